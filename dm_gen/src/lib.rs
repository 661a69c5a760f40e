pub mod codegen;
pub mod schema;

pub use dm_loader;
pub use dm_types;
