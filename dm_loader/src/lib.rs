//! Datamodel File Loading and Import Resolution
//!
//! This crate loads datamodel description files from disk, follows their
//! imports and merges every declared type into a single [`LoadedSchema`]
//! that the generator consumes through the `SchemaSource` trait.

pub mod file;
pub mod resolver;

// Re-export commonly used types at the crate root
pub use file::{DatamodelFile, DatamodelMetadata, ImportSource, Packaging, PackagingOptions};
pub use resolver::{LoadError, LoadedSchema, SchemaLoader};

// Re-export dm_types for convenience
pub use dm_types;
