//! Datamodel Type Definitions
//!
//! This crate contains the schema declarations shared by the loader, the
//! generator and the reflection runtime. It provides pure data structures
//! for describing datamodel records without any file I/O or code generation
//! logic.

pub mod source;
pub mod types;

// Re-export commonly used types at the crate root
pub use source::*;
pub use types::*;
