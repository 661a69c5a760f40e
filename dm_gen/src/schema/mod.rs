pub mod resolved;

pub use resolved::{
    Datamodel, Field, FieldFlags, FieldType, FloatType, IntegerType, LeafType, Record, Resolution,
    ResolveError, TypeResolver,
};
