pub mod flatten;
pub mod ir;
pub mod naming;
pub mod render;

pub use flatten::{EmitError, FlatteningEmitter};
pub use ir::{DefaultValue, Direction, Emission, Handle, Place, Segment, Stmt, TempClass};
pub use naming::NamingContext;
pub use render::{render, render_declarations, IrRenderer, OnFailure, RenderedEmission};

use crate::schema::Field;

/* One dataset flattened with a private naming context */
pub fn flatten_dataset(
    dataset: &Field,
    native_root: &Place,
    wire_root: &Handle,
    direction: Direction,
) -> Result<Emission, EmitError> {
    let mut naming = NamingContext::new();
    FlatteningEmitter::new(&mut naming).emit_dataset(dataset, native_root, wire_root, direction)
}

/* Initial wire skeleton of a dataset with a private naming context */
pub fn flatten_defaults(dataset: &Field, wire_root: &Handle) -> Result<Emission, EmitError> {
    let mut naming = NamingContext::new();
    FlatteningEmitter::new(&mut naming).emit_defaults(dataset, wire_root)
}
