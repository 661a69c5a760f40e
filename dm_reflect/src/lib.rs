/* Datamodel Reflection Library
 *
 * Executes the marshalling IR produced by dm_gen against in-memory values,
 * so the behavior of generated N-API code can be checked without a C
 * toolchain. Native structs are `NativeValue` trees; JavaScript values are
 * `serde_json::Value`.
 */

pub mod errors;
pub mod interpreter;
pub mod value;

pub use errors::{ReflectError, ReflectResult};
pub use interpreter::{marshal_in, marshal_out, wire_root};
pub use value::NativeValue;
