use thiserror::Error;

/// Result alias used across the reflection crate.
pub type ReflectResult<T> = Result<T, ReflectError>;

/// Failures of a marshalling program at run time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReflectError {
    /// A string did not fit its fixed-length buffer (`RangeError`, code `ERANGE`).
    #[error("String too long for {field_path} (max {limit} bytes, got {actual})")]
    StringTooLong {
        field_path: String,
        limit: u32,
        actual: usize,
    },

    /// A JavaScript value had the wrong type for its conversion.
    #[error("Expected {expected} for {path}")]
    TypeMismatch { expected: &'static str, path: String },

    #[error("object has no property '{name}'")]
    MissingProperty { name: String },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A handle was read before anything was stored in it.
    #[error("handle '{0}' read before it was bound")]
    UnboundHandle(String),

    #[error("loop iterator '{0}' used outside its loop")]
    UnboundIterator(char),

    /// The native value does not have the shape the program addresses.
    #[error("native value at '{path}' is not {expected}")]
    NativeShape { path: String, expected: &'static str },
}
