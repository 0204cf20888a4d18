//! Errors raised across the native call boundary.

use thiserror::Error;

/// Fatal signal returned by a native operation.
///
/// The machine attaches the source line and callee name before surfacing
/// it as a runtime error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    /// Operand types not supported by the operation.
    #[error("expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },

    /// Integer or float division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Subscript outside `0..size`.
    #[error("index {index} out of range (size {size})")]
    IndexOutOfRange { index: i64, size: usize },

    /// Requested container size above the allowed maximum.
    #[error("size {requested} exceeds the limit of {limit}")]
    SizeLimit { requested: i64, limit: usize },

    /// Write to a read-only object.
    #[error("object is read-only")]
    ReadOnly,

    /// Any other failure, described by the native itself.
    #[error("{0}")]
    Fatal(String),
}
