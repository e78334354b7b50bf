//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum QrError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// An argument could not be interpreted, e.g. an unknown risk preference.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No valid action can be produced.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Shapes of tensors or vectors exchanged between components do not agree.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Sampling was requested from an empty replay buffer.
    #[error("Replay buffer is empty")]
    EmptyBuffer,

    /// An index is outside of the valid range.
    #[error("Index {0} is out of range (size {1})")]
    IndexOutOfRange(usize, usize),
}
