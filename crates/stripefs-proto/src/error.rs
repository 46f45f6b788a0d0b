//! Error types for the protocol subsystem.

use thiserror::Error;

/// Result type alias for protocol operations.
pub type ProtoResult<T> = Result<T, ProtoError>;

/// Error variants for wire encode/decode.
///
/// All of these are protocol errors: the server rejects the message before
/// any per-request state is allocated.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The operation code in the frame header is not a known operation.
    #[error("Unknown operation code: {0}")]
    UnknownOperation(u32),

    /// The frame is shorter than the fixed header.
    #[error("Truncated frame: got {got} bytes, need at least {need}")]
    TruncatedFrame {
        /// Number of bytes received.
        got: usize,
        /// Minimum frame length.
        need: usize,
    },

    /// The frame body could not be decoded for the given operation.
    #[error("Malformed body for {op:?}: {reason}")]
    MalformedBody {
        /// Operation the body was decoded as.
        op: crate::op::OpCode,
        /// Description of the decode failure.
        reason: String,
    },

    /// A message could not be serialized.
    #[error("Encode error: {0}")]
    EncodeError(String),
}
