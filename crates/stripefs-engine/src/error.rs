//! Error types for the request engine.

use thiserror::Error;

use stripefs_proto::ProtoError;

use crate::job::JobId;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error variants for the dispatcher and its collaborators.
///
/// Business-level failures never appear here; those travel as completion
/// codes through the transition tables. These variants cover protocol
/// rejections (no request context exists yet) and engine-invariant
/// violations (the engine halts).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The incoming message was rejected before a request context existed.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtoError),

    /// A job completion arrived for a job the engine is not tracking.
    #[error("Unknown job id: {0:?}")]
    UnknownJob(JobId),

    /// A scheduler release failed; object exclusivity can no longer be
    /// guaranteed and the engine must stop.
    #[error("Scheduler release failed for request {request}: {reason}")]
    SchedulerInconsistent {
        /// Request whose release state failed.
        request: u64,
        /// Description of the inconsistency.
        reason: String,
    },

    /// A state handler reported an unrecoverable condition.
    #[error("Fatal condition in {machine}/{state}: code {code}")]
    FatalState {
        /// Name of the transition table.
        machine: &'static str,
        /// Name of the failing state.
        state: &'static str,
        /// Completion code observed at the fatal state.
        code: i32,
    },

    /// The engine has halted; no further requests are processed.
    #[error("Engine halted")]
    Halted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_result_alias() {
        let ok: EngineResult<u32> = Ok(7);
        assert!(ok.is_ok());

        let err: EngineResult<u32> = Err(EngineError::Halted);
        assert!(err.is_err());
    }

    #[test]
    fn test_protocol_error_wraps() {
        let err = EngineError::from(ProtoError::UnknownOperation(12));
        assert!(format!("{}", err).contains("Unknown operation code: 12"));
    }

    #[test]
    fn test_fatal_state_display() {
        let err = EngineError::FatalState {
            machine: "mkdir",
            state: "critical_error",
            code: -5,
        };
        assert_eq!(
            format!("{}", err),
            "Fatal condition in mkdir/critical_error: code -5"
        );
    }
}
