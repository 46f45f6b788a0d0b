#![warn(missing_docs)]

//! StripeFS engine subsystem: the server's per-request asynchronous
//! state-machine execution engine and the request scheduler that serializes
//! concurrent operations against the same storage object.
//!
//! Every operation type is a [`machine::TransitionTable`] of states; each
//! state posts at most one non-blocking job through the [`job::JobInterface`]
//! boundary, and the [`dispatch::Engine`] resumes the right continuation when
//! that job completes.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod machine;
pub mod ops;
pub mod registry;
pub mod sched;

pub use config::EngineConfig;
pub use dispatch::{DispatchOutcome, Engine};
pub use error::{EngineError, EngineResult};
pub use registry::server_registry;
