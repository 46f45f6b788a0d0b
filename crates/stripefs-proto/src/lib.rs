#![warn(missing_docs)]

//! StripeFS protocol subsystem: operation codes, typed request/response
//! structures, and the wire frame encoding consumed by the server engine.

pub mod error;
pub mod op;
pub mod status;
pub mod types;
pub mod wire;

pub use error::{ProtoError, ProtoResult};
pub use op::OpCode;
pub use types::{FsId, ObjectAttr, ObjectHandle, ObjectType};
pub use wire::{Request, RequestBody, Response, ResponseBody};
