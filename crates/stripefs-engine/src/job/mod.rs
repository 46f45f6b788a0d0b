//! The job interface: a uniform non-blocking operation-posting boundary.
//!
//! Every call a state handler makes against the network transport or the
//! storage backend goes through [`JobInterface`]. A post either finishes
//! synchronously ([`JobOutcome::Done`]) or returns a [`JobId`] and is
//! completed later through [`JobInterface::poll`], which the event loop
//! feeds back into the dispatcher.

pub mod memory;

use bytes::Bytes;

use stripefs_proto::types::{FsId, IoKind, ObjectHandle, ObjectType};

pub use memory::{JobKind, MemoryJobs};

/// Identifier for a pending job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

/// Transport addressing needed to send a reply to the requesting peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplyAddr {
    /// Opaque peer address assigned by the transport layer.
    pub peer: u64,
    /// Message tag correlating the reply with the request.
    pub tag: u64,
}

/// Result of a completed job.
///
/// `error_code` follows the shared convention: `0` success, negative
/// failure. The remaining fields are filled by whichever job kinds produce
/// them, mirroring the one status structure all completions share.
#[derive(Clone, Debug, Default)]
pub struct JobStatus {
    /// Completion code for the job.
    pub error_code: i32,
    /// Handle minted by a dataspace create.
    pub handle: Option<ObjectHandle>,
    /// Bytes moved by a transfer or send.
    pub actual_size: u64,
    /// Value produced by a keyval read.
    pub value: Option<Vec<u8>>,
}

impl JobStatus {
    /// A successful status with no result fields.
    pub fn ok() -> Self {
        JobStatus::default()
    }

    /// A failed status carrying the given completion code.
    pub fn failed(code: i32) -> Self {
        JobStatus {
            error_code: code,
            ..JobStatus::default()
        }
    }
}

/// Outcome of posting a job.
#[derive(Debug)]
pub enum JobOutcome {
    /// The job finished synchronously; the status is available now.
    Done(JobStatus),
    /// The job is in flight; a completion for this id arrives later.
    Pending(JobId),
}

/// Non-blocking posting boundary to storage and transport.
///
/// Posts themselves do not fail: backend errors are reported as negative
/// completion codes inside [`JobStatus`] so they can be routed through the
/// transition tables like any other completion.
pub trait JobInterface {
    /// Creates a storage object, minting its handle near `hint`.
    fn dspace_create(&mut self, fs: FsId, hint: ObjectHandle, ty: ObjectType) -> JobOutcome;

    /// Removes a storage object.
    fn dspace_remove(&mut self, fs: FsId, handle: ObjectHandle) -> JobOutcome;

    /// Reads the value stored under `key` on an object.
    fn keyval_read(&mut self, fs: FsId, handle: ObjectHandle, key: &str) -> JobOutcome;

    /// Writes `value` under `key` on an object.
    fn keyval_write(
        &mut self,
        fs: FsId,
        handle: ObjectHandle,
        key: &str,
        value: &[u8],
    ) -> JobOutcome;

    /// Starts a bulk transfer against an object's data stream.
    fn bulk_transfer(
        &mut self,
        fs: FsId,
        handle: ObjectHandle,
        kind: IoKind,
        offset: u64,
        size: u64,
    ) -> JobOutcome;

    /// Sends an encoded reply frame to a peer.
    fn send_reply(&mut self, addr: ReplyAddr, frame: Bytes) -> JobOutcome;

    /// Drains completions for previously pending jobs.
    fn poll(&mut self) -> Vec<(JobId, JobStatus)>;
}
