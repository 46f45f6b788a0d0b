//! In-memory job interface adapter.
//!
//! Backs the posting boundary with process-local maps standing in for the
//! dataspace/keyval store and the network transport. Completions are
//! synchronous by default; deferred mode queues every completion for
//! [`MemoryJobs::poll`] so tests and the demo binary can exercise the
//! suspend/resume half of the dispatcher. Single-shot failure injection
//! turns the next post of a given kind into a negative completion code.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use tracing::debug;

use stripefs_proto::status;
use stripefs_proto::types::{FsId, IoKind, ObjectHandle, ObjectType};

use super::{JobId, JobInterface, JobOutcome, JobStatus, ReplyAddr};

/// Kinds of jobs the adapter can post, used to target failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Dataspace creation.
    DspaceCreate,
    /// Dataspace removal.
    DspaceRemove,
    /// Keyval read.
    KeyvalRead,
    /// Keyval write.
    KeyvalWrite,
    /// Bulk data transfer.
    BulkTransfer,
    /// Reply send.
    SendReply,
}

/// In-memory [`JobInterface`] implementation.
pub struct MemoryJobs {
    dspaces: HashMap<(FsId, ObjectHandle), ObjectType>,
    keyvals: HashMap<(FsId, ObjectHandle), HashMap<String, Vec<u8>>>,
    sent: Vec<(ReplyAddr, Bytes)>,
    fail_next: HashMap<JobKind, i32>,
    deferred: VecDeque<(JobId, JobStatus)>,
    defer_all: bool,
    next_handle: u64,
    next_job: u64,
}

impl MemoryJobs {
    /// Creates an empty adapter with synchronous completion.
    pub fn new() -> Self {
        MemoryJobs {
            dspaces: HashMap::new(),
            keyvals: HashMap::new(),
            sent: Vec::new(),
            fail_next: HashMap::new(),
            deferred: VecDeque::new(),
            defer_all: false,
            next_handle: 1,
            next_job: 1,
        }
    }

    /// When enabled, every post returns pending and completes via `poll`.
    pub fn set_defer_all(&mut self, defer: bool) {
        self.defer_all = defer;
    }

    /// Arms a single-shot failure: the next post of `kind` completes with
    /// `code` instead of touching the backing store.
    pub fn fail_next(&mut self, kind: JobKind, code: i32) {
        self.fail_next.insert(kind, code);
    }

    /// Seeds a storage object so reads and transfers against it succeed.
    pub fn seed_object(&mut self, fs: FsId, handle: ObjectHandle, ty: ObjectType) {
        self.dspaces.insert((fs, handle), ty);
        self.next_handle = self.next_handle.max(handle.raw() + 1);
    }

    /// Seeds a keyval pair on an existing object.
    pub fn seed_keyval(&mut self, fs: FsId, handle: ObjectHandle, key: &str, value: Vec<u8>) {
        self.keyvals
            .entry((fs, handle))
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Replies captured by `send_reply`, in send order.
    pub fn sent_replies(&self) -> &[(ReplyAddr, Bytes)] {
        &self.sent
    }

    /// True if the object exists in the dataspace store.
    pub fn has_object(&self, fs: FsId, handle: ObjectHandle) -> bool {
        self.dspaces.contains_key(&(fs, handle))
    }

    /// Number of completions waiting for `poll`.
    pub fn pending_count(&self) -> usize {
        self.deferred.len()
    }

    fn take_failure(&mut self, kind: JobKind) -> Option<i32> {
        self.fail_next.remove(&kind)
    }

    fn finish(&mut self, status: JobStatus) -> JobOutcome {
        if self.defer_all {
            let id = JobId(self.next_job);
            self.next_job += 1;
            debug!(job = id.0, code = status.error_code, "job deferred");
            self.deferred.push_back((id, status));
            JobOutcome::Pending(id)
        } else {
            JobOutcome::Done(status)
        }
    }
}

impl Default for MemoryJobs {
    fn default() -> Self {
        Self::new()
    }
}

impl JobInterface for MemoryJobs {
    fn dspace_create(&mut self, fs: FsId, hint: ObjectHandle, ty: ObjectType) -> JobOutcome {
        if let Some(code) = self.take_failure(JobKind::DspaceCreate) {
            return self.finish(JobStatus::failed(code));
        }
        let handle = ObjectHandle::new(self.next_handle.max(hint.raw()));
        self.next_handle = handle.raw() + 1;
        self.dspaces.insert((fs, handle), ty);
        debug!(fs = fs.0, handle = handle.raw(), "dspace created");
        let mut st = JobStatus::ok();
        st.handle = Some(handle);
        self.finish(st)
    }

    fn dspace_remove(&mut self, fs: FsId, handle: ObjectHandle) -> JobOutcome {
        if let Some(code) = self.take_failure(JobKind::DspaceRemove) {
            return self.finish(JobStatus::failed(code));
        }
        let st = if self.dspaces.remove(&(fs, handle)).is_some() {
            self.keyvals.remove(&(fs, handle));
            JobStatus::ok()
        } else {
            JobStatus::failed(status::NOT_FOUND)
        };
        self.finish(st)
    }

    fn keyval_read(&mut self, fs: FsId, handle: ObjectHandle, key: &str) -> JobOutcome {
        if let Some(code) = self.take_failure(JobKind::KeyvalRead) {
            return self.finish(JobStatus::failed(code));
        }
        let st = match self
            .keyvals
            .get(&(fs, handle))
            .and_then(|kv| kv.get(key))
            .cloned()
        {
            Some(value) => {
                let mut st = JobStatus::ok();
                st.actual_size = value.len() as u64;
                st.value = Some(value);
                st
            }
            None => JobStatus::failed(status::NOT_FOUND),
        };
        self.finish(st)
    }

    fn keyval_write(
        &mut self,
        fs: FsId,
        handle: ObjectHandle,
        key: &str,
        value: &[u8],
    ) -> JobOutcome {
        if let Some(code) = self.take_failure(JobKind::KeyvalWrite) {
            return self.finish(JobStatus::failed(code));
        }
        if !self.dspaces.contains_key(&(fs, handle)) {
            return self.finish(JobStatus::failed(status::NOT_FOUND));
        }
        self.keyvals
            .entry((fs, handle))
            .or_default()
            .insert(key.to_string(), value.to_vec());
        let mut st = JobStatus::ok();
        st.actual_size = value.len() as u64;
        self.finish(st)
    }

    fn bulk_transfer(
        &mut self,
        fs: FsId,
        handle: ObjectHandle,
        kind: IoKind,
        offset: u64,
        size: u64,
    ) -> JobOutcome {
        if let Some(code) = self.take_failure(JobKind::BulkTransfer) {
            return self.finish(JobStatus::failed(code));
        }
        if !self.dspaces.contains_key(&(fs, handle)) {
            return self.finish(JobStatus::failed(status::NOT_FOUND));
        }
        debug!(
            fs = fs.0,
            handle = handle.raw(),
            ?kind,
            offset,
            size,
            "bulk transfer accepted"
        );
        let mut st = JobStatus::ok();
        st.actual_size = size;
        self.finish(st)
    }

    fn send_reply(&mut self, addr: ReplyAddr, frame: Bytes) -> JobOutcome {
        if let Some(code) = self.take_failure(JobKind::SendReply) {
            return self.finish(JobStatus::failed(code));
        }
        let mut st = JobStatus::ok();
        st.actual_size = frame.len() as u64;
        self.sent.push((addr, frame));
        self.finish(st)
    }

    fn poll(&mut self) -> Vec<(JobId, JobStatus)> {
        self.deferred.drain(..).collect()
    }
}
