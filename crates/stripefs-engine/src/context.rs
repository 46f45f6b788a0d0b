//! Per-request bookkeeping owned by the engine from admission to cleanup.

use bytes::Bytes;

use stripefs_proto::{OpCode, Request, Response};

use crate::job::ReplyAddr;
use crate::sched::Ticket;

/// Identifier for an in-flight request context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// Scratch buffers allocated by individual states.
///
/// Anything stored here is freed by the terminal cleanup state along with
/// the response; states must not assume scratch survives past cleanup.
#[derive(Debug, Default)]
pub struct Scratch {
    /// Encoded attribute value read or written by attribute states.
    pub attr_value: Option<Vec<u8>>,
    /// Handle minted by a dataspace create, carried to the send state.
    pub created: Option<stripefs_proto::ObjectHandle>,
    /// Failure code preserved across undo states, so the response reports
    /// the original failure rather than the undo's outcome.
    pub failed: Option<i32>,
}

/// One in-flight operation: the decoded request, the response being
/// assembled, the state cursor, and every resource the engine owns on the
/// request's behalf.
///
/// A context enters the engine exactly once (decode) and leaves exactly once
/// (terminal cleanup); the dispatcher drops it after the terminal state.
#[derive(Debug)]
pub struct RequestContext {
    /// Identity of this context in the engine's in-flight map.
    pub id: RequestId,
    /// Where the eventual reply goes.
    pub addr: ReplyAddr,
    /// The decoded request.
    pub req: Request,
    /// The response being assembled; owned exclusively until sent.
    pub resp: Response,
    /// Current position in the operation's transition table.
    pub cursor: usize,
    /// Scheduler ticket once admission has been requested.
    pub ticket: Option<Ticket>,
    /// State-allocated scratch buffers.
    pub scratch: Scratch,
    /// Encoded reply frame, held between encode and send completion.
    pub reply_frame: Option<Bytes>,
    /// Set by the bulk-I/O machine: engine resources are freed but the
    /// operation's buffers remain owned by the outer transfer layer.
    pub detached: bool,
    /// Description of a scheduler fault, set on the critical-error path.
    pub fault: Option<String>,
}

impl RequestContext {
    /// Builds a context for a freshly decoded request with an empty success
    /// response and the cursor at the table's initial state.
    pub fn new(id: RequestId, addr: ReplyAddr, req: Request) -> Self {
        let resp = Response::new(req.op);
        RequestContext {
            id,
            addr,
            req,
            resp,
            cursor: 0,
            ticket: None,
            scratch: Scratch::default(),
            reply_frame: None,
            detached: false,
            fault: None,
        }
    }

    /// Operation code this context is executing.
    pub fn op(&self) -> OpCode {
        self.req.op
    }

    /// Frees the buffers this context owns: scratch, the encoded reply
    /// frame, and the response body. Called from the terminal cleanup state;
    /// cleanup is unreachable twice, so this runs at most once per context.
    pub fn release_resources(&mut self) {
        self.scratch.attr_value = None;
        self.scratch.created = None;
        self.scratch.failed = None;
        self.reply_frame = None;
        self.resp.body = stripefs_proto::ResponseBody::None;
    }
}
