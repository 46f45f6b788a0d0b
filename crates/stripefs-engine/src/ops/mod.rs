//! Operation state machines.
//!
//! Every machine is built from the same recurring shape: admit via the
//! request scheduler, run the operation's storage actions, send the reply,
//! release the scheduler ticket, free the context's resources. Failure at a
//! domain action detours through an error state that fills the failure code
//! into the response and rejoins at send, so release dominates cleanup on
//! every path and the client always gets a reply.

pub mod create;
pub mod getattr;
pub mod io;
pub mod mkdir;

use tracing::warn;

use stripefs_proto::{status, wire, ResponseBody};

use crate::context::RequestContext;
use crate::dispatch::Services;
use crate::error::EngineError;
use crate::job::JobStatus;
use crate::machine::Action;

/// Keyval key the object attributes are stored under.
pub const ATTR_KEY: &str = "metadata";

/// Shared `init` state: request admission for the target object.
///
/// Admission never fails; it either grants immediately or queues the
/// context FIFO behind the current holder, in which case the engine
/// suspends it until a release promotes it.
pub(crate) fn sched_admit(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    let (fs, handle) = ctx.req.target();
    let (ticket, ready) = services.scheduler.admit(fs, handle, ctx.id);
    ctx.ticket = Some(ticket);
    if ready {
        services.finish_now(status::OK, status)
    } else {
        Action::Deferred
    }
}

/// Shared send tail: encode the assembled response and post the reply.
///
/// An encode failure here is dispatch bookkeeping failing, not an operation
/// error; the engine halts rather than leaving the peer without the reply
/// it can no longer construct.
pub(crate) fn post_reply(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    match wire::encode_response(&ctx.resp) {
        Ok(frame) => {
            ctx.reply_frame = Some(frame.clone());
            let outcome = services.jobs.send_reply(ctx.addr, frame);
            services.post(outcome, status)
        }
        Err(e) => Action::Fatal(EngineError::Protocol(e)),
    }
}

/// Shared `release` state: relinquish the scheduler ticket.
///
/// A promoted waiter is handed to the engine for resumption. Release
/// failure does not complete the operation here; it routes to the machine's
/// critical-error state, because a stuck object is worse than a stuck
/// server.
pub(crate) fn sched_release(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    match ctx.ticket.take() {
        Some(ticket) => match services.scheduler.release(ticket) {
            Ok(Some(wakeup)) => {
                services.wake(wakeup);
                services.finish_now(status::OK, status)
            }
            Ok(None) => services.finish_now(status::OK, status),
            Err(e) => {
                ctx.fault = Some(e.to_string());
                services.finish_now(status::IO, status)
            }
        },
        None => {
            ctx.fault = Some("release without a held ticket".to_string());
            services.finish_now(status::IO, status)
        }
    }
}

/// Shared recoverable-error state: fill the failure code into the response.
///
/// A code preserved across an undo detour takes precedence over the last
/// completion, so the client sees the original failure, not the undo's
/// outcome. The detour then rejoins at send via the default transition.
pub(crate) fn fill_error_response(
    ctx: &mut RequestContext,
    _services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    let code = ctx.scratch.failed.take().unwrap_or(status.error_code);
    warn!(
        request = ctx.id.0,
        op = ctx.op().name(),
        code,
        "operation failed; sending error response"
    );
    ctx.resp.status = code;
    ctx.resp.body = ResponseBody::None;
    Action::Complete
}

/// Shared terminal state: free the buffers this context owns.
pub(crate) fn cleanup(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    ctx.release_resources();
    services.finish_now(status::OK, status)
}

/// Terminal state for bulk I/O: engine-owned resources are freed, but the
/// operation's data buffers remain with the outer transfer layer, so the
/// context terminates detached instead of completed.
pub(crate) fn cleanup_detached(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    ctx.detached = true;
    ctx.release_resources();
    services.finish_now(status::OK, status)
}

/// Shared fatal state, reached only when release itself failed: object
/// exclusivity can no longer be guaranteed, so the engine halts.
pub(crate) fn critical_error(
    ctx: &mut RequestContext,
    _services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    let reason = ctx
        .fault
        .take()
        .unwrap_or_else(|| format!("completion code {}", status.error_code));
    Action::Fatal(EngineError::SchedulerInconsistent {
        request: ctx.id.0,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use stripefs_proto::types::{FsId, ObjectHandle};
    use stripefs_proto::wire::{GetattrRequest, Request, RequestBody};
    use stripefs_proto::OpCode;

    use crate::context::{RequestContext, RequestId};
    use crate::job::{JobStatus, MemoryJobs, ReplyAddr};
    use crate::machine::Target;

    use super::*;

    fn context() -> RequestContext {
        let req = Request {
            op: OpCode::Getattr,
            body: RequestBody::Getattr(GetattrRequest {
                fs_id: FsId::new(1),
                handle: ObjectHandle::new(7),
            }),
        };
        RequestContext::new(RequestId(1), ReplyAddr { peer: 1, tag: 0 }, req)
    }

    #[test]
    fn test_release_of_stale_ticket_completes_with_io() {
        let mut ctx = context();
        let mut jobs = MemoryJobs::new();
        let mut scheduler = crate::sched::RequestScheduler::new();
        let mut wakeups = VecDeque::new();

        // The ticket was already released; holding onto it is the
        // inconsistency the release state must surface.
        let (ticket, ready) = scheduler.admit(FsId::new(1), ObjectHandle::new(7), ctx.id);
        assert!(ready);
        scheduler.release(ticket).unwrap();
        ctx.ticket = Some(ticket);

        let mut services = Services {
            jobs: &mut jobs,
            scheduler: &mut scheduler,
            parked: None,
            wakeups: &mut wakeups,
        };
        let mut st = JobStatus::ok();
        let action = sched_release(&mut ctx, &mut services, &mut st);
        assert!(matches!(action, Action::Complete));
        assert_eq!(st.error_code, status::IO);
        assert!(ctx.fault.is_some());
        assert!(ctx.ticket.is_none());
    }

    #[test]
    fn test_release_without_ticket_completes_with_io() {
        let mut ctx = context();
        let mut jobs = MemoryJobs::new();
        let mut scheduler = crate::sched::RequestScheduler::new();
        let mut wakeups = VecDeque::new();

        let mut services = Services {
            jobs: &mut jobs,
            scheduler: &mut scheduler,
            parked: None,
            wakeups: &mut wakeups,
        };
        let mut st = JobStatus::ok();
        let action = sched_release(&mut ctx, &mut services, &mut st);
        assert!(matches!(action, Action::Complete));
        assert_eq!(st.error_code, status::IO);
        assert!(ctx.fault.is_some());
    }

    #[test]
    fn test_every_machine_routes_release_failure_to_critical_error() {
        let tables = [
            create::machine().unwrap(),
            mkdir::machine().unwrap(),
            getattr::machine().unwrap(),
            io::machine().unwrap(),
        ];
        for table in &tables {
            let release = table.index_of("release").unwrap();
            let critical = table.index_of("critical_error").unwrap();
            assert_eq!(
                table.state(release).unwrap().next_for(status::IO),
                Target::State(critical),
                "{}: release failure must reach critical_error",
                table.name()
            );
        }
    }

    #[test]
    fn test_critical_error_reports_preserved_fault_as_fatal() {
        let mut ctx = context();
        ctx.fault = Some("stale ticket".to_string());
        let mut jobs = MemoryJobs::new();
        let mut scheduler = crate::sched::RequestScheduler::new();
        let mut wakeups = VecDeque::new();

        let mut services = Services {
            jobs: &mut jobs,
            scheduler: &mut scheduler,
            parked: None,
            wakeups: &mut wakeups,
        };
        let mut st = JobStatus::failed(status::IO);
        match critical_error(&mut ctx, &mut services, &mut st) {
            Action::Fatal(EngineError::SchedulerInconsistent { request, reason }) => {
                assert_eq!(request, 1);
                assert_eq!(reason, "stale ticket");
            }
            other => panic!("expected SchedulerInconsistent, got {:?}", other),
        }
    }
}
