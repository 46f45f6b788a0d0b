//! Bulk-I/O state machine, the send-then-wait variant.
//!
//! The transfer is started and the acknowledgment sent, but the data
//! buffers stay with the outer bulk-transfer layer past this machine's
//! lifetime. Its terminal state therefore frees only engine-owned
//! resources and terminates the context detached rather than completed.

use stripefs_proto::{status, ResponseBody};

use crate::context::RequestContext;
use crate::dispatch::Services;
use crate::error::EngineError;
use crate::job::JobStatus;
use crate::machine::{Action, StateSpec, TableBuilder, TableError, TransitionTable};

use super::{cleanup_detached, critical_error, fill_error_response, post_reply, sched_admit, sched_release};

/// Builds the io transition table.
pub fn machine() -> Result<TransitionTable, TableError> {
    TableBuilder::new("io")
        .state(StateSpec::run("init", sched_admit).default_to("transfer"))
        .state(
            StateSpec::run("transfer", start_transfer)
                .on(status::OK, "send")
                .default_to("err_msg"),
        )
        .state(StateSpec::run("send", io_send).default_to("release"))
        .state(
            StateSpec::run("release", sched_release)
                .on(status::OK, "cleanup")
                .default_to("critical_error"),
        )
        .state(StateSpec::run("err_msg", fill_error_response).default_to("send"))
        .state(StateSpec::run("cleanup", cleanup_detached).terminal())
        .state(StateSpec::run("critical_error", critical_error).terminal())
        .build()
}

/// Posts the bulk transfer against the object's data stream.
fn start_transfer(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    let req = match ctx.req.as_io() {
        Some(r) => r.clone(),
        None => {
            return Action::Fatal(EngineError::FatalState {
                machine: "io",
                state: "transfer",
                code: status.error_code,
            })
        }
    };
    let outcome =
        services
            .jobs
            .bulk_transfer(req.fs_id, req.handle, req.kind, req.offset, req.size);
    services.post(outcome, status)
}

/// Acknowledges the accepted transfer size and posts the reply.
fn io_send(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    if !status::is_failure(ctx.resp.status) {
        ctx.resp.body = ResponseBody::Io {
            bytes: status.actual_size,
        };
    }
    post_reply(ctx, services, status)
}
