//! Object-creation state machine.
//!
//! init -> create_object -> send -> release -> cleanup, with a recoverable
//! error detour that still sends a failure response, and a critical-error
//! state for release failing.

use stripefs_proto::types::ObjectType;
use stripefs_proto::{status, ResponseBody};

use crate::context::RequestContext;
use crate::dispatch::Services;
use crate::error::EngineError;
use crate::job::JobStatus;
use crate::machine::{Action, StateSpec, TableBuilder, TableError, TransitionTable};

use super::{cleanup, critical_error, fill_error_response, post_reply, sched_admit, sched_release};

/// Builds the create transition table.
pub fn machine() -> Result<TransitionTable, TableError> {
    TableBuilder::new("create")
        .state(StateSpec::run("init", sched_admit).default_to("create_object"))
        .state(
            StateSpec::run("create_object", create_object)
                .on(status::OK, "send")
                .default_to("err_msg"),
        )
        .state(StateSpec::run("send", create_send).default_to("release"))
        .state(
            StateSpec::run("release", sched_release)
                .on(status::OK, "cleanup")
                .default_to("critical_error"),
        )
        .state(StateSpec::run("err_msg", fill_error_response).default_to("send"))
        .state(StateSpec::run("cleanup", cleanup).terminal())
        .state(StateSpec::run("critical_error", critical_error).terminal())
        .build()
}

/// Posts the dataspace creation. Directories go through mkdir, which also
/// writes the initial attributes; a create asking for one is a client bug.
fn create_object(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    let req = match ctx.req.as_create() {
        Some(r) => r.clone(),
        None => {
            return Action::Fatal(EngineError::FatalState {
                machine: "create",
                state: "create_object",
                code: status.error_code,
            })
        }
    };
    if req.object_type == ObjectType::Directory {
        return services.finish_now(status::NOT_DIR, status);
    }
    let outcome = services
        .jobs
        .dspace_create(req.fs_id, req.handle_hint, req.object_type);
    services.post(outcome, status)
}

/// Fills the minted handle into the response (success path only) and posts
/// the reply.
fn create_send(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    if !status::is_failure(ctx.resp.status) {
        if let Some(handle) = status.handle {
            ctx.resp.body = ResponseBody::Create { handle };
        }
    }
    post_reply(ctx, services, status)
}
