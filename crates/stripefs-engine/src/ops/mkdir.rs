//! Directory-creation state machine, the richer example: two domain
//! actions (dataspace create, then the attribute keyval write), an undo
//! state that removes the dataspace when the attribute write fails, and two
//! distinct error states. `err_msg` is recoverable and still produces a
//! client-visible failure response; `critical_error` is reached only from
//! `release` failing and stops the server rather than attempting further
//! client communication.

use stripefs_proto::types::ObjectType;
use stripefs_proto::{status, ResponseBody};

use crate::context::RequestContext;
use crate::dispatch::Services;
use crate::error::EngineError;
use crate::job::JobStatus;
use crate::machine::{Action, StateSpec, TableBuilder, TableError, TransitionTable};

use super::{
    cleanup, critical_error, fill_error_response, post_reply, sched_admit, sched_release, ATTR_KEY,
};

/// Builds the mkdir transition table.
pub fn machine() -> Result<TransitionTable, TableError> {
    TableBuilder::new("mkdir")
        .state(StateSpec::run("init", sched_admit).default_to("create_dir"))
        .state(
            StateSpec::run("create_dir", create_dir)
                .on(status::OK, "write_attr")
                .default_to("err_msg"),
        )
        .state(
            StateSpec::run("write_attr", write_attr)
                .on(status::OK, "send")
                .default_to("remove_dir"),
        )
        .state(StateSpec::run("remove_dir", remove_dir).default_to("err_msg"))
        .state(StateSpec::run("send", mkdir_send).default_to("release"))
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

/// Posts creation of the directory dataspace at the requested handle.
fn create_dir(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    let req = match ctx.req.as_mkdir() {
        Some(r) => r.clone(),
        None => {
            return Action::Fatal(EngineError::FatalState {
                machine: "mkdir",
                state: "create_dir",
                code: status.error_code,
            })
        }
    };
    let outcome = services
        .jobs
        .dspace_create(req.fs_id, req.handle, ObjectType::Directory);
    services.post(outcome, status)
}

/// Encodes the initial attributes into a scratch buffer and posts the
/// keyval write against the handle the create minted.
fn write_attr(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    let req = match ctx.req.as_mkdir() {
        Some(r) => r.clone(),
        None => {
            return Action::Fatal(EngineError::FatalState {
                machine: "mkdir",
                state: "write_attr",
                code: status.error_code,
            })
        }
    };
    let handle = match status.handle {
        Some(h) => h,
        None => return services.finish_now(status::IO, status),
    };
    ctx.scratch.created = Some(handle);

    let encoded = match bincode::serialize(&req.attr) {
        Ok(bytes) => bytes,
        Err(_) => return services.finish_now(status::IO, status),
    };
    let outcome = services
        .jobs
        .keyval_write(req.fs_id, handle, ATTR_KEY, &encoded);
    ctx.scratch.attr_value = Some(encoded);
    services.post(outcome, status)
}

/// Undoes the dataspace create after a failed attribute write, preserving
/// the original failure code for the error response. If the removal itself
/// fails there is nothing further to do; the detour proceeds to err_msg
/// either way.
fn remove_dir(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    ctx.scratch.failed = Some(status.error_code);
    let fs = match ctx.req.as_mkdir() {
        Some(r) => r.fs_id,
        None => {
            return Action::Fatal(EngineError::FatalState {
                machine: "mkdir",
                state: "remove_dir",
                code: status.error_code,
            })
        }
    };
    match ctx.scratch.created.take() {
        Some(handle) => {
            let outcome = services.jobs.dspace_remove(fs, handle);
            services.post(outcome, status)
        }
        // The create never minted a handle; nothing to undo.
        None => services.finish_now(status::OK, status),
    }
}

/// Fills the created handle into the response (success path only) and
/// posts the reply.
fn mkdir_send(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    if !status::is_failure(ctx.resp.status) {
        if let Some(handle) = ctx.scratch.created {
            ctx.resp.body = ResponseBody::Mkdir { handle };
        }
    }
    post_reply(ctx, services, status)
}
