//! Attribute-retrieval state machine.
//!
//! Reads the attribute keyval into a scratch buffer owned by the context;
//! cleanup frees it along with everything else the context holds.

use stripefs_proto::types::ObjectAttr;
use stripefs_proto::{status, ResponseBody};

use crate::context::RequestContext;
use crate::dispatch::Services;
use crate::error::EngineError;
use crate::job::JobStatus;
use crate::machine::{Action, StateSpec, TableBuilder, TableError, TransitionTable};

use super::{
    cleanup, critical_error, fill_error_response, post_reply, sched_admit, sched_release, ATTR_KEY,
};

/// Builds the getattr transition table.
pub fn machine() -> Result<TransitionTable, TableError> {
    TableBuilder::new("getattr")
        .state(StateSpec::run("init", sched_admit).default_to("read_attr"))
        .state(
            StateSpec::run("read_attr", read_attr)
                .on(status::OK, "send")
                .default_to("err_msg"),
        )
        .state(StateSpec::run("send", getattr_send).default_to("release"))
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

/// Posts the attribute keyval read.
fn read_attr(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    let req = match ctx.req.as_getattr() {
        Some(r) => r.clone(),
        None => {
            return Action::Fatal(EngineError::FatalState {
                machine: "getattr",
                state: "read_attr",
                code: status.error_code,
            })
        }
    };
    let outcome = services.jobs.keyval_read(req.fs_id, req.handle, ATTR_KEY);
    services.post(outcome, status)
}

/// Decodes the attribute value out of the read completion and posts the
/// reply. A value that fails to decode is reported to the client as an I/O
/// failure; the detour still passes release.
fn getattr_send(
    ctx: &mut RequestContext,
    services: &mut Services<'_>,
    status: &mut JobStatus,
) -> Action {
    if !status::is_failure(ctx.resp.status) {
        ctx.scratch.attr_value = status.value.take();
        match ctx
            .scratch
            .attr_value
            .as_deref()
            .map(bincode::deserialize::<ObjectAttr>)
        {
            Some(Ok(attr)) => ctx.resp.body = ResponseBody::Getattr { attr },
            _ => {
                ctx.resp.status = status::IO;
                ctx.resp.body = ResponseBody::None;
            }
        }
    }
    post_reply(ctx, services, status)
}
