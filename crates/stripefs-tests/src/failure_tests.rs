//! Failure paths: error responses, fatal states, and the halted engine.

#[cfg(test)]
mod tests {
    use stripefs_engine::context::RequestContext;
    use stripefs_engine::dispatch::Services;
    use stripefs_engine::job::{JobKind, JobStatus, MemoryJobs};
    use stripefs_engine::machine::{Action, StateSpec, TableBuilder};
    use stripefs_engine::registry::OpRegistry;
    use stripefs_engine::{DispatchOutcome, Engine, EngineConfig, EngineError};
    use stripefs_proto::types::ObjectHandle;
    use stripefs_proto::{status, OpCode, ResponseBody};

    use crate::harness::{addr, engine, engine_with, getattr_frame, last_reply, mkdir_frame, FS};

    #[test]
    fn test_missing_object_produces_failure_response() {
        let mut engine = engine();
        let outcome = engine.admit(&getattr_frame(404), addr(0)).unwrap();
        assert_eq!(outcome, DispatchOutcome::Completed);

        let reply = last_reply(&engine);
        assert_eq!(reply.status, status::NOT_FOUND);
        assert!(matches!(reply.body, ResponseBody::None));
        assert!(engine.scheduler().is_idle(FS, ObjectHandle::new(404)));
        assert!(!engine.is_halted());
    }

    #[test]
    fn test_failed_attribute_write_undoes_create() {
        let mut jobs = MemoryJobs::new();
        jobs.fail_next(JobKind::KeyvalWrite, status::NO_SPACE);
        let mut engine = engine_with(jobs);

        engine.admit(&mkdir_frame(100), addr(0)).unwrap();

        // The client sees the write failure, not the undo's outcome, and
        // the half-created directory is gone.
        let reply = last_reply(&engine);
        assert_eq!(reply.status, status::NO_SPACE);
        assert!(!engine.jobs().has_object(FS, ObjectHandle::new(100)));
        assert!(engine.scheduler().is_idle(FS, ObjectHandle::new(100)));
    }

    fn grab_ticket(
        ctx: &mut RequestContext,
        services: &mut Services<'_>,
        status: &mut JobStatus,
    ) -> Action {
        let (fs, handle) = ctx.req.target();
        let (ticket, _) = services.scheduler.admit(fs, handle, ctx.id);
        ctx.ticket = Some(ticket);
        services.finish_now(status::OK, status)
    }

    fn release_twice(
        ctx: &mut RequestContext,
        services: &mut Services<'_>,
        status: &mut JobStatus,
    ) -> Action {
        let ticket = ctx.ticket.take().unwrap();
        services.scheduler.release(ticket).unwrap();
        match services.scheduler.release(ticket) {
            Ok(_) => services.finish_now(status::OK, status),
            Err(e) => Action::Fatal(EngineError::SchedulerInconsistent {
                request: ctx.id.0,
                reason: e.to_string(),
            }),
        }
    }

    /// Registry whose getattr table releases its ticket twice, modeling a
    /// machine that has lost track of object exclusivity.
    fn broken_registry() -> OpRegistry {
        let table = TableBuilder::new("broken")
            .state(StateSpec::run("init", grab_ticket).default_to("release"))
            .state(StateSpec::run("release", release_twice).terminal())
            .build()
            .unwrap();
        let mut registry = OpRegistry::new();
        registry.register(OpCode::Getattr, table);
        registry
    }

    #[test]
    fn test_scheduler_inconsistency_halts_engine() {
        let mut engine = Engine::new(EngineConfig::default(), broken_registry(), MemoryJobs::new());

        match engine.admit(&getattr_frame(7), addr(0)) {
            Err(EngineError::SchedulerInconsistent { request, .. }) => assert_eq!(request, 1),
            other => panic!("expected SchedulerInconsistent, got {:?}", other),
        }
        assert!(engine.is_halted());

        // A halted engine accepts nothing further.
        match engine.admit(&getattr_frame(8), addr(1)) {
            Err(EngineError::Halted) => {}
            other => panic!("expected Halted, got {:?}", other),
        }
        match engine.pump() {
            Ok(0) => {}
            other => panic!("expected no completions, got {:?}", other),
        }
    }

    #[test]
    fn test_unregistered_op_rejected_with_registered_subset() {
        // Only getattr registered; a mkdir frame is a protocol error even
        // though the opcode itself is known to the wire layer.
        let table = TableBuilder::new("only")
            .state(StateSpec::run("init", grab_ticket).terminal())
            .build()
            .unwrap();
        let mut registry = OpRegistry::new();
        registry.register(OpCode::Getattr, table);
        let mut engine = Engine::new(EngineConfig::default(), registry, MemoryJobs::new());

        match engine.admit(&mkdir_frame(5), addr(0)) {
            Err(EngineError::Protocol(_)) => {}
            other => panic!("expected protocol error, got {:?}", other),
        }
        assert_eq!(engine.stats().protocol_errors, 1);
        assert!(!engine.is_halted());
    }
}
