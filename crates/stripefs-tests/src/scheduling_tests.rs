//! Serialization of concurrent requests against the same storage object.

#[cfg(test)]
mod tests {
    use stripefs_engine::job::{JobKind, MemoryJobs};
    use stripefs_engine::DispatchOutcome;
    use stripefs_proto::types::{ObjectAttr, ObjectHandle, ObjectType};
    use stripefs_proto::{status, OpCode};

    use crate::harness::{
        addr, engine_with, getattr_frame, mkdir_frame, reply_at, run_until_idle, FS,
    };

    #[test]
    fn test_contended_object_replies_in_admission_order() {
        let mut jobs = MemoryJobs::new();
        jobs.set_defer_all(true);
        let mut engine = engine_with(jobs);

        // The mkdir holds handle 100; both getattrs queue behind it.
        let first = engine.admit(&mkdir_frame(100), addr(0)).unwrap();
        let second = engine.admit(&getattr_frame(100), addr(1)).unwrap();
        let third = engine.admit(&getattr_frame(100), addr(2)).unwrap();
        assert_eq!(first, DispatchOutcome::Pending);
        assert_eq!(second, DispatchOutcome::Pending);
        assert_eq!(third, DispatchOutcome::Pending);
        assert_eq!(engine.scheduler().entry_count(), 3);
        assert_eq!(engine.in_flight(), 3);

        run_until_idle(&mut engine);

        let sent = engine.jobs().sent_replies();
        assert_eq!(sent.len(), 3);
        let tags: Vec<u64> = sent.iter().map(|(a, _)| a.tag).collect();
        assert_eq!(tags, vec![0, 1, 2]);

        let mkdir_reply = reply_at(&engine, 0);
        assert_eq!(mkdir_reply.op, OpCode::Mkdir);
        assert_eq!(mkdir_reply.status, status::OK);
        for i in 1..3 {
            let reply = reply_at(&engine, i);
            assert_eq!(reply.op, OpCode::Getattr);
            assert_eq!(reply.status, status::OK);
        }

        assert!(engine.scheduler().is_idle(FS, ObjectHandle::new(100)));
        assert_eq!(engine.scheduler().entry_count(), 0);
        assert_eq!(engine.stats().completed, 3);
        assert_eq!(engine.in_flight(), 0);
    }

    #[test]
    fn test_unrelated_objects_do_not_serialize() {
        let attr = ObjectAttr::new_directory(1, 1, 0o755);
        let mut jobs = MemoryJobs::new();
        for h in [10, 11] {
            jobs.seed_object(FS, ObjectHandle::new(h), ObjectType::Directory);
            jobs.seed_keyval(
                FS,
                ObjectHandle::new(h),
                "metadata",
                bincode::serialize(&attr).unwrap(),
            );
        }
        let mut engine = engine_with(jobs);

        let a = engine.admit(&getattr_frame(10), addr(0)).unwrap();
        let b = engine.admit(&getattr_frame(11), addr(1)).unwrap();
        assert_eq!(a, DispatchOutcome::Completed);
        assert_eq!(b, DispatchOutcome::Completed);
        assert_eq!(engine.stats().completed, 2);
    }

    #[test]
    fn test_failed_holder_still_promotes_waiter() {
        let attr = ObjectAttr::new_directory(1, 1, 0o755);
        let mut jobs = MemoryJobs::new();
        jobs.seed_object(FS, ObjectHandle::new(20), ObjectType::Directory);
        jobs.seed_keyval(
            FS,
            ObjectHandle::new(20),
            "metadata",
            bincode::serialize(&attr).unwrap(),
        );
        jobs.set_defer_all(true);
        // The first read fails; the waiter behind it must still run.
        jobs.fail_next(JobKind::KeyvalRead, status::IO);
        let mut engine = engine_with(jobs);

        engine.admit(&getattr_frame(20), addr(0)).unwrap();
        engine.admit(&getattr_frame(20), addr(1)).unwrap();
        run_until_idle(&mut engine);

        assert_eq!(engine.jobs().sent_replies().len(), 2);
        assert_eq!(reply_at(&engine, 0).status, status::IO);
        assert_eq!(reply_at(&engine, 1).status, status::OK);
        assert!(engine.scheduler().is_idle(FS, ObjectHandle::new(20)));
        assert!(!engine.is_halted());
    }

    #[test]
    fn test_object_reusable_after_queue_drains() {
        let mut jobs = MemoryJobs::new();
        jobs.set_defer_all(true);
        let mut engine = engine_with(jobs);

        engine.admit(&mkdir_frame(30), addr(0)).unwrap();
        run_until_idle(&mut engine);
        assert!(engine.scheduler().is_idle(FS, ObjectHandle::new(30)));

        // A later request against the same object is admitted immediately.
        engine.admit(&getattr_frame(30), addr(1)).unwrap();
        run_until_idle(&mut engine);
        assert_eq!(engine.jobs().sent_replies().len(), 2);
        assert_eq!(reply_at(&engine, 1).status, status::OK);
    }
}
