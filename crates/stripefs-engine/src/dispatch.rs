//! The dispatcher: one general algorithm that runs every operation type.
//!
//! [`Engine::admit`] decodes an unexpected incoming message, builds a
//! request context, and invokes the initial state of the operation's
//! transition table. Each state posts at most one job; synchronous
//! completions advance immediately, pending jobs suspend the context until
//! [`Engine::complete`] (or [`Engine::pump`]) delivers the result. Waiters
//! promoted by a scheduler release are resumed through the same advance
//! path once the current context parks or terminates.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, error, warn};

use stripefs_proto::{wire, ProtoError};

use crate::config::EngineConfig;
use crate::context::{RequestContext, RequestId};
use crate::error::{EngineError, EngineResult};
use crate::job::{JobId, JobInterface, JobOutcome, JobStatus, ReplyAddr};
use crate::machine::{Action, Target, TransitionTable};
use crate::registry::OpRegistry;
use crate::sched::{RequestScheduler, Wakeup};

/// What happened to the request that drove this dispatch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The context reached its terminal state; all resources freed.
    Completed,
    /// Engine-owned resources were freed, but the operation's buffers are
    /// still owned by the outer bulk-transfer layer.
    Detached,
    /// A job is pending; the context is suspended.
    Pending,
}

/// Counters kept by the engine.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Contexts admitted into the engine.
    pub admitted: u64,
    /// Contexts that reached cleanup and fully completed.
    pub completed: u64,
    /// Contexts that terminated detached (bulk I/O).
    pub detached: u64,
    /// Frames rejected before a context existed.
    pub protocol_errors: u64,
}

/// Capabilities handed to a state handler for the duration of one
/// invocation: the posting boundary, the scheduler, and the wakeup queue
/// release feeds.
pub struct Services<'a> {
    /// The job posting boundary.
    pub jobs: &'a mut dyn JobInterface,
    /// The request scheduler.
    pub scheduler: &'a mut RequestScheduler,
    pub(crate) parked: Option<JobId>,
    pub(crate) wakeups: &'a mut VecDeque<Wakeup>,
}

impl<'a> Services<'a> {
    /// Folds a post outcome into the handler's return: synchronous
    /// completions store the status and advance; pending jobs record the id
    /// so the engine can route the completion back to this context.
    pub fn post(&mut self, outcome: JobOutcome, status: &mut JobStatus) -> Action {
        match outcome {
            JobOutcome::Done(st) => {
                *status = st;
                Action::Complete
            }
            JobOutcome::Pending(id) => {
                self.parked = Some(id);
                Action::Deferred
            }
        }
    }

    /// Completes the state immediately with the given code, for states that
    /// only do bookkeeping and post no job.
    pub fn finish_now(&mut self, code: i32, status: &mut JobStatus) -> Action {
        *status = JobStatus {
            error_code: code,
            ..JobStatus::default()
        };
        Action::Complete
    }

    /// Queues a promoted waiter for resumption after the current context
    /// parks or terminates.
    pub fn wake(&mut self, wakeup: Wakeup) {
        self.wakeups.push_back(wakeup);
    }
}

/// The per-request state-machine execution engine.
pub struct Engine<J: JobInterface> {
    config: EngineConfig,
    registry: OpRegistry,
    scheduler: RequestScheduler,
    jobs: J,
    contexts: HashMap<RequestId, RequestContext>,
    pending: HashMap<JobId, RequestId>,
    wakeups: VecDeque<Wakeup>,
    next_request: u64,
    halted: bool,
    stats: EngineStats,
}

impl<J: JobInterface> Engine<J> {
    /// Creates an engine over the given registry and job interface.
    pub fn new(config: EngineConfig, registry: OpRegistry, jobs: J) -> Self {
        Engine {
            config,
            registry,
            scheduler: RequestScheduler::new(),
            jobs,
            contexts: HashMap::new(),
            pending: HashMap::new(),
            wakeups: VecDeque::new(),
            next_request: 1,
            halted: false,
            stats: EngineStats::default(),
        }
    }

    /// Admits an unexpected incoming message.
    ///
    /// Decodes the frame, looks up the operation's table, allocates the
    /// request context and its response, and invokes the initial state.
    /// Decode failures and unknown operations are rejected here, before any
    /// context or scheduler state exists.
    pub fn admit(&mut self, raw: &[u8], addr: ReplyAddr) -> EngineResult<DispatchOutcome> {
        if self.halted {
            return Err(EngineError::Halted);
        }

        let req = match wire::decode_request(raw) {
            Ok(req) => req,
            Err(e) => {
                self.stats.protocol_errors += 1;
                warn!(peer = addr.peer, "rejected frame: {e}");
                return Err(EngineError::Protocol(e));
            }
        };

        let table = match self.registry.table(req.op) {
            Some(t) => t,
            None => {
                self.stats.protocol_errors += 1;
                return Err(EngineError::Protocol(ProtoError::UnknownOperation(
                    req.op.as_raw(),
                )));
            }
        };

        let id = RequestId(self.next_request);
        self.next_request += 1;
        let mut ctx = RequestContext::new(id, addr, req);
        ctx.cursor = table.initial();
        self.stats.admitted += 1;
        debug!(request = id.0, op = ctx.op().name(), "request admitted");

        let outcome = self.run(table, ctx, JobStatus::ok(), false)?;
        self.drain_wakeups()?;
        Ok(outcome)
    }

    /// Delivers the completion of a previously pending job and resumes the
    /// owning context.
    pub fn complete(&mut self, job: JobId, status: JobStatus) -> EngineResult<DispatchOutcome> {
        if self.halted {
            return Err(EngineError::Halted);
        }

        let request = self.pending.remove(&job).ok_or(EngineError::UnknownJob(job))?;
        let ctx = self
            .contexts
            .remove(&request)
            .ok_or(EngineError::UnknownJob(job))?;
        let table = match self.registry.table(ctx.op()) {
            Some(t) => t,
            None => {
                // The context was admitted through this registry; absence
                // here means the engine's bookkeeping is broken.
                self.halted = true;
                return Err(EngineError::FatalState {
                    machine: "unknown",
                    state: "complete",
                    code: status.error_code,
                });
            }
        };

        let outcome = self.run(table, ctx, status, true)?;
        self.drain_wakeups()?;
        Ok(outcome)
    }

    /// Drains the job interface's completion queue and feeds every
    /// completion through [`Engine::complete`]. Returns the number of
    /// completions processed.
    pub fn pump(&mut self) -> EngineResult<usize> {
        let mut processed = 0;
        loop {
            let done = self.jobs.poll();
            if done.is_empty() {
                break;
            }
            for (job, status) in done {
                self.complete(job, status)?;
                processed += 1;
            }
        }
        Ok(processed)
    }

    /// Runs a context until it parks on a pending job or terminates.
    ///
    /// With `advance_first` the completion in `status` selects the
    /// transition out of the context's current state before any handler
    /// runs; otherwise the current state's handler is invoked directly
    /// (initial-state entry).
    fn run(
        &mut self,
        table: Arc<TransitionTable>,
        mut ctx: RequestContext,
        mut status: JobStatus,
        advance_first: bool,
    ) -> EngineResult<DispatchOutcome> {
        let mut advance = advance_first;
        loop {
            let state = match table.state(ctx.cursor) {
                Some(s) => s,
                None => {
                    self.halted = true;
                    return Err(EngineError::FatalState {
                        machine: table.name(),
                        state: "out-of-table",
                        code: status.error_code,
                    });
                }
            };

            if advance {
                advance = false;
                match state.next_for(status.error_code) {
                    Target::State(next) => {
                        ctx.cursor = next;
                        continue;
                    }
                    Target::Terminate => return Ok(self.finish(ctx)),
                }
            }

            if self.config.trace_states {
                debug!(
                    request = ctx.id.0,
                    machine = table.name(),
                    state = state.name(),
                    code = status.error_code,
                    "entering state"
                );
            }

            let mut services = Services {
                jobs: &mut self.jobs,
                scheduler: &mut self.scheduler,
                parked: None,
                wakeups: &mut self.wakeups,
            };
            let action = (state.handler())(&mut ctx, &mut services, &mut status);
            let parked = services.parked;

            match action {
                Action::Complete => advance = true,
                Action::Deferred => {
                    if let Some(job) = parked {
                        self.pending.insert(job, ctx.id);
                    }
                    self.contexts.insert(ctx.id, ctx);
                    return Ok(DispatchOutcome::Pending);
                }
                Action::Fatal(e) => {
                    self.halted = true;
                    error!(
                        request = ctx.id.0,
                        machine = table.name(),
                        state = state.name(),
                        "engine halting: {e}"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Terminal-state bookkeeping; the context is dropped here.
    fn finish(&mut self, ctx: RequestContext) -> DispatchOutcome {
        if ctx.detached {
            self.stats.detached += 1;
            debug!(request = ctx.id.0, op = ctx.op().name(), "request detached");
            DispatchOutcome::Detached
        } else {
            self.stats.completed += 1;
            debug!(request = ctx.id.0, op = ctx.op().name(), "request completed");
            DispatchOutcome::Completed
        }
    }

    /// Resumes waiters promoted by scheduler releases. Resumption may
    /// release further objects and promote further waiters; the queue is
    /// drained until empty.
    fn drain_wakeups(&mut self) -> EngineResult<()> {
        while let Some(wakeup) = self.wakeups.pop_front() {
            let ctx = match self.contexts.remove(&wakeup.request) {
                Some(c) => c,
                None => {
                    warn!(request = wakeup.request.0, "wakeup for unknown context");
                    continue;
                }
            };
            let table = match self.registry.table(ctx.op()) {
                Some(t) => t,
                None => {
                    self.halted = true;
                    return Err(EngineError::FatalState {
                        machine: "unknown",
                        state: "wakeup",
                        code: 0,
                    });
                }
            };
            self.run(table, ctx, JobStatus::ok(), true)?;
        }
        Ok(())
    }

    /// Number of suspended in-flight contexts.
    pub fn in_flight(&self) -> usize {
        self.contexts.len()
    }

    /// True once a fatal condition has stopped the engine.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Engine counters.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// The request scheduler, for introspection.
    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    /// The job interface backing this engine.
    pub fn jobs(&self) -> &J {
        &self.jobs
    }

    /// Mutable access to the job interface (failure injection in tests,
    /// deferred-mode toggles).
    pub fn jobs_mut(&mut self) -> &mut J {
        &mut self.jobs
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
