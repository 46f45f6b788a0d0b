//! The transition-table model: states, completion-code transitions, and the
//! builder that assembles per-operation tables at startup.
//!
//! Each state runs one handler that posts at most one job. The completion
//! code of that job selects the next state: exact match first, then the
//! state's mandatory default. Tables are immutable after construction, so a
//! well-formed table can never leave the dispatcher without a next state.

use std::collections::HashMap;

use thiserror::Error;

use crate::context::RequestContext;
use crate::dispatch::Services;
use crate::error::EngineError;
use crate::job::JobStatus;

/// What a state handler tells the dispatcher after running.
///
/// This is a synchronization signal, not a business result: operation
/// failures travel inside the completion code, never here.
#[derive(Debug)]
pub enum Action {
    /// The posted job completed synchronously; advance immediately.
    Complete,
    /// The job is pending; the engine is re-entered when it completes.
    Deferred,
    /// Unrecoverable engine failure; halt all request processing.
    Fatal(EngineError),
}

/// Where a transition leads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// Another state in the same table.
    State(usize),
    /// End of the context's lifecycle.
    Terminate,
}

/// Handler function run on entry to a state.
pub type StateHandler =
    fn(&mut RequestContext, &mut Services<'_>, &mut JobStatus) -> Action;

/// One state: a handler plus its outgoing transitions.
#[derive(Debug)]
pub struct State {
    name: &'static str,
    handler: StateHandler,
    transitions: HashMap<i32, Target>,
    default: Target,
}

impl State {
    /// Name of this state, for logs and diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The handler to invoke on entry.
    pub fn handler(&self) -> StateHandler {
        self.handler
    }

    /// Selects the next state for a completion code: exact match if one was
    /// declared, the default otherwise. The default is how unexpected but
    /// recoverable codes fall through to an error path.
    pub fn next_for(&self, code: i32) -> Target {
        self.transitions.get(&code).copied().unwrap_or(self.default)
    }

    /// All outgoing targets (declared transitions plus the default).
    pub fn targets(&self) -> impl Iterator<Item = Target> + '_ {
        self.transitions
            .values()
            .copied()
            .chain(std::iter::once(self.default))
    }
}

/// Immutable per-operation table of states.
#[derive(Debug)]
pub struct TransitionTable {
    name: &'static str,
    states: Vec<State>,
}

impl TransitionTable {
    /// Name of the operation this table implements.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Index of the initial state.
    pub fn initial(&self) -> usize {
        0
    }

    /// Looks up a state by index.
    pub fn state(&self, idx: usize) -> Option<&State> {
        self.states.get(idx)
    }

    /// All states, in declaration order.
    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Index of a state by name, for tests and diagnostics.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|s| s.name == name)
    }
}

/// Errors from table construction. These indicate programming errors in a
/// machine definition and surface during startup registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    /// A transition references a state name that was never declared.
    #[error("Machine {machine}: state {from} references unknown state {to}")]
    UnknownState {
        /// Machine being built.
        machine: &'static str,
        /// State declaring the transition.
        from: &'static str,
        /// The missing target name.
        to: &'static str,
    },

    /// Two states share a name.
    #[error("Machine {machine}: duplicate state name {name}")]
    DuplicateState {
        /// Machine being built.
        machine: &'static str,
        /// The repeated name.
        name: &'static str,
    },

    /// The machine has no states at all.
    #[error("Machine {machine} has no states")]
    Empty {
        /// Machine being built.
        machine: &'static str,
    },
}

/// Symbolic transition target used while building.
#[derive(Clone, Copy, Debug)]
enum TargetSpec {
    To(&'static str),
    Terminate,
}

/// Declarative description of one state, consumed by [`TableBuilder`].
pub struct StateSpec {
    name: &'static str,
    handler: StateHandler,
    transitions: Vec<(i32, TargetSpec)>,
    default: TargetSpec,
}

impl StateSpec {
    /// Starts a state spec; the default transition must be set before build
    /// via [`StateSpec::default_to`] or [`StateSpec::terminal`] (it starts
    /// as terminal).
    pub fn run(name: &'static str, handler: StateHandler) -> Self {
        StateSpec {
            name,
            handler,
            transitions: Vec::new(),
            default: TargetSpec::Terminate,
        }
    }

    /// Declares an exact-match transition for a completion code.
    pub fn on(mut self, code: i32, next: &'static str) -> Self {
        self.transitions.push((code, TargetSpec::To(next)));
        self
    }

    /// Sets the default transition.
    pub fn default_to(mut self, next: &'static str) -> Self {
        self.default = TargetSpec::To(next);
        self
    }

    /// Marks the default transition as terminal.
    pub fn terminal(mut self) -> Self {
        self.default = TargetSpec::Terminate;
        self
    }
}

/// Builds a [`TransitionTable`] from state specs, resolving symbolic names
/// and validating the result. The first state added is the initial state.
pub struct TableBuilder {
    name: &'static str,
    specs: Vec<StateSpec>,
}

impl TableBuilder {
    /// Starts a builder for the named machine.
    pub fn new(name: &'static str) -> Self {
        TableBuilder {
            name,
            specs: Vec::new(),
        }
    }

    /// Adds a state.
    pub fn state(mut self, spec: StateSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Resolves names and produces the immutable table.
    pub fn build(self) -> Result<TransitionTable, TableError> {
        if self.specs.is_empty() {
            return Err(TableError::Empty { machine: self.name });
        }

        let mut index: HashMap<&'static str, usize> = HashMap::new();
        for (i, spec) in self.specs.iter().enumerate() {
            if index.insert(spec.name, i).is_some() {
                return Err(TableError::DuplicateState {
                    machine: self.name,
                    name: spec.name,
                });
            }
        }

        let resolve = |from: &'static str, t: TargetSpec| -> Result<Target, TableError> {
            match t {
                TargetSpec::Terminate => Ok(Target::Terminate),
                TargetSpec::To(name) => index
                    .get(name)
                    .map(|&i| Target::State(i))
                    .ok_or(TableError::UnknownState {
                        machine: self.name,
                        from,
                        to: name,
                    }),
            }
        };

        let mut states = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let mut transitions = HashMap::new();
            for &(code, target) in &spec.transitions {
                transitions.insert(code, resolve(spec.name, target)?);
            }
            states.push(State {
                name: spec.name,
                handler: spec.handler,
                transitions,
                default: resolve(spec.name, spec.default)?,
            });
        }

        Ok(TransitionTable {
            name: self.name,
            states,
        })
    }
}
