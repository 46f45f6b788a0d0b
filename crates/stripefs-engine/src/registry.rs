//! Operation registry: maps an operation code to its transition table.
//!
//! Built once at startup and passed into the engine; there is no
//! process-global table. A code missing from the registry is a protocol
//! error at admission time, never a dispatch-time crash.

use std::collections::HashMap;
use std::sync::Arc;

use stripefs_proto::OpCode;

use crate::machine::{TableError, TransitionTable};
use crate::ops;

/// Registry of operation state machines.
pub struct OpRegistry {
    tables: HashMap<OpCode, Arc<TransitionTable>>,
}

impl OpRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        OpRegistry {
            tables: HashMap::new(),
        }
    }

    /// Registers (or replaces) the table for an operation.
    pub fn register(&mut self, op: OpCode, table: TransitionTable) {
        self.tables.insert(op, Arc::new(table));
    }

    /// Looks up the table for an operation.
    pub fn table(&self, op: OpCode) -> Option<Arc<TransitionTable>> {
        self.tables.get(&op).cloned()
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Default for OpRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the registry for a storage server: the four request machines.
pub fn server_registry() -> Result<OpRegistry, TableError> {
    let mut registry = OpRegistry::new();
    registry.register(OpCode::Create, ops::create::machine()?);
    registry.register(OpCode::Mkdir, ops::mkdir::machine()?);
    registry.register(OpCode::Getattr, ops::getattr::machine()?);
    registry.register(OpCode::Io, ops::io::machine()?);
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_registry_covers_all_ops() {
        let registry = server_registry().unwrap();
        assert_eq!(registry.len(), 4);
        for op in [OpCode::Create, OpCode::Mkdir, OpCode::Getattr, OpCode::Io] {
            assert!(registry.table(op).is_some(), "missing table for {:?}", op);
        }
    }

    #[test]
    fn test_unregistered_op_is_absent() {
        let registry = OpRegistry::new();
        assert!(registry.table(OpCode::Create).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cleanup_entered_only_from_release() {
        // Structural form of "release dominates cleanup": the only
        // transition into a table's cleanup state comes from release, so no
        // path can free the context while still holding the object.
        use crate::machine::Target;

        let registry = server_registry().unwrap();
        for op in [OpCode::Create, OpCode::Mkdir, OpCode::Getattr, OpCode::Io] {
            let table = registry.table(op).unwrap();
            let cleanup = table.index_of("cleanup").unwrap();
            for state in table.states() {
                if state.name() == "release" {
                    continue;
                }
                assert!(
                    state.targets().all(|t| t != Target::State(cleanup)),
                    "{}: {} transitions into cleanup",
                    table.name(),
                    state.name()
                );
            }
        }
    }

    #[test]
    fn test_every_state_has_reachable_terminal() {
        // Walking only default transitions from any state must reach
        // Terminate within the table's state count: no machine can strand a
        // context, whatever codes its jobs return.
        use crate::machine::Target;

        let registry = server_registry().unwrap();
        for op in [OpCode::Create, OpCode::Mkdir, OpCode::Getattr, OpCode::Io] {
            let table = registry.table(op).unwrap();
            for start in 0..table.states().len() {
                let mut cursor = start;
                let mut steps = 0;
                loop {
                    let state = table.state(cursor).unwrap();
                    match state.next_for(i32::MIN) {
                        Target::State(next) => cursor = next,
                        Target::Terminate => break,
                    }
                    steps += 1;
                    assert!(
                        steps <= table.states().len(),
                        "{}: cycle through defaults from state {}",
                        table.name(),
                        start
                    );
                }
            }
        }
    }
}
