//! Completion-code convention shared by the wire protocol and the engine.
//!
//! `0` means success; negative values name specific failures. Positive
//! values are never produced. Jobs and responses both carry codes from this
//! namespace, so a storage failure can flow unchanged into the response the
//! client sees.

/// Success.
pub const OK: i32 = 0;

/// Object or attribute key does not exist.
pub const NOT_FOUND: i32 = -2;

/// Caller lacks permission for the operation.
pub const PERM: i32 = -1;

/// Backend I/O failure.
pub const IO: i32 = -5;

/// An object with the requested identity already exists.
pub const EXISTS: i32 = -17;

/// Wrong object type for the requested operation.
pub const NOT_DIR: i32 = -20;

/// Storage backend out of space.
pub const NO_SPACE: i32 = -28;

/// Returns true for codes that indicate failure.
pub fn is_failure(code: i32) -> bool {
    code < 0
}
