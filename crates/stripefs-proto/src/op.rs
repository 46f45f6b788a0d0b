//! Server operation codes.
//!
//! Every request frame leads with a raw `u32` operation code so that the
//! server can reject unrecognized operations at decode time, before any
//! request state exists.

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Operation kinds served by the request engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum OpCode {
    /// Create a storage object (dataspace).
    Create = 2,
    /// Create a directory object and write its initial attributes.
    Mkdir = 18,
    /// Read an object's attributes.
    Getattr = 7,
    /// Bulk read/write against an object's data stream.
    Io = 4,
}

impl OpCode {
    /// Converts a raw wire code to an operation, rejecting unknown codes.
    pub fn from_raw(code: u32) -> Result<Self, ProtoError> {
        match code {
            2 => Ok(OpCode::Create),
            18 => Ok(OpCode::Mkdir),
            7 => Ok(OpCode::Getattr),
            4 => Ok(OpCode::Io),
            other => Err(ProtoError::UnknownOperation(other)),
        }
    }

    /// Returns the raw wire code for this operation.
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Short name used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Create => "create",
            OpCode::Mkdir => "mkdir",
            OpCode::Getattr => "getattr",
            OpCode::Io => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip() {
        for op in [OpCode::Create, OpCode::Mkdir, OpCode::Getattr, OpCode::Io] {
            assert_eq!(OpCode::from_raw(op.as_raw()).unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        match OpCode::from_raw(999) {
            Err(ProtoError::UnknownOperation(999)) => {}
            other => panic!("expected UnknownOperation, got {:?}", other),
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(OpCode::Mkdir.name(), "mkdir");
        assert_eq!(OpCode::Io.name(), "io");
    }
}
