//! Core identity and attribute types shared across the server.

use serde::{Deserialize, Serialize};

/// Identity of a storage object (dataspace handle).
///
/// Handles are minted by the storage backend and are unique within a file
/// system. The request scheduler keys its mutual-exclusion queues on
/// `(FsId, ObjectHandle)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle(pub u64);

impl ObjectHandle {
    /// Creates a handle from a raw value.
    pub fn new(raw: u64) -> Self {
        ObjectHandle(raw)
    }

    /// Returns the raw handle value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Identity of a file system hosted by this server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FsId(pub u32);

impl FsId {
    /// Creates a file system id from a raw value.
    pub fn new(raw: u32) -> Self {
        FsId(raw)
    }
}

/// Kind of storage object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    /// Metadata object describing a regular file.
    Metafile,
    /// Data stream object holding file contents.
    Datafile,
    /// Directory object.
    Directory,
}

/// Object attributes stored under the attribute key and returned by getattr.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAttr {
    /// Owner user id.
    pub owner: u32,
    /// Owner group id.
    pub group: u32,
    /// Permission bits.
    pub perms: u32,
    /// Kind of object these attributes describe.
    pub object_type: ObjectType,
    /// Logical byte size of the object's data stream.
    pub size: u64,
}

impl ObjectAttr {
    /// Attributes for a freshly created directory.
    pub fn new_directory(owner: u32, group: u32, perms: u32) -> Self {
        ObjectAttr {
            owner,
            group,
            perms,
            object_type: ObjectType::Directory,
            size: 0,
        }
    }
}

/// Direction of a bulk I/O transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoKind {
    /// Transfer from storage to the client.
    Read,
    /// Transfer from the client to storage.
    Write,
}
