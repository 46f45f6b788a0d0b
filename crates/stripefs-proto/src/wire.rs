//! Wire frames for server requests and responses.
//!
//! A frame is a little-endian `u32` operation code followed by a bincode
//! body. The code is read before any body decode so that an unrecognized
//! operation is reported as [`ProtoError::UnknownOperation`] rather than a
//! deserializer failure deep inside bincode.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProtoError, ProtoResult};
use crate::op::OpCode;
use crate::types::{FsId, IoKind, ObjectAttr, ObjectHandle, ObjectType};

/// Length of the frame header (the raw operation code).
pub const FRAME_HEADER_LEN: usize = 4;

// ============================================================================
// Request bodies
// ============================================================================

/// Create request - allocate a new storage object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    /// File system the object belongs to.
    pub fs_id: FsId,
    /// Handle range hint; the backend mints the final handle.
    pub handle_hint: ObjectHandle,
    /// Kind of object to create.
    pub object_type: ObjectType,
}

/// Mkdir request - create a directory object and write its attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MkdirRequest {
    /// File system the directory belongs to.
    pub fs_id: FsId,
    /// Handle assigned to the new directory by the client's allocator.
    pub handle: ObjectHandle,
    /// Initial attributes to store under the attribute key.
    pub attr: ObjectAttr,
}

/// Getattr request - read an object's attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetattrRequest {
    /// File system the object belongs to.
    pub fs_id: FsId,
    /// Object whose attributes are wanted.
    pub handle: ObjectHandle,
}

/// Io request - start a bulk transfer against an object's data stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoRequest {
    /// File system the object belongs to.
    pub fs_id: FsId,
    /// Object whose data stream is transferred.
    pub handle: ObjectHandle,
    /// Transfer direction.
    pub kind: IoKind,
    /// Starting byte offset.
    pub offset: u64,
    /// Number of bytes to transfer.
    pub size: u64,
}

/// Operation-specific request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestBody {
    /// Create payload.
    Create(CreateRequest),
    /// Mkdir payload.
    Mkdir(MkdirRequest),
    /// Getattr payload.
    Getattr(GetattrRequest),
    /// Io payload.
    Io(IoRequest),
}

/// A decoded server request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Operation code from the frame header.
    pub op: OpCode,
    /// Operation-specific fields.
    pub body: RequestBody,
}

impl Request {
    /// Returns the storage object this request targets, used as the request
    /// scheduler's mutual-exclusion key.
    pub fn target(&self) -> (FsId, ObjectHandle) {
        match &self.body {
            RequestBody::Create(r) => (r.fs_id, r.handle_hint),
            RequestBody::Mkdir(r) => (r.fs_id, r.handle),
            RequestBody::Getattr(r) => (r.fs_id, r.handle),
            RequestBody::Io(r) => (r.fs_id, r.handle),
        }
    }

    /// The create payload, if this is a create request.
    pub fn as_create(&self) -> Option<&CreateRequest> {
        match &self.body {
            RequestBody::Create(r) => Some(r),
            _ => None,
        }
    }

    /// The mkdir payload, if this is a mkdir request.
    pub fn as_mkdir(&self) -> Option<&MkdirRequest> {
        match &self.body {
            RequestBody::Mkdir(r) => Some(r),
            _ => None,
        }
    }

    /// The getattr payload, if this is a getattr request.
    pub fn as_getattr(&self) -> Option<&GetattrRequest> {
        match &self.body {
            RequestBody::Getattr(r) => Some(r),
            _ => None,
        }
    }

    /// The io payload, if this is an io request.
    pub fn as_io(&self) -> Option<&IoRequest> {
        match &self.body {
            RequestBody::Io(r) => Some(r),
            _ => None,
        }
    }
}

// ============================================================================
// Response bodies
// ============================================================================

/// Operation-specific response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseBody {
    /// No payload; status alone carries the result.
    None,
    /// Create result: the newly allocated handle.
    Create {
        /// Handle of the created object.
        handle: ObjectHandle,
    },
    /// Mkdir result: the handle the directory was created under.
    Mkdir {
        /// Handle of the created directory.
        handle: ObjectHandle,
    },
    /// Getattr result: the attributes read.
    Getattr {
        /// Attributes stored for the object.
        attr: ObjectAttr,
    },
    /// Io result: accepted transfer size.
    Io {
        /// Number of bytes the transfer moved (or will move).
        bytes: u64,
    },
}

/// A server response as assembled by the engine and sent to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Operation this response answers.
    pub op: OpCode,
    /// Completion code: `0` success, negative failure (see [`crate::status`]).
    pub status: i32,
    /// Operation-specific fields; `None` on failure.
    pub body: ResponseBody,
}

impl Response {
    /// Allocates an empty success response for the given operation.
    pub fn new(op: OpCode) -> Self {
        Response {
            op,
            status: crate::status::OK,
            body: ResponseBody::None,
        }
    }
}

// ============================================================================
// Frame encode/decode
// ============================================================================

fn encode_body<T: Serialize>(msg: &T) -> ProtoResult<Vec<u8>> {
    bincode::serialize(msg).map_err(|e| ProtoError::EncodeError(e.to_string()))
}

fn decode_body<T: DeserializeOwned>(op: OpCode, data: &[u8]) -> ProtoResult<T> {
    bincode::deserialize(data).map_err(|e| ProtoError::MalformedBody {
        op,
        reason: e.to_string(),
    })
}

/// Encodes a request into a wire frame.
pub fn encode_request(req: &Request) -> ProtoResult<Bytes> {
    let mut frame = req.op.as_raw().to_le_bytes().to_vec();
    let body = match &req.body {
        RequestBody::Create(r) => encode_body(r)?,
        RequestBody::Mkdir(r) => encode_body(r)?,
        RequestBody::Getattr(r) => encode_body(r)?,
        RequestBody::Io(r) => encode_body(r)?,
    };
    frame.extend_from_slice(&body);
    Ok(Bytes::from(frame))
}

/// Decodes a wire frame into a typed request.
///
/// Rejects short frames, unknown operation codes, and malformed bodies
/// without allocating any server-side request state.
pub fn decode_request(raw: &[u8]) -> ProtoResult<Request> {
    if raw.len() < FRAME_HEADER_LEN {
        return Err(ProtoError::TruncatedFrame {
            got: raw.len(),
            need: FRAME_HEADER_LEN,
        });
    }
    let mut code = [0u8; FRAME_HEADER_LEN];
    code.copy_from_slice(&raw[..FRAME_HEADER_LEN]);
    let op = OpCode::from_raw(u32::from_le_bytes(code))?;
    let body = &raw[FRAME_HEADER_LEN..];

    let body = match op {
        OpCode::Create => RequestBody::Create(decode_body(op, body)?),
        OpCode::Mkdir => RequestBody::Mkdir(decode_body(op, body)?),
        OpCode::Getattr => RequestBody::Getattr(decode_body(op, body)?),
        OpCode::Io => RequestBody::Io(decode_body(op, body)?),
    };
    Ok(Request { op, body })
}

/// Encodes a response into a wire frame.
pub fn encode_response(resp: &Response) -> ProtoResult<Bytes> {
    let mut frame = resp.op.as_raw().to_le_bytes().to_vec();
    frame.extend_from_slice(&encode_body(resp)?);
    Ok(Bytes::from(frame))
}

/// Decodes a response frame, as a client would.
pub fn decode_response(raw: &[u8]) -> ProtoResult<Response> {
    if raw.len() < FRAME_HEADER_LEN {
        return Err(ProtoError::TruncatedFrame {
            got: raw.len(),
            need: FRAME_HEADER_LEN,
        });
    }
    let mut code = [0u8; FRAME_HEADER_LEN];
    code.copy_from_slice(&raw[..FRAME_HEADER_LEN]);
    let op = OpCode::from_raw(u32::from_le_bytes(code))?;
    decode_body(op, &raw[FRAME_HEADER_LEN..])
}
