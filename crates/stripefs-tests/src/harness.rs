//! Shared scaffolding: engine construction, frame builders, reply decoding.

use bytes::Bytes;

use stripefs_engine::job::{MemoryJobs, ReplyAddr};
use stripefs_engine::{server_registry, Engine, EngineConfig};
use stripefs_proto::types::{FsId, IoKind, ObjectAttr, ObjectHandle, ObjectType};
use stripefs_proto::wire::{
    self, CreateRequest, GetattrRequest, IoRequest, MkdirRequest, Request, RequestBody, Response,
};
use stripefs_proto::OpCode;

/// File system id every harness request targets.
pub const FS: FsId = FsId(1);

/// Builds an engine over a fresh in-memory job adapter.
pub fn engine() -> Engine<MemoryJobs> {
    engine_with(MemoryJobs::new())
}

/// Builds an engine over a caller-prepared job adapter (seeded objects,
/// deferred mode, armed failures).
pub fn engine_with(jobs: MemoryJobs) -> Engine<MemoryJobs> {
    let registry = server_registry().expect("server registry builds");
    Engine::new(EngineConfig::default(), registry, jobs)
}

/// Reply address with a distinguishing tag.
pub fn addr(tag: u64) -> ReplyAddr {
    ReplyAddr { peer: 1, tag }
}

/// Encoded create frame.
pub fn create_frame(hint: u64, object_type: ObjectType) -> Bytes {
    encode(Request {
        op: OpCode::Create,
        body: RequestBody::Create(CreateRequest {
            fs_id: FS,
            handle_hint: ObjectHandle::new(hint),
            object_type,
        }),
    })
}

/// Encoded mkdir frame with stock directory attributes.
pub fn mkdir_frame(handle: u64) -> Bytes {
    encode(Request {
        op: OpCode::Mkdir,
        body: RequestBody::Mkdir(MkdirRequest {
            fs_id: FS,
            handle: ObjectHandle::new(handle),
            attr: ObjectAttr::new_directory(1000, 100, 0o755),
        }),
    })
}

/// Encoded getattr frame.
pub fn getattr_frame(handle: u64) -> Bytes {
    encode(Request {
        op: OpCode::Getattr,
        body: RequestBody::Getattr(GetattrRequest {
            fs_id: FS,
            handle: ObjectHandle::new(handle),
        }),
    })
}

/// Encoded io frame.
pub fn io_frame(handle: u64, kind: IoKind, size: u64) -> Bytes {
    encode(Request {
        op: OpCode::Io,
        body: RequestBody::Io(IoRequest {
            fs_id: FS,
            handle: ObjectHandle::new(handle),
            kind,
            offset: 0,
            size,
        }),
    })
}

fn encode(req: Request) -> Bytes {
    wire::encode_request(&req).expect("request encodes")
}

/// Drains the adapter's deferred completions until the engine goes quiet.
pub fn run_until_idle(engine: &mut Engine<MemoryJobs>) {
    while engine.in_flight() > 0 {
        let processed = engine.pump().expect("pump succeeds");
        if processed == 0 {
            break;
        }
    }
}

/// Decodes the i-th reply the adapter captured.
pub fn reply_at(engine: &Engine<MemoryJobs>, i: usize) -> Response {
    let (_, frame) = &engine.jobs().sent_replies()[i];
    wire::decode_response(frame).expect("reply decodes")
}

/// Decodes the most recent reply.
pub fn last_reply(engine: &Engine<MemoryJobs>) -> Response {
    let sent = engine.jobs().sent_replies();
    assert!(!sent.is_empty(), "no reply was sent");
    reply_at(engine, sent.len() - 1)
}
