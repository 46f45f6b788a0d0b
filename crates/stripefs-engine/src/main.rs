//! Demo driver for the request engine: admits a handful of requests against
//! the in-memory job adapter and pumps completions until idle.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stripefs_engine::job::{MemoryJobs, ReplyAddr};
use stripefs_engine::{server_registry, Engine, EngineConfig};
use stripefs_proto::types::{FsId, IoKind, ObjectAttr, ObjectHandle, ObjectType};
use stripefs_proto::wire::{
    self, GetattrRequest, IoRequest, MkdirRequest, Request, RequestBody,
};
use stripefs_proto::OpCode;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing config {path}"))?
        }
        None => EngineConfig::default(),
    };
    let fs = FsId::new(1);
    let dir = ObjectHandle::new(100);
    let file = ObjectHandle::new(200);

    let mut jobs = MemoryJobs::new();
    jobs.seed_object(fs, file, ObjectType::Datafile);
    jobs.set_defer_all(true);

    let registry = server_registry().context("building operation registry")?;
    let mut engine = Engine::new(config, registry, jobs);
    info!(name = %engine.config().name, "starting request engine");

    let requests = [
        Request {
            op: OpCode::Mkdir,
            body: RequestBody::Mkdir(MkdirRequest {
                fs_id: fs,
                handle: dir,
                attr: ObjectAttr::new_directory(1000, 100, 0o755),
            }),
        },
        Request {
            op: OpCode::Getattr,
            body: RequestBody::Getattr(GetattrRequest {
                fs_id: fs,
                handle: dir,
            }),
        },
        Request {
            op: OpCode::Io,
            body: RequestBody::Io(IoRequest {
                fs_id: fs,
                handle: file,
                kind: IoKind::Write,
                offset: 0,
                size: 1 << 20,
            }),
        },
    ];

    for (i, req) in requests.iter().enumerate() {
        let frame = wire::encode_request(req)?;
        let addr = ReplyAddr {
            peer: 1,
            tag: i as u64,
        };
        let outcome = engine.admit(&frame, addr)?;
        info!(op = req.op.name(), ?outcome, "admitted");
    }

    // Event-loop stand-in: feed deferred completions back until quiet.
    while engine.in_flight() > 0 {
        let processed = engine.pump()?;
        if processed == 0 {
            break;
        }
    }

    for (addr, frame) in engine.jobs().sent_replies() {
        let resp = wire::decode_response(frame)?;
        info!(
            tag = addr.tag,
            op = resp.op.name(),
            status = resp.status,
            "reply sent"
        );
    }

    let stats = engine.stats();
    info!(
        admitted = stats.admitted,
        completed = stats.completed,
        detached = stats.detached,
        "engine idle"
    );
    Ok(())
}
