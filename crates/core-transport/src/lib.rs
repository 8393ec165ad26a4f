//! Point-to-point message transport between cooperating ranks.
//!
//! Ranks are modeled as independent `std::thread` workers inside one process;
//! the fabric built by [`Fabric::build`] gives each rank its own point-to-point
//! channel to every other rank, a `now()` clock shared across the run, and a
//! barrier for the shutdown rendezvous. This is the idiomatic in-process
//! stand-in for an MPI communicator: blocking send/recv, ordered delivery per
//! (src, dest) pair, probe-without-consume, and a hard barrier — nothing more.

use std::sync::{Arc, Barrier};
use std::time::Instant;
use thiserror::Error;

/// The closed tag alphabet this layer is permitted to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Request = 1,
    Assign = 2,
    Result = 3,
    StaticResult = 100,
}

/// A typed payload, one variant per tag. Field shapes mirror the bit-exact
/// wire encodings element-for-element; there is no actual byte serialization
/// step because the substrate here is an in-process channel, not a socket.
#[derive(Debug, Clone)]
pub enum Message {
    /// Tag 1: zero bytes.
    Request,
    /// Tag 2: four signed 32-bit integers, `(startRow, startCol, tileWidth, tileHeight)`.
    Assign {
        start_row: i32,
        start_col: i32,
        tile_width: i32,
        tile_height: i32,
    },
    /// Tag 3: `3*tileWidth*tileHeight + 1` floats, row-major RGB then compute time.
    Result(Vec<f32>),
    /// Tag 100: `3*N + 1` floats, row-major RGB then compute time.
    StaticResult(Vec<f32>),
}

impl Message {
    pub fn tag(&self) -> Tag {
        match self {
            Message::Request => Tag::Request,
            Message::Assign { .. } => Tag::Assign,
            Message::Result(_) => Tag::Result,
            Message::StaticResult(_) => Tag::StaticResult,
        }
    }

    /// The sentinel dynamic-mode assignment, `(0, 0, 0, 0)`.
    pub fn sentinel_assign() -> Message {
        Message::Assign {
            start_row: 0,
            start_col: 0,
            tile_width: 0,
            tile_height: 0,
        }
    }

    pub fn is_sentinel_assign(&self) -> bool {
        matches!(
            self,
            Message::Assign {
                start_row: 0,
                start_col: 0,
                tile_width: 0,
                tile_height: 0,
            }
        )
    }
}

/// A received message together with its observed source rank.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: u32,
    pub message: Message,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("rank {rank} observed a disconnected channel")]
    Disconnected { rank: u32 },
}

fn matches_filter(env: &Envelope, src: Option<u32>, tag: Option<Tag>) -> bool {
    src.is_none_or(|s| s == env.from) && tag.is_none_or(|t| t == env.message.tag())
}

/// One rank's handle into the message fabric.
pub struct Transport {
    rank: u32,
    proc_count: u32,
    inbox: crossbeam_channel::Receiver<Envelope>,
    outboxes: Vec<crossbeam_channel::Sender<Envelope>>,
    /// Messages pulled off `inbox` while searching for a filtered match,
    /// kept here (in arrival order) so a later, less restrictive recv/probe
    /// can still observe them.
    stash: Vec<Envelope>,
    barrier: Arc<Barrier>,
    epoch: Instant,
}

impl Transport {
    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn proc_count(&self) -> u32 {
        self.proc_count
    }

    /// Blocking send; preserves order per (src, dest) pair since each rank
    /// only ever sends from its own single thread of execution.
    pub fn send(&self, dest: u32, message: Message) -> Result<(), TransportError> {
        tracing::trace!(
            target: "transport",
            from = self.rank,
            dest,
            tag = ?message.tag(),
            "send"
        );
        self.outboxes[dest as usize]
            .send(Envelope {
                from: self.rank,
                message,
            })
            .map_err(|_| TransportError::Disconnected { rank: dest })
    }

    /// Blocking receive. `src`/`tag` of `None` behave as `ANY`.
    pub fn recv(&mut self, src: Option<u32>, tag: Option<Tag>) -> Result<Envelope, TransportError> {
        if let Some(pos) = self.stash.iter().position(|e| matches_filter(e, src, tag)) {
            return Ok(self.stash.remove(pos));
        }
        loop {
            let env = self
                .inbox
                .recv()
                .map_err(|_| TransportError::Disconnected { rank: self.rank })?;
            if matches_filter(&env, src, tag) {
                return Ok(env);
            }
            self.stash.push(env);
        }
    }

    /// Blocks until a matching message is ready, returns its `(source, tag)`
    /// without removing it — a subsequent `recv` with a filter it still
    /// satisfies will observe it.
    pub fn probe(&mut self, src: Option<u32>, tag: Option<Tag>) -> Result<(u32, Tag), TransportError> {
        if let Some(env) = self.stash.iter().find(|e| matches_filter(e, src, tag)) {
            return Ok((env.from, env.message.tag()));
        }
        loop {
            let env = self
                .inbox
                .recv()
                .map_err(|_| TransportError::Disconnected { rank: self.rank })?;
            let hit = matches_filter(&env, src, tag).then(|| (env.from, env.message.tag()));
            self.stash.push(env);
            if let Some(hit) = hit {
                return Ok(hit);
            }
        }
    }

    /// Returns only after every rank in the fabric has called `barrier()`.
    pub fn barrier(&self) {
        self.barrier.wait();
    }

    /// Monotonic wall-clock seconds since the fabric was built.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Builds a full mesh of point-to-point channels for `proc_count` ranks.
pub struct Fabric;

impl Fabric {
    pub fn build(proc_count: u32) -> Vec<Transport> {
        assert!(proc_count > 0, "a fabric needs at least one rank");
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..proc_count).map(|_| crossbeam_channel::unbounded()).unzip();
        let barrier = Arc::new(Barrier::new(proc_count as usize));
        let epoch = Instant::now();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Transport {
                rank: rank as u32,
                proc_count,
                inbox,
                outboxes: senders.clone(),
                stash: Vec::new(),
                barrier: barrier.clone(),
                epoch,
            })
            .collect()
    }
}
