//! Relay context: the channels sessions use to reach the worker.
//!
//! [`Relay::start`] spawns the single worker task and returns the owning
//! context. Every session receives a cloned [`RelayHandle`]; handles only send
//! messages and never touch relay state directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::error::{RelayError, RelayResult};
use super::lock::{LockToken, SessionId};
use super::storage::ResultFile;
use super::worker::RelayWorker;
use crate::audio::PlaybackSink;

/// A session may run at most this many frames ahead of the worker.
const FRAME_QUEUE_DEPTH: usize = 1;
const LOCK_QUEUE_DEPTH: usize = 1;

/// One binary message, tagged with the sender's token at send time.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub session: SessionId,
    pub token: LockToken,
    pub data: Bytes,
}

#[derive(Debug)]
pub enum LockRequest {
    Acquire {
        session: SessionId,
        reply: oneshot::Sender<LockToken>,
    },
    Release {
        session: SessionId,
        token: LockToken,
        reply: oneshot::Sender<RelayResult<ReleaseOutcome>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The lock was released and this many bytes were written.
    Flushed { bytes: usize },
    /// The caller did not hold the lock; nothing changed.
    NotHolder,
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Samples per playback sink call
    pub feed_chunk: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self { feed_chunk: 128 }
    }
}

/// Cloneable entry point into the relay worker.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    frames: mpsc::Sender<AudioFrame>,
    locks: mpsc::Sender<LockRequest>,
    next_session: Arc<AtomicU64>,
}

impl RelayHandle {
    /// Allocate an id for a newly accepted connection. Ids are never reused.
    pub fn new_session_id(&self) -> SessionId {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Enqueue a frame, waiting while the worker is still busy with the previous one.
    pub async fn submit_frame(&self, frame: AudioFrame) -> RelayResult<()> {
        self.frames.send(frame).await.map_err(|_| RelayError::WorkerGone)
    }

    /// Ask for the producer lock. A zero token means another session holds it.
    pub async fn request_lock(&self, session: SessionId) -> RelayResult<LockToken> {
        let (reply, rx) = oneshot::channel();
        self.locks
            .send(LockRequest::Acquire { session, reply })
            .await
            .map_err(|_| RelayError::WorkerGone)?;
        rx.await.map_err(|_| RelayError::WorkerGone)
    }

    /// Release the lock held by `session` and flush its recording.
    pub async fn request_release(&self, session: SessionId, token: LockToken) -> RelayResult<ReleaseOutcome> {
        let (reply, rx) = oneshot::channel();
        self.locks
            .send(LockRequest::Release { session, token, reply })
            .await
            .map_err(|_| RelayError::WorkerGone)?;
        rx.await.map_err(|_| RelayError::WorkerGone)?
    }
}

/// Owns the running worker task.
pub struct Relay {
    handle: RelayHandle,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Relay {
    /// Spawn the worker on the current tokio runtime.
    pub fn start(sink: Box<dyn PlaybackSink>, store: ResultFile, options: RelayOptions) -> Self {
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let (locks_tx, locks_rx) = mpsc::channel(LOCK_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!(result_file = ?store.path(), feed_chunk = options.feed_chunk, "Starting audio relay worker");
        let worker = RelayWorker::new(sink, store, options.feed_chunk);
        let task = tokio::spawn(worker.run(frames_rx, locks_rx, shutdown_rx));

        Self {
            handle: RelayHandle {
                frames: frames_tx,
                locks: locks_tx,
                next_session: Arc::new(AtomicU64::new(1)),
            },
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    /// Stop the worker, flushing the active holder's recording first.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = self.task.await {
            error!("Audio relay worker ended abnormally: {}", e);
        }
    }
}
