// Audio relay worker
// Sole owner of the lock state, the accumulation buffer and the playback sink

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use super::accumulator::AccumulationBuffer;
use super::error::RelayResult;
use super::handle::{AudioFrame, LockRequest, ReleaseOutcome};
use super::lock::{LockState, LockToken, SessionId, NO_TOKEN};
use super::storage::ResultFile;
use crate::audio::{decode_samples, PlaybackSink};

pub struct RelayWorker {
    sink: Box<dyn PlaybackSink>,
    lock: LockState,
    buffer: AccumulationBuffer,
    store: ResultFile,
    feed_chunk: usize,
    discarded_frames: u64,
}

impl RelayWorker {
    pub fn new(sink: Box<dyn PlaybackSink>, store: ResultFile, feed_chunk: usize) -> Self {
        Self {
            sink,
            lock: LockState::new(),
            buffer: AccumulationBuffer::new(),
            store,
            feed_chunk: feed_chunk.max(1),
            discarded_frames: 0,
        }
    }

    /// Process frames and lock requests one at a time until shutdown.
    ///
    /// The select is biased toward frames: a frame a session enqueued before
    /// its release request is always handled before that release.
    pub async fn run(
        mut self,
        mut frames: mpsc::Receiver<AudioFrame>,
        mut locks: mpsc::Receiver<LockRequest>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                Some(frame) = frames.recv() => self.on_frame(frame),
                Some(request) = locks.recv() => self.on_lock_request(request).await,
                else => break,
            }
        }

        // Frames already accepted into the queue still belong to the recording
        while let Ok(frame) = frames.try_recv() {
            self.on_frame(frame);
        }
        self.finish().await;
    }

    fn on_frame(&mut self, frame: AudioFrame) {
        if !self.lock.admits(frame.token) {
            self.discarded_frames += 1;
            trace!(session = frame.session, bytes = frame.data.len(), "Discarding frame from non-holder");
            return;
        }

        let samples = decode_samples(&frame.data);
        trace!(bytes = frame.data.len(), samples = samples.len(), "Received audio frame");
        for chunk in samples.chunks(self.feed_chunk) {
            self.sink.feed(chunk);
        }

        self.buffer.push(frame.data);
        trace!(buffered = self.buffer.len(), "Frame accumulated");
    }

    async fn on_lock_request(&mut self, request: LockRequest) {
        match request {
            LockRequest::Acquire { session, reply } => {
                let was_holder = self.lock.holder() == Some(session);
                let token = self.lock.try_grant(session);
                if token == NO_TOKEN {
                    debug!(session, holder = ?self.lock.holder(), "Lock request rejected, already held");
                } else if !was_holder {
                    info!(session, token, "Producer lock granted");
                }

                if reply.send(token).is_err() && token != NO_TOKEN && !was_holder {
                    // Requester went away before learning it won; don't leak the lock
                    warn!(session, "Lock requester vanished, revoking grant");
                    self.lock.clear();
                    self.buffer.clear();
                }
            }
            LockRequest::Release { session, token, reply } => {
                let outcome = self.release(session, token).await;
                let _ = reply.send(outcome);
            }
        }
    }

    async fn release(&mut self, session: SessionId, token: LockToken) -> RelayResult<ReleaseOutcome> {
        if !self.lock.release(session, token) {
            debug!(session, "Release ignored, session is not the holder");
            return Ok(ReleaseOutcome::NotHolder);
        }

        info!(session, "Producer lock released");
        let bytes = self.flush().await?;
        Ok(ReleaseOutcome::Flushed { bytes })
    }

    // Writes batch + held-back frame; the buffer is empty afterwards even on failure.
    async fn flush(&mut self) -> RelayResult<usize> {
        if self.buffer.is_empty() {
            debug!("No audio received this session, writing an empty recording");
        }
        let recording = self.buffer.take();
        match self.store.overwrite(&recording).await {
            Ok(()) => {
                info!(bytes = recording.len(), path = ?self.store.path(), "Recording saved");
                Ok(recording.len())
            }
            Err(e) => {
                error!("Failed to save recording: {}", e);
                Err(e)
            }
        }
    }

    async fn finish(&mut self) {
        if let Some(session) = self.lock.holder() {
            info!(session, "Shutting down with an active producer, saving its recording");
            self.lock.clear();
            // Already logged by flush
            let _ = self.flush().await;
        }
        if self.discarded_frames > 0 {
            debug!(discarded = self.discarded_frames, "Frames discarded from non-holders");
        }
        info!("Audio relay worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::handle::{Relay, RelayHandle, RelayOptions};
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct RecordingSink {
        calls: Arc<Mutex<Vec<Vec<f32>>>>,
    }

    impl PlaybackSink for RecordingSink {
        fn feed(&mut self, samples: &[f32]) {
            self.calls.lock().push(samples.to_vec());
        }
    }

    fn frame_bytes(lead: u8, samples: &[f32]) -> Bytes {
        let mut raw = vec![lead; 4];
        for sample in samples {
            raw.extend_from_slice(&sample.to_le_bytes());
        }
        Bytes::from(raw)
    }

    fn start(feed_chunk: usize) -> (Relay, RelayHandle, RecordingSink, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::default();
        let relay = Relay::start(
            Box::new(sink.clone()),
            ResultFile::new(dir.path().join("result.dat")),
            RelayOptions { feed_chunk },
        );
        let handle = relay.handle();
        (relay, handle, sink, dir)
    }

    async fn send(handle: &RelayHandle, session: SessionId, token: LockToken, data: Bytes) {
        handle
            .submit_frame(AudioFrame { session, token, data })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_release_persists_every_frame_in_order() {
        let (relay, handle, sink, dir) = start(128);
        let token = handle.request_lock(1).await.unwrap();
        assert_ne!(token, NO_TOKEN);

        let frames = [
            frame_bytes(1, &[0.1]),
            frame_bytes(2, &[0.2]),
            frame_bytes(3, &[0.3]),
        ];
        for frame in &frames {
            send(&handle, 1, token, frame.clone()).await;
        }

        let outcome = handle.request_release(1, token).await.unwrap();
        assert_eq!(outcome, ReleaseOutcome::Flushed { bytes: 24 });

        let expected: Vec<u8> = frames.iter().flat_map(|f| f.iter().copied()).collect();
        assert_eq!(std::fs::read(dir.path().join("result.dat")).unwrap(), expected);
        assert_eq!(*sink.calls.lock(), vec![vec![0.1], vec![0.2], vec![0.3]]);

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_samples_are_fed_in_fixed_chunks() {
        let (relay, handle, sink, _dir) = start(2);
        let token = handle.request_lock(1).await.unwrap();

        send(&handle, 1, token, frame_bytes(0, &[1.0, 2.0, 3.0, 4.0, 5.0])).await;
        handle.request_release(1, token).await.unwrap();

        assert_eq!(
            *sink.calls.lock(),
            vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0]]
        );
        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_contention_returns_zero_token() {
        let (relay, handle, _sink, _dir) = start(128);
        let token = handle.request_lock(1).await.unwrap();

        assert_eq!(handle.request_lock(2).await.unwrap(), NO_TOKEN);
        // Holder unchanged: its release still succeeds
        assert!(matches!(
            handle.request_release(1, token).await.unwrap(),
            ReleaseOutcome::Flushed { .. }
        ));
        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_frames_from_non_holders_are_discarded() {
        let (relay, handle, sink, dir) = start(128);

        // Nobody holds the lock yet
        send(&handle, 2, NO_TOKEN, frame_bytes(9, &[9.0])).await;

        let token = handle.request_lock(1).await.unwrap();
        send(&handle, 1, token, frame_bytes(1, &[1.0])).await;
        send(&handle, 2, NO_TOKEN, frame_bytes(9, &[9.0])).await;
        send(&handle, 2, token + 1, frame_bytes(9, &[9.0])).await;

        handle.request_release(1, token).await.unwrap();

        assert_eq!(*sink.calls.lock(), vec![vec![1.0]]);
        assert_eq!(
            std::fs::read(dir.path().join("result.dat")).unwrap(),
            frame_bytes(1, &[1.0]).to_vec()
        );
        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_release_by_non_holder_does_not_flush() {
        let (relay, handle, _sink, dir) = start(128);
        let token = handle.request_lock(1).await.unwrap();
        send(&handle, 1, token, frame_bytes(1, &[1.0])).await;

        assert_eq!(handle.request_release(2, token).await.unwrap(), ReleaseOutcome::NotHolder);
        assert!(!dir.path().join("result.dat").exists());

        handle.request_release(1, token).await.unwrap();
        assert!(dir.path().join("result.dat").exists());
        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_next_session_starts_with_empty_recording() {
        let (relay, handle, _sink, dir) = start(128);
        let path = dir.path().join("result.dat");

        let first = handle.request_lock(1).await.unwrap();
        send(&handle, 1, first, frame_bytes(1, &[1.0])).await;
        send(&handle, 1, first, frame_bytes(2, &[2.0])).await;
        handle.request_release(1, first).await.unwrap();

        let second = handle.request_lock(2).await.unwrap();
        assert!(second > first);
        send(&handle, 2, second, frame_bytes(7, &[7.0])).await;
        handle.request_release(2, second).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), frame_bytes(7, &[7.0]).to_vec());
        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported_and_lock_released() {
        let dir = tempfile::tempdir().unwrap();
        let relay = Relay::start(
            Box::new(RecordingSink::default()),
            ResultFile::new(dir.path()),
            RelayOptions::default(),
        );
        let handle = relay.handle();

        let token = handle.request_lock(1).await.unwrap();
        send(&handle, 1, token, frame_bytes(1, &[1.0])).await;
        assert!(handle.request_release(1, token).await.is_err());

        // The relay keeps running and the lock is free again
        assert_ne!(handle.request_lock(2).await.unwrap(), NO_TOKEN);
        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_active_holder() {
        let (relay, handle, _sink, dir) = start(128);
        let token = handle.request_lock(1).await.unwrap();
        send(&handle, 1, token, frame_bytes(4, &[4.0])).await;

        relay.shutdown().await;

        assert_eq!(
            std::fs::read(dir.path().join("result.dat")).unwrap(),
            frame_bytes(4, &[4.0]).to_vec()
        );
        assert!(handle.request_lock(1).await.is_err());
    }
}
