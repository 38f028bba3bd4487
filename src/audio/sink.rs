// Playback sink abstraction used by the relay worker
use tracing::trace;

use super::output::AudioOutput;

/// Write-only destination for decoded PCM samples.
///
/// The relay worker is the only caller, one fixed-size chunk at a time.
pub trait PlaybackSink: Send + 'static {
    fn feed(&mut self, samples: &[f32]);
}

impl PlaybackSink for AudioOutput {
    fn feed(&mut self, samples: &[f32]) {
        let written = self.write(samples);
        if written < samples.len() {
            trace!(dropped = samples.len() - written, "Output buffer full");
        }
    }
}

/// Discards everything; used when the relay runs without an audio device.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PlaybackSink for NullSink {
    fn feed(&mut self, _samples: &[f32]) {}
}
