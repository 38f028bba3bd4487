// Accumulation buffer for the active producer session
use bytes::Bytes;

/// Raw frames of the current session awaiting persistence.
///
/// The newest frame is held back in `pending` and only moved into `batch`
/// when the next frame arrives. [`take`](Self::take) commits it, so nothing
/// is lost or duplicated at a flush.
#[derive(Debug, Default)]
pub struct AccumulationBuffer {
    pending: Option<Bytes>,
    batch: Vec<u8>,
}

impl AccumulationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Bytes) {
        if let Some(previous) = self.pending.replace(frame) {
            self.batch.extend_from_slice(&previous);
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> Option<&[u8]> {
        self.pending.as_deref()
    }

    #[cfg(test)]
    pub fn batch(&self) -> &[u8] {
        &self.batch
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none() && self.batch.is_empty()
    }

    /// Total bytes that the next flush would write
    pub fn len(&self) -> usize {
        self.batch.len() + self.pending.as_ref().map_or(0, Bytes::len)
    }

    /// Drain the batch followed by the held-back frame, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<u8> {
        let mut out = std::mem::take(&mut self.batch);
        if let Some(last) = self.pending.take() {
            out.extend_from_slice(&last);
        }
        out
    }

    pub fn clear(&mut self) {
        self.pending = None;
        self.batch.clear();
    }
}
