// Audio module
// Frame decoding and cpal playback output

pub mod decoder;
pub mod output;
pub mod sink;

pub use decoder::decode_samples;
pub use output::AudioOutput;
pub use sink::{NullSink, PlaybackSink};
