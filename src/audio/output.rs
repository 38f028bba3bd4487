// Audio output using cpal
// Owns the playback device on its own thread and feeds it through a ring buffer

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{HeapRb, traits::{Consumer, Producer, Split}};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

use crate::settings::PlaybackSettings;

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("no output device available")]
    NoDevice,
    #[error("failed to query output config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("unsupported sample format: {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),
    #[error("failed to build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("failed to start stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("playback thread failed: {0}")]
    Thread(String),
}

pub struct AudioOutput {
    producer: RingProducer,
    stop_tx: Option<mpsc::Sender<()>>,
    device_thread: Option<JoinHandle<()>>,
}

impl AudioOutput {
    /// Open the default output device with the requested format.
    ///
    /// cpal streams are not `Send` on every platform, so the stream lives on a
    /// dedicated thread for as long as this value is alive.
    pub fn open(settings: &PlaybackSettings) -> Result<Self, OutputError> {
        let capacity = ring_capacity(settings);
        let rb = HeapRb::<f32>::new(capacity);
        let (producer, consumer) = rb.split();
        let consumer = Arc::new(Mutex::new(consumer));

        let volume = settings.volume.clamp(0.0, 1.0);

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16), OutputError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let requested = settings.clone();
        let device_thread = std::thread::Builder::new()
            .name("playback-device".to_string())
            .spawn(move || {
                let stream = match Self::start_device(&requested, consumer, volume) {
                    Ok((stream, format)) => {
                        let _ = ready_tx.send(Ok(format));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Park until the owner drops us
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| OutputError::Thread(e.to_string()))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| OutputError::Thread("device thread exited before reporting".to_string()))??;

        info!(sample_rate, channels, capacity, volume, "Audio output started");

        Ok(Self {
            producer,
            stop_tx: Some(stop_tx),
            device_thread: Some(device_thread),
        })
    }

    fn start_device(
        settings: &PlaybackSettings,
        consumer: Arc<Mutex<RingConsumer>>,
        volume: f32,
    ) -> Result<(Stream, (u32, u16)), OutputError> {
        let host = cpal::default_host();

        let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
        let sample_format = device.default_output_config()?.sample_format();

        let fixed = StreamConfig {
            channels: settings.channels,
            sample_rate: SampleRate(settings.sample_rate),
            buffer_size: BufferSize::Fixed(settings.buffer_frames),
        };

        let stream = match Self::build_for_format(&device, &fixed, sample_format, consumer.clone(), volume) {
            Ok(stream) => stream,
            Err(OutputError::Build(e)) => {
                // Some backends reject fixed buffer sizes; let the device pick
                warn!("Fixed buffer of {} frames rejected ({}), using device default", settings.buffer_frames, e);
                let flexible = StreamConfig {
                    buffer_size: BufferSize::Default,
                    ..fixed.clone()
                };
                Self::build_for_format(&device, &flexible, sample_format, consumer, volume)?
            }
            Err(e) => return Err(e),
        };

        stream.play()?;

        Ok((stream, (fixed.sample_rate.0, fixed.channels)))
    }

    fn build_for_format(
        device: &cpal::Device,
        config: &StreamConfig,
        sample_format: cpal::SampleFormat,
        consumer: Arc<Mutex<RingConsumer>>,
        volume: f32,
    ) -> Result<Stream, OutputError> {
        match sample_format {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(device, config, consumer, volume),
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(device, config, consumer, volume),
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(device, config, consumer, volume),
            format => Err(OutputError::UnsupportedFormat(format)),
        }
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        consumer: Arc<Mutex<RingConsumer>>,
        volume: f32,
    ) -> Result<Stream, OutputError> {
        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut consumer = consumer.lock();

                // Underruns play silence
                for sample in data.iter_mut() {
                    let value = consumer.try_pop().unwrap_or(0.0) * volume;
                    *sample = T::from_sample(value);
                }
            },
            move |err| {
                error!("Audio output error: {}", err);
            },
            None,
        )?;

        Ok(stream)
    }

    /// Write samples to the output buffer
    /// Returns the number of samples actually written; the rest are dropped
    pub fn write(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.device_thread.take() {
            if handle.join().is_err() {
                error!("Playback device thread panicked");
            }
        }
    }
}

/// Ring buffer length in samples: ~500ms at the requested format
fn ring_capacity(settings: &PlaybackSettings) -> usize {
    (settings.sample_rate as usize * settings.channels as usize / 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_holds_half_a_second() {
        let settings = PlaybackSettings::default();
        assert_eq!(ring_capacity(&settings), 44100);

        let mono = PlaybackSettings {
            sample_rate: 48000,
            channels: 1,
            ..PlaybackSettings::default()
        };
        assert_eq!(ring_capacity(&mono), 24000);
    }
}
