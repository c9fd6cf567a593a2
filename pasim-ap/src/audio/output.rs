//! Audio output using cpal
//!
//! Opens the output device and runs a stream whose callback pops frames from
//! the playout ring. A feeder thread renders the [`OutputBus`] into that
//! ring, so the callback never locks or renders. Volume lives in each unit's
//! gain stage; the callback only converts and clamps.

use crate::audio::AudioFrame;
use crate::error::{Error, Result};
use crate::playback::playout::{playout_ring, PlayoutReader, DEFAULT_RING_FRAMES};
use crate::playback::OutputBus;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Preferred device rate when the device supports it
pub const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// Audio output manager using cpal.
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    /// Render thread feeding the playout ring, with its stop flag
    feeder: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
    /// Stream errors reported by the device callback
    error_count: Arc<AtomicU32>,
    /// Callbacks the playout ring could not fully supply
    underruns: Arc<AtomicU64>,
}

impl AudioOutput {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device.
    ///
    /// # Arguments
    /// - `device_name`: Device to use (None = default device). Falls back to
    ///   the default device if the named one is missing.
    /// - `buffer_size`: Fixed buffer size in frames (None = device default)
    pub fn open(device_name: Option<&str>, buffer_size: Option<u32>) -> Result<Self> {
        let host = cpal::default_host();

        let named = match device_name {
            Some(name) => {
                let found = host
                    .output_devices()
                    .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
                    .find(|d| d.name().ok().as_deref() == Some(name));
                if found.is_none() {
                    warn!("Requested device '{}' not found, falling back to default device", name);
                }
                found
            }
            None => None,
        };

        let device = match named {
            Some(device) => device,
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };
        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let (mut config, sample_format) = Self::get_best_config(&device)?;
        if let Some(size) = buffer_size {
            config.buffer_size = cpal::BufferSize::Fixed(size);
        }

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, sample_format, config.buffer_size
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            feeder: None,
            error_count: Arc::new(AtomicU32::new(0)),
            underruns: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Prefer 44.1kHz stereo f32, otherwise take the device default.
    fn get_best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported_configs.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE))
                .config();
            return Ok((config, sample_format));
        }

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        Ok((supported_config.config(), supported_config.sample_format()))
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    pub fn underrun_count(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Start the device stream, rendering from `bus`.
    ///
    /// The bus must run at [`sample_rate`](Self::sample_rate).
    pub fn start(&mut self, bus: OutputBus) -> Result<()> {
        if bus.sample_rate() != self.sample_rate() {
            return Err(Error::AudioOutput(format!(
                "Bus runs at {}Hz but device at {}Hz",
                bus.sample_rate(),
                self.sample_rate()
            )));
        }

        self.stop()?;

        let (mut feeder, reader) = playout_ring(bus, DEFAULT_RING_FRAMES);
        self.underruns = reader.underrun_counter();
        // Prime the ring so the first callbacks have audio
        feeder.fill();

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(reader)?,
            SampleFormat::I16 => self.build_stream::<i16>(reader)?,
            SampleFormat::U16 => self.build_stream::<u16>(reader)?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let handle = feeder
            .spawn(Arc::clone(&stop))
            .map_err(|e| Error::AudioOutput(format!("Failed to start playout thread: {}", e)))?;
        self.feeder = Some((stop, handle));

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
        self.stream = Some(stream);

        info!("Audio stream started");
        Ok(())
    }

    fn build_stream<T>(&self, mut reader: PlayoutReader) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = self.config.channels as usize;
        let error_count = Arc::clone(&self.error_count);
        // Grown once up front; the callback only reallocates if the device
        // asks for more than this in one go
        let mut frames: Vec<AudioFrame> = vec![AudioFrame::zero(); DEFAULT_RING_FRAMES];

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let needed = data.len() / channels;
                    if frames.len() < needed {
                        frames.resize(needed, AudioFrame::zero());
                    }
                    let block = &mut frames[..needed];
                    reader.read(block);
                    write_frames(data, channels, block);
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_count.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Stop the stream. Safe to call when not started.
    pub fn stop(&mut self) -> Result<()> {
        if let Some((stop, handle)) = self.feeder.take() {
            stop.store(true, Ordering::Release);
            if handle.join().is_err() {
                warn!("Playout thread panicked");
            }
        }
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio stream");
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
        }
        Ok(())
    }
}

/// Convert `frames` into the device's interleaved `data`, clamped.
///
/// Channels past the second are silent; mono devices get the left/right
/// average.
fn write_frames<T>(data: &mut [T], channels: usize, frames: &[AudioFrame])
where
    T: SizedSample + FromSample<f32>,
{
    for (out, frame) in data.chunks_mut(channels).zip(frames.iter()) {
        let mut frame = *frame;
        frame.clamp();
        if channels == 1 {
            out[0] = T::from_sample((frame.left + frame.right) * 0.5);
            continue;
        }
        for (ch, sample) in out.iter_mut().enumerate() {
            let value = match ch {
                0 => frame.left,
                1 => frame.right,
                _ => 0.0,
            };
            *sample = T::from_sample(value);
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::Sample;

    #[test]
    fn test_write_frames_stereo_clamps() {
        let frames = [
            AudioFrame::from_stereo(0.25, -0.5),
            AudioFrame::from_stereo(1.5, -2.0),
        ];
        let mut data = [9.0f32; 4];
        write_frames(&mut data, 2, &frames);
        assert_eq!(data, [0.25, -0.5, 1.0, -1.0]);
    }

    #[test]
    fn test_write_frames_mono_averages() {
        let frames = [AudioFrame::from_stereo(0.5, 0.0), AudioFrame::from_stereo(-0.2, -0.4)];
        let mut data = [9.0f32; 2];
        write_frames(&mut data, 1, &frames);
        assert!((data[0] - 0.25).abs() < 1e-6);
        assert!((data[1] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_write_frames_extra_channels_silent() {
        let frames = [AudioFrame::from_stereo(0.1, 0.2)];
        let mut data = [7i16; 4];
        write_frames(&mut data, 4, &frames);
        assert_eq!(data[0], i16::from_sample(0.1f32));
        assert_eq!(data[1], i16::from_sample(0.2f32));
        assert_eq!(&data[2..], &[0, 0]);
    }
}
