//! Audio decoder using symphonia
//!
//! Decodes a fetched announcement (MP3, FLAC, AAC, Vorbis, WAV) held in
//! memory into an [`AudioBuffer`] at the output sample rate.
//!
//! The whole track is decoded up front: announcements are short and the
//! engine needs random access to start at an arbitrary offset after a pause
//! or a signal chain rebuild.

use crate::audio::resampler::Resampler;
use crate::audio::types::AudioBuffer;
use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Turns encoded bytes into a playable buffer.
///
/// Decoding is CPU bound; the engine runs it on the blocking pool.
pub trait TrackDecoder: Send + Sync {
    /// Decode `bytes`. `extension` is a format hint (e.g. "mp3"), taken from
    /// the resource id.
    fn decode(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioBuffer>;
}

/// Symphonia based decoder producing stereo f32 at `target_rate`.
#[derive(Debug, Clone, Copy)]
pub struct SymphoniaDecoder {
    target_rate: u32,
}

impl SymphoniaDecoder {
    pub fn new(target_rate: u32) -> Self {
        Self { target_rate }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Decode to interleaved samples at the source rate.
    ///
    /// # Returns
    /// - `samples`: Interleaved f32 samples in the source channel layout
    /// - `sample_rate`: Source sample rate
    /// - `channels`: Source channel count
    pub fn decode_interleaved(
        bytes: Vec<u8>,
        extension: Option<&str>,
    ) -> Result<(Vec<f32>, u32, u16)> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    if channels == 0 {
                        channels = spec.channels.count() as u16;
                    }
                    let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    sample_buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(sample_buf.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Decoder failed: {}", e)));
                }
            }
        }

        if channels == 0 {
            return Err(Error::Decode("Channel count not found".to_string()));
        }

        debug!(
            "Decoded {} frames, sample_rate={}, channels={}",
            samples.len() / channels as usize,
            sample_rate,
            channels
        );

        Ok((samples, sample_rate, channels))
    }

    /// Reduce or expand any channel layout to interleaved stereo.
    ///
    /// Mono is duplicated to both sides; extra channels beyond the first two
    /// are dropped.
    pub fn to_stereo(samples: &[f32], channels: u16) -> Vec<f32> {
        match channels {
            2 => samples.to_vec(),
            1 => samples.iter().flat_map(|&s| [s, s]).collect(),
            n => samples
                .chunks_exact(n as usize)
                .flat_map(|frame| [frame[0], frame[1]])
                .collect(),
        }
    }
}

impl TrackDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioBuffer> {
        let (samples, source_rate, channels) = Self::decode_interleaved(bytes, extension)?;
        if samples.is_empty() {
            return Err(Error::Decode("Track contains no audio".to_string()));
        }
        let stereo = Self::to_stereo(&samples, channels);
        let resampled = Resampler::resample(&stereo, source_rate, self.target_rate, 2)?;
        Ok(AudioBuffer::new(resampled, self.target_rate))
    }
}
