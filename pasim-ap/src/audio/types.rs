//! Core audio data types
//!
//! Defines the decoded track buffer and the stereo frame used throughout the
//! signal chain.
//!
//! **Format:**
//! - Samples are f32 (floating point -1.0 to 1.0)
//! - Stereo interleaved: [L, R, L, R, ...]
//! - Sample rate equals the output rate after resampling

use std::sync::Arc;

/// Decoded audio ready for playback.
///
/// Holds the whole track in RAM so that playback can start at any offset.
/// Cloning is cheap: the sample data is shared, which is what lets the
/// decode cache hand the same buffer to every rebuilt output unit.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// PCM audio samples (interleaved stereo)
    samples: Arc<[f32]>,

    /// Sample rate in Hz
    sample_rate: u32,

    /// Number of stereo frames (samples.len() / 2)
    frame_count: usize,
}

impl AudioBuffer {
    /// Create a buffer from interleaved stereo samples.
    ///
    /// A trailing odd sample (incomplete frame) is dropped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32) -> Self {
        if samples.len() % 2 != 0 {
            samples.pop();
        }
        let frame_count = samples.len() / 2;
        Self {
            samples: samples.into(),
            sample_rate,
            frame_count,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Playable duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Frame index corresponding to an offset in seconds (clamped to the end)
    pub fn frame_at(&self, offset_seconds: f64) -> usize {
        let frame = (offset_seconds.max(0.0) * self.sample_rate as f64).round() as usize;
        frame.min(self.frame_count)
    }

    /// Get audio frame at specific frame index
    pub fn get_frame(&self, frame_index: usize) -> Option<AudioFrame> {
        let sample_index = frame_index * 2;
        if sample_index + 1 < self.samples.len() {
            Some(AudioFrame {
                left: self.samples[sample_index],
                right: self.samples[sample_index + 1],
            })
        } else {
            None
        }
    }
}

/// AudioFrame represents a single stereo sample (one frame of audio).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioFrame {
    /// Left channel sample
    pub left: f32,

    /// Right channel sample
    pub right: f32,
}

impl AudioFrame {
    /// Create a silent frame (0.0, 0.0)
    pub fn zero() -> Self {
        AudioFrame { left: 0.0, right: 0.0 }
    }

    /// Create a frame from left and right samples
    pub fn from_stereo(left: f32, right: f32) -> Self {
        AudioFrame { left, right }
    }

    /// Scale both channels
    pub fn scaled(self, gain: f32) -> Self {
        AudioFrame {
            left: self.left * gain,
            right: self.right * gain,
        }
    }

    /// Add another frame to this frame (for summing at the output bus)
    pub fn add(&mut self, other: &AudioFrame) {
        self.left += other.left;
        self.right += other.right;
    }

    /// Clamp samples to valid range [-1.0, 1.0] to prevent clipping
    pub fn clamp(&mut self) {
        self.left = self.left.clamp(-1.0, 1.0);
        self.right = self.right.clamp(-1.0, 1.0);
    }

    /// Larger absolute channel value
    pub fn peak(&self) -> f32 {
        self.left.abs().max(self.right.abs())
    }
}
