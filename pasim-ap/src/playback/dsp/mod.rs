//! Signal processing stages used by the output chain
//!
//! Every stage processes stereo frames in place, one render quantum at a
//! time. The chain guarantees full quanta; stages with block-based internals
//! (the convolver) rely on it.

pub mod compressor;
pub mod convolver;
pub mod delay;
pub mod gain;
pub mod panner;

use crate::audio::AudioFrame;

pub use compressor::Compressor;
pub use convolver::Convolver;
pub use delay::FeedbackDelay;
pub use gain::GainControl;
pub use panner::Panner;

/// Frames rendered per processing call
pub const RENDER_QUANTUM: usize = 128;

/// A stateful in-place audio processor.
pub trait Stage: Send {
    fn process(&mut self, buf: &mut [AudioFrame]);
}

/// Multiply every frame by a constant weight.
pub fn apply_weight(buf: &mut [AudioFrame], weight: f32) {
    for frame in buf.iter_mut() {
        *frame = frame.scaled(weight);
    }
}

/// Add `weight * src` into `dst` frame by frame.
pub fn mix_into(dst: &mut [AudioFrame], src: &[AudioFrame], weight: f32) {
    for (d, s) in dst.iter_mut().zip(src) {
        d.add(&s.scaled(weight));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_into_weights_source() {
        let mut dst = [AudioFrame::from_stereo(0.5, 0.5); 2];
        let src = [AudioFrame::from_stereo(1.0, -1.0); 2];
        mix_into(&mut dst, &src, 0.25);
        assert_eq!(dst[1], AudioFrame::from_stereo(0.75, 0.25));
    }

    #[test]
    fn test_apply_weight_zero_silences() {
        let mut buf = [AudioFrame::from_stereo(0.9, -0.3); 4];
        apply_weight(&mut buf, 0.0);
        assert!(buf.iter().all(|f| f.peak() == 0.0));
    }
}
