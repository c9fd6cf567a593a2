//! Short feedback delay ("echo")
//!
//! `y[n] = x[n - D] + feedback * y[n - D]`, with the loop delay `D` fixed at
//! construction.

use super::Stage;
use crate::audio::AudioFrame;

/// Loop delay of the echo stage in seconds
pub const LOOP_DELAY_SECONDS: f64 = 0.001;

pub struct FeedbackDelay {
    line: Vec<AudioFrame>,
    cursor: usize,
    feedback: f32,
}

impl FeedbackDelay {
    pub fn new(sample_rate: u32, delay_seconds: f64, feedback: f32) -> Self {
        let frames = ((delay_seconds * sample_rate as f64).round() as usize).max(1);
        Self {
            line: vec![AudioFrame::zero(); frames],
            cursor: 0,
            feedback,
        }
    }

    pub fn delay_frames(&self) -> usize {
        self.line.len()
    }
}

impl Stage for FeedbackDelay {
    fn process(&mut self, buf: &mut [AudioFrame]) {
        for frame in buf.iter_mut() {
            let delayed = self.line[self.cursor];
            let mut feed = *frame;
            feed.add(&delayed.scaled(self.feedback));
            self.line[self.cursor] = feed;
            *frame = delayed;
            self.cursor = (self.cursor + 1) % self.line.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_millisecond_at_common_rates() {
        assert_eq!(FeedbackDelay::new(44100, LOOP_DELAY_SECONDS, 0.5).delay_frames(), 44);
        assert_eq!(FeedbackDelay::new(48000, LOOP_DELAY_SECONDS, 0.5).delay_frames(), 48);
        // Never below one frame
        assert_eq!(FeedbackDelay::new(100, LOOP_DELAY_SECONDS, 0.5).delay_frames(), 1);
    }

    #[test]
    fn test_impulse_echoes_with_feedback() {
        let mut delay = FeedbackDelay::new(1000, 0.002, 0.5); // 2 frames
        let mut buf = vec![AudioFrame::zero(); 8];
        buf[0] = AudioFrame::from_stereo(1.0, 1.0);
        delay.process(&mut buf);

        let lefts: Vec<f32> = buf.iter().map(|f| f.left).collect();
        assert_eq!(lefts, vec![0.0, 0.0, 1.0, 0.0, 0.5, 0.0, 0.25, 0.0]);
    }

    #[test]
    fn test_zero_feedback_is_pure_delay() {
        let mut delay = FeedbackDelay::new(1000, 0.001, 0.0);
        let mut buf = vec![
            AudioFrame::from_stereo(0.1, 0.2),
            AudioFrame::from_stereo(0.3, 0.4),
            AudioFrame::zero(),
        ];
        delay.process(&mut buf);
        assert_eq!(buf[1], AudioFrame::from_stereo(0.1, 0.2));
        assert_eq!(buf[2], AudioFrame::from_stereo(0.3, 0.4));
    }
}
