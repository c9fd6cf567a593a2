//! Dynamics compressor
//!
//! Peak detector on the louder channel, soft-knee static curve starting at
//! the threshold, one-pole attack/release smoothing of the gain reduction and
//! automatic makeup gain.

use super::Stage;
use crate::audio::AudioFrame;

pub const KNEE_DB: f32 = 30.0;
pub const RATIO: f32 = 12.0;
pub const ATTACK_SECONDS: f32 = 0.003;
pub const RELEASE_SECONDS: f32 = 0.25;

/// Exponent applied to the inverse full-range gain to derive makeup gain
const MAKEUP_EXPONENT: f32 = 0.6;
/// Floor for the level detector, avoids log of zero
const SILENCE_DB: f32 = -160.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_seconds: f32,
    pub release_seconds: f32,
}

impl CompressorSettings {
    pub fn with_threshold(threshold_db: f32) -> Self {
        Self {
            threshold_db,
            knee_db: KNEE_DB,
            ratio: RATIO,
            attack_seconds: ATTACK_SECONDS,
            release_seconds: RELEASE_SECONDS,
        }
    }

    /// Output level in dB for a steady input level in dB.
    pub fn static_curve(&self, input_db: f32) -> f32 {
        let t = self.threshold_db;
        let k = self.knee_db;
        let slope = 1.0 / self.ratio;

        if input_db <= t {
            input_db
        } else if k > 0.0 && input_db < t + k {
            let over = input_db - t;
            input_db + (slope - 1.0) * over * over / (2.0 * k)
        } else {
            let knee_end = t + k + (slope - 1.0) * k / 2.0;
            knee_end + (input_db - t - k) * slope
        }
    }
}

pub struct Compressor {
    settings: CompressorSettings,
    attack_coeff: f32,
    release_coeff: f32,
    makeup_linear: f32,
    /// Smoothed gain reduction in dB (<= 0)
    envelope_db: f32,
}

impl Compressor {
    pub fn new(sample_rate: u32, threshold_db: f32) -> Self {
        Self::with_settings(sample_rate, CompressorSettings::with_threshold(threshold_db))
    }

    pub fn with_settings(sample_rate: u32, settings: CompressorSettings) -> Self {
        let rate = sample_rate.max(1) as f32;
        let full_range_db = settings.static_curve(0.0);
        let makeup_db = -full_range_db * MAKEUP_EXPONENT;

        Self {
            settings,
            attack_coeff: (-1.0 / (settings.attack_seconds * rate)).exp(),
            release_coeff: (-1.0 / (settings.release_seconds * rate)).exp(),
            makeup_linear: db_to_linear(makeup_db),
            envelope_db: 0.0,
        }
    }

    pub fn settings(&self) -> CompressorSettings {
        self.settings
    }

    pub fn makeup_gain(&self) -> f32 {
        self.makeup_linear
    }

    /// Current smoothed gain reduction in dB
    pub fn reduction_db(&self) -> f32 {
        self.envelope_db
    }
}

impl Stage for Compressor {
    fn process(&mut self, buf: &mut [AudioFrame]) {
        for frame in buf.iter_mut() {
            let peak = frame.peak();
            let level_db = if peak > 0.0 {
                (20.0 * peak.log10()).max(SILENCE_DB)
            } else {
                SILENCE_DB
            };
            let target_db = self.settings.static_curve(level_db) - level_db;

            let coeff = if target_db < self.envelope_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope_db = coeff * self.envelope_db + (1.0 - coeff) * target_db;

            *frame = frame.scaled(db_to_linear(self.envelope_db) * self.makeup_linear);
        }
    }
}

fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_curve_regions() {
        let s = CompressorSettings::with_threshold(-24.0);
        // Below threshold: unity
        assert_eq!(s.static_curve(-40.0), -40.0);
        // Inside the knee: some reduction, less than the full ratio
        let in_knee = s.static_curve(-14.0);
        assert!(in_knee < -14.0 && in_knee > -24.0 + 10.0 / RATIO);
        // Above the knee the slope is 1/ratio
        let a = s.static_curve(10.0);
        let b = s.static_curve(22.0);
        assert!(((b - a) - 12.0 / RATIO).abs() < 1e-4);
    }

    #[test]
    fn test_static_curve_continuous_at_knee_end() {
        let s = CompressorSettings::with_threshold(-12.0);
        let edge = -12.0 + KNEE_DB;
        let below = s.static_curve(edge - 1e-3);
        let above = s.static_curve(edge + 1e-3);
        assert!((below - above).abs() < 1e-2);
    }

    #[test]
    fn test_makeup_gain_from_full_range() {
        let comp = Compressor::new(44100, -12.0);
        let full_range = CompressorSettings::with_threshold(-12.0).static_curve(0.0);
        let expected = 10f32.powf(-full_range * MAKEUP_EXPONENT / 20.0);
        assert!((comp.makeup_gain() - expected).abs() < 1e-6);
        assert!(comp.makeup_gain() > 1.0);
    }

    #[test]
    fn test_loud_signal_is_reduced_over_time() {
        let mut comp = Compressor::new(8000, -30.0);
        let mut buf = vec![AudioFrame::from_stereo(1.0, 1.0); 4000];
        comp.process(&mut buf);

        assert!(comp.reduction_db() < -10.0);
        // Attack is fast, so the tail is well below the first frame
        assert!(buf[3999].left < buf[0].left);
    }

    #[test]
    fn test_silence_releases_toward_unity() {
        let mut comp = Compressor::new(8000, -30.0);
        let mut loud = vec![AudioFrame::from_stereo(1.0, 1.0); 800];
        comp.process(&mut loud);
        let compressed = comp.reduction_db();

        let mut quiet = vec![AudioFrame::zero(); 16000];
        comp.process(&mut quiet);
        assert!(comp.reduction_db() > compressed);
        assert!(comp.reduction_db() > -0.1);
    }
}
