//! Positional stage: equal-power stereo panning with inverse-distance rolloff
//!
//! The listener sits at the origin facing -Z with +Y up, so +X is to the
//! right. The cone is omnidirectional, so only azimuth and distance matter.

use super::Stage;
use crate::audio::AudioFrame;
use crate::playback::params::SpeakerPosition;

const REF_DISTANCE: f64 = 1.0;
const ROLLOFF_FACTOR: f64 = 1.0;

/// Static-position panner. Gains are computed once at construction.
#[derive(Debug, Clone)]
pub struct Panner {
    /// Azimuth folded into [-90, 90] degrees
    azimuth: f64,
    gain_l: f32,
    gain_r: f32,
    distance_gain: f32,
}

impl Panner {
    pub fn new(position: SpeakerPosition) -> Self {
        let azimuth = Self::azimuth_degrees(position);
        let distance_gain = Self::inverse_distance_gain(position) as f32;

        // Stereo input: the pan position only moves energy across sides
        let x = if azimuth <= 0.0 {
            (azimuth + 90.0) / 90.0
        } else {
            azimuth / 90.0
        };
        let angle = x * std::f64::consts::FRAC_PI_2;

        Self {
            azimuth,
            gain_l: angle.cos() as f32,
            gain_r: angle.sin() as f32,
            distance_gain,
        }
    }

    pub fn azimuth(&self) -> f64 {
        self.azimuth
    }

    pub fn distance_gain(&self) -> f32 {
        self.distance_gain
    }

    /// Source azimuth relative to the listener, folded front/back into
    /// [-90, 90] (negative = left).
    fn azimuth_degrees(position: SpeakerPosition) -> f64 {
        // Project onto the horizontal plane (up = +Y)
        let (x, z) = (position.x as f64, position.z as f64);
        let len = (x * x + z * z).sqrt();
        if len == 0.0 {
            return 0.0;
        }
        let (px, pz) = (x / len, z / len);

        // Angle from the right axis, then the front/back half-plane
        let mut azimuth = px.clamp(-1.0, 1.0).acos().to_degrees();
        let front_back = -pz;
        if front_back < 0.0 {
            azimuth = 360.0 - azimuth;
        }

        // Convert to clockwise-from-front
        azimuth = if (0.0..=270.0).contains(&azimuth) {
            90.0 - azimuth
        } else {
            450.0 - azimuth
        };

        if azimuth < -90.0 {
            azimuth = -180.0 - azimuth;
        } else if azimuth > 90.0 {
            azimuth = 180.0 - azimuth;
        }
        azimuth
    }

    fn inverse_distance_gain(position: SpeakerPosition) -> f64 {
        let (x, y, z) = (position.x as f64, position.y as f64, position.z as f64);
        let distance = (x * x + y * y + z * z).sqrt().max(REF_DISTANCE);
        REF_DISTANCE / (REF_DISTANCE + ROLLOFF_FACTOR * (distance - REF_DISTANCE))
    }
}

impl Stage for Panner {
    fn process(&mut self, buf: &mut [AudioFrame]) {
        for frame in buf.iter_mut() {
            let (l, r) = (frame.left, frame.right);
            let (out_l, out_r) = if self.azimuth <= 0.0 {
                (l + r * self.gain_l, r * self.gain_r)
            } else {
                (l * self.gain_l, r + l * self.gain_r)
            };
            frame.left = out_l * self.distance_gain;
            frame.right = out_r * self.distance_gain;
        }
    }
}
