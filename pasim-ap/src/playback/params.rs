//! Spatial effect parameters and speaker position

use serde::{Deserialize, Serialize};

/// Perceived source position relative to the listener.
///
/// Front ends constrain each axis to {-1, 0, 1}; the engine accepts any value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeakerPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl SpeakerPosition {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Parameters of the spatial chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectParams {
    /// Wet share of the convolution reverb, 0.0-1.0
    pub reverb_mix: f32,
    /// Wet share of the feedback delay, 0.0-1.0
    pub delay_mix: f32,
    /// Feedback gain of the delay loop, 0.0-1.0
    pub delay_feedback: f32,
    /// Compressor threshold in dB, -60.0-0.0
    pub compressor_threshold: f32,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            reverb_mix: 0.8,
            delay_mix: 0.7,
            delay_feedback: 0.6,
            compressor_threshold: -12.0,
        }
    }
}

impl EffectParams {
    /// Merge a partial update; out-of-range values are clamped.
    pub fn apply(&mut self, update: &EffectParamsUpdate) {
        if let Some(v) = update.reverb_mix {
            self.reverb_mix = v.clamp(0.0, 1.0);
        }
        if let Some(v) = update.delay_mix {
            self.delay_mix = v.clamp(0.0, 1.0);
        }
        if let Some(v) = update.delay_feedback {
            self.delay_feedback = v.clamp(0.0, 1.0);
        }
        if let Some(v) = update.compressor_threshold {
            self.compressor_threshold = v.clamp(-60.0, 0.0);
        }
    }

    /// Check that every field is within its documented range.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("reverb_mix", self.reverb_mix),
            ("delay_mix", self.delay_mix),
            ("delay_feedback", self.delay_feedback),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0, 1], got {}", name, value));
            }
        }
        if !(-60.0..=0.0).contains(&self.compressor_threshold) {
            return Err(format!(
                "compressor_threshold must be in [-60, 0], got {}",
                self.compressor_threshold
            ));
        }
        Ok(())
    }
}

/// Partial update for [`EffectParams`]; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectParamsUpdate {
    pub reverb_mix: Option<f32>,
    pub delay_mix: Option<f32>,
    pub delay_feedback: Option<f32>,
    pub compressor_threshold: Option<f32>,
}

impl EffectParamsUpdate {
    /// Parse `reverb=0.5,delay=0.2,feedback=0.1,threshold=-20`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut update = Self::default();
        for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{}'", pair))?;
            let value: f32 = value
                .trim()
                .parse()
                .map_err(|_| format!("invalid number for {}: '{}'", key, value))?;
            match key.trim() {
                "reverb" | "reverb_mix" => update.reverb_mix = Some(value),
                "delay" | "delay_mix" => update.delay_mix = Some(value),
                "feedback" | "delay_feedback" => update.delay_feedback = Some(value),
                "threshold" | "compressor_threshold" => {
                    update.compressor_threshold = Some(value)
                }
                other => return Err(format!("unknown effect parameter '{}'", other)),
            }
        }
        Ok(update)
    }
}
