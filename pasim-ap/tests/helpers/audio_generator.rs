//! Test audio generation
//!
//! Deterministic WAV tracks built in memory with hound, decoded through the
//! real symphonia path by the engine under test.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;

/// Rate used by the test bus and test tracks, so decoding skips resampling
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Stereo 16-bit sine tone as WAV bytes
pub fn tone_wav(duration_secs: f32, frequency_hz: f32, amplitude: f32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("wav writer");
        let frames = (duration_secs * TEST_SAMPLE_RATE as f32) as usize;
        for i in 0..frames {
            let t = i as f32 / TEST_SAMPLE_RATE as f32;
            let value = (2.0 * PI * frequency_hz * t).sin() * amplitude;
            let sample = (value * i16::MAX as f32) as i16;
            writer.write_sample(sample).expect("left");
            writer.write_sample(sample).expect("right");
        }
        writer.finalize().expect("finalize");
    }
    cursor.into_inner()
}

/// A 440Hz tone at half amplitude
pub fn announcement_wav(duration_secs: f32) -> Vec<u8> {
    tone_wav(duration_secs, 440.0, 0.5)
}
