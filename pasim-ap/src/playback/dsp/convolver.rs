//! Convolution reverb
//!
//! Uniformly partitioned overlap-add convolution: the impulse is cut into
//! `RENDER_QUANTUM` sized partitions, each transformed once, and every input
//! block is multiplied against the history of input spectra. Latency is zero
//! and cost per block is one forward and one inverse FFT per channel.

use super::{Stage, RENDER_QUANTUM};
use crate::audio::AudioFrame;
use rand::Rng;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;
use tracing::warn;

/// Impulse length in seconds
pub const REVERB_SECONDS: f64 = 0.25;
/// Exponent of the impulse envelope `(1 - i/len)^decay`
pub const REVERB_DECAY: f32 = 0.1;

const FFT_SIZE: usize = RENDER_QUANTUM * 2;

// Impulse normalization constants (Web Audio ConvolverNode)
const GAIN_CALIBRATION: f32 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;
const MIN_POWER: f32 = 0.000125;

/// Decaying stereo noise, independent per channel.
pub fn synth_impulse(sample_rate: u32) -> [Vec<f32>; 2] {
    let len = ((sample_rate as f64 * REVERB_SECONDS) as usize).max(1);
    let mut rng = rand::thread_rng();
    let mut left = Vec::with_capacity(len);
    let mut right = Vec::with_capacity(len);
    for i in 0..len {
        let envelope = (1.0 - i as f32 / len as f32).powf(REVERB_DECAY);
        left.push((rng.gen::<f32>() * 2.0 - 1.0) * envelope);
        right.push((rng.gen::<f32>() * 2.0 - 1.0) * envelope);
    }
    [left, right]
}

/// Scale applied to an impulse so that its RMS power is calibrated.
pub fn normalization_scale(impulse: &[Vec<f32>; 2], sample_rate: u32) -> f32 {
    let len = impulse[0].len().max(impulse[1].len());
    if len == 0 {
        return 1.0;
    }
    let sum: f32 = impulse.iter().flatten().map(|s| s * s).sum();
    let mut power = (sum / (2 * len) as f32).sqrt();
    if !power.is_finite() || power < MIN_POWER {
        power = MIN_POWER;
    }
    let mut scale = GAIN_CALIBRATION / power;
    if sample_rate > 0 {
        scale *= GAIN_CALIBRATION_SAMPLE_RATE / sample_rate as f32;
    }
    scale
}

/// Spectrum of one impulse partition; a failed transform gives a silent
/// (all-zero) partition.
fn partition_spectrum(r2c: &Arc<dyn RealToComplex<f32>>, time: &mut [f32]) -> Vec<Complex<f32>> {
    let mut spectrum = r2c.make_output_vec();
    if let Err(e) = r2c.process(time, &mut spectrum) {
        warn!("Impulse partition transform failed, partition muted: {}", e);
        spectrum.iter_mut().for_each(|c| *c = Complex::new(0.0, 0.0));
    }
    spectrum
}

struct ChannelState {
    partitions: Vec<Vec<Complex<f32>>>,
    /// Ring of past input spectra, newest at `head`
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    overlap: Vec<f32>,
}

impl ChannelState {
    fn new(impulse: &[f32], r2c: &Arc<dyn RealToComplex<f32>>) -> Self {
        let partition_count = impulse.len().div_ceil(RENDER_QUANTUM).max(1);
        let mut partitions = Vec::with_capacity(partition_count);
        let mut time = r2c.make_input_vec();

        for p in 0..partition_count {
            time.iter_mut().for_each(|s| *s = 0.0);
            let start = p * RENDER_QUANTUM;
            let end = (start + RENDER_QUANTUM).min(impulse.len());
            if start < end {
                time[..end - start].copy_from_slice(&impulse[start..end]);
            }
            partitions.push(partition_spectrum(r2c, &mut time));
        }

        Self {
            history: vec![r2c.make_output_vec(); partition_count],
            partitions,
            head: 0,
            overlap: vec![0.0; RENDER_QUANTUM],
        }
    }
}

pub struct Convolver {
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    channels: [ChannelState; 2],
    time: Vec<f32>,
    accum: Vec<Complex<f32>>,
    out_time: Vec<f32>,
    fwd_scratch: Vec<Complex<f32>>,
    inv_scratch: Vec<Complex<f32>>,
}

impl Convolver {
    /// Reverb with a freshly generated, normalized impulse.
    pub fn new(sample_rate: u32) -> Self {
        let mut impulse = synth_impulse(sample_rate);
        let scale = normalization_scale(&impulse, sample_rate);
        for channel in impulse.iter_mut() {
            channel.iter_mut().for_each(|s| *s *= scale);
        }
        Self::from_impulse(&impulse)
    }

    /// Convolver for an explicit stereo impulse, used as-is.
    pub fn from_impulse(impulse: &[Vec<f32>; 2]) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(FFT_SIZE);
        let c2r = planner.plan_fft_inverse(FFT_SIZE);

        let channels = [
            ChannelState::new(&impulse[0], &r2c),
            ChannelState::new(&impulse[1], &r2c),
        ];

        Self {
            time: r2c.make_input_vec(),
            accum: r2c.make_output_vec(),
            out_time: c2r.make_output_vec(),
            fwd_scratch: r2c.make_scratch_vec(),
            inv_scratch: c2r.make_scratch_vec(),
            r2c,
            c2r,
            channels,
        }
    }

    pub fn partition_count(&self) -> usize {
        self.channels[0].partitions.len()
    }

    fn process_channel(&mut self, ch: usize, block: &mut [f32]) {
        let state = &mut self.channels[ch];
        let count = state.partitions.len();

        self.time[..block.len()].copy_from_slice(block);
        self.time[block.len()..].iter_mut().for_each(|s| *s = 0.0);

        state.head = (state.head + count - 1) % count;
        let slot = &mut state.history[state.head];
        if self
            .r2c
            .process_with_scratch(&mut self.time, slot, &mut self.fwd_scratch)
            .is_err()
        {
            block.iter_mut().for_each(|s| *s = 0.0);
            return;
        }

        self.accum.iter_mut().for_each(|c| *c = Complex::new(0.0, 0.0));
        for (p, partition) in state.partitions.iter().enumerate() {
            let input = &state.history[(state.head + p) % count];
            for ((acc, x), h) in self.accum.iter_mut().zip(input).zip(partition) {
                *acc += x * h;
            }
        }

        // Real signal: DC and Nyquist bins carry no imaginary part
        let last = self.accum.len() - 1;
        self.accum[0].im = 0.0;
        self.accum[last].im = 0.0;

        if self
            .c2r
            .process_with_scratch(&mut self.accum, &mut self.out_time, &mut self.inv_scratch)
            .is_err()
        {
            block.iter_mut().for_each(|s| *s = 0.0);
            return;
        }

        let norm = 1.0 / FFT_SIZE as f32;
        for (i, sample) in block.iter_mut().enumerate() {
            *sample = self.out_time[i] * norm + state.overlap[i];
            state.overlap[i] = self.out_time[RENDER_QUANTUM + i] * norm;
        }
    }
}

impl Stage for Convolver {
    fn process(&mut self, buf: &mut [AudioFrame]) {
        debug_assert!(buf.len() <= RENDER_QUANTUM);
        let mut left = [0.0f32; RENDER_QUANTUM];
        let mut right = [0.0f32; RENDER_QUANTUM];
        let n = buf.len().min(RENDER_QUANTUM);
        for (i, frame) in buf.iter().take(n).enumerate() {
            left[i] = frame.left;
            right[i] = frame.right;
        }

        self.process_channel(0, &mut left[..n]);
        self.process_channel(1, &mut right[..n]);

        for (i, frame) in buf.iter_mut().take(n).enumerate() {
            frame.left = left[i];
            frame.right = right[i];
        }
    }
}
