//! Signal chain construction
//!
//! [`build_output_unit`] is the only place an output unit is assembled.
//! Play, resume and every live rebuild go through it, so the same inputs
//! always give the same topology and stage parameters.
//!
//! ```text
//! spatial off:  source -> gain -> out
//! spatial on:   source -> panner -> gain -+-> delay dry ------------------------> out
//!                                         +-> delay -> delay wet -+---------------> out
//!                                         |                       +-> reverb dry -> out
//!                                         |                       +-> convolver -> reverb wet -> out
//!                                         +-> compressor --------------------------------------> out
//! ```

use crate::audio::{AudioBuffer, AudioFrame};
use crate::playback::dsp::{
    apply_weight, delay::LOOP_DELAY_SECONDS, mix_into, Compressor, Convolver, FeedbackDelay,
    GainControl, Panner, Stage, RENDER_QUANTUM,
};
use crate::playback::params::{EffectParams, SpeakerPosition};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

type Block = [AudioFrame; RENDER_QUANTUM];

/// Processing stages, in wiring order, used to describe a unit's topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Source,
    Panner,
    Gain,
    DelayDry,
    Delay,
    DelayWet,
    ReverbDry,
    Convolver,
    ReverbWet,
    Compressor,
    Destination,
}

/// Stage list for a chain with or without spatial processing.
pub fn topology(spatial_enabled: bool) -> Vec<StageKind> {
    use StageKind::*;
    if spatial_enabled {
        vec![
            Source, Panner, Gain, DelayDry, Delay, DelayWet, ReverbDry, Convolver, ReverbWet,
            Compressor, Destination,
        ]
    } else {
        vec![Source, Gain, Destination]
    }
}

struct SpatialChain {
    panner: Panner,
    delay: FeedbackDelay,
    convolver: Convolver,
    compressor: Compressor,
    delay_mix: f32,
    reverb_mix: f32,
}

impl SpatialChain {
    fn new(sample_rate: u32, position: SpeakerPosition, params: &EffectParams) -> Self {
        Self {
            panner: Panner::new(position),
            delay: FeedbackDelay::new(sample_rate, LOOP_DELAY_SECONDS, params.delay_feedback),
            convolver: Convolver::new(sample_rate),
            compressor: Compressor::new(sample_rate, params.compressor_threshold),
            delay_mix: params.delay_mix,
            reverb_mix: params.reverb_mix,
        }
    }

    fn render(&mut self, mut source: Block, gain: f32) -> Block {
        self.panner.process(&mut source);
        apply_weight(&mut source, gain);
        let gained = source;

        let mut out = [AudioFrame::zero(); RENDER_QUANTUM];
        mix_into(&mut out, &gained, 1.0 - self.delay_mix);

        let mut delay_wet = gained;
        self.delay.process(&mut delay_wet);
        apply_weight(&mut delay_wet, self.delay_mix);
        mix_into(&mut out, &delay_wet, 1.0);
        mix_into(&mut out, &delay_wet, 1.0 - self.reverb_mix);

        let mut reverb = delay_wet;
        self.convolver.process(&mut reverb);
        mix_into(&mut out, &reverb, self.reverb_mix);

        let mut compressed = gained;
        self.compressor.process(&mut compressed);
        mix_into(&mut out, &compressed, 1.0);

        out
    }
}

struct Renderer {
    buffer: AudioBuffer,
    cursor: usize,
    gain: GainControl,
    spatial: Option<SpatialChain>,
    pending: Block,
    pending_pos: usize,
}

impl Renderer {
    fn render_quantum(&mut self) {
        let mut block = [AudioFrame::zero(); RENDER_QUANTUM];
        for (i, frame) in block.iter_mut().enumerate() {
            if let Some(f) = self.buffer.get_frame(self.cursor + i) {
                *frame = f;
            }
        }
        self.cursor += RENDER_QUANTUM;

        let gain = self.gain.get();
        self.pending = match self.spatial.as_mut() {
            Some(chain) => chain.render(block, gain),
            None => {
                apply_weight(&mut block, gain);
                block
            }
        };
        self.pending_pos = 0;
    }

    fn render(&mut self, out: &mut [AudioFrame]) {
        for frame in out.iter_mut() {
            if self.pending_pos == RENDER_QUANTUM {
                self.render_quantum();
            }
            *frame = self.pending[self.pending_pos];
            self.pending_pos += 1;
        }
    }
}

/// A live, connected signal chain for one track.
///
/// Clones share the same chain: one sits in the output bus, the engine keeps
/// another to stop it.
#[derive(Clone)]
pub struct OutputUnit {
    renderer: Arc<Mutex<Renderer>>,
    stopped: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicU64>,
    start_offset: f64,
    spatial_enabled: bool,
    source_frames: usize,
}

impl OutputUnit {
    /// Offset in seconds the source started at
    pub fn start_offset(&self) -> f64 {
        self.start_offset
    }

    pub fn spatial_enabled(&self) -> bool {
        self.spatial_enabled
    }

    pub fn topology(&self) -> Vec<StageKind> {
        topology(self.spatial_enabled)
    }

    /// Stop producing sound. Stopping an already stopped unit does nothing.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!(start_offset = self.start_offset, "Output unit stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Frames written by [`render`](Self::render) since construction
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Source frames remaining after the start offset
    pub fn source_frames(&self) -> usize {
        self.source_frames
    }

    /// Fill `out` with the next frames. A stopped unit yields silence.
    pub fn render(&self, out: &mut [AudioFrame]) {
        if self.is_stopped() {
            out.fill(AudioFrame::zero());
            return;
        }
        let mut renderer = match self.renderer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        renderer.render(out);
        self.frames_rendered
            .fetch_add(out.len() as u64, Ordering::Relaxed);
    }
}

impl fmt::Debug for OutputUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputUnit")
            .field("start_offset", &self.start_offset)
            .field("spatial_enabled", &self.spatial_enabled)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Build the signal chain for `buffer`, starting `offset` seconds in.
///
/// Returns the unit and the handle controlling its gain stage. Stage
/// parameters are fixed for the unit's lifetime; changing them means
/// building a new unit.
pub fn build_output_unit(
    buffer: &AudioBuffer,
    offset: f64,
    volume: f32,
    spatial_enabled: bool,
    position: SpeakerPosition,
    params: &EffectParams,
) -> (OutputUnit, GainControl) {
    let gain = GainControl::new(volume);
    let start_frame = buffer.frame_at(offset);
    let spatial = spatial_enabled.then(|| SpatialChain::new(buffer.sample_rate(), position, params));

    debug!(
        offset,
        spatial_enabled,
        start_frame,
        "Building output unit"
    );

    let renderer = Renderer {
        buffer: buffer.clone(),
        cursor: start_frame,
        gain: gain.clone(),
        spatial,
        pending: [AudioFrame::zero(); RENDER_QUANTUM],
        pending_pos: RENDER_QUANTUM,
    };

    let unit = OutputUnit {
        renderer: Arc::new(Mutex::new(renderer)),
        stopped: Arc::new(AtomicBool::new(false)),
        frames_rendered: Arc::new(AtomicU64::new(0)),
        start_offset: offset,
        spatial_enabled,
        source_frames: buffer.frame_count() - start_frame,
    };

    (unit, gain)
}
