//! Playout ring between the output bus and the device callback
//!
//! The bus renders on a dedicated thread into a lock-free ring; the device
//! callback only pops frames. Rendering (FFT convolution, unit locks) never
//! runs on the real-time thread, and an empty ring plays silence.
//!
//! ```text
//! OutputBus -> PlayoutFeeder (render thread) -> HeapRb<AudioFrame> -> PlayoutReader (cpal callback)
//! ```

use crate::audio::AudioFrame;
use crate::playback::OutputBus;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// Frames rendered per feeder pass
pub const FEED_BLOCK: usize = 512;

/// Default ring capacity in frames (about 93ms at 44.1kHz)
pub const DEFAULT_RING_FRAMES: usize = 4096;

/// Split a ring of `capacity` frames into its render and playout ends.
pub fn playout_ring(bus: OutputBus, capacity: usize) -> (PlayoutFeeder, PlayoutReader) {
    let rb = HeapRb::<AudioFrame>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    let underruns = Arc::new(AtomicU64::new(0));

    let feeder = PlayoutFeeder {
        producer,
        bus,
        scratch: vec![AudioFrame::zero(); FEED_BLOCK],
    };
    let reader = PlayoutReader {
        consumer,
        underruns,
    };
    (feeder, reader)
}

/// Write end: renders the bus into the ring.
pub struct PlayoutFeeder {
    producer: HeapProd<AudioFrame>,
    bus: OutputBus,
    scratch: Vec<AudioFrame>,
}

impl PlayoutFeeder {
    /// Render until the ring is full. Returns the frames written.
    pub fn fill(&mut self) -> usize {
        let mut written = 0;
        loop {
            let vacant = self.producer.vacant_len().min(FEED_BLOCK);
            if vacant == 0 {
                break;
            }
            let block = &mut self.scratch[..vacant];
            self.bus.render(block);
            written += self.producer.push_slice(block);
        }
        written
    }

    /// Frames waiting to be played
    pub fn buffered(&self) -> usize {
        self.producer.occupied_len()
    }

    /// Keep the ring topped up on a named thread until `stop` is set.
    pub fn spawn(mut self, stop: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        // Wake twice per block so the ring never drains between passes
        let rate = self.bus.sample_rate().max(1) as f64;
        let pause = Duration::from_secs_f64(FEED_BLOCK as f64 / rate / 2.0);

        thread::Builder::new()
            .name("pasim-playout".to_string())
            .spawn(move || {
                debug!("Playout feeder started");
                while !stop.load(Ordering::Acquire) {
                    let written = self.fill();
                    trace!(written, "Playout ring topped up");
                    thread::sleep(pause);
                }
                debug!("Playout feeder stopped");
            })
    }
}

/// Read end: owned by the device callback.
pub struct PlayoutReader {
    consumer: HeapCons<AudioFrame>,
    underruns: Arc<AtomicU64>,
}

impl PlayoutReader {
    /// Fill `out` from the ring; anything the ring cannot supply is silence.
    ///
    /// Never blocks. Returns the frames taken from the ring.
    pub fn read(&mut self, out: &mut [AudioFrame]) -> usize {
        let read = self.consumer.pop_slice(out);
        if read < out.len() {
            out[read..].fill(AudioFrame::zero());
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
        read
    }

    /// Shared count of callbacks that ran short
    pub fn underrun_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.underruns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::playback::chain::build_output_unit;
    use crate::playback::params::{EffectParams, SpeakerPosition};
    use std::time::Instant;

    fn bus_with_tone(value: f32, frames: usize) -> OutputBus {
        let bus = OutputBus::new(8000);
        let buffer = AudioBuffer::new(vec![value; 2 * frames], 8000);
        let (unit, _gain) = build_output_unit(
            &buffer,
            0.0,
            1.0,
            false,
            SpeakerPosition::default(),
            &EffectParams::default(),
        );
        bus.attach(unit);
        bus
    }

    #[test]
    fn test_fill_stops_at_capacity() {
        let (mut feeder, _reader) = playout_ring(bus_with_tone(0.5, 4000), 1000);
        assert_eq!(feeder.fill(), 1000);
        assert_eq!(feeder.buffered(), 1000);
        assert_eq!(feeder.fill(), 0);
    }

    #[test]
    fn test_short_ring_plays_silence_and_counts_underrun() {
        let (mut feeder, mut reader) = playout_ring(bus_with_tone(0.5, 4000), 64);
        let underruns = reader.underrun_counter();
        feeder.fill();

        let mut out = [AudioFrame::from_stereo(9.0, 9.0); 100];
        assert_eq!(reader.read(&mut out), 64);
        assert!(out[..64].iter().all(|f| *f == AudioFrame::from_stereo(0.5, 0.5)));
        assert!(out[64..].iter().all(|f| *f == AudioFrame::zero()));
        assert_eq!(underruns.load(Ordering::Relaxed), 1);

        // Full read: no new underrun
        feeder.fill();
        let mut out = [AudioFrame::zero(); 32];
        assert_eq!(reader.read(&mut out), 32);
        assert_eq!(underruns.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_reader_plays_buffered_frames_without_the_bus() {
        let bus = bus_with_tone(0.25, 4000);
        let (mut feeder, mut reader) = playout_ring(bus.clone(), 256);
        feeder.fill();

        // Bus gone quiet: what is already queued still plays
        bus.detach();
        let mut out = [AudioFrame::zero(); 256];
        assert_eq!(reader.read(&mut out), 256);
        assert!(out.iter().all(|f| *f == AudioFrame::from_stereo(0.25, 0.25)));

        feeder.fill();
        assert_eq!(reader.read(&mut out), 256);
        assert!(out.iter().all(|f| *f == AudioFrame::zero()));
    }

    #[test]
    fn test_feeder_thread_tops_up_until_stopped() {
        let (feeder, mut reader) = playout_ring(bus_with_tone(0.5, 80_000), 512);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = feeder.spawn(Arc::clone(&stop)).unwrap();

        let mut out = [AudioFrame::zero(); 128];
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut total = 0;
        while total < 2048 && Instant::now() < deadline {
            total += reader.read(&mut out);
            thread::sleep(Duration::from_millis(1));
        }
        assert!(total >= 2048);

        stop.store(true, Ordering::Release);
        handle.join().unwrap();
    }
}
