//! Renders emitted grains into mono audio blocks.

use assume::assume;

use crate::buffer::AudioBuffer;

use super::voice::{GrainEvent, GrainSink};

// -------------------------------------------------------------------------------------------------

/// Fixed size pool of playing grains.
///
/// Grains are emitted by the voices via [`GrainSink::emit`] and then get mixed into the output
/// by [`GrainPool::process`], starting at their output time. The pool reuses inactive [`Grain`]
/// slots to avoid allocations in the audio thread: when all slots are busy, new grains are
/// dropped.
pub struct GrainPool {
    /// Pool of reusable grain instances.
    grains: Box<[Grain]>,
    /// Indices of currently active grains.
    active_grain_indices: Vec<usize>,
    /// Number of grains which got dropped because the pool was exhausted.
    dropped_grain_count: usize,
    /// Sample rate of the audio output.
    sample_rate: u32,
}

impl GrainPool {
    /// Create a new grain pool with the given number of grain slots for the given output rate.
    pub fn new(pool_size: usize, sample_rate: u32) -> Self {
        debug_assert!(pool_size > 0, "Need at least one grain slot");
        debug_assert!(sample_rate > 0, "Invalid sample rate");
        let grains = (0..pool_size).map(|_| Grain::new()).collect();
        let active_grain_indices = Vec::with_capacity(pool_size);
        Self {
            grains,
            active_grain_indices,
            dropped_grain_count: 0,
            sample_rate,
        }
    }

    /// Number of grains which are playing or waiting to be played.
    pub fn active_grain_count(&self) -> usize {
        self.active_grain_indices.len()
    }

    /// Number of grains which got dropped since the pool got created, because all slots were busy.
    pub fn dropped_grain_count(&self) -> usize {
        self.dropped_grain_count
    }

    pub fn is_empty(&self) -> bool {
        self.active_grain_indices.is_empty()
    }

    /// Stop all grains immediately.
    pub fn reset(&mut self) {
        for index in self.active_grain_indices.drain(..) {
            self.grains[index].deactivate();
        }
    }

    /// Mix all active grains into the given mono output block, which starts at the given output
    /// frame. Grains which start after the block are kept waiting.
    pub fn process(&mut self, output: &mut [f32], block_start_frame: u64) {
        for &index in &self.active_grain_indices {
            let grain = &mut self.grains[index];
            let start = grain.start_frame.saturating_sub(block_start_frame);
            if start >= output.len() as u64 {
                continue;
            }
            for o in output[start as usize..].iter_mut() {
                *o += grain.process();
                if !grain.is_active() {
                    break;
                }
            }
        }
        let grains = &self.grains;
        self.active_grain_indices
            .retain(|index| grains[*index].is_active());
    }
}

impl GrainSink for GrainPool {
    fn emit(&mut self, event: GrainEvent) {
        if let Some(index) = self.grains.iter().position(|g| !g.is_active()) {
            self.grains[index].activate(event, self.sample_rate);
            self.active_grain_indices.push(index);
        } else {
            self.dropped_grain_count += 1;
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A single playing grain: a linearly enveloped, resampled read of a buffer region.
#[derive(Debug, Clone)]
struct Grain {
    /// Buffer which is read, `None` when the grain is inactive.
    buffer: Option<AudioBuffer>,
    /// Output frame at which the grain starts playing.
    start_frame: u64,
    /// Current read position in buffer frames.
    position: f64,
    /// Increment to apply to position each output sample.
    increment: f64,
    /// Number of output samples remaining in this grain.
    samples_remaining: usize,
    /// Current position of the envelope (0.0 to 1.0).
    window_phase: f64,
    /// Amount to increment the window phase each sample.
    window_increment: f64,
    /// Attack and release length, relative to the grain length.
    attack: f64,
    release: f64,
    /// Grain's overall volume.
    volume: f32,
}

impl Grain {
    /// Create a new inactive grain.
    const fn new() -> Self {
        Self {
            buffer: None,
            start_frame: 0,
            position: 0.0,
            increment: 0.0,
            samples_remaining: 0,
            window_phase: 0.0,
            window_increment: 0.0,
            attack: 0.0,
            release: 0.0,
            volume: 0.0,
        }
    }

    #[inline]
    fn is_active(&self) -> bool {
        self.buffer.is_some()
    }

    fn activate(&mut self, event: GrainEvent, sample_rate: u32) {
        let sample_rate = sample_rate as f64;
        let buffer_sample_rate = event.buffer.sample_rate() as f64;
        let length = ((event.duration / event.rate) * sample_rate).round().max(1.0) as usize;

        self.start_frame = (event.time.max(0.0) * sample_rate).round() as u64;
        self.position = event.offset * buffer_sample_rate;
        self.increment = event.rate * buffer_sample_rate / sample_rate;
        self.samples_remaining = length;
        self.window_phase = 0.0;
        self.window_increment = 1.0 / length as f64;
        self.attack = event.attack;
        self.release = event.release;
        self.volume = event.gain;
        self.buffer = Some(event.buffer);
    }

    fn deactivate(&mut self) {
        self.buffer = None;
        self.samples_remaining = 0;
    }

    /// Linear attack/release envelope at the current window phase.
    #[inline]
    fn envelope(&self) -> f64 {
        let phase = self.window_phase;
        let attack = if self.attack > 0.0 {
            phase / self.attack
        } else {
            1.0
        };
        let release = if self.release > 0.0 {
            (1.0 - phase) / self.release
        } else {
            1.0
        };
        attack.min(release).clamp(0.0, 1.0)
    }

    /// Process this grain for one output sample.
    fn process(&mut self) -> f32 {
        let Some(buffer) = &self.buffer else {
            return 0.0;
        };
        let value = sample_at_position(buffer.samples(), self.position);
        let output = value * self.envelope() as f32 * self.volume;

        self.position += self.increment;
        self.window_phase += self.window_increment;
        self.samples_remaining = self.samples_remaining.saturating_sub(1);
        if self.samples_remaining == 0 {
            self.deactivate();
        }
        output
    }
}

// -------------------------------------------------------------------------------------------------

/// Sample the given buffer at a fractional frame position using cubic interpolation.
/// Positions outside of the buffer read the nearest edge sample.
#[inline]
fn sample_at_position(samples: &[f32], position: f64) -> f32 {
    let len = samples.len();
    if len == 0 {
        return 0.0;
    }
    let max_index = len - 1;
    let position = position.clamp(0.0, max_index as f64);

    let index = (position as usize).min(max_index);
    let fraction = (position - index as f64) as f32;

    // Calculate indices for 4-point cubic interpolation
    let i1 = index;
    let i0 = i1.saturating_sub(1);
    let i2 = (i1 + 1).min(max_index);
    let i3 = (i1 + 2).min(max_index);

    assume!(unsafe: i0 < len);
    let y0 = samples[i0];
    assume!(unsafe: i1 < len);
    let y1 = samples[i1];
    assume!(unsafe: i2 < len);
    let y2 = samples[i2];
    assume!(unsafe: i3 < len);
    let y3 = samples[i3];

    // Cubic interpolation (Catmull-Rom)
    let a = -0.5 * y0 + 1.5 * y1 - 1.5 * y2 + 0.5 * y3;
    let b = y0 - 2.5 * y1 + 2.0 * y2 - 0.5 * y3;
    let c = -0.5 * y0 + 0.5 * y2;
    let d = y1;

    a * fraction * fraction * fraction + b * fraction * fraction + c * fraction + d
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn grain(time: f64, duration: f64, buffer: &AudioBuffer) -> GrainEvent {
        GrainEvent {
            time,
            offset: 0.0,
            duration,
            rate: 1.0,
            gain: 1.0,
            attack: 0.5,
            release: 0.5,
            buffer: buffer.clone(),
        }
    }

    #[test]
    fn interpolation() {
        let samples = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(sample_at_position(&samples, 1.0), 1.0);
        assert!((sample_at_position(&samples, 1.5) - 1.5).abs() < 1e-6);
        assert_eq!(sample_at_position(&samples, -4.0), 0.0);
        assert_eq!(sample_at_position(&samples, 10.0), 3.0);
        assert_eq!(sample_at_position(&[], 0.5), 0.0);
    }

    #[test]
    fn triangle_envelope() {
        let sample_rate = 1000;
        let buffer = AudioBuffer::new(vec![1.0f32; 1000], sample_rate).unwrap();
        let mut pool = GrainPool::new(4, sample_rate);
        pool.emit(grain(0.0, 0.1, &buffer));
        assert_eq!(pool.active_grain_count(), 1);

        let mut output = vec![0.0; 200];
        pool.process(&mut output, 0);
        assert!(pool.is_empty());
        assert_eq!(output[0], 0.0);
        assert!((output[50] - 1.0).abs() < 1e-6);
        assert!(output[25] > 0.4 && output[25] < 0.6);
        assert!(output[..50].windows(2).all(|w| w[1] >= w[0]));
        assert!(output[50..100].windows(2).all(|w| w[1] <= w[0]));
        assert!(output[100..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn grains_start_at_their_time() {
        let sample_rate = 1000;
        let buffer = AudioBuffer::new(vec![1.0f32; 1000], sample_rate).unwrap();
        let mut pool = GrainPool::new(4, sample_rate);
        pool.emit(grain(0.15, 0.02, &buffer));

        let mut output = vec![0.0; 100];
        pool.process(&mut output, 0);
        assert!(output.iter().all(|s| *s == 0.0));
        assert_eq!(pool.active_grain_count(), 1);

        let mut output = vec![0.0; 100];
        pool.process(&mut output, 100);
        assert!(output[..50].iter().all(|s| *s == 0.0));
        assert!(output[51..69].iter().all(|s| *s > 0.0));
        assert!(output[70..].iter().all(|s| *s == 0.0));
        assert!(pool.is_empty());
    }

    #[test]
    fn exhausted_pool_drops_grains() {
        let buffer = AudioBuffer::new(vec![1.0f32; 1000], 1000).unwrap();
        let mut pool = GrainPool::new(2, 1000);
        for _ in 0..3 {
            pool.emit(grain(0.0, 0.5, &buffer));
        }
        assert_eq!(pool.active_grain_count(), 2);
        assert_eq!(pool.dropped_grain_count(), 1);
        pool.reset();
        assert!(pool.is_empty());
        pool.emit(grain(0.0, 0.5, &buffer));
        assert_eq!(pool.active_grain_count(), 1);
    }
}
