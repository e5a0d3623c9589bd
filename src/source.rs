pub mod empty;

use std::time::Instant;

// -------------------------------------------------------------------------------------------------

/// Timing info for [`Source::write`] calls.
#[derive(Debug, Clone, Copy)]
pub struct SourceTime {
    /// Output's playback position in sample frames at the start of the written buffer.
    pub pos_in_frames: u64,
    /// Time stamp of the output's playback position.
    pub pos_instant: Instant,
}

impl Default for SourceTime {
    fn default() -> Self {
        Self {
            pos_in_frames: 0,
            pos_instant: Instant::now(),
        }
    }
}

impl SourceTime {
    pub fn new(pos_in_frames: u64) -> Self {
        Self {
            pos_in_frames,
            pos_instant: Instant::now(),
        }
    }

    /// Create a copy of the given time, moved forward by the given number of frames.
    pub fn with_frames_added(time: &SourceTime, frames: u64) -> Self {
        Self {
            pos_in_frames: time.pos_in_frames + frames,
            pos_instant: time.pos_instant,
        }
    }

    /// Playback position in seconds for the given sample rate.
    pub fn pos_in_seconds(&self, sample_rate: u32) -> f64 {
        self.pos_in_frames as f64 / sample_rate as f64
    }
}

// -------------------------------------------------------------------------------------------------

/// Types that can produce interleaved audio samples in `f32` format. `Send`able across threads.
pub trait Source: Send + 'static {
    /// Write at most `output.len()` samples into the interleaved `output`. Returns the number of
    /// written samples. Should take care to always output full frames, and must _never_ block.
    fn write(&mut self, output: &mut [f32], time: &SourceTime) -> usize;

    /// The source's output channel layout.
    fn channel_count(&self) -> usize;
    /// The source's output sample rate.
    fn sample_rate(&self) -> u32;

    /// True when the source no longer produces any samples.
    fn is_exhausted(&self) -> bool;
}
