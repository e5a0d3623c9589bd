use super::{Source, SourceTime};

// -------------------------------------------------------------------------------------------------

/// A silent placeholder source, used by outputs when nothing is playing.
pub struct EmptySource {
    channel_count: usize,
    sample_rate: u32,
}

impl EmptySource {
    pub fn new(channel_count: usize, sample_rate: u32) -> Self {
        Self {
            channel_count,
            sample_rate,
        }
    }
}

impl Source for EmptySource {
    fn write(&mut self, _output: &mut [f32], _time: &SourceTime) -> usize {
        0
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_exhausted(&self) -> bool {
        true
    }
}
