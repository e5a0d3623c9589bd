#[cfg(feature = "cpal-output")]
pub mod cpal;
#[cfg(feature = "wav-output")]
pub mod wav;

use crate::{source::Source, Error};

// -------------------------------------------------------------------------------------------------

/// Audio output which plays, or writes, a single [`Source`].
pub trait OutputDevice {
    /// Actual device's output sample buffer channel count.
    fn channel_count(&self) -> usize;
    /// Actual device's output sample rate.
    fn sample_rate(&self) -> u32;
    /// Actual device's output playhead position in **samples** (NOT frames).
    fn sample_position(&self) -> u64;

    /// Get actual output volume.
    fn volume(&self) -> f32;
    /// Set a new output volume.
    fn set_volume(&mut self, volume: f32);

    /// True when the output is running, i.e. not paused or closed.
    fn is_running(&self) -> bool;

    /// Play given source as main output source. The source's channel layout and sample rate
    /// must match the output's.
    fn play(&mut self, source: Box<dyn Source>) -> Result<(), Error>;
    /// Drop actual source, replacing it with silence.
    fn stop(&mut self);
    /// Pause playback without dropping the output source.
    fn pause(&mut self);
    /// Resume from paused playback.
    fn resume(&mut self);

    /// Release the audio device or file.
    fn close(&mut self);
}

// -------------------------------------------------------------------------------------------------

pub(crate) fn check_source_layout(
    source: &dyn Source,
    channel_count: usize,
    sample_rate: u32,
) -> Result<(), Error> {
    if source.channel_count() != channel_count || source.sample_rate() != sample_rate {
        return Err(Error::ParameterError(format!(
            "source layout {}ch@{}Hz does not match the output layout {}ch@{}Hz",
            source.channel_count(),
            source.sample_rate(),
            channel_count,
            sample_rate
        )));
    }
    Ok(())
}
