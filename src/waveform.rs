//! Helper functions to generate waveform overviews of audio buffers for the renderer.
//!
//! ## Examples
//!
//! Print a waveform overview as text, one line per point.
//!
//! ```rust
//! use grainfield::{waveform::waveform_from_buffer, AudioBuffer};
//!
//! let buffer = AudioBuffer::white_noise(2.0, 44100)?;
//! let waveform = waveform_from_buffer(&buffer, 64);
//! assert_eq!(waveform.len(), 64);
//!
//! for point in &waveform {
//!     let width = ((point.max - point.min) * 20.0) as usize;
//!     println!("{:>8.3}s {}", point.time.as_secs_f32(), "#".repeat(width));
//! }
//! # Ok::<(), grainfield::Error>(())
//! ```

use std::time::Duration;

use crate::buffer::AudioBuffer;

// -------------------------------------------------------------------------------------------------

/// A single point in a waveform view plot, which represents a condensed view of the audio data at
/// the specified time as min/max values.
/// The slice width is indirectly specified via the resolution parameter when generating the points.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct WaveformPoint {
    /// Start time this point refers to in the original sample buffer.
    pub time: Duration,
    /// The minimum of all values which are represented by this time slice.
    pub min: f32,
    /// The maximum of all values which are represented by this time slice.
    pub max: f32,
}

// -------------------------------------------------------------------------------------------------

/// Generates display data for waveform plots with the given resolution from the given buffer.
///
/// Resolution usually is the width in pixels that you want to draw the waveform into. The returned
/// points are guaranteed to be smaller or equal to the given resolution. When they are smaller,
/// there are less sample frames than the specified resolution present in the buffer. The waveform
/// must then be drawn upscaled. Else the resulting plot data will represent a downscaled version
/// of the original waveform data.
///
/// Slice boundaries are rounded to the nearest frame, so all slices cover about the same number
/// of frames. The resulting plot point's min/max values use the same range as the buffer values.
pub fn waveform_from_buffer(buffer: &AudioBuffer, resolution: usize) -> Vec<WaveformPoint> {
    let samples = buffer.samples();
    let sample_rate = buffer.sample_rate() as f64;
    let frame_count = samples.len();
    if resolution == 0 || frame_count == 0 {
        return Vec::new();
    }

    // upscale
    if frame_count <= resolution {
        samples
            .iter()
            .enumerate()
            .map(|(frame_index, value)| WaveformPoint {
                time: Duration::from_secs_f64(frame_index as f64 / sample_rate),
                min: *value,
                max: *value,
            })
            .collect()
    }
    // downscale
    else {
        let step_size = frame_count as f64 / resolution as f64;
        let mut waveform = Vec::with_capacity(resolution);
        let mut slice_start = 0;
        let mut slice_end_f = 0.0;
        for _ in 0..resolution {
            slice_end_f += step_size;
            let slice_end = ((slice_end_f + 0.5) as usize).clamp(slice_start, frame_count);
            let (min, max) = samples[slice_start..slice_end]
                .iter()
                .fold((f32::MAX, f32::MIN), |(min, max), value| {
                    (min.min(*value), max.max(*value))
                });
            waveform.push(WaveformPoint {
                time: Duration::from_secs_f64(slice_start as f64 / sample_rate),
                min,
                max,
            });
            slice_start = slice_end;
        }
        waveform
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waveform() {
        // downscale
        let ramp = (0..1000).map(|i| i as f32 / 1000.0).collect::<Vec<_>>();
        let buffer = AudioBuffer::new(ramp, 1000).unwrap();
        let points = waveform_from_buffer(&buffer, 10);
        assert_eq!(points.len(), 10);
        assert_eq!(points[0].min, 0.0);
        assert_eq!(points[0].max, 0.099);
        assert_eq!(points[9].max, 0.999);
        assert_eq!(points[5].time, Duration::from_millis(500));
        assert!(points.iter().all(|p| p.min <= p.max));

        // upscale
        let buffer = AudioBuffer::new(vec![0.5f32, -0.5], 2).unwrap();
        let points = waveform_from_buffer(&buffer, 10);
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].min, -0.5);
        assert_eq!(points[1].time, Duration::from_millis(500));

        // empty
        assert!(waveform_from_buffer(&buffer, 0).is_empty());
    }
}
