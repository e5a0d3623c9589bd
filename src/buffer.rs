use std::{fmt, sync::Arc};

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{utils::buffer::interleaved_to_mono, Error};

// -------------------------------------------------------------------------------------------------

/// An immutable, shared mono recording which grains are read from.
///
/// Sample data is wrapped into an `Arc`, so cloning a buffer only copies a reference. Buffers are
/// loaded and decoded by the caller and are never mutated by the synth.
#[derive(Clone)]
pub struct AudioBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new buffer from mono sample data. Returns Error::ParameterError when the sample
    /// rate is 0.
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Result<Self, Error> {
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "audio buffer sample rate must be > 0".to_string(),
            ));
        }
        Ok(Self {
            samples: samples.into(),
            sample_rate,
        })
    }

    /// Create a new buffer from interleaved multi-channel sample data, mixing it down to mono.
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, Error> {
        if channel_count == 0 {
            return Err(Error::ParameterError(
                "audio buffer channel count must be > 0".to_string(),
            ));
        }
        Self::new(interleaved_to_mono(samples, channel_count), sample_rate)
    }

    /// Create a buffer of the given duration in seconds, filled with white noise.
    pub fn white_noise(duration: f64, sample_rate: u32) -> Result<Self, Error> {
        Self::white_noise_with_rng(duration, sample_rate, &mut SmallRng::from_os_rng())
    }

    /// Create a white noise buffer using the given random number generator.
    pub fn white_noise_with_rng(
        duration: f64,
        sample_rate: u32,
        rng: &mut impl Rng,
    ) -> Result<Self, Error> {
        let frame_count = (duration.max(0.0) * sample_rate as f64) as usize;
        let samples = (0..frame_count)
            .map(|_| rng.random::<f32>() * 2.0 - 1.0)
            .collect::<Vec<_>>();
        Self::new(samples, sample_rate)
    }

    /// The buffer's sample data.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// The buffer's sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of sample frames in the buffer.
    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    /// Buffer duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("frame_count", &self.frame_count())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration() {
        let buffer = AudioBuffer::new(vec![0.0f32; 22050], 44100).unwrap();
        assert_eq!(buffer.frame_count(), 22050);
        assert_eq!(buffer.duration(), 0.5);

        let stereo = AudioBuffer::from_interleaved(&[1.0, 0.0, 0.5, 0.5], 2, 48000).unwrap();
        assert_eq!(stereo.samples(), &[0.5, 0.5]);
        assert_eq!(stereo.duration(), 2.0 / 48000.0);
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        assert!(matches!(
            AudioBuffer::new(vec![0.0f32; 100], 0),
            Err(Error::ParameterError(_))
        ));
        assert!(matches!(
            AudioBuffer::from_interleaved(&[0.0; 4], 0, 44100),
            Err(Error::ParameterError(_))
        ));
        assert!(AudioBuffer::white_noise(1.0, 0).is_err());
        // empty recordings are valid
        let empty = AudioBuffer::new(Vec::<f32>::new(), 44100).unwrap();
        assert_eq!(empty.duration(), 0.0);
    }

    #[test]
    fn white_noise() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let noise = AudioBuffer::white_noise_with_rng(2.0, 8000, &mut rng).unwrap();
        assert_eq!(noise.frame_count(), 16000);
        assert!(noise.samples().iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(noise.samples().iter().any(|s| s.abs() > 0.5));
    }
}
