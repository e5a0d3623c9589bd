use crate::{
    utils::{
        dsp::filters::biquad::{BiquadFilter, BiquadFilterCoefficients},
        smoothed::{ExponentialSmoothedValue, SmoothedValue},
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Low-pass stage behind both voices of the synth.
///
/// The cutoff is controlled by a normalized factor in range `0..=1` which maps to a frequency on a
/// logarithmic curve between [`CutoffFilter::MIN_FREQUENCY`] and half the sample rate. Factor
/// changes are smoothed per sample.
#[derive(Debug, Clone)]
pub struct CutoffFilter {
    log_ratio: f32,
    max_coefficient_frequency: f32,
    factor: ExponentialSmoothedValue,
    coefficients: BiquadFilterCoefficients,
    filter: BiquadFilter,
}

impl CutoffFilter {
    /// Cutoff frequency in Hz for factor 0.
    pub const MIN_FREQUENCY: f32 = 20.0;
    /// Filter resonance.
    pub const Q: f32 = 1.0;

    /// Create a new, fully opened filter for the given sample rate.
    pub fn new(sample_rate: u32) -> Result<Self, Error> {
        let max_frequency = Self::max_frequency_for(sample_rate);
        if max_frequency <= Self::MIN_FREQUENCY {
            return Err(Error::ParameterError(format!(
                "Invalid cutoff filter sample-rate: must be > {}, but is {sample_rate}",
                2.0 * Self::MIN_FREQUENCY
            )));
        }
        let log_ratio = (max_frequency / Self::MIN_FREQUENCY).ln();
        // the SVF gets unstable at nyquist
        let max_coefficient_frequency = 0.49 * sample_rate as f32;
        let factor = ExponentialSmoothedValue::new(1.0, sample_rate);
        let coefficients =
            BiquadFilterCoefficients::new(sample_rate, max_coefficient_frequency, Self::Q)?;
        let filter = BiquadFilter::new();
        Ok(Self {
            log_ratio,
            max_coefficient_frequency,
            factor,
            coefficients,
            filter,
        })
    }

    /// Target cutoff factor.
    pub fn factor(&self) -> f32 {
        self.factor.target()
    }
    /// Set a new cutoff factor. Values outside of `0..=1` are clamped, NaN is ignored.
    pub fn set_factor(&mut self, factor: f32) {
        if !factor.is_nan() {
            self.factor.set_target(factor.clamp(0.0, 1.0));
        }
    }

    /// Target cutoff frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency_for(self.factor.target())
    }

    /// Map a normalized cutoff factor to a frequency in Hz.
    pub fn frequency_for(&self, factor: f32) -> f32 {
        Self::MIN_FREQUENCY * (factor.clamp(0.0, 1.0) * self.log_ratio).exp()
    }

    /// Filter the given mono buffer in-place.
    pub fn process(&mut self, buffer: &mut [f32]) {
        if self.factor.need_ramp() {
            for sample in buffer.iter_mut() {
                let factor = self.factor.next();
                self.update_coefficients(factor);
                *sample = self
                    .filter
                    .process_sample(&self.coefficients, *sample as f64) as f32;
            }
        } else {
            self.update_coefficients(self.factor.target());
            self.filter.process(&self.coefficients, buffer);
        }
    }

    /// Clear the filter's state and skip pending factor ramps.
    pub fn reset(&mut self) {
        self.factor.reset();
        self.filter.reset();
    }

    fn update_coefficients(&mut self, factor: f32) {
        let frequency = self
            .frequency_for(factor)
            .min(self.max_coefficient_frequency);
        let result = self.coefficients.set_cutoff(frequency);
        debug_assert!(result.is_ok(), "Cutoff frequency out of range");
    }

    fn max_frequency_for(sample_rate: u32) -> f32 {
        0.5 * sample_rate as f32
    }
}

// -------------------------------------------------------------------------------------------------
