use std::f64;

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Low-pass coefficients of a [BiquadFilter].
///
/// Coefficients are recalculated whenever one of the parameters changes, so they can be set
/// once per sample while a cutoff change is ramping.
#[derive(Default, Clone, PartialEq, Debug)]
pub struct BiquadFilterCoefficients {
    sample_rate: u32,
    cutoff: f32,
    q: f32,
    a1: f64,
    a2: f64,
    a3: f64,
}

impl BiquadFilterCoefficients {
    pub fn new(sample_rate: u32, cutoff: f32, q: f32) -> Result<Self, Error> {
        let mut coefficients = BiquadFilterCoefficients::default();
        coefficients.set(sample_rate, cutoff, q)?;
        Ok(coefficients)
    }

    /// Get currently applied sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The frequency in Hz where the cutoff of the filter should be.
    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }
    /// Set the cutoff frequency in Hz. Must be below nyquist.
    pub fn set_cutoff(&mut self, cutoff: f32) -> Result<(), Error> {
        if self.cutoff != cutoff {
            self.cutoff = cutoff;
            self.apply()
        } else {
            Ok(())
        }
    }

    /// The steepness of the filter.
    pub fn q(&self) -> f32 {
        self.q
    }

    /// Sets and applies a batch of new filter parameters.
    pub fn set(&mut self, sample_rate: u32, cutoff: f32, q: f32) -> Result<(), Error> {
        if self.sample_rate != sample_rate || self.cutoff != cutoff || self.q != q {
            self.sample_rate = sample_rate;
            self.cutoff = cutoff;
            self.q = q;
            self.apply()
        } else {
            Ok(())
        }
    }

    fn apply(&mut self) -> Result<(), Error> {
        if self.sample_rate == 0 {
            return Err(Error::ParameterError(format!(
                "Invalid filter sample-rate: must be > 0, but is {s}",
                s = self.sample_rate
            )));
        }
        if self.q <= 0.0 {
            return Err(Error::ParameterError(format!(
                "Invalid filter Q: must be > 0, but is {q}",
                q = self.q
            )));
        }
        if self.cutoff <= 0.0 || self.cutoff >= self.sample_rate as f32 / 2.0 {
            return Err(Error::ParameterError(format!(
                "Invalid filter frequency: must be in range 0..{n} (nyquist), but is {f}",
                n = self.sample_rate as f32 / 2.0,
                f = self.cutoff
            )));
        }
        let g = f64::tan(f64::consts::PI * self.cutoff as f64 / self.sample_rate as f64);
        let k = 1.0 / self.q as f64;
        self.a1 = 1.0 / (1.0 + g * (g + k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// State variable low-pass filter, designed by Andrew Simper of Cytomic.
/// See <http://cytomic.com/files/dsp/SvfLinearTrapOptimised2.pdf>
///
/// Second-order, 12 dB/octave. Stable when the cutoff is modulated at audio rate.
#[derive(Default, Clone, Debug)]
pub struct BiquadFilter {
    ic1eq: f64,
    ic2eq: f64,
}

impl BiquadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter all samples in the given buffer in-place.
    #[inline]
    pub fn process(&mut self, coefficients: &BiquadFilterCoefficients, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(coefficients, *sample as f64) as f32;
        }
    }

    /// Apply the filter on a single sample.
    #[inline]
    pub fn process_sample(&mut self, coefficients: &BiquadFilterCoefficients, input: f64) -> f64 {
        let v3 = input - self.ic2eq;
        let v1 = coefficients.a1 * self.ic1eq + coefficients.a2 * v3;
        let v2 = self.ic2eq + coefficients.a2 * self.ic1eq + coefficients.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;
        v2
    }

    /// Reset state of filter.
    #[inline]
    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

// -------------------------------------------------------------------------------------------------
