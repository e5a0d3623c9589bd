//! Smoothed parameter values, used to de-zipper gain and cutoff changes in the audio thread.

use std::fmt::Debug;

use crate::utils::buffer::scale_buffer;

// -------------------------------------------------------------------------------------------------

/// Provides smooth transitions between a current and target f32 value.
pub trait SmoothedValue: Debug {
    /// Access to the current, possibly ramped value.
    #[must_use]
    fn current(&self) -> f32;
    /// Access to the target value.
    #[must_use]
    fn target(&self) -> f32;

    /// Ramp, if needed, and get the current ramped value, else returns the target value.
    #[must_use]
    fn next(&mut self) -> f32 {
        if self.need_ramp() {
            self.ramp();
            self.current()
        } else {
            self.target()
        }
    }

    /// Test if ramping is necessary. When no ramping is needed, the target value can be
    /// applied to entire blocks.
    #[must_use]
    fn need_ramp(&self) -> bool;
    /// Move current towards the target value.
    fn ramp(&mut self);

    /// Set current and target to the same value.
    fn init(&mut self, value: f32);
    /// Set a new target value. Current follows with the next ramps.
    fn set_target(&mut self, target: f32);
}

// -------------------------------------------------------------------------------------------------

/// Apply a smoothed gain value to a mono buffer.
pub fn apply_smoothed_gain(buffer: &mut [f32], smoothed: &mut impl SmoothedValue) {
    if smoothed.need_ramp() {
        for s in buffer.iter_mut() {
            *s *= smoothed.next();
        }
    } else {
        let gain = smoothed.target();
        if (1.0 - gain).abs() > 0.000001 {
            scale_buffer(buffer, gain);
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Exponential smoothed value, moving a fixed fraction (the inertia) of the remaining distance
/// towards the target on each ramp. Inertia is specified at 44.1 kHz and scaled to the actual
/// sample rate.
#[derive(Debug, Clone)]
pub struct ExponentialSmoothedValue {
    current: f32,
    target: f32,
    inertia: f32,
    sample_rate_comp: f32,
}

impl ExponentialSmoothedValue {
    pub const DEFAULT_INERTIA: f32 = 0.02;

    pub fn new(value: f32, sample_rate: u32) -> Self {
        Self::with_inertia(value, Self::DEFAULT_INERTIA, sample_rate)
    }

    pub fn with_inertia(value: f32, inertia: f32, sample_rate: u32) -> Self {
        assert!(inertia > 0.0 && inertia <= 1.0, "Invalid inertia");
        assert!(sample_rate > 0, "Invalid sample rate");
        Self {
            current: value,
            target: value,
            inertia,
            sample_rate_comp: 44100.0 / sample_rate as f32,
        }
    }

    #[inline(always)]
    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    /// Jump to the target value, skipping all pending ramps.
    pub fn reset(&mut self) {
        self.init(self.target);
    }

    #[inline(always)]
    fn step(&self) -> f32 {
        // never overshoot at low sample rates
        (self.inertia * self.sample_rate_comp).min(1.0)
    }
}

impl SmoothedValue for ExponentialSmoothedValue {
    #[inline(always)]
    fn current(&self) -> f32 {
        self.current
    }

    #[inline(always)]
    fn target(&self) -> f32 {
        self.target
    }

    fn need_ramp(&self) -> bool {
        const EPSILON: f32 = f32::EPSILON * 100.0;
        ((self.target - self.current) * self.step()).abs() > EPSILON
    }

    fn ramp(&mut self) {
        self.current += (self.target - self.current) * self.step();
    }

    fn init(&mut self, value: f32) {
        self.target = value;
        self.current = value;
    }

    fn set_target(&mut self, target: f32) {
        self.target = target;
        if !self.need_ramp() {
            self.current = self.target;
        }
    }
}

// -------------------------------------------------------------------------------------------------
