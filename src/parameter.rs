//! Descriptors of the parameters the controller shares with all devices.

use four_cc::FourCC;

// -------------------------------------------------------------------------------------------------

mod float;
pub use float::FloatParameter;

// -------------------------------------------------------------------------------------------------

/// Output gain in dB.
pub const GAIN: FloatParameter =
    FloatParameter::new(FourCC(*b"GAIN"), "gain", -60.0..=12.0, 0.0).with_unit("dB");

/// Time between two grains in seconds.
pub const PERIOD: FloatParameter =
    FloatParameter::new(FourCC(*b"PERD"), "period", 0.001..=0.5, 0.05).with_unit("s");

/// Grain duration in seconds.
pub const DURATION: FloatParameter =
    FloatParameter::new(FourCC(*b"DURA"), "duration", 0.001..=1.0, 0.1).with_unit("s");

/// Random grain position variation in seconds.
pub const POSITION_VAR: FloatParameter =
    FloatParameter::new(FourCC(*b"PVAR"), "positionVar", 0.005..=1.0, 0.005).with_unit("s");

/// Random grain playback rate variation, relative to the original speed.
pub const RESAMPLING_VAR: FloatParameter =
    FloatParameter::new(FourCC(*b"RVAR"), "resamplingVar", 0.0..=1.0, 0.0);

/// All shared numeric parameters, e.g. to build a controller UI.
pub fn shared_parameters() -> [FloatParameter; 5] {
    [GAIN, PERIOD, DURATION, POSITION_VAR, RESAMPLING_VAR]
}

/// Find a shared numeric parameter by its controller name.
pub fn shared_parameter(name: &str) -> Option<FloatParameter> {
    shared_parameters().into_iter().find(|p| p.name() == name)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_lookup() {
        let parameters = shared_parameters();
        for (index, parameter) in parameters.iter().enumerate() {
            assert!(parameter.range().contains(&parameter.default_value()));
            assert!(parameters[index + 1..]
                .iter()
                .all(|p| p.id() != parameter.id() && p.name() != parameter.name()));
        }
        assert_eq!(shared_parameter("positionVar"), Some(POSITION_VAR));
        assert_eq!(shared_parameter("state"), None);
        // the smallest position variance is the window derivation's floor
        assert_eq!(*POSITION_VAR.range().start(), 0.005);
    }

    #[test]
    fn grain_bounds_match_voice_limits() {
        use crate::synth::voice::{MAX_GRAIN_DURATION, MIN_PERIOD};
        // the synth's default grain pool is sized for these bounds
        assert_eq!(*PERIOD.range().start(), MIN_PERIOD as f32);
        assert_eq!(*DURATION.range().end(), MAX_GRAIN_DURATION as f32);
    }
}
