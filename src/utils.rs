//! Shared DSP helpers: gain conversion, buffer operations, smoothing and filters.

pub mod buffer;
pub mod dsp;
pub mod smoothed;

// -------------------------------------------------------------------------------------------------

const MINUS_INF_IN_DB: f32 = -200.0f32;

/// `ln(10) / 20`: multiply a dB value with this factor and exponentiate to get a linear gain.
const DB_TO_LIN_FACTOR: f32 = 0.115_129_255;

// -------------------------------------------------------------------------------------------------

/// Convert a linear gain to decibels. Values at or below -200 dB are treated as silence.
pub fn linear_to_db(value: f32) -> f32 {
    if value == 1.0 {
        return 0.0; // avoid rounding errors at exactly 0 dB
    } else if value > 1e-10f32 {
        return value.ln() / DB_TO_LIN_FACTOR;
    }
    MINUS_INF_IN_DB
}

/// Convert decibels to a linear gain: `exp(0.1151... * db)`, i.e. `10^(db / 20)`.
pub fn db_to_linear(value: f32) -> f32 {
    if value == 0.0f32 {
        return 1.0f32; // avoid rounding errors at exactly 0 dB
    } else if value > MINUS_INF_IN_DB {
        return (value * DB_TO_LIN_FACTOR).exp();
    }
    0.0f32
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lin_db_conversion() {
        assert_eq!(linear_to_db(1.0), 0.0);
        assert_eq!(linear_to_db(0.0), MINUS_INF_IN_DB);
        assert_eq!(db_to_linear(MINUS_INF_IN_DB), 0.0);
        assert_eq!(db_to_linear(0.0), 1.0);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-6);
        assert!((db_to_linear(6.0) - 1.995_262_3).abs() < 1e-5);
    }

    #[test]
    fn lin_db_round_trip() {
        for db in [-60.0f32, -20.0, 0.0, 6.0] {
            let round_trip = linear_to_db(db_to_linear(db));
            assert!(
                (round_trip - db).abs() < 1e-4,
                "{db} dB came back as {round_trip} dB"
            );
        }
    }
}
