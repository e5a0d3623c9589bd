//! Filter implementations.

pub mod biquad;
