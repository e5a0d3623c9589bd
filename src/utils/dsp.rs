//! Common DSP building blocks.

pub mod filters;
