#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod buffer;
mod error;
mod performance;
mod renderer;

// public, flat re-exports
pub use buffer::AudioBuffer;
pub use error::Error;

pub use performance::{
    Performance, PerformanceOptions, PerformanceState, SharedParamName, SharedParamUpdate,
};
pub use renderer::{BufferTransition, OpacityTransition, WindowRect, WindowRenderer};

pub use synth::{
    message::{SynthHandle, SynthMessage},
    voice::GranularVoice,
    CrossfadeSynth, SynthControl, SynthOptions,
};
pub use window::{GrainWindow, TouchTarget, WindowParameters, WindowState};

pub use parameter::FloatParameter;
pub use source::{Source, SourceTime};

#[cfg(any(feature = "wav-output", feature = "cpal-output"))]
pub use output::OutputDevice;

// public mods
pub mod parameter;
pub mod scheduler;
pub mod source;
pub mod synth;
pub mod utils;
pub mod waveform;
pub mod window;

#[cfg(any(feature = "wav-output", feature = "cpal-output"))]
pub mod output;
