//! Derivation of the grain window, the buffer region grains are currently drawn from.
//!
//! The window is computed once, from the buffer duration and the requested grain parameters,
//! and then used by both the synth (grain duration, position variance, valid playback positions)
//! and the renderer (window size and position in samples), so what's displayed always matches
//! what is audible.

// -------------------------------------------------------------------------------------------------

/// Inputs of the grain window derivation. All values in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowParameters {
    /// Duration of the current buffer.
    pub buffer_duration: f64,
    /// Requested grain duration.
    pub grain_duration: f64,
    /// Requested grain position variance.
    pub position_var: f64,
    /// Smallest position variance the controller may send.
    pub min_position_var: f64,
}

// -------------------------------------------------------------------------------------------------

/// Grain window which got derived from [`WindowParameters`]. All values in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainWindow {
    /// Grain duration, limited to fit into the buffer.
    pub grain_duration: f64,
    /// Position variance, limited to fit into the buffer.
    pub position_var: f64,
    /// Total duration of the window: `grain_duration + 2 * position_var`.
    pub window_duration: f64,
    /// Smallest valid playback position.
    pub min_position: f64,
    /// Largest valid playback position.
    pub max_position: f64,
}

impl GrainWindow {
    /// Derive the grain window from the given parameters.
    ///
    /// Grain durations are limited so that the smallest position variance still fits into the
    /// buffer, and the position variance is limited to the remaining space. Negative inputs are
    /// treated as 0.
    pub fn derive(parameters: &WindowParameters) -> Self {
        let buffer_duration = parameters.buffer_duration.max(0.0);
        let min_position_var = parameters.min_position_var.max(0.0);

        let max_duration = buffer_duration - 2.0 * min_position_var;
        let grain_duration = parameters.grain_duration.min(max_duration).max(0.0);
        let max_position_var = 0.5 * (buffer_duration - grain_duration);
        let position_var = parameters.position_var.min(max_position_var).max(0.0);

        let window_duration = grain_duration + 2.0 * position_var;
        let margin = 0.5 * window_duration;
        Self {
            grain_duration,
            position_var,
            window_duration,
            min_position: margin,
            max_position: buffer_duration - margin,
        }
    }

    /// Window size in samples for the given sample rate.
    pub fn size_samples(&self, sample_rate: u32) -> f64 {
        self.window_duration * sample_rate as f64
    }

    /// Clamp the given playback position into the valid position range. When the window is
    /// larger than the buffer, the center of the valid range is returned.
    pub fn clamp_position(&self, position: f64) -> f64 {
        if self.min_position > self.max_position {
            0.5 * (self.min_position + self.max_position)
        } else if position.is_nan() {
            self.min_position
        } else {
            position.clamp(self.min_position, self.max_position)
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Synth and renderer targets of a single touch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchTarget {
    /// Playback position in seconds, clamped into the grain window's valid range.
    pub position: f64,
    /// Normalized low-pass cutoff factor in range `0..=1`.
    pub cutoff_factor: f32,
    /// Normalized vertical touch coordinate.
    pub y: f32,
}

impl TouchTarget {
    /// Map a normalized touch coordinate to a playback position and cutoff factor.
    ///
    /// The horizontal coordinate scrubs through the buffer. The vertical one controls the cutoff:
    /// the filter opens from the bottom and is fully open in the upper half of the surface.
    pub fn from_touch(window: &GrainWindow, buffer_duration: f64, x: f32, y: f32) -> Self {
        let position = window.clamp_position(x as f64 * buffer_duration);
        let cutoff_factor = if y.is_nan() {
            1.0
        } else {
            (1.5 - y).clamp(0.0, 1.0)
        };
        Self {
            position,
            cutoff_factor,
            y,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Renderer facing projection of a grain window and touch. Sizes and positions in samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowState {
    pub size_samples: f64,
    pub position_samples: f64,
    pub opacity: f32,
    pub vertical_offset: f32,
}

impl WindowState {
    pub fn derive(window: &GrainWindow, touch: &TouchTarget, sample_rate: u32) -> Self {
        Self {
            size_samples: window.size_samples(sample_rate),
            position_samples: touch.position * sample_rate as f64,
            opacity: touch.cutoff_factor,
            vertical_offset: touch.y,
        }
    }
}

// -------------------------------------------------------------------------------------------------
