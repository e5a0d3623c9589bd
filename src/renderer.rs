//! View model of the player's canvas: waveform layers of the current and previous buffer, and the
//! grain window rectangle on top of them.
//!
//! Drawing itself is up to the caller. The renderer keeps track of what needs to be redrawn and
//! computes the geometry, while buffer changes are announced as [`BufferTransition`] events.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::{
    buffer::AudioBuffer,
    waveform::{waveform_from_buffer, WaveformPoint},
    window::WindowState,
};

// -------------------------------------------------------------------------------------------------

/// Vertical pixel offset of the window rectangle relative to the touch position.
const WINDOW_Y_OFFSET: f32 = 50.0;

// -------------------------------------------------------------------------------------------------

/// Buffer presence changes, sent to the repaint loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferTransition {
    /// The first buffer arrived after no buffer was present: fade in the window.
    Arrived { fade_duration: f64 },
    /// A buffer replaced a previous buffer: crossfade the waveform layers.
    Replaced { fade_duration: f64 },
    /// The buffer got removed: fade out the window and waveform.
    Cleared { fade_duration: f64 },
}

// -------------------------------------------------------------------------------------------------

/// Opacity of a waveform layer or the window, moving to its target within a given duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpacityTransition {
    pub target: f32,
    pub duration: f64,
}

impl OpacityTransition {
    const fn hidden() -> Self {
        Self {
            target: 0.0,
            duration: 0.0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// The grain window rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub alpha: f32,
}

// -------------------------------------------------------------------------------------------------

/// Renderer view model, which mirrors the synth's buffer and grain window.
pub struct WindowRenderer {
    sample_rate: u32,
    width: usize,
    height: usize,
    buffer: Option<AudioBuffer>,
    layer_index: usize,
    layer_opacity: [OpacityTransition; 2],
    window_layer_opacity: OpacityTransition,
    window_size: f64,
    window_position: f64,
    window_y: f32,
    window_opacity: f32,
    needs_waveform_update: bool,
    needs_window_update: bool,
    transition_sender: Sender<BufferTransition>,
    transition_receiver: Receiver<BufferTransition>,
}

impl WindowRenderer {
    /// Create a new renderer for a canvas of the given size. `sample_rate` is the rate window
    /// sizes and positions are specified in.
    pub fn new(sample_rate: u32, width: usize, height: usize) -> Self {
        let (transition_sender, transition_receiver) = unbounded();
        Self {
            sample_rate,
            width,
            height,
            buffer: None,
            layer_index: 0,
            layer_opacity: [OpacityTransition::hidden(); 2],
            window_layer_opacity: OpacityTransition::hidden(),
            window_size: 0.0,
            window_position: 0.0,
            window_y: 0.5,
            window_opacity: 0.5,
            needs_waveform_update: false,
            needs_window_update: false,
            transition_sender,
            transition_receiver,
        }
    }

    /// Receiver for buffer transition events.
    pub fn transitions(&self) -> Receiver<BufferTransition> {
        self.transition_receiver.clone()
    }

    /// The currently displayed buffer.
    pub fn buffer(&self) -> Option<&AudioBuffer> {
        self.buffer.as_ref()
    }

    /// Show a new buffer or remove the current one, crossfading the waveform layers within
    /// `fade_time + 1` seconds.
    pub fn set_buffer(&mut self, buffer: Option<AudioBuffer>, fade_time: f64) {
        let fade_duration = fade_time.max(0.0) + 1.0;
        let transition = match (&self.buffer, &buffer) {
            (None, Some(_)) => {
                self.window_layer_opacity = OpacityTransition {
                    target: 1.0,
                    duration: fade_duration,
                };
                BufferTransition::Arrived { fade_duration }
            }
            (Some(_), None) | (None, None) => {
                self.window_layer_opacity = OpacityTransition {
                    target: 0.0,
                    duration: fade_duration,
                };
                BufferTransition::Cleared { fade_duration }
            }
            (Some(_), Some(_)) => BufferTransition::Replaced { fade_duration },
        };
        self.buffer = buffer;

        self.layer_opacity[self.layer_index] = OpacityTransition {
            target: 0.0,
            duration: fade_duration,
        };
        self.layer_index = (self.layer_index + 1) % 2;
        self.layer_opacity[self.layer_index] = OpacityTransition {
            target: 1.0,
            duration: fade_duration,
        };
        self.needs_waveform_update = true;

        if let Err(err) = self.transition_sender.send(transition) {
            log::warn!("Failed to send buffer transition: {err}");
        }
    }

    /// Remove the current buffer.
    pub fn reset_buffer(&mut self, fade_time: f64) {
        self.set_buffer(None, fade_time);
    }

    /// Index of the waveform layer which shows the current buffer.
    pub fn active_layer(&self) -> usize {
        self.layer_index
    }

    /// Opacity transition of the given waveform layer.
    pub fn layer_opacity(&self, index: usize) -> OpacityTransition {
        self.layer_opacity[index]
    }

    /// Opacity transition of the window layer.
    pub fn window_layer_opacity(&self) -> OpacityTransition {
        self.window_layer_opacity
    }

    /// Window size in samples.
    pub fn window_size_samples(&self) -> f64 {
        self.window_size
    }
    pub fn set_window_size(&mut self, size_samples: f64) {
        self.window_size = size_samples;
        self.needs_window_update = true;
    }

    /// Window center position in samples.
    pub fn window_position_samples(&self) -> f64 {
        self.window_position
    }
    /// Normalized vertical window position.
    pub fn window_y(&self) -> f32 {
        self.window_y
    }
    pub fn set_window_position(&mut self, position_samples: f64, y: f32) {
        self.window_position = position_samples;
        self.window_y = y;
        self.needs_window_update = true;
    }

    /// Window opacity in range `0..=1`.
    pub fn window_opacity(&self) -> f32 {
        self.window_opacity
    }
    pub fn set_window_opacity(&mut self, opacity: f32) {
        self.window_opacity = opacity;
        self.needs_window_update = true;
    }

    /// Apply size, position and opacity of a derived window state at once.
    pub fn apply_window_state(&mut self, state: &WindowState) {
        self.set_window_size(state.size_samples);
        self.set_window_position(state.position_samples, state.vertical_offset);
        self.set_window_opacity(state.opacity);
    }

    /// Canvas size in pixels.
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }
    /// Set a new canvas size. Everything needs to be redrawn after resizing.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.needs_waveform_update = true;
        self.needs_window_update = true;
    }

    /// True when the active waveform layer needs to be redrawn.
    pub fn needs_waveform_update(&self) -> bool {
        self.needs_waveform_update
    }

    /// True when the window layer needs to be redrawn.
    pub fn needs_window_update(&self) -> bool {
        self.needs_window_update
    }

    /// Waveform points of the current buffer at canvas resolution. Clears the waveform update flag.
    pub fn waveform_points(&mut self) -> Vec<WaveformPoint> {
        self.needs_waveform_update = false;
        match &self.buffer {
            Some(buffer) => waveform_from_buffer(buffer, self.width),
            None => Vec::new(),
        }
    }

    /// Window rectangle in pixels, or `None` without buffer. Clears the window update flag.
    pub fn window_rect(&mut self) -> Option<WindowRect> {
        let buffer = self.buffer.as_ref()?;
        if self.width == 0 {
            return None;
        }
        self.needs_window_update = false;

        let width = self.width as f64;
        let height = self.height as f32;
        let samples_per_pixel = buffer.duration() * self.sample_rate as f64 / width;
        let window_width = self.window_size / samples_per_pixel;
        let x = self.window_position / samples_per_pixel - 0.5 * window_width;
        Some(WindowRect {
            x: x as f32,
            y: self.window_y * height - WINDOW_Y_OFFSET,
            width: window_width as f32,
            height,
            alpha: 0.5 * self.window_opacity,
        })
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(duration: f64) -> AudioBuffer {
        AudioBuffer::new(vec![0.25f32; (duration * 1000.0) as usize], 1000).unwrap()
    }

    #[test]
    fn buffer_transitions() {
        let mut renderer = WindowRenderer::new(1000, 100, 50);
        let transitions = renderer.transitions();

        renderer.set_buffer(Some(buffer(1.0)), 2.0);
        assert_eq!(
            transitions.try_recv(),
            Ok(BufferTransition::Arrived { fade_duration: 3.0 })
        );
        assert_eq!(renderer.window_layer_opacity().target, 1.0);
        assert_eq!(renderer.active_layer(), 1);
        assert_eq!(renderer.layer_opacity(1).target, 1.0);
        assert_eq!(renderer.layer_opacity(0).target, 0.0);
        assert!(renderer.needs_waveform_update());

        renderer.set_buffer(Some(buffer(2.0)), 2.0);
        assert_eq!(
            transitions.try_recv(),
            Ok(BufferTransition::Replaced { fade_duration: 3.0 })
        );
        assert_eq!(renderer.active_layer(), 0);
        assert_eq!(renderer.layer_opacity(0).target, 1.0);
        assert_eq!(renderer.layer_opacity(1).target, 0.0);

        renderer.reset_buffer(8.0);
        assert_eq!(
            transitions.try_recv(),
            Ok(BufferTransition::Cleared { fade_duration: 9.0 })
        );
        assert_eq!(renderer.window_layer_opacity().target, 0.0);
        assert!(renderer.buffer().is_none());
        assert!(renderer.window_rect().is_none());
        assert!(renderer.waveform_points().is_empty());
    }

    #[test]
    fn window_geometry() {
        let mut renderer = WindowRenderer::new(1000, 100, 50);
        renderer.set_buffer(Some(buffer(2.0)), 0.0);
        renderer.apply_window_state(&WindowState {
            size_samples: 400.0,
            position_samples: 1000.0,
            opacity: 0.8,
            vertical_offset: 0.5,
        });
        assert!(renderer.needs_window_update());

        // 2000 samples over 100 pixels
        let rect = renderer.window_rect().unwrap();
        assert!((rect.width - 20.0).abs() < 1e-4);
        assert!((rect.x - 40.0).abs() < 1e-4);
        assert!((rect.y - (25.0 - 50.0)).abs() < 1e-4);
        assert_eq!(rect.height, 50.0);
        assert!((rect.alpha - 0.4).abs() < 1e-6);
        assert!(!renderer.needs_window_update());

        renderer.resize(200, 100);
        assert!(renderer.needs_window_update() && renderer.needs_waveform_update());
        let rect = renderer.window_rect().unwrap();
        assert!((rect.width - 40.0).abs() < 1e-4);
        assert_eq!(renderer.waveform_points().len(), 200);
        assert!(!renderer.needs_waveform_update());
    }
}
