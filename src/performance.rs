//! Device side lifecycle of a performance: shared parameters, recordings and touches in,
//! synth and renderer updates out.

use std::str::FromStr;

use crate::{
    buffer::AudioBuffer,
    parameter,
    renderer::WindowRenderer,
    synth::{SynthControl, DEFAULT_FADE_TIME},
    utils::db_to_linear,
    window::{GrainWindow, TouchTarget, WindowParameters, WindowState},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Lifecycle states, as broadcast by the controller.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
)]
#[strum(serialize_all = "lowercase")]
pub enum PerformanceState {
    /// Connected, waiting for the performance to start.
    Wait,
    /// Listening for recordings, the first one starts the sound.
    #[strum(to_string = "starting", serialize = "start")]
    Starting,
    /// Playing recordings.
    Playing,
    /// Fading out and tearing down.
    End,
}

// -------------------------------------------------------------------------------------------------

/// Names of the parameters the controller shares with all devices.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
)]
#[strum(serialize_all = "camelCase")]
pub enum SharedParamName {
    Period,
    Duration,
    PositionVar,
    ResamplingVar,
    Gain,
    State,
}

// -------------------------------------------------------------------------------------------------

/// A single shared parameter update from the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SharedParamUpdate {
    /// Grain period in seconds.
    Period(f64),
    /// Requested grain duration in seconds.
    Duration(f64),
    /// Requested grain position variance in seconds.
    PositionVar(f64),
    /// Grain resampling variance.
    ResamplingVar(f64),
    /// Output gain in dB.
    Gain(f32),
    /// Lifecycle state.
    State(PerformanceState),
}

impl SharedParamUpdate {
    /// Parse an update from the controller's parameter name and textual value. Numeric values
    /// are clamped to the ranges of the [`parameter`] descriptors.
    pub fn parse(name: &str, value: &str) -> Result<Self, Error> {
        let name = SharedParamName::from_str(name)
            .map_err(|_| Error::ParameterError(format!("Unknown shared parameter '{name}'")))?;
        let number = || -> Result<f32, Error> {
            let descriptor = parameter::shared_parameter(&name.to_string()).ok_or_else(|| {
                Error::ParameterError(format!("Missing descriptor for parameter '{name}'"))
            })?;
            descriptor.string_to_value(value).ok_or_else(|| {
                Error::ParameterError(format!("Invalid value '{value}' for parameter '{name}'"))
            })
        };
        Ok(match name {
            SharedParamName::Period => Self::Period(number()? as f64),
            SharedParamName::Duration => Self::Duration(number()? as f64),
            SharedParamName::PositionVar => Self::PositionVar(number()? as f64),
            SharedParamName::ResamplingVar => Self::ResamplingVar(number()? as f64),
            SharedParamName::Gain => Self::Gain(number()?),
            SharedParamName::State => {
                let state = PerformanceState::from_str(value.trim()).map_err(|_| {
                    Error::ParameterError(format!("Invalid performance state '{value}'"))
                })?;
                Self::State(state)
            }
        })
    }

    /// The update's parameter name.
    pub fn name(&self) -> SharedParamName {
        match self {
            Self::Period(_) => SharedParamName::Period,
            Self::Duration(_) => SharedParamName::Duration,
            Self::PositionVar(_) => SharedParamName::PositionVar,
            Self::ResamplingVar(_) => SharedParamName::ResamplingVar,
            Self::Gain(_) => SharedParamName::Gain,
            Self::State(_) => SharedParamName::State,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Options to create a [`Performance`].
#[derive(Debug, Clone, Copy)]
pub struct PerformanceOptions {
    /// Sample rate window sizes and positions are expressed in. By default 44100.
    pub sample_rate: u32,
    /// Crossfade time in seconds when a new recording arrives. By default 2.
    pub fade_time: f64,
    /// Fade out time in seconds at the end of the performance. By default 8.
    pub release_time: f64,
    /// Smallest position variance the controller sends. By default 0.005.
    pub min_position_var: f64,
    /// Assumed buffer duration in seconds until the first recording arrives. By default 2.
    pub buffer_duration: f64,
    /// Grain duration in seconds until the controller sends one. By default 0.1.
    pub grain_duration: f64,
    /// Position variance in seconds until the controller sends one. By default 0.005.
    pub position_var: f64,
    /// Index of this device in the session. By default 0.
    pub client_index: usize,
    /// Number of recording groups. By default 1.
    pub record_count: usize,
    /// Renderer canvas size in pixels. By default 1024 x 768.
    pub canvas_size: (usize, usize),
}

impl Default for PerformanceOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            fade_time: DEFAULT_FADE_TIME,
            release_time: 8.0,
            min_position_var: 0.005,
            buffer_duration: 2.0,
            grain_duration: 0.1,
            position_var: 0.005,
            client_index: 0,
            record_count: 1,
            canvas_size: (1024, 768),
        }
    }
}

impl PerformanceOptions {
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn fade_time(mut self, fade_time: f64) -> Self {
        self.fade_time = fade_time;
        self
    }

    pub fn release_time(mut self, release_time: f64) -> Self {
        self.release_time = release_time;
        self
    }

    pub fn client_index(mut self, client_index: usize) -> Self {
        self.client_index = client_index;
        self
    }

    pub fn record_count(mut self, record_count: usize) -> Self {
        self.record_count = record_count;
        self
    }

    pub fn canvas_size(mut self, width: usize, height: usize) -> Self {
        self.canvas_size = (width, height);
        self
    }

    /// Validate all options. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_rate == 0 {
            return Err(Error::ParameterError(
                "performance options 'sample_rate' must be > 0".to_string(),
            ));
        }
        if self.record_count == 0 {
            return Err(Error::ParameterError(
                "performance options 'record_count' must be > 0".to_string(),
            ));
        }
        for (name, value) in [
            ("fade_time", self.fade_time),
            ("release_time", self.release_time),
            ("min_position_var", self.min_position_var),
            ("buffer_duration", self.buffer_duration),
        ] {
            if value < 0.0 || value.is_nan() {
                return Err(Error::ParameterError(format!(
                    "performance options '{name}' value is '{value}'"
                )));
            }
        }
        Ok(())
    }

    /// Recording group of this device.
    pub fn phase(&self) -> usize {
        self.client_index % self.record_count.max(1)
    }
}

// -------------------------------------------------------------------------------------------------

/// Controls a synth and renderer through the lifecycle of a performance.
///
/// All inputs arrive from the control thread: shared parameter updates and recordings from the
/// session, touches from the touch surface. The grain window is derived once per change and
/// then applied to the synth and the renderer, so both always agree on what's audible.
///
/// Only one touch is followed at a time: touches with other ids are ignored until the tracked
/// touch ended.
pub struct Performance<S: SynthControl> {
    options: PerformanceOptions,
    synth: S,
    renderer: WindowRenderer,
    state: Option<PerformanceState>,
    view_state: Option<PerformanceState>,
    listening: bool,
    buffer_duration: f64,
    grain_duration: f64,
    position_var: f64,
    window: GrainWindow,
    target: TouchTarget,
    has_recording: bool,
    touch_id: Option<u64>,
    end_countdown: Option<f64>,
}

impl<S: SynthControl> Performance<S> {
    /// Create a new performance which controls the given synth.
    pub fn new(synth: S, options: PerformanceOptions) -> Result<Self, Error> {
        options.validate()?;
        let (width, height) = options.canvas_size;
        let renderer = WindowRenderer::new(options.sample_rate, width, height);
        let window = GrainWindow::derive(&WindowParameters {
            buffer_duration: options.buffer_duration,
            grain_duration: options.grain_duration,
            position_var: options.position_var,
            min_position_var: options.min_position_var,
        });
        let target = TouchTarget::from_touch(&window, options.buffer_duration, 0.5, 0.5);
        let mut performance = Self {
            options,
            synth,
            renderer,
            state: None,
            view_state: None,
            listening: false,
            buffer_duration: options.buffer_duration,
            grain_duration: options.grain_duration,
            position_var: options.position_var,
            window,
            target,
            has_recording: false,
            touch_id: None,
            end_countdown: None,
        };
        performance.update_window()?;
        performance.set_touch(0.5, 0.5)?;
        Ok(performance)
    }

    /// The performance's options.
    pub fn options(&self) -> &PerformanceOptions {
        &self.options
    }

    /// Last state received from the controller.
    pub fn state(&self) -> Option<PerformanceState> {
        self.state
    }

    /// State which is currently shown to the audience. Switches to `End` only after the release.
    pub fn view_state(&self) -> Option<PerformanceState> {
        self.view_state
    }

    /// True when recordings are accepted.
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Recording group of this device.
    pub fn phase(&self) -> usize {
        self.options.phase()
    }

    /// Duration of the last accepted recording.
    pub fn buffer_duration(&self) -> f64 {
        self.buffer_duration
    }

    /// Currently applied grain window.
    pub fn window(&self) -> &GrainWindow {
        &self.window
    }

    /// Id of the currently tracked touch.
    pub fn touch_id(&self) -> Option<u64> {
        self.touch_id
    }

    pub fn synth(&self) -> &S {
        &self.synth
    }
    pub fn synth_mut(&mut self) -> &mut S {
        &mut self.synth
    }

    pub fn renderer(&self) -> &WindowRenderer {
        &self.renderer
    }
    pub fn renderer_mut(&mut self) -> &mut WindowRenderer {
        &mut self.renderer
    }

    /// Apply a shared parameter update from the controller.
    pub fn handle_param(&mut self, update: SharedParamUpdate) -> Result<(), Error> {
        log::debug!("Shared parameter update: {update:?}");
        let result = match update {
            SharedParamUpdate::Period(period) => self.synth.set_period(period),
            SharedParamUpdate::Duration(duration) => {
                self.grain_duration = duration;
                self.update_window()
            }
            SharedParamUpdate::PositionVar(position_var) => {
                self.position_var = position_var;
                self.update_window()
            }
            SharedParamUpdate::ResamplingVar(resampling_var) => {
                self.synth.set_resampling_var(resampling_var)
            }
            SharedParamUpdate::Gain(gain_db) => self.synth.set_gain(db_to_linear(gain_db)),
            SharedParamUpdate::State(state) => self.enter_state(state),
        };
        result.inspect_err(|err| log::warn!("Failed to apply '{}': {err}", update.name()))
    }

    /// Parse and apply a shared parameter update from the controller.
    pub fn handle_param_str(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let update = SharedParamUpdate::parse(name, value)
            .inspect_err(|err| log::warn!("Ignoring shared parameter update: {err}"))?;
        self.handle_param(update)
    }

    /// Handle a recording of the given recording group. Returns false when the recording got
    /// ignored, because no recordings are accepted in the current state or it belongs to another
    /// group.
    pub fn handle_buffer(&mut self, buffer: AudioBuffer, phase: usize) -> Result<bool, Error> {
        if !self.listening {
            log::debug!("Ignoring recording: not listening");
            return Ok(false);
        }
        if phase != self.phase() {
            log::debug!("Ignoring recording of group {phase}");
            return Ok(false);
        }
        log::info!(
            "Playing new recording of group {phase} ({:.2}s)",
            buffer.duration()
        );
        let fade_time = self.options.fade_time;
        self.buffer_duration = buffer.duration();
        self.synth
            .replace_buffer(buffer.clone(), fade_time)
            .inspect_err(|err| log::warn!("Failed to replace synth buffer: {err}"))?;
        self.renderer.set_buffer(Some(buffer), fade_time);
        self.update_window()?;
        // the synth starts the first recording in its middle and continues later ones at the
        // previous voice's position, which only gets pushed when it's out of the new window
        let position = if self.has_recording {
            self.target.position
        } else {
            0.5 * self.buffer_duration
        };
        self.has_recording = true;
        self.target.position = self.window.clamp_position(position);
        if self.target.position != position {
            self.synth.set_position(self.target.position)?;
        }
        self.apply_window_state();
        if !self.synth.is_playing() {
            self.synth.start()?;
        }
        self.view_state = Some(PerformanceState::Playing);
        Ok(true)
    }

    /// Advance the performance's timers by the given number of seconds.
    pub fn advance(&mut self, delta: f64) -> Result<(), Error> {
        if let Some(remaining) = self.end_countdown {
            let remaining = remaining - delta;
            if remaining > 0.0 {
                self.end_countdown = Some(remaining);
            } else {
                self.end_countdown = None;
                log::info!("Performance ended");
                self.view_state = Some(PerformanceState::End);
                self.has_recording = false;
                self.synth.teardown()?;
            }
        }
        Ok(())
    }

    /// Start tracking a touch, unless another touch is tracked already.
    pub fn touch_start(&mut self, id: u64, x: f32, y: f32) -> Result<(), Error> {
        if self.touch_id.is_none() {
            self.touch_id = Some(id);
            self.set_touch(x, y)?;
        }
        Ok(())
    }

    /// Move the tracked touch. Other touches are ignored.
    pub fn touch_move(&mut self, id: u64, x: f32, y: f32) -> Result<(), Error> {
        if self.touch_id == Some(id) {
            self.set_touch(x, y)?;
        }
        Ok(())
    }

    /// Release the tracked touch. Other touches are ignored.
    pub fn touch_end(&mut self, id: u64) {
        if self.touch_id == Some(id) {
            self.touch_id = None;
        }
    }

    /// Apply a normalized touch position to the synth and renderer.
    pub fn set_touch(&mut self, x: f32, y: f32) -> Result<(), Error> {
        self.target = TouchTarget::from_touch(&self.window, self.buffer_duration, x, y);
        self.apply_window_state();
        self.synth.set_position(self.target.position)?;
        self.synth.set_cutoff_factor(self.target.cutoff_factor)
    }

    fn apply_window_state(&mut self) {
        let state = WindowState::derive(&self.window, &self.target, self.options.sample_rate);
        self.renderer.apply_window_state(&state);
    }

    fn enter_state(&mut self, state: PerformanceState) -> Result<(), Error> {
        log::info!("Entering performance state '{state}'");
        self.state = Some(state);
        match state {
            PerformanceState::Wait => self.wait_state(),
            PerformanceState::Starting => self.start_state(),
            PerformanceState::Playing => self.playing_state(),
            PerformanceState::End => self.end_state(),
        }
    }

    fn wait_state(&mut self) -> Result<(), Error> {
        self.view_state = Some(PerformanceState::Wait);
        Ok(())
    }

    fn start_state(&mut self) -> Result<(), Error> {
        self.listening = true;
        self.view_state = Some(PerformanceState::Starting);
        Ok(())
    }

    fn playing_state(&mut self) -> Result<(), Error> {
        self.listening = true;
        self.view_state = Some(PerformanceState::Playing);
        Ok(())
    }

    fn end_state(&mut self) -> Result<(), Error> {
        let release_time = self.options.release_time;
        self.listening = false;
        self.end_countdown = Some(release_time + 2.0);
        self.renderer.reset_buffer(release_time);
        self.synth.stop(release_time)
    }

    fn update_window(&mut self) -> Result<(), Error> {
        self.window = GrainWindow::derive(&WindowParameters {
            buffer_duration: self.buffer_duration,
            grain_duration: self.grain_duration,
            position_var: self.position_var,
            min_position_var: self.options.min_position_var,
        });
        self.renderer
            .set_window_size(self.window.size_samples(self.options.sample_rate));
        self.synth.set_grain_duration(self.window.grain_duration)?;
        self.synth.set_position_var(self.window.position_var)
    }
}

// -------------------------------------------------------------------------------------------------
