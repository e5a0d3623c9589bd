//! Two-voice granular synth, which crossfades between buffers.

pub mod cutoff;
pub mod grains;
pub mod message;
pub mod voice;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam_queue::ArrayQueue;

use crate::{
    buffer::AudioBuffer,
    scheduler::Scheduler,
    source::{Source, SourceTime},
    utils::{
        buffer::{clear_buffer, mono_to_interleaved},
        smoothed::{apply_smoothed_gain, ExponentialSmoothedValue, SmoothedValue},
    },
    Error,
};

use cutoff::CutoffFilter;
use grains::GrainPool;
use message::{SynthHandle, SynthMessage};
use voice::{GranularVoice, MAX_GRAIN_DURATION, MIN_PERIOD};

// -------------------------------------------------------------------------------------------------

/// Number of voices a synth alternates between.
pub const VOICE_COUNT: usize = 2;

/// Max number of frames processed at once. Voices are advanced with this granularity.
pub const MAX_BLOCK_FRAMES: usize = 256;

/// Default crossfade time in seconds for buffer replacements.
pub const DEFAULT_FADE_TIME: f64 = 2.0;

/// Number of grain slots which fit all grains of both voices at the shortest period and longest
/// grain duration, with grains slowed down to half of their original speed.
pub const DEFAULT_GRAIN_POOL_SIZE: usize =
    VOICE_COUNT * (2 * (MAX_GRAIN_DURATION / MIN_PERIOD) as usize + 2);

// -------------------------------------------------------------------------------------------------

/// Options to create a [`CrossfadeSynth`].
#[derive(Debug, Clone, Copy)]
pub struct SynthOptions {
    /// Output sample rate. By default 44100.
    pub sample_rate: u32,
    /// Output channel layout. The mono synth signal gets copied into all channels. By default 2.
    pub channel_count: usize,
    /// Max number of simultaneously playing grains. By default [`DEFAULT_GRAIN_POOL_SIZE`].
    pub grain_pool_size: usize,
    /// Max number of pending control messages. By default 256.
    pub message_queue_size: usize,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channel_count: 2,
            grain_pool_size: DEFAULT_GRAIN_POOL_SIZE,
            message_queue_size: 256,
        }
    }
}

impl SynthOptions {
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn channel_count(mut self, channel_count: usize) -> Self {
        self.channel_count = channel_count;
        self
    }

    pub fn grain_pool_size(mut self, grain_pool_size: usize) -> Self {
        self.grain_pool_size = grain_pool_size;
        self
    }

    pub fn message_queue_size(mut self, message_queue_size: usize) -> Self {
        self.message_queue_size = message_queue_size;
        self
    }

    /// Validate all options. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_rate == 0 {
            return Err(Error::ParameterError(
                "synth options 'sample_rate' must be > 0".to_string(),
            ));
        }
        if self.channel_count == 0 {
            return Err(Error::ParameterError(
                "synth options 'channel_count' must be > 0".to_string(),
            ));
        }
        if self.grain_pool_size == 0 {
            return Err(Error::ParameterError(
                "synth options 'grain_pool_size' must be > 0".to_string(),
            ));
        }
        if self.message_queue_size == 0 {
            return Err(Error::ParameterError(
                "synth options 'message_queue_size' must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Control surface of a granular crossfade synth.
///
/// Implemented by [`CrossfadeSynth`] for direct, single threaded use, and by [`SynthHandle`]
/// to control a synth which is running in the audio thread. Direct calls never fail.
pub trait SynthControl {
    /// True after `start` and until `stop`. Does not reflect the tail of a fade-out.
    fn is_playing(&self) -> bool;

    /// Mark the synth as playing. Gains are not touched: sound starts with the next buffer.
    fn start(&mut self) -> Result<(), Error>;
    /// Fade out the active voice and mark the synth as stopped.
    fn stop(&mut self, fade_time: f64) -> Result<(), Error>;
    /// Crossfade from the active voice to the other voice, which plays the given buffer.
    fn replace_buffer(&mut self, buffer: AudioBuffer, fade_time: f64) -> Result<(), Error>;
    /// Unbind all buffers and silence all voices immediately.
    fn teardown(&mut self) -> Result<(), Error>;

    /// Set the normalized low-pass cutoff in range `0..=1`.
    fn set_cutoff_factor(&mut self, factor: f32) -> Result<(), Error>;
    /// Set the linear output gain.
    fn set_gain(&mut self, gain: f32) -> Result<(), Error>;
    /// Set the grain period in seconds of both voices.
    fn set_period(&mut self, period: f64) -> Result<(), Error>;
    /// Set the grain duration in seconds of both voices.
    fn set_grain_duration(&mut self, duration: f64) -> Result<(), Error>;
    /// Set the grain position variance in seconds of both voices.
    fn set_position_var(&mut self, position_var: f64) -> Result<(), Error>;
    /// Set the grain resampling variance of both voices.
    fn set_resampling_var(&mut self, resampling_var: f64) -> Result<(), Error>;
    /// Set the playback position in seconds of the active voice.
    fn set_position(&mut self, position: f64) -> Result<(), Error>;
}

// -------------------------------------------------------------------------------------------------

/// Granular synth with two voices in strict alternation.
///
/// Each [`CrossfadeSynth::replace_buffer`] call flips the active voice: the previously active
/// voice fades out with its old buffer, while the new active voice fades in with the new one.
/// Grain parameters are applied to both voices, so the inactive voice is always ready to take
/// over. The playback position only applies to the active voice.
///
/// The synth is a [`Source`]: it renders grains of both voices, filters them with a shared
/// [`CutoffFilter`] and applies the output gain. Use [`CrossfadeSynth::handle`] to control a
/// synth which got moved into an audio output.
pub struct CrossfadeSynth {
    options: SynthOptions,
    voices: [GranularVoice; VOICE_COUNT],
    active_index: usize,
    scheduler: Scheduler,
    grain_pool: GrainPool,
    cutoff: CutoffFilter,
    gain: ExponentialSmoothedValue,
    is_playing: Arc<AtomicBool>,
    message_queue: Arc<ArrayQueue<SynthMessage>>,
    current_time: f64,
    mono_buffer: Vec<f32>,
}

impl CrossfadeSynth {
    /// Create a new, silent synth with the given options.
    pub fn new(options: SynthOptions) -> Result<Self, Error> {
        options.validate()?;
        let voices = [GranularVoice::new(), GranularVoice::new()];
        Self::with_voices(options, voices)
    }

    /// Create a new, silent synth with the given preconfigured voices, e.g. voices with seeded
    /// random number generators. Buffers and gains of the voices are reset.
    pub fn with_voices(
        options: SynthOptions,
        mut voices: [GranularVoice; VOICE_COUNT],
    ) -> Result<Self, Error> {
        options.validate()?;
        for voice in &mut voices {
            voice.reset();
        }
        let scheduler = Scheduler::with_capacity(VOICE_COUNT);
        let grain_pool = GrainPool::new(options.grain_pool_size, options.sample_rate);
        let cutoff = CutoffFilter::new(options.sample_rate)?;
        let gain = ExponentialSmoothedValue::new(1.0, options.sample_rate);
        let is_playing = Arc::new(AtomicBool::new(false));
        let message_queue = Arc::new(ArrayQueue::new(options.message_queue_size));
        let mono_buffer = vec![0.0; MAX_BLOCK_FRAMES];
        Ok(Self {
            options,
            voices,
            active_index: 0,
            scheduler,
            grain_pool,
            cutoff,
            gain,
            is_playing,
            message_queue,
            current_time: 0.0,
            mono_buffer,
        })
    }

    /// Create a handle to control this synth from another thread.
    pub fn handle(&self) -> SynthHandle {
        SynthHandle::new(Arc::clone(&self.message_queue), Arc::clone(&self.is_playing))
    }

    /// The synth's options.
    pub fn options(&self) -> &SynthOptions {
        &self.options
    }

    /// Index of the currently active voice.
    pub fn active_index(&self) -> usize {
        self.active_index
    }

    /// Access to the voice at the given index.
    pub fn voice(&self, index: usize) -> &GranularVoice {
        &self.voices[index]
    }

    /// Access to the currently active voice.
    pub fn active_voice(&self) -> &GranularVoice {
        &self.voices[self.active_index]
    }

    /// True when the voice at the given index got registered with the scheduler.
    pub fn is_scheduled(&self, index: usize) -> bool {
        self.scheduler.has(index)
    }

    /// True when the voice at the given index is registered but has no next tick.
    pub fn is_parked(&self, index: usize) -> bool {
        self.scheduler.has(index) && self.scheduler.next_time_of(index).is_none()
    }

    /// Audio time in seconds of the last processed block end.
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Target cutoff factor.
    pub fn cutoff_factor(&self) -> f32 {
        self.cutoff.factor()
    }

    /// Target cutoff frequency in Hz.
    pub fn cutoff_frequency(&self) -> f32 {
        self.cutoff.frequency()
    }

    /// Target linear output gain.
    pub fn gain(&self) -> f32 {
        self.gain.target()
    }

    /// Number of currently playing or pending grains.
    pub fn active_grain_count(&self) -> usize {
        self.grain_pool.active_grain_count()
    }

    /// Number of grains which got dropped because the grain pool was exhausted.
    pub fn dropped_grain_count(&self) -> usize {
        self.grain_pool.dropped_grain_count()
    }

    /// Apply all pending messages from [`SynthHandle`]s. Called by the synth itself before
    /// rendering each audio buffer.
    pub fn process_messages(&mut self) {
        while let Some(message) = self.message_queue.pop() {
            self.apply_message(message);
        }
    }

    fn apply_message(&mut self, message: SynthMessage) {
        match message {
            SynthMessage::Start => self.start_playing(),
            SynthMessage::Stop { fade_time } => self.stop_playing(fade_time),
            SynthMessage::ReplaceBuffer { buffer, fade_time } => {
                self.crossfade_to(buffer, fade_time)
            }
            SynthMessage::Teardown => self.tear_down(),
            SynthMessage::SetCutoffFactor(factor) => self.cutoff.set_factor(factor),
            SynthMessage::SetGain(gain) => self.apply_gain(gain),
            SynthMessage::SetPeriod(period) => {
                self.voices.iter_mut().for_each(|v| v.set_period(period))
            }
            SynthMessage::SetGrainDuration(duration) => {
                self.voices.iter_mut().for_each(|v| v.set_duration(duration))
            }
            SynthMessage::SetPositionVar(position_var) => self
                .voices
                .iter_mut()
                .for_each(|v| v.set_position_var(position_var)),
            SynthMessage::SetResamplingVar(resampling_var) => self
                .voices
                .iter_mut()
                .for_each(|v| v.set_resampling_var(resampling_var)),
            SynthMessage::SetPosition(position) => self.apply_position(position),
        }
    }

    fn start_playing(&mut self) {
        self.is_playing.store(true, Ordering::Relaxed);
    }

    fn stop_playing(&mut self, fade_time: f64) {
        self.voices[self.active_index].fade_out(fade_time);
        self.is_playing.store(false, Ordering::Relaxed);
    }

    fn crossfade_to(&mut self, buffer: AudioBuffer, fade_time: f64) {
        let prev_index = self.active_index;
        let next_index = (prev_index + 1) % VOICE_COUNT;
        self.active_index = next_index;

        self.voices[prev_index].fade_out(fade_time);
        let prev_position = self.voices[prev_index].position();

        // the very first buffer starts playing in its middle, later ones continue where
        // the previous voice was playing
        let first_buffer = self.scheduler.is_empty();
        let buffer_duration = buffer.duration();

        let next = &mut self.voices[next_index];
        next.set_buffer(Some(buffer));
        if first_buffer {
            next.set_position(0.5 * buffer_duration);
        } else {
            next.set_position(prev_position);
        }
        next.fade_in(fade_time);

        if self.scheduler.has(next_index) {
            self.scheduler.rearm(next_index, self.current_time);
        } else {
            self.scheduler.add(next_index, self.current_time);
        }
    }

    fn tear_down(&mut self) {
        for voice in &mut self.voices {
            voice.reset();
        }
        self.scheduler.clear();
        self.grain_pool.reset();
        self.cutoff.reset();
        self.is_playing.store(false, Ordering::Relaxed);
    }

    fn apply_gain(&mut self, gain: f32) {
        if !gain.is_nan() {
            self.gain.set_target(gain.max(0.0));
        }
    }

    fn apply_position(&mut self, position: f64) {
        let voice = &mut self.voices[self.active_index];
        if voice.buffer().is_some() {
            voice.set_position(position);
        }
    }

    fn advance_voices(&mut self, end_time: f64) {
        self.scheduler.advance_until(end_time, |index, time| {
            self.voices[index].advance(time, &mut self.grain_pool)
        });
    }
}

impl SynthControl for CrossfadeSynth {
    fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Relaxed)
    }

    fn start(&mut self) -> Result<(), Error> {
        self.start_playing();
        Ok(())
    }

    fn stop(&mut self, fade_time: f64) -> Result<(), Error> {
        self.stop_playing(fade_time);
        Ok(())
    }

    fn replace_buffer(&mut self, buffer: AudioBuffer, fade_time: f64) -> Result<(), Error> {
        self.crossfade_to(buffer, fade_time);
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), Error> {
        self.tear_down();
        Ok(())
    }

    fn set_cutoff_factor(&mut self, factor: f32) -> Result<(), Error> {
        self.apply_message(SynthMessage::SetCutoffFactor(factor));
        Ok(())
    }

    fn set_gain(&mut self, gain: f32) -> Result<(), Error> {
        self.apply_gain(gain);
        Ok(())
    }

    fn set_period(&mut self, period: f64) -> Result<(), Error> {
        self.apply_message(SynthMessage::SetPeriod(period));
        Ok(())
    }

    fn set_grain_duration(&mut self, duration: f64) -> Result<(), Error> {
        self.apply_message(SynthMessage::SetGrainDuration(duration));
        Ok(())
    }

    fn set_position_var(&mut self, position_var: f64) -> Result<(), Error> {
        self.apply_message(SynthMessage::SetPositionVar(position_var));
        Ok(())
    }

    fn set_resampling_var(&mut self, resampling_var: f64) -> Result<(), Error> {
        self.apply_message(SynthMessage::SetResamplingVar(resampling_var));
        Ok(())
    }

    fn set_position(&mut self, position: f64) -> Result<(), Error> {
        self.apply_position(position);
        Ok(())
    }
}

impl Source for CrossfadeSynth {
    fn write(&mut self, output: &mut [f32], time: &SourceTime) -> usize {
        self.process_messages();

        let channel_count = self.options.channel_count;
        let sample_rate = self.options.sample_rate as f64;
        let mut frame = time.pos_in_frames;
        for chunk in output.chunks_mut(MAX_BLOCK_FRAMES * channel_count) {
            let frame_count = chunk.len() / channel_count;
            self.current_time = frame as f64 / sample_rate;
            let end_time = (frame + frame_count as u64) as f64 / sample_rate;
            self.advance_voices(end_time);

            let mono = &mut self.mono_buffer[..frame_count];
            clear_buffer(mono);
            self.grain_pool.process(mono, frame);
            self.cutoff.process(mono);
            apply_smoothed_gain(mono, &mut self.gain);
            mono_to_interleaved(mono, chunk, channel_count);

            frame += frame_count as u64;
        }
        self.current_time = frame as f64 / sample_rate;
        output.len()
    }

    fn channel_count(&self) -> usize {
        self.options.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.options.sample_rate
    }

    fn is_exhausted(&self) -> bool {
        false
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;

    fn synth() -> CrossfadeSynth {
        let voices = [
            GranularVoice::with_rng(SmallRng::seed_from_u64(1)),
            GranularVoice::with_rng(SmallRng::seed_from_u64(2)),
        ];
        CrossfadeSynth::with_voices(SynthOptions::default().channel_count(1), voices).unwrap()
    }

    fn noise(duration: f64) -> AudioBuffer {
        AudioBuffer::white_noise_with_rng(duration, 44100, &mut SmallRng::seed_from_u64(3)).unwrap()
    }

    fn render(synth: &mut CrossfadeSynth, seconds: f64) -> Vec<f32> {
        let frame_count = (seconds * synth.sample_rate() as f64) as usize;
        let mut output = vec![0.0; frame_count * synth.channel_count()];
        let frame = (synth.current_time() * synth.sample_rate() as f64).round() as u64;
        let time = SourceTime::new(frame);
        synth.write(&mut output, &time);
        output
    }

    fn rms(buffer: &[f32]) -> f32 {
        (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
    }

    #[test]
    fn replace_buffer_rotates_voices() {
        let mut synth = synth();
        assert_eq!(synth.active_index(), 0);

        synth.replace_buffer(noise(4.0), 2.0).unwrap();
        assert_eq!(synth.active_index(), 1);
        assert_eq!(synth.voice(1).target_gain(), 1.0);
        assert_eq!(synth.voice(0).target_gain(), 0.0);
        assert!(synth.is_scheduled(1));
        assert!(!synth.is_scheduled(0));

        for _ in 0..5 {
            synth.replace_buffer(noise(1.0), 2.0).unwrap();
            let active = synth.active_index();
            assert_eq!(synth.voice(active).target_gain(), 1.0);
            assert_eq!(synth.voice(1 - active).target_gain(), 0.0);
            assert_eq!(
                synth
                    .voices
                    .iter()
                    .filter(|v| v.target_gain() == 1.0)
                    .count(),
                1
            );
        }
        assert!(synth.is_scheduled(0) && synth.is_scheduled(1));
    }

    #[test]
    fn position_continuity() {
        let mut synth = synth();
        synth.replace_buffer(noise(4.0), 2.0).unwrap();
        assert_eq!(synth.active_voice().position(), 2.0);

        synth.set_position(1.25).unwrap();
        synth.replace_buffer(noise(3.0), 2.0).unwrap();
        assert_eq!(synth.active_index(), 0);
        assert_eq!(synth.active_voice().position(), 1.25);

        // positions only apply to the active voice
        synth.set_position(0.5).unwrap();
        assert_eq!(synth.voice(0).position(), 0.5);
        assert_eq!(synth.voice(1).position(), 1.25);

        synth.replace_buffer(noise(3.0), 2.0).unwrap();
        assert_eq!(synth.active_voice().position(), 0.5);
    }

    #[test]
    fn set_position_without_buffer() {
        let mut synth = synth();
        synth.set_position(1.0).unwrap();
        assert_eq!(synth.active_voice().position(), 0.0);
    }

    #[test]
    fn parameters_apply_to_both_voices() {
        let mut synth = synth();
        synth.set_period(0.02).unwrap();
        synth.set_grain_duration(0.2).unwrap();
        synth.set_position_var(0.05).unwrap();
        synth.set_resampling_var(0.1).unwrap();
        for voice in &synth.voices {
            assert_eq!(voice.period(), 0.02);
            assert_eq!(voice.duration(), 0.2);
            assert_eq!(voice.position_var(), 0.05);
            assert_eq!(voice.resampling_var(), 0.1);
        }
        synth.set_gain(-1.0).unwrap();
        assert_eq!(synth.gain(), 0.0);
        synth.set_cutoff_factor(0.5).unwrap();
        assert_eq!(synth.cutoff_factor(), 0.5);
    }

    #[test]
    fn start_and_stop() {
        let mut synth = synth();
        assert!(!synth.is_playing());
        synth.start().unwrap();
        assert!(synth.is_playing());
        // starting alone does not produce sound
        assert_eq!(synth.active_voice().target_gain(), 0.0);

        synth.replace_buffer(noise(2.0), 0.5).unwrap();
        synth.stop(1.0).unwrap();
        assert!(!synth.is_playing());
        assert_eq!(synth.active_voice().target_gain(), 0.0);
    }

    #[test]
    fn silent_until_first_buffer() {
        let mut synth = synth();
        synth.start().unwrap();
        let output = render(&mut synth, 0.5);
        assert!(output.iter().all(|s| *s == 0.0));

        synth.replace_buffer(noise(2.0), 0.1).unwrap();
        let output = render(&mut synth, 0.5);
        assert!(rms(&output[output.len() / 2..]) > 0.01);
        assert!(synth.active_grain_count() > 0);
    }

    #[test]
    fn faded_out_voices_get_parked_and_rearmed() {
        let mut synth = synth();
        synth.replace_buffer(noise(2.0), 0.1).unwrap();
        render(&mut synth, 0.5);
        synth.replace_buffer(noise(2.0), 0.1).unwrap();
        render(&mut synth, 0.5);
        assert!(synth.is_parked(1));
        assert!(synth.voice(1).is_inert());
        assert!(!synth.is_parked(0));

        // the parked voice fades in again with the next buffer
        synth.replace_buffer(noise(2.0), 0.1).unwrap();
        assert!(!synth.is_parked(1));
        render(&mut synth, 0.5);
        assert_eq!(synth.voice(1).gain(), 1.0);
        assert!(synth.is_parked(0));

        // stopping parks all voices
        synth.stop(0.1).unwrap();
        render(&mut synth, 0.5);
        assert!(synth.is_parked(0) && synth.is_parked(1));
        let output = render(&mut synth, 0.5);
        assert!(rms(&output) < 1e-6);
    }

    #[test]
    fn pool_fits_densest_grains() {
        let voices = [
            GranularVoice::with_rng(SmallRng::seed_from_u64(1)),
            GranularVoice::with_rng(SmallRng::seed_from_u64(2)),
        ];
        let options = SynthOptions::default().sample_rate(8000).channel_count(1);
        let mut synth = CrossfadeSynth::with_voices(options, voices).unwrap();
        let buffer = |seed| {
            let mut rng = SmallRng::seed_from_u64(seed);
            AudioBuffer::white_noise_with_rng(4.0, 8000, &mut rng).unwrap()
        };
        synth.set_period(MIN_PERIOD).unwrap();
        synth.set_grain_duration(MAX_GRAIN_DURATION).unwrap();
        synth.set_position_var(0.0).unwrap();

        synth.replace_buffer(buffer(3), 0.5).unwrap();
        render(&mut synth, 1.5);
        assert!(synth.active_grain_count() > 900);
        // both voices emit while crossfading
        synth.replace_buffer(buffer(4), 0.5).unwrap();
        render(&mut synth, 1.5);
        assert_eq!(synth.dropped_grain_count(), 0);
    }

    #[test]
    fn queued_messages_apply_as_a_whole() {
        let mut synth = synth();
        let mut handle = synth.handle();
        handle.set_period(0.02).unwrap();
        handle.replace_buffer(noise(2.0), 1.0).unwrap();
        handle.start().unwrap();
        assert!(handle.is_playing());
        assert_eq!(handle.pending_message_count(), 3);

        // nothing is applied before the audio thread processes the queue
        assert_eq!(synth.active_index(), 0);
        assert_eq!(synth.voice(1).target_gain(), 0.0);

        render(&mut synth, 0.01);
        assert_eq!(handle.pending_message_count(), 0);
        assert_eq!(synth.active_index(), 1);
        assert_eq!(synth.voice(1).target_gain(), 1.0);
        assert!(synth.voice(1).buffer().is_some());
        assert_eq!(synth.voice(0).period(), 0.02);
        assert!(synth.is_playing());

        handle.teardown().unwrap();
        render(&mut synth, 0.01);
        assert!(!synth.is_scheduled(0) && !synth.is_scheduled(1));
        assert!(synth.voices.iter().all(|v| v.buffer().is_none()));
        assert!(!handle.is_playing());
    }

    #[test]
    fn full_queue_fails() {
        let synth =
            CrossfadeSynth::new(SynthOptions::default().message_queue_size(1)).unwrap();
        let mut handle = synth.handle();
        assert!(handle.set_gain(0.5).is_ok());
        assert!(matches!(handle.set_gain(0.5), Err(Error::SendError(_))));
    }
}
