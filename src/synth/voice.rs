//! Single grain emitting voice with a per-voice gain envelope.

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::buffer::AudioBuffer;

// -------------------------------------------------------------------------------------------------

/// Smallest allowed grain period and grain duration in seconds.
pub const MIN_PERIOD: f64 = 0.001;

/// Largest allowed grain duration in seconds.
pub const MAX_GRAIN_DURATION: f64 = 1.0;

/// Grains which got shortened below this duration in seconds by the buffer bounds are dropped.
const MIN_GRAIN_DURATION: f64 = 0.001;

/// Smallest resampling rate a grain gets played back with.
const MIN_RESAMPLING_RATE: f64 = 0.01;

/// Distance to the target gain at which a fade is treated as complete.
const GAIN_EPSILON: f64 = 1e-9;

// -------------------------------------------------------------------------------------------------

/// A single grain, as emitted by a [`GranularVoice`].
///
/// `offset` and `duration` are buffer times in seconds. The grain's output length is
/// `duration / rate` seconds, starting at output `time`.
#[derive(Debug, Clone)]
pub struct GrainEvent {
    /// Output time in seconds at which the grain starts.
    pub time: f64,
    /// Read start in the buffer in seconds.
    pub offset: f64,
    /// Read length in the buffer in seconds.
    pub duration: f64,
    /// Playback rate of the buffer region, 1.0 being the original speed.
    pub rate: f64,
    /// Grain amplitude.
    pub gain: f32,
    /// Linear attack, relative to the grain duration.
    pub attack: f64,
    /// Linear release, relative to the grain duration.
    pub release: f64,
    /// The buffer the grain reads from.
    pub buffer: AudioBuffer,
}

// -------------------------------------------------------------------------------------------------

/// Receiver of emitted grains.
pub trait GrainSink {
    fn emit(&mut self, grain: GrainEvent);
}

impl GrainSink for Vec<GrainEvent> {
    fn emit(&mut self, grain: GrainEvent) {
        self.push(grain);
    }
}

// -------------------------------------------------------------------------------------------------

/// Grain emission state machine, bound to at most one [`AudioBuffer`].
///
/// When advanced, the voice first moves its gain towards the target gain, then emits one grain
/// around its current playback position and returns the time of its next tick. Silent voices
/// return no next tick, so the scheduler can park them.
///
/// Grains are centered around their read offset: with a position variance of `position_var`,
/// the audible window of a voice is `position +- (0.5 * duration_abs + position_var)`.
#[derive(Debug, Clone)]
pub struct GranularVoice {
    buffer: Option<AudioBuffer>,
    position: f64,
    period_abs: f64,
    period_var: f64,
    duration_abs: f64,
    position_var: f64,
    resampling_var: f64,
    centered: bool,
    attack_rel: f64,
    release_rel: f64,
    gain: f64,
    target_gain: f64,
    gain_increment: f64,
    rng: SmallRng,
}

impl Default for GranularVoice {
    fn default() -> Self {
        Self::new()
    }
}

impl GranularVoice {
    pub const DEFAULT_PERIOD: f64 = 0.01;
    pub const DEFAULT_DURATION: f64 = 0.1;
    pub const DEFAULT_POSITION_VAR: f64 = 0.003;

    /// Create a new, silent voice without buffer.
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_os_rng())
    }

    /// Create a new, silent voice which uses the given random number generator for all jitter.
    pub fn with_rng(rng: SmallRng) -> Self {
        Self {
            buffer: None,
            position: 0.0,
            period_abs: Self::DEFAULT_PERIOD,
            period_var: 0.0,
            duration_abs: Self::DEFAULT_DURATION,
            position_var: Self::DEFAULT_POSITION_VAR,
            resampling_var: 0.0,
            centered: true,
            attack_rel: 0.5,
            release_rel: 0.5,
            gain: 0.0,
            target_gain: 0.0,
            gain_increment: 0.0,
            rng,
        }
    }

    /// The bound buffer, if any.
    pub fn buffer(&self) -> Option<&AudioBuffer> {
        self.buffer.as_ref()
    }
    /// Bind a new buffer or unbind the current one. Gains and position are not touched.
    pub fn set_buffer(&mut self, buffer: Option<AudioBuffer>) {
        self.buffer = buffer;
    }

    /// Current playback position in seconds.
    pub fn position(&self) -> f64 {
        self.position
    }
    pub fn set_position(&mut self, position: f64) {
        if !position.is_nan() {
            self.position = position;
        }
    }

    /// Time between two grains in seconds.
    pub fn period(&self) -> f64 {
        self.period_abs
    }
    pub fn set_period(&mut self, period: f64) {
        if !period.is_nan() {
            self.period_abs = period.max(MIN_PERIOD);
        }
    }

    /// Random variation of the grain period in seconds.
    pub fn period_var(&self) -> f64 {
        self.period_var
    }
    pub fn set_period_var(&mut self, period_var: f64) {
        if !period_var.is_nan() {
            self.period_var = period_var.max(0.0);
        }
    }

    /// Grain duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration_abs
    }
    pub fn set_duration(&mut self, duration: f64) {
        if !duration.is_nan() {
            self.duration_abs = duration.clamp(MIN_PERIOD, MAX_GRAIN_DURATION);
        }
    }

    /// Random variation of the grain read offset in seconds.
    pub fn position_var(&self) -> f64 {
        self.position_var
    }
    pub fn set_position_var(&mut self, position_var: f64) {
        if !position_var.is_nan() {
            self.position_var = position_var.max(0.0);
        }
    }

    /// Random variation of the grain playback rate, relative to 1.0.
    pub fn resampling_var(&self) -> f64 {
        self.resampling_var
    }
    pub fn set_resampling_var(&mut self, resampling_var: f64) {
        if !resampling_var.is_nan() {
            self.resampling_var = resampling_var.max(0.0);
        }
    }

    /// True when grains are centered around their read offset.
    pub fn centered(&self) -> bool {
        self.centered
    }
    pub fn set_centered(&mut self, centered: bool) {
        self.centered = centered;
    }

    /// Current envelope gain.
    pub fn gain(&self) -> f64 {
        self.gain
    }
    /// Gain the envelope is moving to.
    pub fn target_gain(&self) -> f64 {
        self.target_gain
    }
    /// Gain change per tick of the running fade. 0 when no fade is running.
    pub fn gain_increment(&self) -> f64 {
        self.gain_increment
    }

    /// True when the voice is silent and will stay silent: it emits nothing and can be parked.
    pub fn is_inert(&self) -> bool {
        self.gain <= 0.0 && self.target_gain <= 0.0
    }

    /// Start a linear fade from the current gain to `target` which completes after `duration`
    /// seconds, assuming ticks at the current period. Supersedes any running fade.
    /// Fades with zero duration apply the target gain immediately.
    pub fn fade_to(&mut self, target: f64, duration: f64) {
        let target = if target.is_nan() {
            self.target_gain
        } else {
            target.clamp(0.0, 1.0)
        };
        self.target_gain = target;
        if duration > 0.0 && self.period_abs > 0.0 {
            self.gain_increment = (target - self.gain) / (duration / self.period_abs);
            if self.gain_increment == 0.0 {
                self.gain = target;
            }
        } else {
            self.gain = target;
            self.gain_increment = 0.0;
        }
    }

    /// Fade to full gain.
    pub fn fade_in(&mut self, duration: f64) {
        self.fade_to(1.0, duration);
    }

    /// Fade to silence.
    pub fn fade_out(&mut self, duration: f64) {
        self.fade_to(0.0, duration);
    }

    /// Advance the voice at the given time: update the gain envelope and emit one grain into the
    /// given sink. Returns the time of the next tick, or `None` when the voice became silent.
    pub fn advance(&mut self, time: f64, sink: &mut impl GrainSink) -> Option<f64> {
        self.update_gain();
        if self.gain <= 0.0 {
            return None;
        }
        self.trigger(time, sink);
        let period = self.period_abs + self.bipolar_random(self.period_var);
        Some(time + period.max(MIN_PERIOD))
    }

    /// Unbind the buffer and silence the voice. Position and grain parameters are kept.
    pub fn reset(&mut self) {
        self.buffer = None;
        self.gain = 0.0;
        self.target_gain = 0.0;
        self.gain_increment = 0.0;
    }

    fn update_gain(&mut self) {
        if self.gain_increment == 0.0 {
            return;
        }
        let gain = self.gain + self.gain_increment;
        let reached = if self.gain_increment > 0.0 {
            gain >= self.target_gain - GAIN_EPSILON
        } else {
            gain <= self.target_gain + GAIN_EPSILON
        };
        if reached {
            self.gain = self.target_gain;
            self.gain_increment = 0.0;
        } else {
            self.gain = gain;
        }
    }

    fn trigger(&mut self, time: f64, sink: &mut impl GrainSink) {
        if self.buffer.is_none() {
            return;
        }
        let mut grain_time = time;
        let mut duration = self.duration_abs;
        let mut offset = self.position + self.bipolar_random(self.position_var);
        let rate = (1.0 + self.bipolar_random(self.resampling_var)).max(MIN_RESAMPLING_RATE);
        if self.centered {
            offset -= 0.5 * duration;
        }
        if let Some(buffer) = &self.buffer {
            // keep the read region within the buffer
            if offset < 0.0 {
                grain_time -= offset / rate;
                duration += offset;
                offset = 0.0;
            }
            let buffer_duration = buffer.duration();
            if offset + duration > buffer_duration {
                duration = buffer_duration - offset;
            }
            if duration >= MIN_GRAIN_DURATION {
                sink.emit(GrainEvent {
                    time: grain_time,
                    offset,
                    duration,
                    rate,
                    gain: self.gain as f32,
                    attack: self.attack_rel,
                    release: self.release_rel,
                    buffer: buffer.clone(),
                });
            }
        }
    }

    fn bipolar_random(&mut self, amount: f64) -> f64 {
        if amount > 0.0 {
            amount * (self.rng.random::<f64>() * 2.0 - 1.0)
        } else {
            0.0
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn voice() -> GranularVoice {
        GranularVoice::with_rng(SmallRng::seed_from_u64(0x5eed))
    }

    fn buffer(duration: f64) -> AudioBuffer {
        let sample_rate = 1000;
        AudioBuffer::new(
            vec![0.5f32; (duration * sample_rate as f64) as usize],
            sample_rate,
        )
        .unwrap()
    }

    /// Run ticks at a fixed period until the gain reached its target, returning the tick count.
    fn ticks_until_target(voice: &mut GranularVoice, period: f64) -> usize {
        let mut sink = Vec::new();
        let target = voice.target_gain();
        let rising = target > voice.gain();
        let mut previous = voice.gain();
        let mut ticks = 0;
        while voice.gain() != target {
            voice.advance(ticks as f64 * period, &mut sink);
            ticks += 1;
            if rising {
                assert!(voice.gain() >= previous && voice.gain() <= target);
            } else {
                assert!(voice.gain() <= previous && voice.gain() >= target);
            }
            previous = voice.gain();
            assert!(ticks < 100_000, "fade does not converge");
        }
        ticks
    }

    #[test]
    fn gain_converges_without_overshoot() {
        for (period, duration) in [(0.05, 2.0), (0.07, 0.3), (0.003, 1.0), (0.01, 0.01)] {
            let mut voice = voice();
            voice.set_period(period);

            voice.fade_in(duration);
            let ticks = ticks_until_target(&mut voice, period);
            assert!(ticks <= (duration / period).ceil() as usize);
            assert_eq!(voice.gain(), 1.0);
            assert_eq!(voice.gain_increment(), 0.0);

            voice.fade_out(duration);
            let ticks = ticks_until_target(&mut voice, period);
            assert!(ticks <= (duration / period).ceil() as usize);
            assert_eq!(voice.gain(), 0.0);
            assert!(voice.is_inert());
        }
    }

    #[test]
    fn fade_supersedes_running_fade() {
        let mut voice = voice();
        voice.set_period(0.1);
        voice.fade_in(1.0);
        let mut sink = Vec::new();
        for tick in 0..5 {
            voice.advance(tick as f64 * 0.1, &mut sink);
        }
        assert!((voice.gain() - 0.5).abs() < 1e-9);

        voice.fade_out(0.5);
        assert!((voice.gain_increment() + 0.1).abs() < 1e-9);
        let ticks = ticks_until_target(&mut voice, 0.1);
        assert_eq!(ticks, 5);
    }

    #[test]
    fn zero_duration_fades_snap() {
        let mut voice = voice();
        voice.fade_to(1.0, 0.0);
        assert_eq!(voice.gain(), 1.0);
        assert_eq!(voice.gain_increment(), 0.0);

        voice.fade_to(0.25, -1.0);
        assert_eq!(voice.gain(), 0.25);

        voice.fade_to(2.0, 0.0);
        assert_eq!(voice.gain(), 1.0);
    }

    #[test]
    fn silent_voices_request_no_tick() {
        let mut voice = voice();
        let mut sink = Vec::new();
        voice.set_buffer(Some(buffer(1.0)));
        assert_eq!(voice.advance(0.0, &mut sink), None);
        assert!(sink.is_empty());

        voice.fade_in(0.0);
        assert_eq!(voice.advance(0.0, &mut sink), Some(voice.period()));
        assert_eq!(sink.len(), 1);

        voice.fade_out(0.0);
        assert_eq!(voice.advance(1.0, &mut sink), None);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn missing_buffer_emits_nothing() {
        let mut voice = voice();
        let mut sink = Vec::new();
        voice.fade_in(0.0);
        voice.set_position(0.5);
        assert_eq!(voice.advance(0.0, &mut sink), Some(voice.period()));
        assert!(sink.is_empty());
    }

    #[test]
    fn setters_clamp() {
        let mut voice = voice();
        voice.set_period(0.0);
        assert_eq!(voice.period(), MIN_PERIOD);
        voice.set_duration(-1.0);
        assert_eq!(voice.duration(), MIN_PERIOD);
        voice.set_duration(10.0);
        assert_eq!(voice.duration(), MAX_GRAIN_DURATION);
        voice.set_position_var(-0.1);
        assert_eq!(voice.position_var(), 0.0);
        voice.set_resampling_var(-0.1);
        assert_eq!(voice.resampling_var(), 0.0);
        voice.set_period_var(-0.1);
        assert_eq!(voice.period_var(), 0.0);
        voice.set_position(2.0);
        voice.set_position(f64::NAN);
        assert_eq!(voice.position(), 2.0);
        voice.set_period(f64::NAN);
        assert_eq!(voice.period(), MIN_PERIOD);
    }

    #[test]
    fn grains_are_centered_and_clamped() {
        let mut voice = voice();
        let mut sink = Vec::new();
        voice.set_buffer(Some(buffer(1.0)));
        voice.set_position_var(0.0);
        voice.set_duration(0.1);
        voice.fade_in(0.0);

        voice.set_position(0.5);
        voice.advance(2.0, &mut sink);
        let grain = sink.pop().unwrap();
        assert!((grain.offset - 0.45).abs() < 1e-9);
        assert!((grain.duration - 0.1).abs() < 1e-9);
        assert_eq!(grain.time, 2.0);
        assert_eq!(grain.rate, 1.0);
        assert_eq!(grain.gain, 1.0);

        // start of buffer: the grain starts later and gets shorter
        voice.set_position(0.0);
        voice.advance(2.0, &mut sink);
        let grain = sink.pop().unwrap();
        assert_eq!(grain.offset, 0.0);
        assert!((grain.duration - 0.05).abs() < 1e-9);
        assert!((grain.time - 2.05).abs() < 1e-9);

        // end of buffer: the grain gets shorter
        voice.set_position(1.0);
        voice.advance(2.0, &mut sink);
        let grain = sink.pop().unwrap();
        assert!((grain.offset - 0.95).abs() < 1e-9);
        assert!((grain.duration - 0.05).abs() < 1e-9);

        // completely outside of the buffer
        voice.set_position(3.0);
        voice.advance(2.0, &mut sink);
        assert!(sink.is_empty());
    }

    #[test]
    fn jitter_stays_within_variance() {
        let mut voice = voice();
        let mut sink = Vec::new();
        voice.set_buffer(Some(buffer(4.0)));
        voice.set_position(2.0);
        voice.set_duration(0.1);
        voice.set_position_var(0.3);
        voice.set_resampling_var(0.2);
        voice.set_period(0.05);
        voice.set_period_var(0.01);
        voice.fade_in(0.0);

        let mut time = 0.0;
        for _ in 0..500 {
            let next = voice.advance(time, &mut sink).unwrap();
            assert!(next - time >= 0.04 - 1e-9 && next - time <= 0.06 + 1e-9);
            time = next;
        }
        assert_eq!(sink.len(), 500);
        for grain in &sink {
            assert!(grain.offset >= 2.0 - 0.3 - 0.05 - 1e-9);
            assert!(grain.offset <= 2.0 + 0.3 - 0.05 + 1e-9);
            assert!(grain.rate >= 0.8 - 1e-9 && grain.rate <= 1.2 + 1e-9);
        }
        assert!(sink.iter().any(|g| (g.offset - 1.95).abs() > 0.1));
        assert!(sink.iter().any(|g| (g.rate - 1.0).abs() > 0.05));
    }
}
