use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam_queue::ArrayQueue;

use crate::{buffer::AudioBuffer, Error};

use super::SynthControl;

// -------------------------------------------------------------------------------------------------

/// Events to control a [`CrossfadeSynth`](super::CrossfadeSynth) from other threads.
///
/// Messages are applied by the audio thread between two processed blocks, each one as a whole.
#[derive(Debug, Clone)]
pub enum SynthMessage {
    Start,
    Stop { fade_time: f64 },
    ReplaceBuffer { buffer: AudioBuffer, fade_time: f64 },
    Teardown,
    SetCutoffFactor(f32),
    SetGain(f32),
    SetPeriod(f64),
    SetGrainDuration(f64),
    SetPositionVar(f64),
    SetResamplingVar(f64),
    SetPosition(f64),
}

// -------------------------------------------------------------------------------------------------

/// Thread-safe handle to a [`CrossfadeSynth`](super::CrossfadeSynth), which is running in the
/// audio thread.
///
/// All calls push a single [`SynthMessage`] into the synth's message queue and never block. When
/// the queue is full, the call fails with [`Error::SendError`] and the message is dropped.
#[derive(Clone)]
pub struct SynthHandle {
    message_queue: Arc<ArrayQueue<SynthMessage>>,
    is_playing: Arc<AtomicBool>,
}

impl SynthHandle {
    pub(crate) fn new(
        message_queue: Arc<ArrayQueue<SynthMessage>>,
        is_playing: Arc<AtomicBool>,
    ) -> Self {
        Self {
            message_queue,
            is_playing,
        }
    }

    /// Number of messages which are not yet applied by the synth.
    pub fn pending_message_count(&self) -> usize {
        self.message_queue.len()
    }

    /// Push a raw message into the synth's message queue.
    pub fn send(&self, message: SynthMessage) -> Result<(), Error> {
        self.message_queue
            .push(message)
            .map_err(|_msg| Error::SendError("Synth message queue is full".to_string()))
    }
}

impl SynthControl for SynthHandle {
    fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Relaxed)
    }

    fn start(&mut self) -> Result<(), Error> {
        self.send(SynthMessage::Start)?;
        self.is_playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&mut self, fade_time: f64) -> Result<(), Error> {
        self.send(SynthMessage::Stop { fade_time })?;
        self.is_playing.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn replace_buffer(&mut self, buffer: AudioBuffer, fade_time: f64) -> Result<(), Error> {
        self.send(SynthMessage::ReplaceBuffer { buffer, fade_time })
    }

    fn teardown(&mut self) -> Result<(), Error> {
        self.send(SynthMessage::Teardown)
    }

    fn set_cutoff_factor(&mut self, factor: f32) -> Result<(), Error> {
        self.send(SynthMessage::SetCutoffFactor(factor))
    }

    fn set_gain(&mut self, gain: f32) -> Result<(), Error> {
        self.send(SynthMessage::SetGain(gain))
    }

    fn set_period(&mut self, period: f64) -> Result<(), Error> {
        self.send(SynthMessage::SetPeriod(period))
    }

    fn set_grain_duration(&mut self, duration: f64) -> Result<(), Error> {
        self.send(SynthMessage::SetGrainDuration(duration))
    }

    fn set_position_var(&mut self, position_var: f64) -> Result<(), Error> {
        self.send(SynthMessage::SetPositionVar(position_var))
    }

    fn set_resampling_var(&mut self, resampling_var: f64) -> Result<(), Error> {
        self.send(SynthMessage::SetResamplingVar(resampling_var))
    }

    fn set_position(&mut self, position: f64) -> Result<(), Error> {
        self.send(SynthMessage::SetPosition(position))
    }
}
