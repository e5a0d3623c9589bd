use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    StreamConfig,
};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::{
    error::Error,
    output::{check_source_layout, OutputDevice},
    source::{empty::EmptySource, Source, SourceTime},
};

// -------------------------------------------------------------------------------------------------

const PREFERRED_SAMPLE_FORMAT: cpal::SampleFormat = cpal::SampleFormat::F32;
const PREFERRED_SAMPLE_RATE: cpal::SampleRate = cpal::SampleRate(44100);
const PREFERRED_CHANNELS: cpal::ChannelCount = 2;
const PREFERRED_BUFFER_SIZE: cpal::BufferSize = if cfg!(debug_assertions) {
    cpal::BufferSize::Default
} else {
    cpal::BufferSize::Fixed(1024)
};

// -------------------------------------------------------------------------------------------------

/// Live audio output on the system's default output device.
///
/// Sources and volume changes are passed to the audio callback through a channel, and get
/// applied before the next buffer is rendered. The stream starts running when opened.
pub struct CpalOutput {
    stream: Option<cpal::Stream>,
    channel_count: usize,
    sample_rate: u32,
    volume: f32,
    running: bool,
    playback_pos: Arc<AtomicU64>,
    callback_send: Sender<CallbackMsg>,
}

impl CpalOutput {
    /// Open the default output device of the default host.
    pub fn open() -> Result<Self, Error> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(cpal::DefaultStreamConfigError::DeviceNotAvailable)?;
        if let Ok(name) = device.name() {
            log::info!("Using audio device: {name}");
        }

        let supported = Self::preferred_output_config(&device)?;
        let config = StreamConfig {
            buffer_size: PREFERRED_BUFFER_SIZE,
            ..supported.config()
        };
        let channel_count = config.channels as usize;
        let sample_rate = config.sample_rate.0;

        let playback_pos = Arc::new(AtomicU64::new(0));
        let (callback_send, callback_recv) = bounded(16);
        let mut callback = StreamCallback {
            callback_recv,
            source: Box::new(EmptySource::new(channel_count, sample_rate)),
            volume: 1.0,
            playback_pos: Arc::clone(&playback_pos),
            playback_pos_instant: Instant::now(),
        };

        log::info!("Opening output stream: {config:?}");
        let stream = device.build_output_stream(
            &config,
            move |output: &mut [f32], _| callback.write_samples(output),
            |err| log::error!("Audio output error: {err}"),
            None,
        )?;
        stream.play()?;

        Ok(Self {
            stream: Some(stream),
            channel_count,
            sample_rate,
            volume: 1.0,
            running: true,
            playback_pos,
            callback_send,
        })
    }

    fn preferred_output_config(
        device: &cpal::Device,
    ) -> Result<cpal::SupportedStreamConfig, Error> {
        for s in device.supported_output_configs()? {
            let rates = s.min_sample_rate()..=s.max_sample_rate();
            if s.channels() == PREFERRED_CHANNELS
                && s.sample_format() == PREFERRED_SAMPLE_FORMAT
                && rates.contains(&PREFERRED_SAMPLE_RATE)
            {
                return Ok(s.with_sample_rate(PREFERRED_SAMPLE_RATE));
            }
        }
        Ok(device.default_output_config()?)
    }

    fn send_to_callback(&self, msg: CallbackMsg) {
        if self.callback_send.send(msg).is_err() {
            log::error!("Output stream callback is gone");
        }
    }
}

impl OutputDevice for CpalOutput {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn sample_position(&self) -> u64 {
        self.playback_pos.load(Ordering::Relaxed)
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.send_to_callback(CallbackMsg::SetVolume(volume));
    }

    fn is_running(&self) -> bool {
        self.running && self.stream.is_some()
    }

    fn play(&mut self, source: Box<dyn Source>) -> Result<(), Error> {
        check_source_layout(source.as_ref(), self.channel_count, self.sample_rate)?;
        self.callback_send.send(CallbackMsg::PlaySource(source))?;
        Ok(())
    }

    fn stop(&mut self) {
        let empty = EmptySource::new(self.channel_count, self.sample_rate);
        self.send_to_callback(CallbackMsg::PlaySource(Box::new(empty)));
    }

    fn pause(&mut self) {
        if let Some(stream) = &self.stream {
            log::debug!("Pausing audio output stream");
            match stream.pause() {
                Ok(()) => self.running = false,
                Err(err) => log::error!("Failed to pause stream: {err}"),
            }
        }
    }

    fn resume(&mut self) {
        if let Some(stream) = &self.stream {
            log::debug!("Resuming audio output stream");
            match stream.play() {
                Ok(()) => self.running = true,
                Err(err) => log::error!("Failed to resume stream: {err}"),
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            log::debug!("Closing audio output stream");
            let _ = stream.pause();
        }
        self.running = false;
    }
}

// -------------------------------------------------------------------------------------------------

enum CallbackMsg {
    PlaySource(Box<dyn Source>),
    SetVolume(f32),
}

struct StreamCallback {
    callback_recv: Receiver<CallbackMsg>,
    source: Box<dyn Source>,
    volume: f32,
    playback_pos: Arc<AtomicU64>,
    playback_pos_instant: Instant,
}

impl StreamCallback {
    fn write_samples(&mut self, output: &mut [f32]) {
        while let Ok(msg) = self.callback_recv.try_recv() {
            match msg {
                CallbackMsg::PlaySource(source) => self.source = source,
                CallbackMsg::SetVolume(volume) => self.volume = volume,
            }
        }

        let time = SourceTime {
            pos_in_frames: self.playback_pos.load(Ordering::Relaxed)
                / self.source.channel_count().max(1) as u64,
            pos_instant: self.playback_pos_instant,
        };
        let written = self.source.write(output, &time);
        output[..written].iter_mut().for_each(|s| *s *= self.volume);
        self.playback_pos
            .fetch_add(output.len() as u64, Ordering::Relaxed);

        // mute what the source didn't write
        output[written..].iter_mut().for_each(|s| *s = 0.0);
    }
}

// -------------------------------------------------------------------------------------------------

impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(err: cpal::DefaultStreamConfigError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(err: cpal::SupportedStreamConfigsError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::BuildStreamError> for Error {
    fn from(err: cpal::BuildStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::PlayStreamError> for Error {
    fn from(err: cpal::PlayStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}
