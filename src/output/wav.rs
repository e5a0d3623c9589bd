use std::{fs::File, io::BufWriter, path::Path, time::Duration};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{
    error::Error,
    output::{check_source_layout, OutputDevice},
    source::{empty::EmptySource, Source, SourceTime},
    utils::{
        buffer::clear_buffer,
        smoothed::{apply_smoothed_gain, ExponentialSmoothedValue, SmoothedValue},
    },
};

// -------------------------------------------------------------------------------------------------

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNEL_COUNT: usize = 2;

const BUFFER_SIZE_FRAMES: usize = 1024;

// -------------------------------------------------------------------------------------------------

/// Audio output device, which renders its source into a wav file instead of playing it back.
///
/// Rendering is offline and synchronous: nothing gets written until [`WavOutput::render`] is
/// called, so a caller can interleave control updates and rendering with exact timing.
/// Wav file contents are always saved as 32bit floats.
pub struct WavOutput {
    writer: Option<WavWriter<BufWriter<File>>>,
    channel_count: usize,
    sample_rate: u32,
    source: Box<dyn Source>,
    smoothed_volume: ExponentialSmoothedValue,
    buffer: Vec<f32>,
    running: bool,
    playback_pos: u64,
}

impl WavOutput {
    /// Open a wav output device to write at the given file using default specs.
    pub fn open<P: AsRef<Path>>(file_path: P) -> Result<Self, Error> {
        Self::open_with_specs(file_path, DEFAULT_SAMPLE_RATE, DEFAULT_CHANNEL_COUNT)
    }

    /// Create a new wav output device with the given parameters.
    ///
    /// * `file_path`: Target file path. Should end with ".wav" extension.
    /// * `sample_rate`: Source and wav file's sample rate.
    /// * `channel_count`: Source and wav file's channel layout.
    pub fn open_with_specs<P: AsRef<Path>>(
        file_path: P,
        sample_rate: u32,
        channel_count: usize,
    ) -> Result<Self, Error> {
        if channel_count == 0 || channel_count > u16::MAX as usize || sample_rate == 0 {
            return Err(Error::ParameterError(format!(
                "invalid wav output layout {channel_count}ch@{sample_rate}Hz"
            )));
        }
        let spec = WavSpec {
            channels: channel_count as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(file_path, spec)?;
        log::info!("Opened wav output: {channel_count} channels at {sample_rate}Hz");

        Ok(Self {
            writer: Some(writer),
            channel_count,
            sample_rate,
            source: Box::new(EmptySource::new(channel_count, sample_rate)),
            smoothed_volume: ExponentialSmoothedValue::new(1.0, sample_rate),
            buffer: vec![0.0; BUFFER_SIZE_FRAMES * channel_count],
            running: true,
            playback_pos: 0,
        })
    }

    /// Render the given duration of the current source into the file. Silence gets written
    /// where the source produced no output. Returns the number of written frames, which is
    /// zero when the output is paused or closed.
    pub fn render(&mut self, duration: Duration) -> Result<u64, Error> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(0);
        };
        if !self.running {
            return Ok(0);
        }
        let frame_count = (duration.as_secs_f64() * self.sample_rate as f64).round() as u64;
        let mut frames_left = frame_count;
        while frames_left > 0 {
            let frames = (frames_left as usize).min(BUFFER_SIZE_FRAMES);
            let buffer = &mut self.buffer[..frames * self.channel_count];
            clear_buffer(buffer);

            let time = SourceTime::new(self.playback_pos / self.channel_count as u64);
            let written = self.source.write(buffer, &time);
            apply_smoothed_gain(&mut buffer[..written], &mut self.smoothed_volume);

            for sample in buffer.iter() {
                writer.write_sample(*sample)?;
            }
            self.playback_pos += buffer.len() as u64;
            frames_left -= frames as u64;
        }
        Ok(frame_count)
    }
}

impl OutputDevice for WavOutput {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn sample_position(&self) -> u64 {
        self.playback_pos
    }

    fn volume(&self) -> f32 {
        self.smoothed_volume.target()
    }

    fn set_volume(&mut self, volume: f32) {
        self.smoothed_volume.set_target(volume);
    }

    fn is_running(&self) -> bool {
        self.running && self.writer.is_some()
    }

    fn play(&mut self, source: Box<dyn Source>) -> Result<(), Error> {
        check_source_layout(source.as_ref(), self.channel_count, self.sample_rate)?;
        self.source = source;
        Ok(())
    }

    fn stop(&mut self) {
        self.source = Box::new(EmptySource::new(self.channel_count, self.sample_rate));
    }

    fn pause(&mut self) {
        self.running = false;
    }

    fn resume(&mut self) {
        self.running = true;
    }

    fn close(&mut self) {
        if let Some(writer) = self.writer.take() {
            match writer.finalize() {
                Ok(()) => log::info!("Closed wav output"),
                Err(err) => log::error!("Failed to finalize wav file: {err}"),
            }
        }
    }
}

impl Drop for WavOutput {
    fn drop(&mut self) {
        self.close();
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;
    use crate::{
        buffer::AudioBuffer,
        synth::{voice::GranularVoice, CrossfadeSynth, SynthControl, SynthOptions},
    };

    #[test]
    fn render_synth() {
        let path = std::env::temp_dir().join(format!("grainfield-test-{}.wav", std::process::id()));
        let mut output = WavOutput::open_with_specs(&path, 22050, 2).unwrap();

        let voices = [
            GranularVoice::with_rng(SmallRng::seed_from_u64(1)),
            GranularVoice::with_rng(SmallRng::seed_from_u64(2)),
        ];
        let options = SynthOptions::default().sample_rate(22050).channel_count(2);
        let mut synth = CrossfadeSynth::with_voices(options, voices).unwrap();
        let mut handle = synth.handle();
        let buffer =
            AudioBuffer::white_noise_with_rng(1.0, 22050, &mut SmallRng::seed_from_u64(3)).unwrap();
        synth.replace_buffer(buffer, 0.05).unwrap();

        assert!(output
            .play(Box::new(CrossfadeSynth::new(SynthOptions::default()).unwrap()))
            .is_err());
        output.play(Box::new(synth)).unwrap();

        assert_eq!(output.render(Duration::from_millis(500)).unwrap(), 11025);
        handle.stop(0.05).unwrap();
        output.pause();
        assert_eq!(output.render(Duration::from_millis(500)).unwrap(), 0);
        output.resume();
        assert_eq!(output.render(Duration::from_millis(500)).unwrap(), 11025);
        assert_eq!(output.sample_position(), 2 * 22050);
        output.close();
        assert!(!output.is_running());

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 22050);
        let samples = reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(samples.len(), 2 * 22050);
        // sound while playing, silence at the end after the fade-out
        assert!(samples[..22050].iter().any(|s| s.abs() > 0.01));
        assert!(samples[samples.len() - 1000..].iter().all(|s| s.abs() < 1e-3));
        std::fs::remove_file(path).unwrap();
    }
}
