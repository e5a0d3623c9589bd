//! Renders a short performance into a wav file: the controller starts the performance, two
//! recordings arrive, a touch sweeps over the buffer and the controller ends the performance.

use std::{f64::consts::PI, path::PathBuf, time::Duration};

use arg::{parse_args, Args};

use grainfield::{
    output::{wav::WavOutput, OutputDevice},
    AudioBuffer, CrossfadeSynth, Error, Performance, PerformanceOptions, SynthOptions,
};

// -------------------------------------------------------------------------------------------------

const DEFAULT_LOG_LEVEL: log::Level = if cfg!(debug_assertions) {
    log::Level::Debug
} else {
    log::Level::Info
};

const SAMPLE_RATE: u32 = 44100;
const STEP: f64 = 0.05;

// -------------------------------------------------------------------------------------------------

#[derive(Args, Debug, Default)]
struct Arguments {
    #[arg(short = "o", long = "output")]
    /// Target wav file path. By default \"performance.wav\".
    output_path: Option<PathBuf>,
    #[arg(short = "c", long = "client-index")]
    /// Index of the rendered device in the session. By default 0.
    client_index: Option<usize>,
    #[arg(short = "l", long = "log-level")]
    /// Set logging level to \"debug\", \"info\", \"warn\" or \"error\".
    log_level: Option<log::Level>,
}

// -------------------------------------------------------------------------------------------------

/// Controller and audience input at a given time in seconds.
enum Cue {
    Param(&'static str, &'static str),
    Recording { frequency: f64, duration: f64 },
    Touch(f32, f32),
    Release,
}

fn cues() -> Vec<(f64, Cue)> {
    let mut cues = vec![
        (0.0, Cue::Param("state", "wait")),
        (0.0, Cue::Param("gain", "-6")),
        (0.0, Cue::Param("period", "0.02")),
        (0.0, Cue::Param("duration", "0.12")),
        (0.0, Cue::Param("positionVar", "0.05")),
        (1.0, Cue::Param("state", "start")),
        (2.0, Cue::Recording { frequency: 220.0, duration: 3.0 }),
        (9.0, Cue::Recording { frequency: 330.0, duration: 4.0 }),
        (12.0, Cue::Param("resamplingVar", "0.1")),
        (12.0, Cue::Param("period", "0.01")),
        (16.0, Cue::Param("state", "end")),
    ];
    // sweep a single touch over the buffer and down, which closes the filter
    for step in 0..=40 {
        let t = step as f32 / 40.0;
        cues.push((4.0 + 0.1 * step as f64, Cue::Touch(t, 0.4 + 0.6 * t)));
    }
    cues.push((8.1, Cue::Release));
    cues.sort_by(|(a, _), (b, _)| a.total_cmp(b));
    cues
}

/// A fake recording: a decaying harmonic tone, repeated a few times.
fn recording(frequency: f64, duration: f64) -> Result<AudioBuffer, Error> {
    let frame_count = (duration * SAMPLE_RATE as f64) as usize;
    let samples = (0..frame_count)
        .map(|frame| {
            let time = frame as f64 / SAMPLE_RATE as f64;
            let envelope = (-3.0 * (time % 0.75)).exp();
            let phase = 2.0 * PI * frequency * time;
            let tone = phase.sin() + 0.3 * (2.0 * phase).sin();
            (0.5 * envelope * tone) as f32
        })
        .collect::<Vec<_>>();
    AudioBuffer::new(samples, SAMPLE_RATE)
}

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    let args = parse_args::<Arguments>();
    simple_logger::SimpleLogger::new()
        .with_level(args.log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_level_filter())
        .init()
        .expect("Failed to set logger");

    let output_path = args
        .output_path
        .unwrap_or_else(|| PathBuf::from("performance.wav"));
    let client_index = args.client_index.unwrap_or(0);

    // the synth renders into the wav file, the performance controls it via its handle
    let synth = CrossfadeSynth::new(SynthOptions::default().sample_rate(SAMPLE_RATE))?;
    let handle = synth.handle();
    let mut output = WavOutput::open_with_specs(&output_path, SAMPLE_RATE, 2)?;
    output.play(Box::new(synth))?;

    let options = PerformanceOptions::default()
        .sample_rate(SAMPLE_RATE)
        .client_index(client_index)
        .record_count(1);
    let mut performance = Performance::new(handle, options)?;
    let phase = performance.phase();

    let mut cues = cues().into_iter().peekable();
    let mut time = 0.0;
    let end_time = 16.0 + options.release_time + 3.0;
    while time < end_time {
        while let Some((_, cue)) = cues.next_if(|(cue_time, _)| *cue_time <= time) {
            match cue {
                Cue::Param(name, value) => {
                    // failures are logged by the performance
                    let _ = performance.handle_param_str(name, value);
                }
                Cue::Recording { frequency, duration } => {
                    performance.handle_buffer(recording(frequency, duration)?, phase)?;
                }
                Cue::Touch(x, y) => {
                    performance.touch_start(1, x, y)?;
                    performance.touch_move(1, x, y)?;
                }
                Cue::Release => performance.touch_end(1),
            }
        }
        performance.advance(STEP)?;
        output.render(Duration::from_secs_f64(STEP))?;
        time += STEP;
    }
    output.close();

    println!(
        "Rendered {:.1}s into '{}'",
        output.sample_position() as f64 / (2 * SAMPLE_RATE) as f64,
        output_path.display()
    );
    Ok(())
}
