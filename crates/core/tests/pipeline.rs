use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use crossbeam_channel::Receiver;
use spectral_dominance_core::{
    AnalysisConfig, BinFrequencyTable, ChunkSource, DominanceError, DominanceListener,
    DominancePipeline, FrameSource, PipelineState, Result, WavSource, WindowFunction,
};

/// Hands out a fixed list of buffers, then ends the stream.
struct ScriptedSource {
    buffers: VecDeque<Vec<f32>>,
    released: Arc<Mutex<bool>>,
}

impl FrameSource for ScriptedSource {
    fn next_buffer(&mut self) -> Result<Option<Vec<f32>>> {
        Ok(self.buffers.pop_front())
    }

    fn release(&mut self) {
        *self.released.lock().unwrap() = true;
    }
}

/// Yields one buffer, then fails like an unplugged device.
struct FailingSource {
    first: Option<Vec<f32>>,
}

impl FrameSource for FailingSource {
    fn next_buffer(&mut self) -> Result<Option<Vec<f32>>> {
        match self.first.take() {
            Some(buffer) => Ok(Some(buffer)),
            None => Err(DominanceError::source_failed("device unplugged")),
        }
    }
}

#[derive(Default)]
struct Observed {
    values: Vec<f32>,
    failures: Vec<String>,
    stopped: bool,
}

#[derive(Clone, Default)]
struct Collector(Arc<Mutex<Observed>>);

impl DominanceListener for Collector {
    fn on_dominance_index(&mut self, value: f32) {
        self.0.lock().unwrap().values.push(value);
    }

    fn on_failure(&mut self, error: &DominanceError) {
        self.0.lock().unwrap().failures.push(error.to_string());
    }

    fn on_stopped(&mut self) {
        self.0.lock().unwrap().stopped = true;
    }
}

/// A tone centred on `bin` of a `window`-sample transform, `len` samples long.
fn tone_over(bin: usize, window: usize, len: usize, amplitude: f64) -> Vec<f32> {
    (0..len)
        .map(|n| {
            let phase = 2.0 * std::f64::consts::PI * bin as f64 * n as f64 / window as f64;
            (amplitude * phase.sin()) as f32
        })
        .collect()
}

fn tone(bin: usize, len: usize, amplitude: f64) -> Vec<f32> {
    tone_over(bin, len, len, amplitude)
}

fn stream(config: &AnalysisConfig, samples: &[f32]) -> ChunkSource {
    let (chunks, source) = ChunkSource::channel(config).unwrap();
    for chunk in samples.chunks(500) {
        chunks.send(chunk.to_vec()).unwrap();
    }
    source
}

fn collect(rx: &Receiver<f32>) -> Vec<f32> {
    rx.try_iter().collect()
}

#[test]
fn silence_then_repeated_tone_emits_two_values() {
    let config = AnalysisConfig::default();
    let silence = vec![0.0; config.buffer_size];
    let loud = tone(100, config.buffer_size, 0.5);
    let released = Arc::new(Mutex::new(false));
    let source = ScriptedSource {
        buffers: VecDeque::from(vec![silence, loud.clone(), loud]),
        released: Arc::clone(&released),
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut pipeline = DominancePipeline::new(config).unwrap();
    pipeline
        .start(move |_| Ok(source), move |value: f32| tx.send(value).unwrap())
        .unwrap();
    pipeline.join().unwrap();

    let expected = BinFrequencyTable::new(22_050, 4096).as_slice()[100];
    let values = collect(&rx);
    assert_eq!(values.len(), 2);
    for value in values {
        assert_abs_diff_eq!(value as f64, expected, epsilon = 1.0);
    }

    let stats = pipeline.stats();
    assert_eq!(stats.frames_processed, 3);
    assert_eq!(stats.indeterminate_frames, 1);
    assert_eq!(stats.values_emitted, 2);
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(*released.lock().unwrap());
}

#[test]
fn hann_window_keeps_symmetric_peak_centred() {
    let config = AnalysisConfig {
        window: WindowFunction::Hann,
        ..Default::default()
    };
    let loud = tone(100, config.buffer_size, 0.5);
    let source = ScriptedSource {
        buffers: VecDeque::from(vec![loud]),
        released: Arc::default(),
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut pipeline = DominancePipeline::new(config).unwrap();
    pipeline
        .start(move |_| Ok(source), move |value: f32| tx.send(value).unwrap())
        .unwrap();
    pipeline.join().unwrap();

    let values = collect(&rx);
    assert_eq!(values.len(), 1);
    assert_abs_diff_eq!(values[0] as f64, 100.0 * 22_050.0 / 4096.0, epsilon = 1.0);
}

#[test]
fn cancel_while_blocked_stops_without_processing() {
    let config = AnalysisConfig::default();
    let (chunks, source) = ChunkSource::channel(&config).unwrap();
    let observed = Collector::default();

    let mut pipeline = DominancePipeline::new(config.clone()).unwrap();
    pipeline.start(move |_| Ok(source), observed.clone()).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Running);

    // Give the worker time to block on the empty source.
    thread::sleep(Duration::from_millis(20));
    pipeline.cancel();
    assert_eq!(pipeline.state(), PipelineState::Cancelling);

    // A full, loud buffer arrives after cancellation and must be discarded.
    chunks.send(tone(100, config.buffer_size, 0.5)).unwrap();
    pipeline.join().unwrap();

    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(pipeline.stats().frames_processed, 0);
    let observed = observed.0.lock().unwrap();
    assert!(observed.values.is_empty());
    assert!(observed.stopped);
}

#[test]
fn acquisition_failure_is_reported_by_start() {
    let observed = Collector::default();
    let mut pipeline = DominancePipeline::new(AnalysisConfig::default()).unwrap();
    let result = pipeline.start(
        |_: &AnalysisConfig| -> Result<ChunkSource> {
            Err(DominanceError::acquisition("input unavailable"))
        },
        observed.clone(),
    );

    match result {
        Err(DominanceError::Acquisition(message)) => assert_eq!(message, "input unavailable"),
        other => panic!("expected acquisition failure, got {other:?}"),
    }
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    pipeline.join().unwrap();

    // The consumer never saw a run, so it is not told one stopped.
    let observed = observed.0.lock().unwrap();
    assert!(observed.values.is_empty());
    assert!(observed.failures.is_empty());
    assert!(!observed.stopped);
}

#[test]
fn invalid_stream_config_fails_acquisition() {
    let mut pipeline = DominancePipeline::new(AnalysisConfig::default()).unwrap();
    let result = pipeline.start(
        |config: &AnalysisConfig| {
            let full = AnalysisConfig {
                overlap: config.buffer_size,
                ..config.clone()
            };
            ChunkSource::channel(&full).map(|(_, source)| source)
        },
        |_: f32| {},
    );

    assert!(matches!(result, Err(DominanceError::InvalidConfig(_))));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[test]
fn mid_run_failure_reaches_consumer_after_prior_values() {
    let config = AnalysisConfig::default();
    let source = FailingSource {
        first: Some(tone(200, config.buffer_size, 0.5)),
    };
    let observed = Collector::default();

    let mut pipeline = DominancePipeline::new(config).unwrap();
    pipeline.start(move |_| Ok(source), observed.clone()).unwrap();
    pipeline.join().unwrap();

    assert_eq!(pipeline.state(), PipelineState::Stopped);
    let observed = observed.0.lock().unwrap();
    assert_eq!(observed.values.len(), 1);
    assert_eq!(observed.failures, vec!["frame source failed: device unplugged"]);
    assert!(observed.stopped);
}

#[test]
fn slow_consumer_does_not_hold_back_the_worker() {
    let config = AnalysisConfig {
        sample_rate: 1024,
        buffer_size: 64,
        overlap: 0,
        ..Default::default()
    };
    let source = ScriptedSource {
        buffers: (0..5).map(|_| tone(4, 64, 1.0)).collect(),
        released: Arc::default(),
    };
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);

    let mut pipeline = DominancePipeline::new(config).unwrap();
    pipeline
        .start(move |_| Ok(source), move |value: f32| {
            thread::sleep(Duration::from_millis(50));
            sink.lock().unwrap().push(value);
        })
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.state() != PipelineState::Stopped && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(delivered.lock().unwrap().len() < 5);

    pipeline.join().unwrap();
    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len(), 5);
    assert!(delivered.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn overlapping_chunks_from_a_stream_are_analysed() {
    // 100 periods per window and 25 per hop: every window sees the same tone.
    let config = AnalysisConfig::default();
    let samples = tone_over(
        100,
        config.buffer_size,
        config.buffer_size + 2 * config.hop_size(),
        0.5,
    );
    let source = stream(&config, &samples);

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut pipeline = DominancePipeline::new(config).unwrap();
    pipeline
        .start(move |_| Ok(source), move |value: f32| tx.send(value).unwrap())
        .unwrap();
    pipeline.join().unwrap();

    let expected = BinFrequencyTable::new(22_050, 4096).as_slice()[100];
    let values = collect(&rx);
    assert_eq!(values.len(), 3);
    for value in values {
        assert_abs_diff_eq!(value as f64, expected, epsilon = 1.0);
    }
    assert_eq!(pipeline.stats().indeterminate_frames, 0);
}

#[test]
fn streamed_silence_then_tone_with_overlap() {
    let config = AnalysisConfig::default();
    let mut samples = vec![0.0; config.buffer_size];
    samples.extend(tone_over(
        100,
        config.buffer_size,
        config.buffer_size + config.hop_size(),
        0.5,
    ));
    let source = stream(&config, &samples);

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut pipeline = DominancePipeline::new(config).unwrap();
    pipeline
        .start(move |_| Ok(source), move |value: f32| tx.send(value).unwrap())
        .unwrap();
    pipeline.join().unwrap();

    // One silent window, three straddling the onset, two of pure tone. The
    // tail left after the last window is exactly the overlap, so no padded
    // buffer follows.
    let stats = pipeline.stats();
    assert_eq!(stats.frames_processed, 6);
    assert_eq!(stats.indeterminate_frames, 1);

    let expected = BinFrequencyTable::new(22_050, 4096).as_slice()[100];
    let values = collect(&rx);
    assert_eq!(values.len(), 5);
    let pure = &values[3..];
    for value in pure {
        assert_abs_diff_eq!(*value as f64, expected, epsilon = 1.0);
    }
    assert_abs_diff_eq!(pure[0], pure[1], epsilon = 1e-3);
}

#[test]
fn wav_file_drives_the_pipeline() {
    let config = AnalysisConfig::default();
    let path = std::env::temp_dir().join(format!(
        "spectral-dominance-pipeline-{}.wav",
        std::process::id()
    ));
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: config.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let mut samples = vec![0.0; config.buffer_size];
    samples.extend(tone(100, config.buffer_size, 0.5));
    for sample in &samples {
        writer.write_sample(*sample).unwrap();
    }
    writer.finalize().unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut pipeline = DominancePipeline::new(config).unwrap();
    let wav = path.clone();
    pipeline
        .start(
            move |config: &AnalysisConfig| WavSource::open(&wav, config),
            move |value: f32| tx.send(value).unwrap(),
        )
        .unwrap();
    pipeline.join().unwrap();
    std::fs::remove_file(&path).ok();

    // Silence, three windows straddling the tone onset, then the pure tone.
    let stats = pipeline.stats();
    assert_eq!(stats.frames_processed, 5);
    assert_eq!(stats.indeterminate_frames, 1);
    let values = collect(&rx);
    assert_eq!(values.len(), 4);
    assert_abs_diff_eq!(
        *values.last().unwrap() as f64,
        100.0 * 22_050.0 / 4096.0,
        epsilon = 1.0
    );
}
