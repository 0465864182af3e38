//! Microphone capture through cpal.
//!
//! `cpal::Stream` is `!Send` on most platforms, so a [`LiveSource`] has to be
//! opened and dropped on the same thread. The pipeline satisfies this by
//! acquiring its source on the analysis worker itself.

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, warn};

use super::{FrameAssembler, FrameSource};
use crate::{AnalysisConfig, DominanceError, Result};

/// Frame source fed by the default input device.
pub struct LiveSource {
    stream: Stream,
    chunks: Receiver<Vec<f32>>,
    failures: Receiver<String>,
    assembler: FrameAssembler,
}

impl LiveSource {
    /// Opens the default input device at `config.sample_rate`.
    pub fn open(config: &AnalysisConfig) -> Result<Self> {
        let assembler = FrameAssembler::new(config)?;
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| DominanceError::acquisition("no default input device found"))?;

        let supported = device
            .default_input_config()
            .map_err(DominanceError::acquisition)?;
        let stream_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            sample_rate = config.sample_rate,
            channels = stream_config.channels,
            "opening input device"
        );

        let (chunk_tx, chunks) = crossbeam_channel::unbounded();
        let (failure_tx, failures) = crossbeam_channel::unbounded();

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, chunk_tx, failure_tx),
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, chunk_tx, failure_tx),
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, chunk_tx, failure_tx),
            other => Err(DominanceError::acquisition(format!(
                "unsupported input sample format {other:?}"
            ))),
        }?;

        stream.play().map_err(DominanceError::acquisition)?;

        Ok(Self {
            stream,
            chunks,
            failures,
            assembler,
        })
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    chunks: Sender<Vec<f32>>,
    failures: Sender<String>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| {
                        frame.iter().map(|s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32
                    })
                    .collect();
                if chunks.send(mono).is_err() {
                    warn!("live source dropped; discarding captured samples");
                }
            },
            move |err| {
                error!("audio stream error: {err}");
                let _ = failures.send(err.to_string());
            },
            None,
        )
        .map_err(DominanceError::acquisition)
}

impl FrameSource for LiveSource {
    fn next_buffer(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            if let Some(frame) = self.assembler.next_frame() {
                return Ok(Some(frame));
            }

            crossbeam_channel::select! {
                recv(self.chunks) -> chunk => match chunk {
                    Ok(chunk) => self.assembler.push(&chunk),
                    Err(_) => return Ok(None),
                },
                recv(self.failures) -> failure => match failure {
                    Ok(message) => return Err(DominanceError::source_failed(message)),
                    Err(_) => return Ok(None),
                },
            }
        }
    }

    fn release(&mut self) {
        if let Err(e) = self.stream.pause() {
            warn!("failed to pause input stream: {e}");
        }
        info!("input device released");
    }
}
