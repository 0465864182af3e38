use std::{fs::File, io::BufReader, path::Path};

use hound::{SampleFormat, WavReader, WavSpec};
use tracing::debug;

use super::{FrameAssembler, FrameSource};
use crate::{AnalysisConfig, DominanceError, Result};

/// File-backed frame source reading a WAV file incrementally.
///
/// Multi-channel files are averaged down to mono. The file must already be at
/// the configured sample rate.
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    spec: WavSpec,
    assembler: FrameAssembler,
    chunk_frames: usize,
    exhausted: bool,
}

impl WavSource {
    pub fn open(path: impl AsRef<Path>, config: &AnalysisConfig) -> Result<Self> {
        let path = path.as_ref();
        let assembler = FrameAssembler::new(config)?;
        let reader = WavReader::open(path).map_err(|e| {
            DominanceError::acquisition(format!("cannot open {}: {e}", path.display()))
        })?;
        let spec = reader.spec();

        if spec.sample_rate != config.sample_rate {
            return Err(DominanceError::acquisition(format!(
                "{} is sampled at {} Hz but the pipeline expects {} Hz",
                path.display(),
                spec.sample_rate,
                config.sample_rate
            )));
        }

        debug!(
            path = %path.display(),
            channels = spec.channels,
            bits = spec.bits_per_sample,
            duration_frames = reader.duration(),
            "opened wav source"
        );

        Ok(Self {
            reader,
            spec,
            assembler,
            chunk_frames: config.hop_size(),
            exhausted: false,
        })
    }

    /// Reads up to `chunk_frames` frames and mixes them to mono.
    fn read_chunk(&mut self) -> Result<Vec<f32>> {
        let channels = usize::from(self.spec.channels.max(1));
        let wanted = self.chunk_frames * channels;

        let interleaved: Vec<f32> = match self.spec.sample_format {
            SampleFormat::Float => self
                .reader
                .samples::<f32>()
                .take(wanted)
                .collect::<std::result::Result<Vec<f32>, hound::Error>>(),
            SampleFormat::Int => {
                let max = ((1_i64 << (self.spec.bits_per_sample - 1)) - 1) as f32;
                self.reader
                    .samples::<i32>()
                    .take(wanted)
                    .map(|s| s.map(|v| v as f32 / max))
                    .collect::<std::result::Result<Vec<f32>, hound::Error>>()
            }
        }
        .map_err(DominanceError::source_failed)?;

        if channels == 1 {
            return Ok(interleaved);
        }

        Ok(interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect())
    }
}

impl FrameSource for WavSource {
    fn next_buffer(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            if let Some(frame) = self.assembler.next_frame() {
                return Ok(Some(frame));
            }
            if self.exhausted {
                return Ok(None);
            }

            let chunk = self.read_chunk()?;
            if chunk.is_empty() {
                self.exhausted = true;
                return Ok(self.assembler.finish());
            }
            self.assembler.push(&chunk);
        }
    }

    fn release(&mut self) {
        debug!("wav source released");
    }
}
