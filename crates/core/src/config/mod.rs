use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{DominanceError, RangeSeed, Result, WindowFunction};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = serde_json::from_str(&text)?;
        Ok(config)
    }
}

/// Parameters of the analysis pipeline. Fixed for the lifetime of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Rate the frame source delivers samples at, in Hz.
    pub sample_rate: u32,
    /// Samples per analysis buffer. Must be even.
    pub buffer_size: usize,
    /// Samples shared by consecutive buffers.
    pub overlap: usize,
    /// Minimum raw magnitude range a frame needs to yield a dominance index.
    pub threshold: f32,
    pub window: WindowFunction,
    pub range_seed: RangeSeed,
    /// Emit a zero-padded buffer for trailing samples at end of stream.
    pub pad_final_buffer: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            buffer_size: 4096,
            overlap: 3072,
            threshold: 10.0,
            window: WindowFunction::Rectangular,
            range_seed: RangeSeed::FirstMagnitude,
            pad_final_buffer: true,
        }
    }
}

impl AnalysisConfig {
    /// Number of magnitude bins retained per frame.
    pub fn fft_size(&self) -> usize {
        self.buffer_size / 2
    }

    /// Fresh samples consumed between consecutive buffers. Zero for an
    /// overlap that [`validate`](Self::validate) would reject.
    pub fn hop_size(&self) -> usize {
        self.buffer_size.saturating_sub(self.overlap)
    }

    /// Checks the buffering invariants, notably `0 <= overlap < buffer_size`.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(DominanceError::InvalidConfig(
                "sample rate must be positive".into(),
            ));
        }
        if self.buffer_size < 2 || self.buffer_size % 2 != 0 {
            return Err(DominanceError::InvalidConfig(format!(
                "buffer size must be an even number of at least 2 samples, got {}",
                self.buffer_size
            )));
        }
        if self.overlap >= self.buffer_size {
            return Err(DominanceError::InvalidConfig(format!(
                "overlap ({}) must be smaller than buffer size ({})",
                self.overlap, self.buffer_size
            )));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(DominanceError::InvalidConfig(format!(
                "threshold must be a finite non-negative value, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}
