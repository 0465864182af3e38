use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::AnalysisConfig;

/// Taper applied to each buffer before the forward transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowFunction {
    /// No tapering; samples enter the transform untouched.
    #[default]
    Rectangular,
    Hann,
    Hamming,
}

impl WindowFunction {
    /// Precomputes the window coefficients for a buffer of `len` samples.
    pub fn coefficients(self, len: usize) -> Vec<f32> {
        (0..len).map(|index| self.value(index, len)).collect()
    }

    fn value(self, index: usize, len: usize) -> f32 {
        if len <= 1 {
            return 1.0;
        }

        let phase = (2.0 * PI * index as f32) / (len as f32 - 1.0);
        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5 - 0.5 * phase.cos(),
            WindowFunction::Hamming => 0.54 - 0.46 * phase.cos(),
        }
    }
}

/// Centre frequency in Hz of every retained bin.
///
/// Built once when a pipeline starts and shared read-only with every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BinFrequencyTable {
    frequencies: Arc<[f64]>,
    resolution: f64,
}

impl BinFrequencyTable {
    /// Maps bin `i` to `i * sample_rate / buffer_size` for the first
    /// `buffer_size / 2` bins.
    pub fn new(sample_rate: u32, buffer_size: usize) -> Self {
        let resolution = f64::from(sample_rate) / buffer_size as f64;
        let frequencies = (0..buffer_size / 2)
            .map(|bin| bin as f64 * f64::from(sample_rate) / buffer_size as f64)
            .collect();
        Self {
            frequencies,
            resolution,
        }
    }

    /// Table for the configured sample rate and buffer size.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.sample_rate, config.buffer_size)
    }

    /// Number of retained bins, `buffer_size / 2`.
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Width of a single bin in Hz.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Frequencies in Hz, indexed by bin.
    pub fn as_slice(&self) -> &[f64] {
        &self.frequencies
    }
}

/// Real-input forward FFT producing the half-spectrum magnitude vector.
///
/// Owns its planner output and scratch space so a frame never allocates
/// anything besides the returned magnitudes.
pub struct SpectralTransform {
    buffer_size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl SpectralTransform {
    /// Plans a forward transform for `buffer_size` samples and precomputes
    /// the window coefficients.
    pub fn new(buffer_size: usize, window: WindowFunction) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(buffer_size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        Self {
            buffer_size,
            plan,
            window: window.coefficients(buffer_size),
            input,
            spectrum,
            scratch,
        }
    }

    /// Transform for the configured buffer size and window.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.buffer_size, config.window)
    }

    /// Number of magnitudes produced per buffer.
    pub fn fft_size(&self) -> usize {
        self.buffer_size / 2
    }

    /// Transforms one sample buffer into `buffer_size / 2` bin magnitudes.
    ///
    /// # Panics
    ///
    /// Panics when `samples` is not exactly `buffer_size` long.
    pub fn magnitudes(&mut self, samples: &[f32]) -> Vec<f32> {
        assert_eq!(
            samples.len(),
            self.buffer_size,
            "sample buffer length does not match transform size"
        );

        for ((slot, sample), coefficient) in self.input.iter_mut().zip(samples).zip(&self.window) {
            *slot = sample * coefficient;
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .expect("fft buffers are sized by the plan");

        self.spectrum[..self.fft_size()]
            .iter()
            .map(|bin| bin.norm())
            .collect()
    }
}

impl fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}
