//! Reduction of a magnitude vector to its dominance index: the mean bin
//! frequency weighted by min-max rescaled magnitudes.

use serde::{Deserialize, Serialize};

use crate::{AnalysisConfig, BinFrequencyTable};

/// Starting value used when scanning magnitudes for their minimum and maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeSeed {
    /// Seed from the first magnitude, giving the true range of the frame.
    #[default]
    FirstMagnitude,
    /// Seed from zero. The range then always includes 0, so an all-positive
    /// spectrum is rescaled against 0 instead of its real minimum.
    Zero,
}

/// Pure min-max rescale and weighted-average reducer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DominanceReducer {
    threshold: f32,
    seed: RangeSeed,
}

impl DominanceReducer {
    /// Creates a reducer guarding on `threshold` raw magnitude units.
    pub fn new(threshold: f32, seed: RangeSeed) -> Self {
        Self { threshold, seed }
    }

    /// Reducer using the configured threshold and range seed.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.threshold, config.range_seed)
    }

    /// Returns the magnitude-weighted mean frequency of the frame, or `None`
    /// when the raw magnitude range is below the threshold or any magnitude
    /// is not finite.
    ///
    /// # Panics
    ///
    /// Panics when `magnitudes` and `bins` differ in length.
    pub fn reduce(&self, magnitudes: &[f32], bins: &BinFrequencyTable) -> Option<f32> {
        assert_eq!(
            magnitudes.len(),
            bins.len(),
            "magnitude vector and bin table lengths differ"
        );

        if magnitudes.iter().any(|m| !m.is_finite()) {
            return None;
        }

        let (min, max) = self.range(magnitudes)?;
        let span = max - min;
        if !span.is_finite() || span < self.threshold || span <= 0.0 {
            return None;
        }

        let mut numerator = 0.0_f64;
        let mut denominator = 0.0_f64;
        for (magnitude, hz) in magnitudes.iter().zip(bins.as_slice()) {
            let weight = f64::from((magnitude - min) / span);
            denominator += weight;
            numerator += hz * weight;
        }

        let value = (numerator / denominator) as f32;
        value.is_finite().then_some(value)
    }

    fn range(&self, magnitudes: &[f32]) -> Option<(f32, f32)> {
        let seed = match self.seed {
            RangeSeed::FirstMagnitude => *magnitudes.first()?,
            RangeSeed::Zero => 0.0,
        };

        Some(
            magnitudes
                .iter()
                .fold((seed, seed), |(min, max), &m| (min.min(m), max.max(m))),
        )
    }
}

impl Default for DominanceReducer {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}
