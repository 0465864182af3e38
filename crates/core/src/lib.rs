//! Core library for the spectral dominance analyser.
//!
//! A [`DominancePipeline`] pulls overlapping mono buffers from a
//! [`FrameSource`], transforms each one into a half-spectrum magnitude vector
//! and reduces it to a single dominance index: the mean bin frequency weighted
//! by min-max rescaled magnitudes. Values reach a [`DominanceListener`] in
//! frame order on a separate delivery thread.
//!
//! ```text
//! FrameSource ─► SpectralTransform ─► DominanceReducer ─► delivery queue ─► listener
//!                      (worker thread)                       (delivery thread)
//! ```

pub mod analysis;
pub mod config;
pub mod delivery;
pub mod dominance;
pub mod error;
pub mod pipeline;
pub mod source;

pub use analysis::{BinFrequencyTable, SpectralTransform, WindowFunction};
pub use config::{AnalysisConfig, AppConfig};
pub use delivery::DominanceListener;
pub use dominance::{DominanceReducer, RangeSeed};
pub use error::{DominanceError, Result};
pub use pipeline::{DominancePipeline, PipelineState, PipelineStats};
#[cfg(feature = "live")]
pub use source::LiveSource;
pub use source::{ChunkSource, FrameAssembler, FrameSource, WavSource};
