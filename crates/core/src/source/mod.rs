//! Frame sources deliver fixed-size mono buffers with a fixed overlap.
//!
//! Raw audio arrives in whatever chunk sizes the backend produces. The
//! [`FrameAssembler`] turns those chunks into `buffer_size` buffers that
//! advance by `hop_size` samples, so consecutive buffers share `overlap`
//! samples.

#[cfg(feature = "live")]
mod live;
mod wav;

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender};

use crate::{AnalysisConfig, Result};

#[cfg(feature = "live")]
pub use live::LiveSource;
pub use wav::WavSource;

/// Inbound collaborator of the analysis loop.
pub trait FrameSource {
    /// Blocks until the next buffer of exactly `buffer_size` samples is
    /// available. `Ok(None)` signals the end of the stream.
    fn next_buffer(&mut self) -> Result<Option<Vec<f32>>>;

    /// Releases the underlying input. Called once when the loop stops.
    fn release(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_buffer(&mut self) -> Result<Option<Vec<f32>>> {
        (**self).next_buffer()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Accumulates chunks and slices them into overlapping buffers.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    buffer_size: usize,
    hop_size: usize,
    pad_final_buffer: bool,
    pending: VecDeque<f32>,
    emitted: bool,
    finished: bool,
}

impl FrameAssembler {
    /// Creates an assembler for `config`.
    ///
    /// # Errors
    /// [`DominanceError::InvalidConfig`](crate::DominanceError::InvalidConfig)
    /// unless `0 <= overlap < buffer_size` and the rest of the configuration
    /// validates.
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            buffer_size: config.buffer_size,
            hop_size: config.hop_size(),
            pad_final_buffer: config.pad_final_buffer,
            pending: VecDeque::with_capacity(config.buffer_size * 2),
            emitted: false,
            finished: false,
        })
    }

    /// Appends raw samples to the pending queue.
    pub fn push(&mut self, samples: &[f32]) {
        self.pending.extend(samples.iter().copied());
    }

    /// Pops the next complete buffer, if enough samples are pending.
    pub fn next_frame(&mut self) -> Option<Vec<f32>> {
        if self.pending.len() < self.buffer_size {
            return None;
        }

        let frame: Vec<f32> = self.pending.iter().take(self.buffer_size).copied().collect();
        self.pending.drain(..self.hop_size);
        self.emitted = true;
        Some(frame)
    }

    /// Flushes the trailing samples at end of stream as one zero-padded
    /// buffer. Returns `None` when every pending sample was already part of
    /// an emitted buffer, or when padding is disabled.
    pub fn finish(&mut self) -> Option<Vec<f32>> {
        if self.finished {
            return None;
        }
        self.finished = true;

        if !self.pad_final_buffer || self.unseen_samples() == 0 {
            self.pending.clear();
            return None;
        }

        let mut frame: Vec<f32> = self.pending.drain(..).collect();
        frame.resize(self.buffer_size, 0.0);
        Some(frame)
    }

    /// Samples waiting that no emitted buffer has covered yet.
    pub fn unseen_samples(&self) -> usize {
        if self.emitted {
            let overlap = self.buffer_size - self.hop_size;
            self.pending.len().saturating_sub(overlap)
        } else {
            self.pending.len()
        }
    }
}

/// Frame source fed by a channel of raw sample chunks.
///
/// The stream ends once every [`Sender`] has been dropped.
#[derive(Debug)]
pub struct ChunkSource {
    chunks: Receiver<Vec<f32>>,
    assembler: FrameAssembler,
    exhausted: bool,
}

impl ChunkSource {
    /// Wraps an existing chunk receiver. Fails on an invalid configuration.
    pub fn new(chunks: Receiver<Vec<f32>>, config: &AnalysisConfig) -> Result<Self> {
        Ok(Self {
            chunks,
            assembler: FrameAssembler::new(config)?,
            exhausted: false,
        })
    }

    /// Creates a source together with the unbounded sender that feeds it.
    pub fn channel(config: &AnalysisConfig) -> Result<(Sender<Vec<f32>>, Self)> {
        let (tx, rx) = crossbeam_channel::unbounded();
        Ok((tx, Self::new(rx, config)?))
    }
}

impl FrameSource for ChunkSource {
    fn next_buffer(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            if let Some(frame) = self.assembler.next_frame() {
                return Ok(Some(frame));
            }
            if self.exhausted {
                return Ok(None);
            }

            match self.chunks.recv() {
                Ok(chunk) => self.assembler.push(&chunk),
                Err(_) => {
                    self.exhausted = true;
                    return Ok(self.assembler.finish());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DominanceError;

    fn small_config(buffer_size: usize, overlap: usize) -> AnalysisConfig {
        AnalysisConfig {
            buffer_size,
            overlap,
            ..Default::default()
        }
    }

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    #[test]
    fn consecutive_frames_share_overlap() {
        let mut assembler = FrameAssembler::new(&small_config(8, 6)).unwrap();
        assembler.push(&ramp(12));

        let first = assembler.next_frame().unwrap();
        let second = assembler.next_frame().unwrap();
        let third = assembler.next_frame().unwrap();
        assert_eq!(first, ramp(8));
        assert_eq!(&second[..6], &first[2..]);
        assert_eq!(third[0], 4.0);
        assert!(assembler.next_frame().is_none());
    }

    #[test]
    fn waits_for_a_full_buffer() {
        let mut assembler = FrameAssembler::new(&small_config(8, 0)).unwrap();
        assembler.push(&ramp(5));
        assert!(assembler.next_frame().is_none());
        assembler.push(&ramp(3));
        assert_eq!(assembler.next_frame().unwrap().len(), 8);
    }

    #[test]
    fn finish_pads_unseen_tail() {
        let mut assembler = FrameAssembler::new(&small_config(8, 4)).unwrap();
        assembler.push(&ramp(10));
        assert!(assembler.next_frame().is_some());
        assert_eq!(assembler.unseen_samples(), 2);

        let tail = assembler.finish().unwrap();
        assert_eq!(tail, vec![4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 0.0, 0.0]);
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn finish_skips_when_tail_already_covered() {
        let mut assembler = FrameAssembler::new(&small_config(8, 4)).unwrap();
        assembler.push(&ramp(8));
        assert!(assembler.next_frame().is_some());
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn finish_respects_disabled_padding() {
        let config = AnalysisConfig {
            pad_final_buffer: false,
            ..small_config(8, 0)
        };
        let mut assembler = FrameAssembler::new(&config).unwrap();
        assembler.push(&ramp(3));
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn chunk_source_reframes_and_ends() {
        let config = small_config(4, 2);
        let (tx, mut source) = ChunkSource::channel(&config).unwrap();
        tx.send(ramp(3)).unwrap();
        tx.send(vec![3.0, 4.0, 5.0]).unwrap();
        drop(tx);

        assert_eq!(source.next_buffer().unwrap(), Some(vec![0.0, 1.0, 2.0, 3.0]));
        assert_eq!(source.next_buffer().unwrap(), Some(vec![2.0, 3.0, 4.0, 5.0]));
        assert_eq!(source.next_buffer().unwrap(), None);
        assert_eq!(source.next_buffer().unwrap(), None);
    }

    #[test]
    fn full_overlap_is_rejected_by_every_constructor() {
        let full = small_config(8, 8);
        assert!(matches!(
            FrameAssembler::new(&full),
            Err(DominanceError::InvalidConfig(_))
        ));
        assert!(matches!(
            ChunkSource::channel(&full),
            Err(DominanceError::InvalidConfig(_))
        ));

        let (_tx, rx) = crossbeam_channel::unbounded();
        assert!(matches!(
            ChunkSource::new(rx, &small_config(8, 12)),
            Err(DominanceError::InvalidConfig(_))
        ));
    }

    #[test]
    fn chunk_source_with_minimal_hop_terminates() {
        let config = small_config(8, 7);
        let (tx, mut source) = ChunkSource::channel(&config).unwrap();
        tx.send(ramp(8)).unwrap();
        drop(tx);

        let mut frames = 0;
        while source.next_buffer().unwrap().is_some() {
            frames += 1;
            assert!(frames <= 2, "stream did not end");
        }
        assert_eq!(frames, 1);
    }
}
