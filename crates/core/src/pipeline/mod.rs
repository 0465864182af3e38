//! Analysis loop and its lifecycle.
//!
//! ```text
//! DominancePipeline::new()      state = Idle
//!     └─► start(acquire, listener)
//!             worker acquires source  → Err: state = Stopped, error returned
//!                                     → Ok:  state = Running
//!         └─► cancel()                state = Cancelling
//!             worker reaches a frame boundary, releases source
//!                                     state = Stopped
//! ```
//!
//! One worker thread runs the loop. Each iteration pulls one buffer, transforms
//! it and reduces it to at most one dominance index, which is queued for the
//! delivery thread. Cancellation is checked before pulling a buffer and again
//! once the pull returns, so a buffer that arrives after `cancel()` is dropped
//! unprocessed. A stopped pipeline cannot be restarted.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, trace};

use crate::{
    delivery::{delivery_channel, spawn_dispatcher, DeliverySender},
    AnalysisConfig, BinFrequencyTable, DominanceError, DominanceListener, DominanceReducer,
    FrameSource, Result, SpectralTransform,
};

/// Lifecycle of a [`DominancePipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Running,
    Cancelling,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Cancelling => "cancelling",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters updated by the worker once per frame.
#[derive(Debug, Default)]
struct PipelineCounters {
    frames: AtomicU64,
    indeterminate: AtomicU64,
    emitted: AtomicU64,
}

/// Snapshot of the frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub indeterminate_frames: u64,
    pub values_emitted: u64,
}

/// Control surface of the analysis pipeline.
pub struct DominancePipeline {
    config: AnalysisConfig,
    state: Arc<Mutex<PipelineState>>,
    counters: Arc<PipelineCounters>,
    bins: Option<BinFrequencyTable>,
    worker: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl DominancePipeline {
    /// Creates an idle pipeline. Fails if the configuration is invalid.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Arc::new(Mutex::new(PipelineState::Idle)),
            counters: Arc::new(PipelineCounters::default()),
            bins: None,
            worker: None,
            dispatcher: None,
        })
    }

    /// Configuration the pipeline was created with.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Current lifecycle state (snapshot).
    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Bin frequency table, available once the pipeline has been started.
    pub fn bin_frequencies(&self) -> Option<&BinFrequencyTable> {
        self.bins.as_ref()
    }

    /// Frame counters accumulated by the worker so far.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames_processed: self.counters.frames.load(Ordering::Relaxed),
            indeterminate_frames: self.counters.indeterminate.load(Ordering::Relaxed),
            values_emitted: self.counters.emitted.load(Ordering::Relaxed),
        }
    }

    /// Starts the analysis loop.
    ///
    /// `acquire` runs on the worker thread, so sources that must stay on the
    /// thread that opened them (such as cpal streams) work unchanged. This call
    /// blocks until acquisition has succeeded or failed.
    ///
    /// # Errors
    /// - [`DominanceError::InvalidState`] unless the pipeline is idle.
    /// - Whatever `acquire` returned, typically [`DominanceError::Acquisition`].
    /// - [`DominanceError::WorkerLost`] if the worker died before reporting.
    pub fn start<S, A, L>(&mut self, acquire: A, listener: L) -> Result<()>
    where
        S: FrameSource + 'static,
        A: FnOnce(&AnalysisConfig) -> Result<S> + Send + 'static,
        L: DominanceListener,
    {
        {
            let mut state = self.state.lock();
            if *state != PipelineState::Idle {
                return Err(DominanceError::InvalidState {
                    operation: "start",
                    state: *state,
                });
            }
            *state = PipelineState::Running;
        }

        let bins = BinFrequencyTable::from_config(&self.config);
        debug!(
            bins = bins.len(),
            resolution_hz = bins.resolution(),
            highest_hz = bins.as_slice().last().copied().unwrap_or_default(),
            "bin frequency table ready"
        );
        self.bins = Some(bins.clone());

        let (delivery, deliveries) = delivery_channel();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let config = self.config.clone();
        let state = Arc::clone(&self.state);
        let counters = Arc::clone(&self.counters);

        let spawned = thread::Builder::new()
            .name("dominance-analysis".into())
            .spawn(move || {
                let _stopped = StopOnExit(Arc::clone(&state));

                // Acquire on this thread; the source never crosses threads.
                let source = match acquire(&config) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                AnalysisLoop {
                    source,
                    transform: SpectralTransform::from_config(&config),
                    reducer: DominanceReducer::from_config(&config),
                    bins,
                    state,
                    counters,
                    delivery,
                }
                .run();
            });

        match spawned {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                self.set_state(PipelineState::Stopped);
                return Err(e.into());
            }
        }

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("frame source acquisition failed: {e}");
                let _ = self.join();
                self.set_state(PipelineState::Stopped);
                return Err(e);
            }
            Err(_) => {
                let _ = self.join();
                self.set_state(PipelineState::Stopped);
                return Err(DominanceError::WorkerLost);
            }
        }

        // The listener only gets a dispatcher once a source exists, so a
        // failed start never reaches `on_stopped`.
        match spawn_dispatcher(deliveries, listener) {
            Ok(dispatcher) => self.dispatcher = Some(dispatcher),
            Err(e) => {
                error!("cannot spawn delivery thread: {e}");
                self.cancel();
                return Err(e);
            }
        }

        info!(
            sample_rate = self.config.sample_rate,
            buffer_size = self.config.buffer_size,
            overlap = self.config.overlap,
            "dominance pipeline running"
        );
        Ok(())
    }

    /// Requests cooperative cancellation.
    ///
    /// A running loop moves to `Cancelling` and stops at its next frame
    /// boundary. An idle pipeline moves straight to `Stopped`.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        match *state {
            PipelineState::Running => {
                *state = PipelineState::Cancelling;
                info!("dominance pipeline cancellation requested");
            }
            PipelineState::Idle => *state = PipelineState::Stopped,
            PipelineState::Cancelling | PipelineState::Stopped => {}
        }
    }

    /// Waits for the worker to stop and for every queued value to be
    /// delivered.
    ///
    /// Blocks indefinitely while the loop is running and its source keeps
    /// producing; call [`cancel`](Self::cancel) first to bound the wait.
    pub fn join(&mut self) -> Result<()> {
        let mut lost = false;
        if let Some(worker) = self.worker.take() {
            lost |= worker.join().is_err();
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            lost |= dispatcher.join().is_err();
        }

        if lost {
            Err(DominanceError::WorkerLost)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, next: PipelineState) {
        *self.state.lock() = next;
    }
}

impl Drop for DominancePipeline {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for DominancePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DominancePipeline")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Marks the pipeline stopped when the worker exits, including by panic.
struct StopOnExit(Arc<Mutex<PipelineState>>);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        *self.0.lock() = PipelineState::Stopped;
    }
}

struct AnalysisLoop<S> {
    source: S,
    transform: SpectralTransform,
    reducer: DominanceReducer,
    bins: BinFrequencyTable,
    state: Arc<Mutex<PipelineState>>,
    counters: Arc<PipelineCounters>,
    delivery: DeliverySender,
}

impl<S: FrameSource> AnalysisLoop<S> {
    fn run(mut self) {
        loop {
            if self.cancel_requested() {
                debug!("cancellation observed at frame boundary");
                break;
            }

            let buffer = match self.source.next_buffer() {
                Ok(Some(buffer)) => buffer,
                Ok(None) => {
                    info!("frame source exhausted");
                    break;
                }
                Err(e) => {
                    error!("frame source failed mid-run: {e}");
                    self.delivery.failure(e);
                    break;
                }
            };

            if self.cancel_requested() {
                debug!("cancellation observed; discarding pending buffer");
                break;
            }

            self.process(&buffer);
        }

        self.source.release();
        info!("dominance pipeline stopped");
    }

    fn process(&mut self, buffer: &[f32]) {
        let magnitudes = self.transform.magnitudes(buffer);
        let frame = self.counters.frames.fetch_add(1, Ordering::Relaxed);

        match self.reducer.reduce(&magnitudes, &self.bins) {
            Some(value) => {
                self.counters.emitted.fetch_add(1, Ordering::Relaxed);
                self.delivery.value(value);
            }
            None => {
                self.counters.indeterminate.fetch_add(1, Ordering::Relaxed);
                trace!(frame, "indeterminate frame skipped");
            }
        }
    }

    fn cancel_requested(&self) -> bool {
        *self.state.lock() != PipelineState::Running
    }
}
