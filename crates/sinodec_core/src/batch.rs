//! Background batch runs.
//!
//! [`BatchManager`] runs an [`OutOfCoreVolumePipeline`] on a worker thread,
//! exposes its progress through a polled state and owns the cancel flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::warn;

use crate::config::PipelineConfig;
use crate::error::{SinoError, SinoResult};
use crate::progress::PipelineProgress;
use crate::sinogram::ImageSource;
use crate::volume::{MemorySink, OutOfCoreVolumePipeline};

/// Batch state for front ends.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BatchState {
    #[default]
    Idle,
    Processing {
        /// Slices stored plus projections emitted so far.
        completed_units: usize,
        /// Slices plus projections of the whole run.
        total_units: usize,
    },
    Completed,
    Cancelled,
    Error(String),
}

type Worker = JoinHandle<SinoResult<MemorySink>>;

/// Manager for a background batch run into a [`MemorySink`].
pub struct BatchManager {
    /// Current state
    state: BatchState,
    /// Channel to receive progress updates
    progress_rx: Option<Receiver<PipelineProgress>>,
    /// Cancel flag shared with the worker thread
    cancel_flag: Arc<AtomicBool>,
    /// Handle to the worker thread
    worker_handle: Option<Worker>,
    /// Projections of the last completed run
    result: Option<MemorySink>,
}

impl Default for BatchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchManager {
    pub fn new() -> Self {
        Self {
            state: BatchState::Idle,
            progress_rx: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            worker_handle: None,
            result: None,
        }
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.state, BatchState::Processing { .. })
    }

    pub fn take_result(&mut self) -> Option<MemorySink> {
        self.result.take()
    }

    /// Start a batch run over `source` with `config`.
    pub fn start<S>(&mut self, source: S, config: PipelineConfig)
    where
        S: ImageSource<f32> + 'static,
    {
        // Cancel any existing run
        self.cancel();

        self.cancel_flag = Arc::new(AtomicBool::new(false));
        self.result = None;

        let (tx, rx) = channel();
        self.progress_rx = Some(rx);
        let cancel_flag = self.cancel_flag.clone();

        let handle = thread::spawn(move || -> SinoResult<MemorySink> {
            let pipeline = OutOfCoreVolumePipeline::new(config)?
                .with_observer(Arc::new(tx))
                .with_cancel_flag(cancel_flag);
            let mut sink = MemorySink::new();
            pipeline.run(&source, &mut sink)?;
            Ok(sink)
        });

        self.worker_handle = Some(handle);
        self.state = BatchState::Processing {
            completed_units: 0,
            total_units: 0,
        };
    }

    /// Request cancellation and wait for the worker to stop.
    pub fn cancel(&mut self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            self.finish(handle);
        }
        self.progress_rx = None;
    }

    /// Poll for progress updates without blocking.
    pub fn poll_progress(&mut self) {
        let mut messages = Vec::new();
        if let Some(rx) = &self.progress_rx {
            messages.extend(rx.try_iter());
        }

        for progress in messages {
            match progress {
                PipelineProgress::Started { slices, angles } => {
                    self.state = BatchState::Processing {
                        completed_units: 0,
                        total_units: slices + angles,
                    };
                }
                PipelineProgress::Slice { .. } | PipelineProgress::Projection { .. } => {
                    if let BatchState::Processing {
                        completed_units, ..
                    } = &mut self.state
                    {
                        *completed_units += 1;
                    }
                }
                PipelineProgress::Finished { .. } | PipelineProgress::Cancelled { .. } => {}
            }
        }

        let finished = self
            .worker_handle
            .as_ref()
            .map_or(false, |h| h.is_finished());
        if finished {
            if let Some(handle) = self.worker_handle.take() {
                self.finish(handle);
            }
        }
    }

    /// Block until the current run ends and return the final state.
    pub fn wait(&mut self) -> &BatchState {
        if let Some(handle) = self.worker_handle.take() {
            self.finish(handle);
        }
        &self.state
    }

    /// Reset to idle, cancelling any run.
    pub fn reset(&mut self) {
        self.cancel();
        self.state = BatchState::Idle;
        self.result = None;
    }

    fn finish(&mut self, handle: Worker) {
        self.state = match handle.join() {
            Ok(Ok(sink)) => {
                self.result = Some(sink);
                BatchState::Completed
            }
            Ok(Err(SinoError::Cancelled { .. })) => BatchState::Cancelled,
            Ok(Err(e)) => BatchState::Error(e.to_string()),
            Err(_) => {
                warn!("batch: worker thread panicked");
                BatchState::Error("batch worker panicked".to_string())
            }
        };
        self.progress_rx = None;
    }
}
