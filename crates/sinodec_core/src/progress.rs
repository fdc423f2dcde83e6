//! Progress reporting for the batch pipeline.
//!
//! Observers are purely observational: the pipeline never waits on them and
//! ignores delivery failures.

use std::sync::mpsc::Sender;

use log::info;

/// Progress update from a batch run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineProgress {
    /// Run started.
    Started { slices: usize, angles: usize },
    /// A slice was corrected and stored.
    Slice {
        index: usize,
        fraction: f64,
        status: String,
    },
    /// A projection was resliced and emitted.
    Projection {
        index: usize,
        fraction: f64,
        status: String,
    },
    /// Run finished successfully.
    Finished { projections: usize },
    /// Run was cancelled.
    Cancelled { completed: usize },
}

impl PipelineProgress {
    /// Fraction for per-unit events.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            PipelineProgress::Slice { fraction, .. }
            | PipelineProgress::Projection { fraction, .. } => Some(*fraction),
            _ => None,
        }
    }
}

/// Receiver of progress events.
pub trait ProgressObserver: Send + Sync {
    fn report(&self, event: PipelineProgress);
}

impl ProgressObserver for Sender<PipelineProgress> {
    fn report(&self, event: PipelineProgress) {
        // A dropped receiver just stops listening.
        let _ = self.send(event);
    }
}

/// Forwards every event to the `log` facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn report(&self, event: PipelineProgress) {
        match event {
            PipelineProgress::Started { slices, angles } => {
                info!("batch: started, {slices} slices x {angles} angles");
            }
            PipelineProgress::Slice {
                fraction, status, ..
            }
            | PipelineProgress::Projection {
                fraction, status, ..
            } => info!("batch: {:5.1}% {status}", fraction * 100.0),
            PipelineProgress::Finished { projections } => {
                info!("batch: finished, {projections} projections written");
            }
            PipelineProgress::Cancelled { completed } => {
                info!("batch: cancelled after {completed} units");
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressObserver for SilentProgress {
    fn report(&self, _event: PipelineProgress) {}
}
