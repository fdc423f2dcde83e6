//! Error types for the sinogram restoration pipeline.

use std::fmt;
use std::io;

use thiserror::Error;

/// Stage of the per-slice pipeline at which an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Assemble,
    Deconvolve,
    RemoveArtifacts,
    Store,
    Reslice,
    Emit,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Assemble => "assemble",
            PipelineStage::Deconvolve => "deconvolve",
            PipelineStage::RemoveArtifacts => "remove-artifacts",
            PipelineStage::Store => "store",
            PipelineStage::Reslice => "reslice",
            PipelineStage::Emit => "emit",
        };
        f.write_str(name)
    }
}

/// Errors raised by the restoration kernels and the batch driver.
#[derive(Debug, Error)]
pub enum SinoError {
    /// Sinogram, mask, spectrum or filter shapes disagree.
    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A geometric quantity (radial coordinate, pixel size) is undefined.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Requested transform backend cannot be initialized.
    #[error("transform backend '{backend}' unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// The memory-mapped volume store could not be created or accessed.
    #[error("out-of-core store failure during {operation}: {source}")]
    OutOfCoreIo {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An FFT backend rejected its buffers.
    #[error("transform failed: {0}")]
    Transform(String),

    /// An external collaborator (image source, sink, reconstructor) failed.
    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("batch cancelled after {completed} units")]
    Cancelled { completed: usize },

    /// Wraps an error with the unit it was raised from: the slice index for
    /// per-slice stages, the angle index for `Reslice` and `Emit`.
    #[error("unit {index} failed at stage {stage}: {source}")]
    Stage {
        index: usize,
        stage: PipelineStage,
        #[source]
        source: Box<SinoError>,
    },
}

impl SinoError {
    /// Attach unit/stage context to an error.
    pub fn at(self, index: usize, stage: PipelineStage) -> Self {
        SinoError::Stage {
            index,
            stage,
            source: Box::new(self),
        }
    }

    pub(crate) fn io(operation: &'static str, source: io::Error) -> Self {
        SinoError::OutOfCoreIo { operation, source }
    }

    /// Check that `found` equals `expected`, otherwise return `ShapeMismatch`.
    pub fn check_shape(
        context: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    ) -> SinoResult<()> {
        if expected == found {
            Ok(())
        } else {
            Err(SinoError::ShapeMismatch {
                context,
                expected,
                found,
            })
        }
    }
}

/// Crate-wide result alias.
pub type SinoResult<T> = Result<T, SinoError>;
