//! Sinogram Restoration Core Library
//!
//! Pure Rust implementation of the optical projection tomography sinogram
//! restoration pipeline: centering, PSF-based spectral deconvolution and
//! wavelet-domain artifact suppression, plus an out-of-core batch driver that
//! reslices corrected sinograms into 16-bit projections. This crate contains
//! all algorithm logic without Python bindings.

pub mod acquisition;
pub mod batch;
pub mod centering;
pub mod config;
pub mod deconvolution;
pub mod error;
pub mod filters;
pub mod float_trait;
pub mod orchestration;
pub mod progress;
pub mod psf;
pub mod reslice;
pub mod sinogram;
pub mod store;
pub mod tiff_io;
pub mod transforms;
pub mod volume;
pub mod wavelet;

// Re-export commonly used types at the crate root
pub use acquisition::{parse_drift_csv, read_drift_csv, ScanLog};
pub use batch::{BatchManager, BatchState};
pub use centering::{correlation_coefficient, estimate_shift, roll_pixels};
pub use config::{
    CorrectionOrder, PipelineConfig, ShiftMode, TransformBackend, ZeroCrossingPolicy,
};
pub use deconvolution::{
    build_rolloff_filter, deconvolve, radial_coordinates, DeconvolutionParams,
    SpectralDeconvolver,
};
pub use error::{PipelineStage, SinoError, SinoResult};
pub use float_trait::SinoFloat;
pub use orchestration::{
    acquisition_angles, correct_sinogram, preview_slice, PreviewResult, Reconstructor,
    SliceCorrector,
};
pub use progress::{LogProgress, PipelineProgress, ProgressObserver, SilentProgress};
pub use psf::estimate_psf;
pub use reslice::{reslice_projection, DynamicRange};
pub use sinogram::{
    assemble_sinogram, AngleSet, DriftCorrectedSource, ImageSource, ProjectionDrift, StackSource,
};
pub use store::OutOfCoreStore;
pub use tiff_io::{TiffDirectorySource, TiffProjectionSink};
#[cfg(feature = "half-spectrum")]
pub use transforms::HalfSpectrumTransform;
pub use transforms::{
    plan_transform, plan_transform_with_fallback, DirectTransform, SpectralTransform,
};
pub use volume::{BatchSummary, MemorySink, OutOfCoreVolumePipeline, ProjectionSink};
pub use wavelet::{
    haar_dwt2, haar_idwt2, remove_artifacts, WaveletArtifactSuppressor, WaveletDecomposition,
};
