//! Single-slice restoration pipeline.
//!
//! This module ties the components together for one sinogram:
//! - Per-slice correction (deconvolution and artifact removal, in the
//!   configured order), shared with the batch driver
//! - Centering (auto-detected or overridden shift)
//! - Hand-off to the external reconstruction collaborator

use log::{debug, info};
use ndarray::{Array2, ArrayView2};

use crate::centering::{estimate_shift, roll_pixels};
use crate::config::{CorrectionOrder, PipelineConfig, ShiftMode};
use crate::deconvolution::SpectralDeconvolver;
use crate::error::{PipelineStage, SinoError, SinoResult};
use crate::float_trait::SinoFloat;
use crate::sinogram::{assemble_sinogram, AngleSet, ImageSource};
use crate::wavelet::WaveletArtifactSuppressor;

// =============================================================================
// Collaborators
// =============================================================================

/// External tomographic reconstruction (filtered back-projection or similar).
///
/// Receives a `(pixel, angle)` sinogram and the acquisition angles in
/// degrees; returns an `output_size x output_size` slice.
pub trait Reconstructor<F: SinoFloat> {
    fn reconstruct(
        &self,
        sinogram: ArrayView2<F>,
        angles: &AngleSet,
        output_size: usize,
    ) -> SinoResult<Array2<F>>;
}

// =============================================================================
// Slice Correction
// =============================================================================

/// Corrections applied to each sinogram of a run.
///
/// Plans are built once for the sinogram shape and reused for every slice.
pub struct SliceCorrector<F: SinoFloat> {
    deconvolver: Option<SpectralDeconvolver<F>>,
    suppressor: Option<WaveletArtifactSuppressor>,
    order: CorrectionOrder,
}

impl<F: SinoFloat> SliceCorrector<F> {
    pub fn new(
        deconvolver: Option<SpectralDeconvolver<F>>,
        suppressor: Option<WaveletArtifactSuppressor>,
        order: CorrectionOrder,
    ) -> Self {
        Self {
            deconvolver,
            suppressor,
            order,
        }
    }

    /// Build the corrections enabled in `config` for `(pixels, angles)`.
    pub fn from_config(config: &PipelineConfig, shape: (usize, usize)) -> SinoResult<Self> {
        let deconvolver = if config.apply_deconvolution {
            Some(SpectralDeconvolver::from_config(config, shape)?)
        } else {
            None
        };
        let suppressor = if config.apply_artifact_removal {
            Some(WaveletArtifactSuppressor::new(config.sigma)?)
        } else {
            None
        };
        Ok(Self::new(deconvolver, suppressor, config.order))
    }

    pub fn is_identity(&self) -> bool {
        self.deconvolver.is_none() && self.suppressor.is_none()
    }

    fn deconvolve(&self, sinogram: Array2<F>, slice: usize) -> SinoResult<Array2<F>> {
        match &self.deconvolver {
            Some(d) => d
                .deconvolve(sinogram.view())
                .map_err(|e| e.at(slice, PipelineStage::Deconvolve)),
            None => Ok(sinogram),
        }
    }

    fn remove_artifacts(&self, sinogram: Array2<F>, slice: usize) -> SinoResult<Array2<F>> {
        match &self.suppressor {
            Some(s) => s
                .remove_artifacts(sinogram.view())
                .map_err(|e| e.at(slice, PipelineStage::RemoveArtifacts)),
            None => Ok(sinogram),
        }
    }

    /// Apply the enabled corrections to the sinogram of `slice`.
    pub fn correct(&self, sinogram: Array2<F>, slice: usize) -> SinoResult<Array2<F>> {
        match self.order {
            CorrectionOrder::DeconvolveThenRemove => {
                let deblurred = self.deconvolve(sinogram, slice)?;
                self.remove_artifacts(deblurred, slice)
            }
            CorrectionOrder::RemoveThenDeconvolve => {
                let cleaned = self.remove_artifacts(sinogram, slice)?;
                self.deconvolve(cleaned, slice)
            }
        }
    }
}

// =============================================================================
// Preview Pipeline
// =============================================================================

/// Result of a single-slice preview.
#[derive(Debug, Clone)]
pub struct PreviewResult<F: SinoFloat> {
    /// Shift applied along the pixel axis.
    pub shift: i32,
    /// Corrected and centred sinogram handed to the reconstructor.
    pub sinogram: Array2<F>,
    /// Reconstructed slice.
    pub slice: Array2<F>,
}

/// Angles handed to the reconstructor for `count` projections.
pub fn acquisition_angles(count: usize, full_rotation: bool) -> AngleSet {
    if full_rotation {
        AngleSet::full_rotation(count)
    } else {
        AngleSet::uniform(count, 180.0)
    }
}

/// Resolve the centering shift for a sinogram.
pub fn resolve_shift<F: SinoFloat>(
    sinogram: ArrayView2<F>,
    config: &PipelineConfig,
) -> SinoResult<i32> {
    match config.shift {
        ShiftMode::Override(shift) => Ok(shift),
        ShiftMode::Auto => estimate_shift(sinogram, config.centering_span, config.full_rotation),
    }
}

/// Correct and centre an already assembled sinogram.
pub fn correct_sinogram<F: SinoFloat>(
    sinogram: Array2<F>,
    config: &PipelineConfig,
    slice: usize,
) -> SinoResult<(i32, Array2<F>)> {
    config.validate()?;
    let shift = resolve_shift(sinogram.view(), config)?;
    let corrector = SliceCorrector::from_config(config, sinogram.dim())?;
    let corrected = corrector.correct(sinogram, slice)?;
    Ok((shift, roll_pixels(corrected.view(), shift)))
}

/// Restore and reconstruct one slice of a projection stack.
pub fn preview_slice<F, S, R>(
    source: &S,
    slice: usize,
    config: &PipelineConfig,
    reconstructor: &R,
) -> SinoResult<PreviewResult<F>>
where
    F: SinoFloat,
    S: ImageSource<F> + ?Sized,
    R: Reconstructor<F> + ?Sized,
{
    let sinogram =
        assemble_sinogram(source, slice).map_err(|e| e.at(slice, PipelineStage::Assemble))?;
    let (shift, centred) = correct_sinogram(sinogram, config, slice)?;
    debug!("preview: slice {slice} shift {shift}");

    let angles = acquisition_angles(centred.ncols(), config.full_rotation);
    let image = reconstructor.reconstruct(centred.view(), &angles, config.output_size)?;
    let size = config.output_size;
    SinoError::check_shape("reconstructed slice", (size, size), image.dim())?;

    info!(
        "preview: slice {slice} reconstructed at {size}x{size} (shift {shift}, deconvolution {}, artifact removal {})",
        config.apply_deconvolution, config.apply_artifact_removal
    );
    Ok(PreviewResult {
        shift,
        sinogram: centred,
        slice: image,
    })
}
