//! Pipeline configuration.
//!
//! A single value object carries every tunable of the preview and batch
//! pipelines. It is serde-serializable so front ends can hand it over as JSON.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{SinoError, SinoResult};

// =============================================================================
// Constants
// =============================================================================

/// Default reconstruction output size (pixels per side).
pub const DEFAULT_OUTPUT_SIZE: usize = 512;

/// Default Wiener regularization term.
pub const DEFAULT_NOISE_LEVEL: f64 = 0.05;

/// Default detector pixel size (arbitrary units, only the ratio matters).
pub const DEFAULT_PIXEL_SIZE: f64 = 1.0;

/// Default roll-off taper width on the `line` coordinate.
pub const DEFAULT_ROLLOFF_WIDTH: f64 = 0.3;

/// Default median window for the approximation subband.
pub const DEFAULT_SIGMA: usize = 5;

/// Default number of candidate shifts tried by the centering search.
pub const DEFAULT_CENTERING_SPAN: usize = 50;

/// Environment variable consulted when no scratch directory is configured.
pub const SCRATCH_DIR_ENV: &str = "SINODEC_SCRATCH_DIR";

// =============================================================================
// Types
// =============================================================================

/// How the centering shift is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftMode {
    /// Estimate the shift from the sinogram.
    #[default]
    Auto,
    /// Use a fixed, user-supplied shift.
    Override(i32),
}

/// Roll-off behavior where the pixel-frequency coordinate is exactly zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroCrossingPolicy {
    /// Treat the zero-frequency row as passband (filter value 1.0).
    #[default]
    Passband,
    /// Fail with `DegenerateGeometry`.
    Reject,
}

/// Order of the two corrections when both are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionOrder {
    #[default]
    DeconvolveThenRemove,
    RemoveThenDeconvolve,
}

/// Spectral transform implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformBackend {
    /// Full complex 2D transform.
    #[default]
    Direct,
    /// Real-input half-spectrum transform with symmetric expansion.
    HalfSpectrum,
}

impl TransformBackend {
    pub fn name(self) -> &'static str {
        match self {
            TransformBackend::Direct => "direct",
            TransformBackend::HalfSpectrum => "half-spectrum",
        }
    }
}

/// Configuration for the sinogram restoration pipelines.
///
/// All parameters have defaults matching the interactive tool.
/// Use `Default::default()` for standard settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Centering shift: auto-detect or override. Default: Auto
    pub shift: ShiftMode,
    /// Reconstructed slice size. Default: 512
    pub output_size: usize,
    /// Wiener regularization. Default: 0.05
    pub noise_level: f64,
    /// Detector pixel size. Default: 1.0
    pub pixel_size: f64,
    /// Roll-off taper width. Default: 0.3
    pub rolloff_width: f64,
    /// Zero-crossing handling of the radial coordinate. Default: Passband
    pub zero_crossing: ZeroCrossingPolicy,
    /// Median window of the wavelet suppressor. Default: 5
    pub sigma: usize,
    /// Half-open slice range `[low, high)`; `None` processes every slice.
    pub slice_range: Option<(usize, usize)>,
    /// Run the spectral deconvolver. Default: true
    pub apply_deconvolution: bool,
    /// Run the wavelet artifact suppressor. Default: true
    pub apply_artifact_removal: bool,
    /// Order of the corrections. Default: DeconvolveThenRemove
    pub order: CorrectionOrder,
    /// Number of candidate shifts for centering. Default: 50
    pub centering_span: usize,
    /// Scan covers 360 degrees. Default: true
    pub full_rotation: bool,
    /// Spectral transform backend. Default: Direct
    pub backend: TransformBackend,
    /// Process slices concurrently in the batch pipeline. Default: true
    pub parallel: bool,
    /// Directory for the out-of-core store.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shift: ShiftMode::Auto,
            output_size: DEFAULT_OUTPUT_SIZE,
            noise_level: DEFAULT_NOISE_LEVEL,
            pixel_size: DEFAULT_PIXEL_SIZE,
            rolloff_width: DEFAULT_ROLLOFF_WIDTH,
            zero_crossing: ZeroCrossingPolicy::Passband,
            sigma: DEFAULT_SIGMA,
            slice_range: None,
            apply_deconvolution: true,
            apply_artifact_removal: true,
            order: CorrectionOrder::DeconvolveThenRemove,
            centering_span: DEFAULT_CENTERING_SPAN,
            full_rotation: true,
            backend: TransformBackend::Direct,
            parallel: true,
            scratch_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a (possibly partial) JSON document; missing keys take defaults.
    pub fn from_json_str(json: &str) -> SinoResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SinoError::InvalidConfig(format!("malformed JSON config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> SinoResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SinoError::InvalidConfig(format!("cannot serialize config: {e}")))
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> SinoResult<()> {
        let invalid = |msg: &str| Err(SinoError::InvalidConfig(msg.to_string()));
        if self.output_size == 0 {
            return invalid("output_size must be > 0");
        }
        if !(self.noise_level.is_finite() && self.noise_level > 0.0) {
            return invalid("noise_level must be finite and > 0");
        }
        if !(self.pixel_size.is_finite() && self.pixel_size > 0.0) {
            return invalid("pixel_size must be finite and > 0");
        }
        if !(self.rolloff_width.is_finite() && self.rolloff_width > 0.0) {
            return invalid("rolloff_width must be finite and > 0");
        }
        if self.sigma == 0 {
            return invalid("sigma must be >= 1");
        }
        if self.centering_span == 0 {
            return invalid("centering_span must be > 0");
        }
        if let Some((low, high)) = self.slice_range {
            if low >= high {
                return invalid("slice_range must satisfy low < high");
            }
        }
        Ok(())
    }

    /// Resolve the directory for the out-of-core store.
    ///
    /// Precedence: explicit `scratch_dir`, then `SINODEC_SCRATCH_DIR`, then the
    /// system temp dir.
    pub fn resolve_scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .or_else(|| {
                std::env::var(SCRATCH_DIR_ENV)
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Clamp the configured slice range to a stack of `slice_count` slices.
    pub fn resolve_slice_range(&self, slice_count: usize) -> SinoResult<(usize, usize)> {
        let (low, high) = self.slice_range.unwrap_or((0, slice_count));
        if low >= high || high > slice_count {
            return Err(SinoError::InvalidConfig(format!(
                "slice range [{low}, {high}) outside stack of {slice_count} slices"
            )));
        }
        Ok((low, high))
    }
}
