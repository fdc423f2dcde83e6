//! Regularized spectral deconvolution.
//!
//! The sinogram spectrum is divided by the data-derived PSF through a
//! Wiener-style filter and apodized by a roll-off window keyed on the
//! normalized coordinate `line[i, j] = Phi[j] / Rx[i]`:
//!
//! ```text
//! out = RollOff * X * conj(P) / (P * conj(P) + noise_level)
//! ```

use log::debug;
use ndarray::{Array1, Array2, ArrayView2, Zip};
use rustfft::num_complex::Complex;

use crate::config::{
    PipelineConfig, TransformBackend, ZeroCrossingPolicy, DEFAULT_ROLLOFF_WIDTH,
};
use crate::error::{SinoError, SinoResult};
use crate::filters::mean;
use crate::float_trait::SinoFloat;
use crate::psf::estimate_psf_from_spectrum;
use crate::transforms::{plan_transform_with_fallback, SpectralTransform};

// =============================================================================
// Constants
// =============================================================================

/// Stop-band value of the roll-off filter; keeps the filter strictly positive.
pub const ROLLOFF_FLOOR: f64 = 1e-6;

// =============================================================================
// Types
// =============================================================================

/// Numeric parameters of the deconvolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeconvolutionParams<F: SinoFloat> {
    pub pixel_size: F,
    pub noise_level: F,
    pub rolloff_width: F,
    pub zero_crossing: ZeroCrossingPolicy,
}

impl<F: SinoFloat> DeconvolutionParams<F> {
    pub fn new(pixel_size: F, noise_level: F) -> Self {
        Self {
            pixel_size,
            noise_level,
            rolloff_width: F::from_f64_c(DEFAULT_ROLLOFF_WIDTH),
            zero_crossing: ZeroCrossingPolicy::Passband,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            pixel_size: F::from_f64_c(config.pixel_size),
            noise_level: F::from_f64_c(config.noise_level),
            rolloff_width: F::from_f64_c(config.rolloff_width),
            zero_crossing: config.zero_crossing,
        }
    }
}

// =============================================================================
// Roll-off Filter
// =============================================================================

/// `n` points evenly spaced over `[-half, half]`, endpoints included.
///
/// Computed symmetrically so an odd `n` has an exact zero at its centre.
fn symmetric_linspace<F: SinoFloat>(half: F, n: usize) -> Array1<F> {
    if n <= 1 {
        return Array1::from_elem(n, -half);
    }
    let denom = F::usize_as(n - 1);
    Array1::from_shape_fn(n, |i| (F::usize_as(2 * i) - denom) * half / denom)
}

/// Normalized coordinate field `line[i, j] = Phi[j] / Rx[i]` for a sinogram
/// of `(pixels, angles)`.
///
/// `Phi` spans `[-W/(4π), W/(4π)]` with `W = pixels`; `Rx` spans
/// `[-0.5/pixel_size, 0.5/pixel_size]`. An odd pixel count puts `Rx = 0` on
/// the centre row: [`ZeroCrossingPolicy::Passband`] sets `line = 0` there,
/// [`ZeroCrossingPolicy::Reject`] returns `DegenerateGeometry`.
pub fn radial_coordinates<F: SinoFloat>(
    (pixels, angles): (usize, usize),
    pixel_size: F,
    policy: ZeroCrossingPolicy,
) -> SinoResult<Array2<F>> {
    if !(pixel_size.is_finite() && pixel_size > F::zero()) {
        return Err(SinoError::DegenerateGeometry(format!(
            "pixel size must be finite and positive, got {:?}",
            pixel_size
        )));
    }

    let phi_half = F::usize_as(pixels) / (F::from_f64_c(4.0) * F::PI);
    let phi = symmetric_linspace(phi_half, angles);
    let rx = symmetric_linspace(F::from_f64_c(0.5) / pixel_size, pixels);

    if let Some(row) = rx.iter().position(|&v| v == F::zero()) {
        match policy {
            ZeroCrossingPolicy::Reject => {
                return Err(SinoError::DegenerateGeometry(format!(
                    "radial coordinate Rx is zero at pixel-frequency row {row} of {pixels}"
                )));
            }
            ZeroCrossingPolicy::Passband => {
                debug!("deconvolution: Rx zero crossing at row {row} treated as passband");
            }
        }
    }

    Ok(Array2::from_shape_fn((pixels, angles), |(i, j)| {
        if rx[i] == F::zero() {
            F::zero()
        } else {
            phi[j] / rx[i]
        }
    }))
}

/// Roll-off value for a single coordinate.
///
/// `1` for `line <= 0`, the floor for `line > width`, and
/// `cos(π/2 · line/width)` in between (never below the floor).
#[inline]
pub fn rolloff_value<F: SinoFloat>(line: F, width: F) -> F {
    let floor = F::from_f64_c(ROLLOFF_FLOOR);
    if line <= F::zero() {
        F::one()
    } else if line > width {
        floor
    } else {
        (F::PI / F::from_f64_c(2.0) * line.abs() / width)
            .cos()
            .max(floor)
    }
}

/// Evaluate the roll-off window over a coordinate field.
pub fn build_rolloff_filter<F: SinoFloat>(line: ArrayView2<F>, width: F) -> Array2<F> {
    line.mapv(|l| rolloff_value(l, width))
}

// =============================================================================
// Wiener Filter
// =============================================================================

/// `rolloff * spectrum * conj(psf) / (psf * conj(psf) + noise_level)`.
pub fn wiener_filter<F: SinoFloat>(
    spectrum: ArrayView2<Complex<F>>,
    psf: ArrayView2<Complex<F>>,
    rolloff: ArrayView2<F>,
    noise_level: F,
) -> SinoResult<Array2<Complex<F>>> {
    SinoError::check_shape("psf", spectrum.dim(), psf.dim())?;
    SinoError::check_shape("roll-off filter", spectrum.dim(), rolloff.dim())?;

    let mut out = Array2::<Complex<F>>::zeros(spectrum.dim());
    Zip::from(&mut out)
        .and(&spectrum)
        .and(&psf)
        .and(&rolloff)
        .for_each(|o, &x, &p, &w| {
            let denom = p.norm_sqr() + noise_level;
            *o = x * p.conj() * (w / denom);
        });
    Ok(out)
}

// =============================================================================
// Deconvolver
// =============================================================================

/// Deconvolver for one sinogram shape.
///
/// Owns the transform plans and the roll-off window, both of which depend
/// only on shape and parameters, so one instance serves a whole batch.
pub struct SpectralDeconvolver<F: SinoFloat> {
    transform: Box<dyn SpectralTransform<F>>,
    rolloff: Array2<F>,
    noise_level: F,
}

impl<F: SinoFloat> SpectralDeconvolver<F> {
    pub fn new(
        transform: Box<dyn SpectralTransform<F>>,
        params: DeconvolutionParams<F>,
    ) -> SinoResult<Self> {
        if !(params.noise_level.is_finite() && params.noise_level > F::zero()) {
            return Err(SinoError::InvalidConfig(
                "noise_level must be finite and > 0".to_string(),
            ));
        }
        if !(params.rolloff_width.is_finite() && params.rolloff_width > F::zero()) {
            return Err(SinoError::InvalidConfig(
                "rolloff_width must be finite and > 0".to_string(),
            ));
        }
        let line = radial_coordinates(transform.shape(), params.pixel_size, params.zero_crossing)?;
        let rolloff = build_rolloff_filter(line.view(), params.rolloff_width);
        Ok(Self {
            transform,
            rolloff,
            noise_level: params.noise_level,
        })
    }

    /// Plan a deconvolver for `shape` from a pipeline configuration.
    pub fn from_config(config: &PipelineConfig, shape: (usize, usize)) -> SinoResult<Self> {
        let transform = plan_transform_with_fallback(config.backend, shape)?;
        Self::new(transform, DeconvolutionParams::from_config(config))
    }

    pub fn shape(&self) -> (usize, usize) {
        self.transform.shape()
    }

    pub fn backend(&self) -> TransformBackend {
        self.transform.backend()
    }

    pub fn rolloff(&self) -> ArrayView2<'_, F> {
        self.rolloff.view()
    }

    /// Deblur a sinogram (pixel x angle). Output has the input's shape.
    ///
    /// The mean is removed before filtering and restored afterwards.
    pub fn deconvolve(&self, sinogram: ArrayView2<F>) -> SinoResult<Array2<F>> {
        SinoError::check_shape("deconvolution input", self.shape(), sinogram.dim())?;

        let offset = mean(sinogram);
        let centred = sinogram.mapv(|v| v - offset);

        let spectrum = self.transform.forward(centred.view())?;
        let psf = estimate_psf_from_spectrum(spectrum.view());
        let filtered = wiener_filter(
            spectrum.view(),
            psf.view(),
            self.rolloff.view(),
            self.noise_level,
        )?;

        let mut restored = self.transform.inverse(filtered.view())?;
        restored.mapv_inplace(|v| v + offset);
        Ok(restored)
    }
}

/// One-shot deconvolution with the direct backend and default roll-off.
pub fn deconvolve<F: SinoFloat>(
    sinogram: ArrayView2<F>,
    pixel_size: F,
    noise_level: F,
) -> SinoResult<Array2<F>> {
    let transform = plan_transform_with_fallback(TransformBackend::Direct, sinogram.dim())?;
    let deconvolver =
        SpectralDeconvolver::new(transform, DeconvolutionParams::new(pixel_size, noise_level))?;
    deconvolver.deconvolve(sinogram)
}
