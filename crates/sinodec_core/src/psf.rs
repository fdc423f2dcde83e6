//! Point-spread function estimation from the sinogram's own spectrum.
//!
//! The vertical power spectrum (mean magnitude over the angle axis, zero
//! frequency centred) is thresholded against a high-frequency noise baseline;
//! the resulting signal mask, heavily smoothed, is the pixel-axis frequency
//! response of the blur. The 2D estimate is that profile repeated over every
//! angle-frequency column, so it is separable by construction.

use log::debug;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rustfft::num_complex::Complex;

use crate::error::{SinoError, SinoResult};
use crate::filters::gaussian_blur_1d;
use crate::float_trait::SinoFloat;
use crate::transforms::{fftshift_1d, ifftshift_1d, SpectralTransform};

// =============================================================================
// Constants
// =============================================================================

/// Leading samples of the shifted spectrum taken as pure noise.
pub const PSF_BASELINE_SAMPLES: usize = 200;

/// Smoothing applied to the vertical power spectrum before thresholding.
const PSF_DETECTION_SIGMA: f64 = 3.0;

/// Frequencies above this multiple of the baseline carry signal.
const PSF_SIGNAL_FACTOR: f64 = 1.4;

/// Smoothing of the binary signal mask into the blur response.
const PSF_SMOOTHING_SIGMA: f64 = 100.0;

/// Mean magnitude over the angle axis, zero frequency centred.
pub fn vertical_power_spectrum<F: SinoFloat>(spectrum: ArrayView2<Complex<F>>) -> Array1<F> {
    let cols = spectrum.ncols().max(1);
    let native: Vec<F> = spectrum
        .axis_iter(Axis(0))
        .map(|row| row.iter().map(|v| v.norm()).fold(F::zero(), |a, b| a + b) / F::usize_as(cols))
        .collect();
    Array1::from_vec(fftshift_1d(&native))
}

/// 1D blur response along the pixel-frequency axis, transform-native order.
pub fn psf_profile<F: SinoFloat>(spectrum: ArrayView2<Complex<F>>) -> Array1<F> {
    let vertps = vertical_power_spectrum(spectrum);
    let n = vertps.len();
    if n == 0 {
        return vertps;
    }

    let window = PSF_BASELINE_SAMPLES.min(n);
    let baseline = vertps.iter().take(window).fold(F::zero(), |a, &b| a + b) / F::usize_as(window);
    let threshold = F::from_f64_c(PSF_SIGNAL_FACTOR) * baseline;

    let smoothed = gaussian_blur_1d(vertps.view(), F::from_f64_c(PSF_DETECTION_SIGMA));
    let mask = smoothed.mapv(|v| if v > threshold { F::one() } else { F::zero() });
    let coverage = mask.iter().filter(|&&v| v > F::zero()).count();

    let profile = gaussian_blur_1d(mask.view(), F::from_f64_c(PSF_SMOOTHING_SIGMA));
    debug!(
        "psf: baseline {:.4e} over {} samples, {}/{} frequencies flagged as signal",
        baseline.as_f64(),
        window,
        coverage,
        n
    );

    Array1::from_vec(ifftshift_1d(&profile.to_vec()))
}

/// Build the separable PSF from an existing forward transform.
pub fn estimate_psf_from_spectrum<F: SinoFloat>(
    spectrum: ArrayView2<Complex<F>>,
) -> Array2<Complex<F>> {
    let (rows, cols) = spectrum.dim();
    let profile = psf_profile(spectrum);
    Array2::from_shape_fn((rows, cols), |(r, _)| Complex::new(profile[r], F::zero()))
}

/// Estimate the PSF of a sinogram (pixel x angle) with the given transform.
pub fn estimate_psf<F: SinoFloat>(
    sinogram: ArrayView2<F>,
    transform: &dyn SpectralTransform<F>,
) -> SinoResult<Array2<Complex<F>>> {
    SinoError::check_shape("psf estimation", transform.shape(), sinogram.dim())?;
    let spectrum = transform.forward(sinogram)?;
    Ok(estimate_psf_from_spectrum(spectrum.view()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::DirectTransform;

    fn smooth_sinogram(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(p, j)| {
            let x = p as f64 - rows as f64 / 2.0 - 10.0 * (j as f64 * 0.1).sin();
            (-x * x / 200.0).exp() + 0.01 * ((p * 31 + j * 17) % 13) as f64
        })
    }

    #[test]
    fn test_psf_shape_and_separability() {
        let sino = smooth_sinogram(64, 30);
        let t = DirectTransform::new((64, 30)).unwrap();
        let psf = estimate_psf(sino.view(), &t).unwrap();
        assert_eq!(psf.dim(), (64, 30));
        for r in 0..64 {
            let first = psf[[r, 0]];
            assert!(first.im == 0.0);
            assert!(first.re >= 0.0 && first.re <= 1.0 + 1e-12);
            for c in 1..30 {
                assert_eq!(psf[[r, c]], first);
            }
        }
    }

    #[test]
    fn test_psf_peaks_at_low_frequency() {
        // Pure smooth signal: energy concentrated near zero frequency, the
        // high-frequency baseline is rounding noise.
        let sino = Array2::from_shape_fn((1024, 8), |(p, j)| {
            let x = p as f64 - 512.0 - 10.0 * (j as f64 * 0.1).sin();
            (-x * x / 200.0).exp()
        });
        let t = DirectTransform::new((1024, 8)).unwrap();
        let psf = estimate_psf(sino.view(), &t).unwrap();
        // native order: row 0 is DC, row rows/2 is Nyquist
        assert!(psf[[0, 0]].re > psf[[512, 0]].re);
        assert!(psf[[0, 0]].re > psf[[256, 0]].re);
        assert!(psf[[0, 0]].re > 0.0);
    }

    #[test]
    fn test_flat_spectrum_gives_zero_psf() {
        let spectrum = Array2::from_elem((40, 8), Complex::new(1.0f64, 0.0));
        let psf = estimate_psf_from_spectrum(spectrum.view());
        assert!(psf.iter().all(|v| v.re == 0.0 && v.im == 0.0));
    }

    #[test]
    fn test_vertical_power_spectrum_is_centred() {
        let mut spectrum = Array2::from_elem((8, 4), Complex::new(0.0f64, 0.0));
        for c in 0..4 {
            spectrum[[0, c]] = Complex::new(0.0, 2.0);
        }
        let vertps = vertical_power_spectrum(spectrum.view());
        assert!((vertps[4] - 2.0).abs() < 1e-12);
        assert_eq!(vertps.iter().filter(|&&v| v != 0.0).count(), 1);
    }

    #[test]
    fn test_shape_mismatch() {
        let sino = Array2::<f64>::zeros((10, 12));
        let t = DirectTransform::new((12, 10)).unwrap();
        assert!(matches!(
            estimate_psf(sino.view(), &t),
            Err(SinoError::ShapeMismatch { .. })
        ));
    }
}
