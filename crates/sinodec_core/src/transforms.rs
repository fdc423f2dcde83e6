//! 2D spectral transforms.
//!
//! Two interchangeable backends implement [`SpectralTransform`]:
//!
//! - [`DirectTransform`]: full complex row/column FFTs (rustfft).
//! - [`HalfSpectrumTransform`]: real-to-complex FFT of the `floor(C/2)+1`
//!   non-redundant columns (realfft), expanded to the full spectrum by
//!   conjugate symmetry. Behind the `half-spectrum` feature.
//!
//! Both follow the unnormalized-forward / `1/(R*C)`-inverse convention and
//! own their plans, so one planned transform serves every slice of a batch.

use std::sync::Arc;

use log::warn;
use ndarray::{Array2, ArrayView2};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

#[cfg(feature = "half-spectrum")]
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::config::TransformBackend;
use crate::error::{SinoError, SinoResult};
use crate::float_trait::SinoFloat;

// =============================================================================
// Transform Interface
// =============================================================================

/// Real <-> complex 2D discrete Fourier transform of a fixed shape.
pub trait SpectralTransform<F: SinoFloat>: Send + Sync {
    /// Which implementation this is.
    fn backend(&self) -> TransformBackend;

    /// `(rows, cols)` the plans were built for.
    fn shape(&self) -> (usize, usize);

    /// Unnormalized forward transform, same shape in and out.
    fn forward(&self, image: ArrayView2<F>) -> SinoResult<Array2<Complex<F>>>;

    /// Inverse transform divided by `rows * cols`, returning the real part.
    fn inverse(&self, spectrum: ArrayView2<Complex<F>>) -> SinoResult<Array2<F>>;
}

fn check_plan_shape(rows: usize, cols: usize) -> SinoResult<()> {
    if rows == 0 || cols == 0 {
        return Err(SinoError::Transform(format!(
            "cannot plan a transform for empty shape ({rows}, {cols})"
        )));
    }
    Ok(())
}

/// Plan a transform of the requested backend.
pub fn plan_transform<F: SinoFloat>(
    backend: TransformBackend,
    shape: (usize, usize),
) -> SinoResult<Box<dyn SpectralTransform<F>>> {
    match backend {
        TransformBackend::Direct => Ok(Box::new(DirectTransform::new(shape)?)),
        TransformBackend::HalfSpectrum => plan_half_spectrum(shape),
    }
}

/// Plan the requested backend, falling back to [`DirectTransform`] when it
/// is unavailable. Other errors are returned unchanged.
pub fn plan_transform_with_fallback<F: SinoFloat>(
    backend: TransformBackend,
    shape: (usize, usize),
) -> SinoResult<Box<dyn SpectralTransform<F>>> {
    match plan_transform(backend, shape) {
        Err(err @ SinoError::BackendUnavailable { .. }) => {
            warn!("{err}; falling back to the direct transform");
            Ok(Box::new(DirectTransform::new(shape)?))
        }
        other => other,
    }
}

#[cfg(feature = "half-spectrum")]
fn plan_half_spectrum<F: SinoFloat>(
    shape: (usize, usize),
) -> SinoResult<Box<dyn SpectralTransform<F>>> {
    Ok(Box::new(HalfSpectrumTransform::new(shape)?))
}

#[cfg(not(feature = "half-spectrum"))]
fn plan_half_spectrum<F: SinoFloat>(
    _shape: (usize, usize),
) -> SinoResult<Box<dyn SpectralTransform<F>>> {
    Err(SinoError::BackendUnavailable {
        backend: TransformBackend::HalfSpectrum.name(),
        reason: "crate built without the `half-spectrum` feature".to_string(),
    })
}

// =============================================================================
// Direct Backend
// =============================================================================

/// Compute 2D FFT of a real image using pre-computed plans.
/// Returns unnormalized FFT.
pub fn fft2d<F: SinoFloat>(
    input: ArrayView2<F>,
    fft_row_plan: &Arc<dyn Fft<F>>,
    fft_col_plan: &Arc<dyn Fft<F>>,
) -> Array2<Complex<F>> {
    let (rows, cols) = input.dim();

    // 1. Transform rows
    let mut output = Array2::<Complex<F>>::zeros((rows, cols));
    let mut row_vec = vec![Complex::new(F::zero(), F::zero()); cols];
    for r in 0..rows {
        for (c, &v) in input.row(r).iter().enumerate() {
            row_vec[c] = Complex::new(v, F::zero());
        }
        fft_row_plan.process(&mut row_vec);
        for c in 0..cols {
            output[[r, c]] = row_vec[c];
        }
    }

    // 2. Transform columns
    let mut col_vec = vec![Complex::new(F::zero(), F::zero()); rows];
    for c in 0..cols {
        for r in 0..rows {
            col_vec[r] = output[[r, c]];
        }
        fft_col_plan.process(&mut col_vec);
        for r in 0..rows {
            output[[r, c]] = col_vec[r];
        }
    }

    output
}

/// Compute 2D inverse FFT using pre-computed plans.
/// Normalizes by 1/(rows*cols) and keeps the real part.
pub fn ifft2d<F: SinoFloat>(
    input: ArrayView2<Complex<F>>,
    ifft_row_plan: &Arc<dyn Fft<F>>,
    ifft_col_plan: &Arc<dyn Fft<F>>,
) -> Array2<F> {
    let (rows, cols) = input.dim();

    // 1. Transform columns
    let mut intermediate = input.to_owned();
    let mut col_vec = vec![Complex::new(F::zero(), F::zero()); rows];
    for c in 0..cols {
        for r in 0..rows {
            col_vec[r] = intermediate[[r, c]];
        }
        ifft_col_plan.process(&mut col_vec);
        for r in 0..rows {
            intermediate[[r, c]] = col_vec[r];
        }
    }

    // 2. Transform rows
    let mut output = Array2::<F>::zeros((rows, cols));
    let norm_factor = F::one() / F::usize_as(rows * cols);
    let mut row_vec = vec![Complex::new(F::zero(), F::zero()); cols];
    for r in 0..rows {
        for c in 0..cols {
            row_vec[c] = intermediate[[r, c]];
        }
        ifft_row_plan.process(&mut row_vec);
        for c in 0..cols {
            output[[r, c]] = row_vec[c].re * norm_factor;
        }
    }

    output
}

/// Full complex transform backend.
pub struct DirectTransform<F: SinoFloat> {
    rows: usize,
    cols: usize,
    fft_row: Arc<dyn Fft<F>>,
    fft_col: Arc<dyn Fft<F>>,
    ifft_row: Arc<dyn Fft<F>>,
    ifft_col: Arc<dyn Fft<F>>,
}

impl<F: SinoFloat> DirectTransform<F> {
    pub fn new((rows, cols): (usize, usize)) -> SinoResult<Self> {
        check_plan_shape(rows, cols)?;
        let mut planner = FftPlanner::<F>::new();
        Ok(Self {
            rows,
            cols,
            fft_row: planner.plan_fft_forward(cols),
            fft_col: planner.plan_fft_forward(rows),
            ifft_row: planner.plan_fft_inverse(cols),
            ifft_col: planner.plan_fft_inverse(rows),
        })
    }
}

impl<F: SinoFloat> SpectralTransform<F> for DirectTransform<F> {
    fn backend(&self) -> TransformBackend {
        TransformBackend::Direct
    }

    fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn forward(&self, image: ArrayView2<F>) -> SinoResult<Array2<Complex<F>>> {
        SinoError::check_shape("forward transform", self.shape(), image.dim())?;
        Ok(fft2d(image, &self.fft_row, &self.fft_col))
    }

    fn inverse(&self, spectrum: ArrayView2<Complex<F>>) -> SinoResult<Array2<F>> {
        SinoError::check_shape("inverse transform", self.shape(), spectrum.dim())?;
        Ok(ifft2d(spectrum, &self.ifft_row, &self.ifft_col))
    }
}

// =============================================================================
// Half-Spectrum Backend
// =============================================================================

/// Real-input transform computing only `floor(C/2)+1` columns.
///
/// The forward path expands the half spectrum with
/// `X[r, c] = conj(X[(R - r) mod R, C - c])`: the computed block mirrored on
/// both axes, its redundant DC column (and Nyquist column for even `C`)
/// dropped, and rolled down one row so row 0 stays paired with itself.
///
/// The inverse path keeps the conjugate-symmetric part of its input, so it
/// returns the real part of the direct inverse even for asymmetric spectra.
#[cfg(feature = "half-spectrum")]
pub struct HalfSpectrumTransform<F: SinoFloat> {
    rows: usize,
    cols: usize,
    r2c: Arc<dyn RealToComplex<F>>,
    c2r: Arc<dyn ComplexToReal<F>>,
    fft_col: Arc<dyn Fft<F>>,
    ifft_col: Arc<dyn Fft<F>>,
}

#[cfg(feature = "half-spectrum")]
impl<F: SinoFloat> HalfSpectrumTransform<F> {
    pub fn new((rows, cols): (usize, usize)) -> SinoResult<Self> {
        check_plan_shape(rows, cols)?;
        let mut real_planner = RealFftPlanner::<F>::new();
        let mut planner = FftPlanner::<F>::new();
        Ok(Self {
            rows,
            cols,
            r2c: real_planner.plan_fft_forward(cols),
            c2r: real_planner.plan_fft_inverse(cols),
            fft_col: planner.plan_fft_forward(rows),
            ifft_col: planner.plan_fft_inverse(rows),
        })
    }

    /// Number of non-redundant columns.
    #[inline]
    pub fn half_cols(&self) -> usize {
        self.cols / 2 + 1
    }
}

#[cfg(feature = "half-spectrum")]
impl<F: SinoFloat> SpectralTransform<F> for HalfSpectrumTransform<F> {
    fn backend(&self) -> TransformBackend {
        TransformBackend::HalfSpectrum
    }

    fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn forward(&self, image: ArrayView2<F>) -> SinoResult<Array2<Complex<F>>> {
        SinoError::check_shape("forward transform", self.shape(), image.dim())?;
        let (rows, cols) = (self.rows, self.cols);
        let half = self.half_cols();

        // 1. Real-to-complex along rows, keeping the non-redundant columns.
        let mut output = Array2::<Complex<F>>::zeros((rows, cols));
        let mut in_buf = self.r2c.make_input_vec();
        let mut out_buf = self.r2c.make_output_vec();
        for r in 0..rows {
            for (dst, &v) in in_buf.iter_mut().zip(image.row(r).iter()) {
                *dst = v;
            }
            self.r2c
                .process(&mut in_buf, &mut out_buf)
                .map_err(|e| SinoError::Transform(e.to_string()))?;
            for c in 0..half {
                output[[r, c]] = out_buf[c];
            }
        }

        // 2. Complex transform of the retained columns.
        let mut col_vec = vec![Complex::new(F::zero(), F::zero()); rows];
        for c in 0..half {
            for r in 0..rows {
                col_vec[r] = output[[r, c]];
            }
            self.fft_col.process(&mut col_vec);
            for r in 0..rows {
                output[[r, c]] = col_vec[r];
            }
        }

        // 3. Conjugate-symmetric expansion of the missing columns.
        for c in half..cols {
            for r in 0..rows {
                output[[r, c]] = output[[(rows - r) % rows, cols - c]].conj();
            }
        }

        Ok(output)
    }

    fn inverse(&self, spectrum: ArrayView2<Complex<F>>) -> SinoResult<Array2<F>> {
        SinoError::check_shape("inverse transform", self.shape(), spectrum.dim())?;
        let (rows, cols) = (self.rows, self.cols);
        let half = self.half_cols();
        let two = F::from_f64_c(2.0);

        // 1. Conjugate-symmetric part of the retained columns.
        let mut truncated = Array2::<Complex<F>>::zeros((rows, half));
        for r in 0..rows {
            for c in 0..half {
                let mirror = spectrum[[(rows - r) % rows, (cols - c) % cols]].conj();
                truncated[[r, c]] = (spectrum[[r, c]] + mirror) / two;
            }
        }

        // 2. Inverse complex transform along columns.
        let mut col_vec = vec![Complex::new(F::zero(), F::zero()); rows];
        for c in 0..half {
            for r in 0..rows {
                col_vec[r] = truncated[[r, c]];
            }
            self.ifft_col.process(&mut col_vec);
            for r in 0..rows {
                truncated[[r, c]] = col_vec[r];
            }
        }

        // 3. Complex-to-real along rows, renormalized by the pixel count.
        let norm_factor = F::one() / F::usize_as(rows * cols);
        let mut output = Array2::<F>::zeros((rows, cols));
        let mut in_buf = self.c2r.make_input_vec();
        let mut out_buf = self.c2r.make_output_vec();
        for r in 0..rows {
            for (c, dst) in in_buf.iter_mut().enumerate() {
                *dst = truncated[[r, c]];
            }
            in_buf[0].im = F::zero();
            if cols % 2 == 0 {
                in_buf[half - 1].im = F::zero();
            }
            self.c2r
                .process(&mut in_buf, &mut out_buf)
                .map_err(|e| SinoError::Transform(e.to_string()))?;
            for (dst, &v) in output.row_mut(r).iter_mut().zip(out_buf.iter()) {
                *dst = v * norm_factor;
            }
        }

        Ok(output)
    }
}

// =============================================================================
// Frequency Shifts
// =============================================================================

/// Move the zero-frequency sample to the centre (`numpy.fft.fftshift`).
pub fn fftshift_1d<T: Copy>(data: &[T]) -> Vec<T> {
    let n = data.len();
    (0..n).map(|k| data[(k + n - n / 2) % n]).collect()
}

/// Inverse of [`fftshift_1d`] (`numpy.fft.ifftshift`).
pub fn ifftshift_1d<T: Copy>(data: &[T]) -> Vec<T> {
    let n = data.len();
    (0..n).map(|k| data[(k + n / 2) % n]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Helper: Simple LCG for deterministic test data
    struct SimpleLcg {
        state: u64,
    }

    impl SimpleLcg {
        fn new(seed: u64) -> Self {
            Self { state: seed }
        }

        fn next_f64(&mut self) -> f64 {
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (self.state >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
        let mut rng = SimpleLcg::new(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.next_f64() * 2.0 - 1.0)
    }

    fn max_abs_diff_real(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    fn max_abs_diff_complex(a: &Array2<Complex<f64>>, b: &Array2<Complex<f64>>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).norm())
            .fold(0.0, f64::max)
    }

    const SHAPES: [(usize, usize); 4] = [(8, 8), (9, 7), (16, 11), (5, 12)];

    // ==================== Direct Backend Tests ====================

    #[test]
    fn test_direct_round_trip() {
        for (i, &shape) in SHAPES.iter().enumerate() {
            let x = random_matrix(shape.0, shape.1, 100 + i as u64);
            let t = DirectTransform::<f64>::new(shape).unwrap();
            let back = t.inverse(t.forward(x.view()).unwrap().view()).unwrap();
            assert!(max_abs_diff_real(&x, &back) < 1e-10, "shape {shape:?}");
        }
    }

    #[test]
    fn test_direct_delta_has_flat_spectrum() {
        let mut x = Array2::<f64>::zeros((6, 5));
        x[[0, 0]] = 1.0;
        let t = DirectTransform::new((6, 5)).unwrap();
        let spec = t.forward(x.view()).unwrap();
        for v in spec.iter() {
            assert!((v.re - 1.0).abs() < 1e-12);
            assert!(v.im.abs() < 1e-12);
        }
    }

    #[test]
    fn test_direct_dc_is_sum() {
        let x = random_matrix(7, 10, 3);
        let t = DirectTransform::new((7, 10)).unwrap();
        let spec = t.forward(x.view()).unwrap();
        assert!((spec[[0, 0]].re - x.sum()).abs() < 1e-10);
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let t = DirectTransform::<f64>::new((4, 6)).unwrap();
        let x = Array2::<f64>::zeros((6, 4));
        assert!(matches!(
            t.forward(x.view()),
            Err(SinoError::ShapeMismatch { .. })
        ));
        assert!(DirectTransform::<f64>::new((0, 6)).is_err());
    }

    // ==================== Half-Spectrum Backend Tests ====================

    #[cfg(feature = "half-spectrum")]
    #[test]
    fn test_half_spectrum_matches_direct() {
        for (i, &shape) in SHAPES.iter().enumerate() {
            let x = random_matrix(shape.0, shape.1, 200 + i as u64);
            let direct = DirectTransform::new(shape).unwrap();
            let half = HalfSpectrumTransform::new(shape).unwrap();
            let a = direct.forward(x.view()).unwrap();
            let b = half.forward(x.view()).unwrap();
            assert!(max_abs_diff_complex(&a, &b) < 1e-9, "shape {shape:?}");
        }
    }

    #[cfg(feature = "half-spectrum")]
    #[test]
    fn test_half_spectrum_round_trip() {
        for (i, &shape) in SHAPES.iter().enumerate() {
            let x = random_matrix(shape.0, shape.1, 300 + i as u64);
            let t = HalfSpectrumTransform::new(shape).unwrap();
            let back = t.inverse(t.forward(x.view()).unwrap().view()).unwrap();
            assert!(max_abs_diff_real(&x, &back) < 1e-10, "shape {shape:?}");
        }
    }

    #[cfg(feature = "half-spectrum")]
    #[test]
    fn test_half_spectrum_inverse_of_asymmetric_spectrum() {
        // A filtered spectrum is generally not conjugate symmetric; both
        // inverses must still agree on the real part.
        let shape = (9, 10);
        let x = random_matrix(shape.0, shape.1, 7);
        let direct = DirectTransform::new(shape).unwrap();
        let half = HalfSpectrumTransform::new(shape).unwrap();
        let mut spec = direct.forward(x.view()).unwrap();
        for ((r, c), v) in spec.indexed_iter_mut() {
            if r < 4 && c > 2 {
                *v = *v * 0.25;
            }
        }
        let a = direct.inverse(spec.view()).unwrap();
        let b = half.inverse(spec.view()).unwrap();
        assert!(max_abs_diff_real(&a, &b) < 1e-10);
    }

    #[cfg(feature = "half-spectrum")]
    #[test]
    fn test_plan_transform_selects_backend() {
        let t = plan_transform::<f32>(TransformBackend::HalfSpectrum, (4, 4)).unwrap();
        assert_eq!(t.backend(), TransformBackend::HalfSpectrum);
        let t = plan_transform_with_fallback::<f32>(TransformBackend::HalfSpectrum, (4, 4)).unwrap();
        assert_eq!(t.backend(), TransformBackend::HalfSpectrum);
    }

    #[cfg(not(feature = "half-spectrum"))]
    #[test]
    fn test_missing_backend_falls_back_to_direct() {
        assert!(matches!(
            plan_transform::<f32>(TransformBackend::HalfSpectrum, (4, 4)),
            Err(SinoError::BackendUnavailable { .. })
        ));
        let t = plan_transform_with_fallback::<f32>(TransformBackend::HalfSpectrum, (4, 4)).unwrap();
        assert_eq!(t.backend(), TransformBackend::Direct);
    }

    #[test]
    fn test_f32_round_trip() {
        let x = random_matrix(12, 9, 11).mapv(|v| v as f32);
        let t = plan_transform::<f32>(TransformBackend::Direct, (12, 9)).unwrap();
        let back = t.inverse(t.forward(x.view()).unwrap().view()).unwrap();
        for (a, b) in x.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    // ==================== Shift Tests ====================

    #[test]
    fn test_fftshift_even_and_odd() {
        assert_eq!(fftshift_1d(&[0, 1, 2, 3]), vec![2, 3, 0, 1]);
        assert_eq!(fftshift_1d(&[0, 1, 2, 3, 4]), vec![3, 4, 0, 1, 2]);
        assert_eq!(ifftshift_1d(&[3, 4, 0, 1, 2]), vec![0, 1, 2, 3, 4]);
        let data: Vec<usize> = (0..7).collect();
        assert_eq!(ifftshift_1d(&fftshift_1d(&data)), data);
    }
}
