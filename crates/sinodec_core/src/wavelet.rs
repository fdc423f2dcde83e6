//! Wavelet-domain blob and ring artifact suppression.
//!
//! One level of a 2D Haar decomposition splits the sinogram into four
//! subbands. Coefficients outside `mean ± x·std` of their subband are
//! replaced by a median-filtered estimate; every other coefficient is left
//! untouched, so real structure survives while localized artifacts are
//! pulled back to their neighborhood.

use log::debug;
use ndarray::{Array2, ArrayView2, Axis, Zip};

use crate::error::{SinoError, SinoResult};
use crate::filters::{mean_std, median_filter_2d};
use crate::float_trait::SinoFloat;

// =============================================================================
// Constants
// =============================================================================

/// Outlier threshold (in standard deviations) for the approximation subband.
const APPROXIMATION_THRESHOLD: f64 = 2.0;

/// Outlier threshold for the three detail subbands.
const DETAIL_THRESHOLD: f64 = 3.0;

/// Detail subbands use a median window this many times `sigma`.
const DETAIL_WINDOW_FACTOR: usize = 2;

// =============================================================================
// Haar Transform
// =============================================================================

/// Single-level 2D wavelet decomposition.
///
/// Subband naming follows PyWavelets: `horizontal` is detail along the pixel
/// axis (axis 0), `vertical` is detail along the angle axis (axis 1).
#[derive(Debug, Clone, PartialEq)]
pub struct WaveletDecomposition<F: SinoFloat> {
    pub approximation: Array2<F>,
    pub horizontal: Array2<F>,
    pub vertical: Array2<F>,
    pub diagonal: Array2<F>,
}

impl<F: SinoFloat> WaveletDecomposition<F> {
    /// Shape shared by all four subbands.
    pub fn subband_shape(&self) -> (usize, usize) {
        self.approximation.dim()
    }

    fn subbands_mut(&mut self) -> [&mut Array2<F>; 4] {
        [
            &mut self.approximation,
            &mut self.horizontal,
            &mut self.vertical,
            &mut self.diagonal,
        ]
    }
}

/// Haar analysis of one lane; odd lengths extend the last sample.
fn haar_analysis_1d<F: SinoFloat>(input: &[F], low: &mut [F], high: &mut [F]) {
    let n = input.len();
    for k in 0..low.len() {
        let a = input[2 * k];
        let b = if 2 * k + 1 < n { input[2 * k + 1] } else { a };
        low[k] = (a + b) * F::FRAC_1_SQRT_2;
        high[k] = (a - b) * F::FRAC_1_SQRT_2;
    }
}

/// Haar synthesis of one lane into `2 * low.len()` samples.
fn haar_synthesis_1d<F: SinoFloat>(low: &[F], high: &[F], output: &mut [F]) {
    for k in 0..low.len() {
        output[2 * k] = (low[k] + high[k]) * F::FRAC_1_SQRT_2;
        output[2 * k + 1] = (low[k] - high[k]) * F::FRAC_1_SQRT_2;
    }
}

/// Apply 1D Haar analysis along `axis`, returning (low, high).
fn analyze_axis<F: SinoFloat>(input: ArrayView2<F>, axis: Axis) -> (Array2<F>, Array2<F>) {
    let len = input.len_of(axis);
    let half = len.div_ceil(2);
    let mut shape = [input.nrows(), input.ncols()];
    shape[axis.index()] = half;

    let mut low = Array2::zeros((shape[0], shape[1]));
    let mut high = Array2::zeros((shape[0], shape[1]));
    let mut lane = vec![F::zero(); len];
    let mut lo = vec![F::zero(); half];
    let mut hi = vec![F::zero(); half];

    let other = Axis(1 - axis.index());
    for (i, src) in input.axis_iter(other).enumerate() {
        lane.iter_mut().zip(src.iter()).for_each(|(d, &s)| *d = s);
        haar_analysis_1d(&lane, &mut lo, &mut hi);
        low.index_axis_mut(other, i)
            .iter_mut()
            .zip(&lo)
            .for_each(|(d, &s)| *d = s);
        high.index_axis_mut(other, i)
            .iter_mut()
            .zip(&hi)
            .for_each(|(d, &s)| *d = s);
    }
    (low, high)
}

/// Apply 1D Haar synthesis along `axis`, doubling its length.
fn synthesize_axis<F: SinoFloat>(low: ArrayView2<F>, high: ArrayView2<F>, axis: Axis) -> Array2<F> {
    let half = low.len_of(axis);
    let mut shape = [low.nrows(), low.ncols()];
    shape[axis.index()] = 2 * half;

    let mut output = Array2::zeros((shape[0], shape[1]));
    let mut lo = vec![F::zero(); half];
    let mut hi = vec![F::zero(); half];
    let mut lane = vec![F::zero(); 2 * half];

    let other = Axis(1 - axis.index());
    for i in 0..low.len_of(other) {
        lo.iter_mut()
            .zip(low.index_axis(other, i).iter())
            .for_each(|(d, &s)| *d = s);
        hi.iter_mut()
            .zip(high.index_axis(other, i).iter())
            .for_each(|(d, &s)| *d = s);
        haar_synthesis_1d(&lo, &hi, &mut lane);
        output
            .index_axis_mut(other, i)
            .iter_mut()
            .zip(&lane)
            .for_each(|(d, &s)| *d = s);
    }
    output
}

/// One-level 2D Haar decomposition (PyWavelets `dwt2(x, 'haar')`).
///
/// Each subband is `(ceil(rows/2), ceil(cols/2))`.
pub fn haar_dwt2<F: SinoFloat>(input: ArrayView2<F>) -> WaveletDecomposition<F> {
    let (low0, high0) = analyze_axis(input, Axis(0));
    let (approximation, vertical) = analyze_axis(low0.view(), Axis(1));
    let (horizontal, diagonal) = analyze_axis(high0.view(), Axis(1));
    WaveletDecomposition {
        approximation,
        horizontal,
        vertical,
        diagonal,
    }
}

/// Inverse of [`haar_dwt2`]; the result has even dimensions
/// `(2 * sub_rows, 2 * sub_cols)`.
pub fn haar_idwt2<F: SinoFloat>(decomposition: &WaveletDecomposition<F>) -> Array2<F> {
    let low0 = synthesize_axis(
        decomposition.approximation.view(),
        decomposition.vertical.view(),
        Axis(1),
    );
    let high0 = synthesize_axis(
        decomposition.horizontal.view(),
        decomposition.diagonal.view(),
        Axis(1),
    );
    synthesize_axis(low0.view(), high0.view(), Axis(0))
}

// =============================================================================
// Outlier Replacement
// =============================================================================

/// True where a coefficient lies outside `mean ± x·std` (population std).
pub fn outlier_mask<F: SinoFloat>(subband: ArrayView2<F>, x: F) -> Array2<bool> {
    let (mean, std) = mean_std(subband);
    let (lower, upper) = (mean - x * std, mean + x * std);
    subband.mapv(|v| v < lower || v > upper)
}

/// Replace the outliers of one subband with its median-filtered values.
/// Returns the number of replaced coefficients.
fn suppress_subband<F: SinoFloat>(subband: &mut Array2<F>, window: usize, x: F) -> usize {
    let mask = outlier_mask(subband.view(), x);
    let flagged = mask.iter().filter(|&&m| m).count();
    if flagged == 0 {
        return 0;
    }
    let median = median_filter_2d(subband.view(), window);
    Zip::from(subband)
        .and(&mask)
        .and(&median)
        .for_each(|v, &m, &med| {
            if m {
                *v = med;
            }
        });
    flagged
}

/// Outlier-replacing suppressor with a fixed median window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveletArtifactSuppressor {
    sigma: usize,
}

impl WaveletArtifactSuppressor {
    pub fn new(sigma: usize) -> SinoResult<Self> {
        if sigma == 0 {
            return Err(SinoError::InvalidConfig("sigma must be >= 1".to_string()));
        }
        Ok(Self { sigma })
    }

    pub fn sigma(&self) -> usize {
        self.sigma
    }

    /// Suppress artifacts in a sinogram; output has the input's shape.
    pub fn remove_artifacts<F: SinoFloat>(&self, sinogram: ArrayView2<F>) -> SinoResult<Array2<F>> {
        let (rows, cols) = sinogram.dim();
        if rows == 0 || cols == 0 {
            return Err(SinoError::ShapeMismatch {
                context: "artifact removal input",
                expected: (rows.max(1), cols.max(1)),
                found: (rows, cols),
            });
        }

        let mut decomposition = haar_dwt2(sinogram);
        let approx_x = F::from_f64_c(APPROXIMATION_THRESHOLD);
        let detail_x = F::from_f64_c(DETAIL_THRESHOLD);
        let detail_window = DETAIL_WINDOW_FACTOR * self.sigma;

        let mut replaced = [0usize; 4];
        for (i, subband) in decomposition.subbands_mut().into_iter().enumerate() {
            replaced[i] = if i == 0 {
                suppress_subband(subband, self.sigma, approx_x)
            } else {
                suppress_subband(subband, detail_window, detail_x)
            };
        }
        debug!(
            "wavelet: replaced coefficients A={} H={} V={} D={} (sigma {})",
            replaced[0], replaced[1], replaced[2], replaced[3], self.sigma
        );

        let restored = haar_idwt2(&decomposition);
        // Odd input lengths grow by one sample through the transform pair.
        Ok(restored.slice(ndarray::s![..rows, ..cols]).to_owned())
    }
}

/// One-shot artifact removal with median window `sigma`.
pub fn remove_artifacts<F: SinoFloat>(sinogram: ArrayView2<F>, sigma: usize) -> SinoResult<Array2<F>> {
    WaveletArtifactSuppressor::new(sigma)?.remove_artifacts(sinogram)
}
