//! Separable smoothing, rank filtering and summary statistics.
//!
//! The Gaussian and median filters use the `reflect` boundary convention
//! (`d c b a | a b c d | d c b a`), applied periodically so that kernels
//! wider than the signal still see a well-defined extension.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use crate::float_trait::SinoFloat;

// =============================================================================
// Constants
// =============================================================================

/// Minimum row count before the median filter fans out over rayon.
const PARALLEL_ROW_THRESHOLD: usize = 64;

// =============================================================================
// Gaussian Smoothing
// =============================================================================

/// Compute 1D Gaussian kernel with given sigma.
/// Kernel size is ceil(4 * sigma) * 2 + 1 to match scipy's default truncate=4.0
fn gaussian_kernel_1d<F: SinoFloat>(sigma: F) -> Vec<F> {
    if sigma <= F::zero() {
        return vec![F::one()];
    }

    let radius = (F::GAUSSIAN_TRUNCATE * sigma)
        .ceil()
        .to_usize()
        .unwrap_or(0);
    let size = 2 * radius + 1;
    let mut kernel = vec![F::zero(); size];

    let sigma2 = sigma * sigma;
    let two = F::from_f64_c(2.0);
    let mut sum = F::zero();

    for (i, k) in kernel.iter_mut().enumerate() {
        let x = F::usize_as(i) - F::usize_as(radius);
        let val = (-(x * x) / (two * sigma2)).exp();
        *k = val;
        sum += val;
    }

    let inv_sum = F::one() / sum;
    for val in kernel.iter_mut() {
        *val *= inv_sum;
    }

    kernel
}

/// Reflect index for boundary handling (scipy 'reflect' mode).
/// reflect(-1) = 0, reflect(-2) = 1, reflect(n) = n-1, reflect(n+1) = n-2.
/// The extension repeats with period 2n.
#[inline(always)]
pub(crate) fn reflect_index(idx: isize, len: usize) -> usize {
    let n = len as isize;
    let m = idx.rem_euclid(2 * n);
    if m < n {
        m as usize
    } else {
        (2 * n - 1 - m) as usize
    }
}

/// Fill a pre-allocated padded buffer with reflected boundaries.
#[inline]
fn fill_padded_row<F: SinoFloat>(input: &[F], radius: usize, padded: &mut Vec<F>) {
    let n = input.len();
    padded.clear();
    padded.extend((0..n + 2 * radius).map(|p| {
        let src = p as isize - radius as isize;
        input[reflect_index(src, n)]
    }));
}

/// Apply 1D convolution to a padded buffer (no bounds checking needed).
#[inline]
fn convolve_1d_padded<F: SinoFloat>(padded: &[F], kernel: &[F], output: &mut [F]) {
    let klen = kernel.len();
    for (i, out) in output.iter_mut().enumerate() {
        let mut sum = F::zero();
        for k in 0..klen {
            sum += padded[i + k] * kernel[k];
        }
        *out = sum;
    }
}

/// Apply 1D Gaussian blur to a 1D array with reflect boundary.
/// Matches scipy.ndimage.gaussian_filter1d behavior.
pub fn gaussian_blur_1d<F: SinoFloat>(input: ArrayView1<F>, sigma: F) -> Array1<F> {
    let n = input.len();
    if n == 0 {
        return Array1::zeros(0);
    }

    let kernel = gaussian_kernel_1d(sigma);
    let radius = kernel.len() / 2;

    let input_vec: Vec<F> = input.iter().copied().collect();
    let mut padded = Vec::with_capacity(n + 2 * radius);
    fill_padded_row(&input_vec, radius, &mut padded);

    let mut output = vec![F::zero(); n];
    convolve_1d_padded(&padded, &kernel, &mut output);
    Array1::from_vec(output)
}

// =============================================================================
// Median Filtering
// =============================================================================

/// Select the element of rank `rank` (0-based) using partial sorting.
#[inline]
fn select_rank<F: SinoFloat>(data: &mut [F], rank: usize) -> F {
    let (_, value, _) = data.select_nth_unstable_by(rank, |a, b| {
        a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
    });
    *value
}

/// Square-window 2D median filter with reflect boundary.
///
/// Mirrors `scipy.ndimage.median_filter(input, size)`: the window spans
/// offsets `-size/2 ..= size - 1 - size/2` on both axes and the output is the
/// element of rank `size*size/2`, so even windows take the upper median.
pub fn median_filter_2d<F: SinoFloat>(input: ArrayView2<F>, size: usize) -> Array2<F> {
    let (rows, cols) = input.dim();
    if rows == 0 || cols == 0 || size <= 1 {
        return input.to_owned();
    }

    let origin = (size / 2) as isize;
    let rank = size * size / 2;
    let row_idx: Vec<Vec<usize>> = (0..rows)
        .map(|r| {
            (0..size)
                .map(|k| reflect_index(r as isize + k as isize - origin, rows))
                .collect()
        })
        .collect();
    let col_idx: Vec<Vec<usize>> = (0..cols)
        .map(|c| {
            (0..size)
                .map(|k| reflect_index(c as isize + k as isize - origin, cols))
                .collect()
        })
        .collect();

    let filter_row = |r: usize, out_row: &mut [F]| {
        let mut window = Vec::with_capacity(size * size);
        for (c, out) in out_row.iter_mut().enumerate() {
            window.clear();
            for &rr in &row_idx[r] {
                for &cc in &col_idx[c] {
                    window.push(input[[rr, cc]]);
                }
            }
            *out = select_rank(&mut window, rank);
        }
    };

    let mut output = Array2::zeros((rows, cols));
    if rows >= PARALLEL_ROW_THRESHOLD {
        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(r, mut out_row)| {
                let mut buf = vec![F::zero(); cols];
                filter_row(r, &mut buf);
                out_row.iter_mut().zip(buf).for_each(|(o, v)| *o = v);
            });
    } else {
        let mut buf = vec![F::zero(); cols];
        for r in 0..rows {
            filter_row(r, &mut buf);
            output.row_mut(r).iter_mut().zip(&buf).for_each(|(o, &v)| *o = v);
        }
    }
    output
}

// =============================================================================
// Statistics
// =============================================================================

/// Mean and population standard deviation, accumulated in f64.
pub fn mean_std<F: SinoFloat>(data: ArrayView2<F>) -> (F, F) {
    let n = data.len();
    if n == 0 {
        return (F::zero(), F::zero());
    }
    let mean = data.iter().map(|v| v.as_f64()).sum::<f64>() / n as f64;
    let var = data
        .iter()
        .map(|v| {
            let d = v.as_f64() - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    (F::from_f64_c(mean), F::from_f64_c(var.sqrt()))
}

/// Arithmetic mean accumulated in f64.
pub fn mean<F: SinoFloat>(data: ArrayView2<F>) -> F {
    mean_std(data).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    // ==================== Reflect Tests ====================

    #[test]
    fn test_reflect_index_scipy_convention() {
        assert_eq!(reflect_index(-1, 5), 0);
        assert_eq!(reflect_index(-2, 5), 1);
        assert_eq!(reflect_index(5, 5), 4);
        assert_eq!(reflect_index(6, 5), 3);
        assert_eq!(reflect_index(2, 5), 2);
        // Beyond one full reflection the pattern repeats with period 2n.
        assert_eq!(reflect_index(10, 5), 0);
        assert_eq!(reflect_index(-6, 5), 4);
        assert_eq!(reflect_index(-11, 5), 0);
        assert_eq!(reflect_index(7, 1), 0);
    }

    // ==================== Gaussian Tests ====================

    #[test]
    fn test_gaussian_kernel_normalized() {
        let kernel = gaussian_kernel_1d(3.0f64);
        assert_eq!(kernel.len(), 25);
        let sum: f64 = kernel.iter().sum();
        assert!(approx_eq(sum, 1.0, 1e-12));
        assert!(kernel[12] > kernel[11]);
        assert!(approx_eq(kernel[0], kernel[24], 1e-15));
    }

    #[test]
    fn test_gaussian_blur_preserves_constant() {
        let input = Array1::from_elem(40, 2.5f64);
        let out = gaussian_blur_1d(input.view(), 3.0);
        for &v in out.iter() {
            assert!(approx_eq(v, 2.5, 1e-12));
        }
    }

    #[test]
    fn test_gaussian_blur_kernel_wider_than_signal() {
        // sigma=100 on 16 samples: radius 400, periodic reflection keeps the
        // output finite and bounded by the input range.
        let input = Array1::from_shape_fn(16, |i| if (6..10).contains(&i) { 1.0f64 } else { 0.0 });
        let out = gaussian_blur_1d(input.view(), 100.0);
        let expected_mean = 4.0 / 16.0;
        for &v in out.iter() {
            assert!(v.is_finite());
            assert!(approx_eq(v, expected_mean, 0.05));
        }
    }

    #[test]
    fn test_gaussian_blur_zero_sigma_is_identity() {
        let input = array![1.0f32, 5.0, -2.0];
        let out = gaussian_blur_1d(input.view(), 0.0);
        assert_eq!(out, input);
    }

    // ==================== Median Tests ====================

    #[test]
    fn test_median_removes_isolated_spike() {
        let mut input = Array2::<f64>::zeros((9, 9));
        input[[4, 4]] = 100.0;
        let out = median_filter_2d(input.view(), 3);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_median_matches_scipy_small_case() {
        // scipy.ndimage.median_filter(a, size=3) with reflect boundary
        let input = array![[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        let out = median_filter_2d(input.view(), 3);
        let expected = array![[2.0, 3.0, 3.0], [4.0, 5.0, 6.0], [7.0, 7.0, 8.0]];
        assert_eq!(out, expected);
    }

    #[test]
    fn test_median_even_window_upper_rank() {
        // 1D-like case: a single row with size 2 picks the max of each pair
        // window [c-1, c] (origin = 1).
        let input = array![[1.0f64, 4.0, 2.0, 8.0]];
        let out = median_filter_2d(input.view(), 2);
        // windows (rows reflect to the same row): {1,1,1,1}->1, {1,4,1,4}->4,
        // {4,2,4,2}->4, {2,8,2,8}->8
        assert_eq!(out, array![[1.0, 4.0, 4.0, 8.0]]);
    }

    #[test]
    fn test_median_parallel_matches_sequential_shape() {
        let input = Array2::from_shape_fn((80, 12), |(r, c)| ((r * 7 + c * 3) % 11) as f32);
        let out = median_filter_2d(input.view(), 5);
        assert_eq!(out.dim(), (80, 12));
        let min = input.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = input.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(out.iter().all(|&v| v >= min && v <= max));
    }

    // ==================== Statistics Tests ====================

    #[test]
    fn test_mean_std_population() {
        let data = array![[1.0f64, 2.0], [3.0, 4.0]];
        let (m, s) = mean_std(data.view());
        assert!(approx_eq(m, 2.5, 1e-12));
        assert!(approx_eq(s, 1.25f64.sqrt(), 1e-12));
    }
}
