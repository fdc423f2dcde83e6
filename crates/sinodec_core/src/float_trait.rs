//! Float trait abstraction for f32/f64 support.
//!
//! Every numeric kernel in this crate is generic over [`SinoFloat`], so the
//! restoration pipeline runs in either single or double precision.

use num_traits::{Float, FromPrimitive, NumAssign};
use rustfft::FftNum;
use std::fmt::Debug;
use std::iter::Sum;

/// Trait alias for floating point types supported by the sinogram pipeline.
///
/// This trait combines all the bounds needed by the restoration kernels:
/// - Basic float operations (Float, NumAssign)
/// - FFT compatibility (FftNum from rustfft, also required by realfft)
/// - Conversion from primitive types (FromPrimitive)
/// - Iteration support (Sum)
/// - Debug printing
pub trait SinoFloat:
    Float + FftNum + FromPrimitive + NumAssign + Sum + Debug + Send + Sync + 'static
{
    /// The constant PI for this float type.
    const PI: Self;

    /// Gaussian kernel truncation factor (4.0, scipy's default).
    const GAUSSIAN_TRUNCATE: Self;

    /// 1/sqrt(2), the Haar filter tap.
    const FRAC_1_SQRT_2: Self;

    /// Create a value from an f64 constant.
    fn from_f64_c(val: f64) -> Self;

    /// Create a value from a usize constant.
    fn usize_as(val: usize) -> Self;

    /// Create a value from an isize constant.
    fn isize_as(val: isize) -> Self;

    /// Widen to f64 for accumulation and reporting.
    fn as_f64(self) -> f64;
}

impl SinoFloat for f32 {
    const PI: Self = std::f32::consts::PI;
    const GAUSSIAN_TRUNCATE: Self = 4.0;
    const FRAC_1_SQRT_2: Self = std::f32::consts::FRAC_1_SQRT_2;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val as f32
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f32
    }

    #[inline]
    fn isize_as(val: isize) -> Self {
        val as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl SinoFloat for f64 {
    const PI: Self = std::f64::consts::PI;
    const GAUSSIAN_TRUNCATE: Self = 4.0;
    const FRAC_1_SQRT_2: Self = std::f64::consts::FRAC_1_SQRT_2;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f64
    }

    #[inline]
    fn isize_as(val: isize) -> Self {
        val as f64
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_trait_impl() {
        let val: f32 = SinoFloat::from_f64_c(std::f64::consts::PI);
        assert!((val - std::f32::consts::PI).abs() < 1e-5);

        let usize_val: f32 = SinoFloat::usize_as(42);
        assert_eq!(usize_val, 42.0f32);

        let isize_val: f32 = SinoFloat::isize_as(-5);
        assert_eq!(isize_val, -5.0f32);

        assert_eq!(2.5f32.as_f64(), 2.5f64);
    }

    #[test]
    fn test_f64_trait_impl() {
        let val: f64 = SinoFloat::from_f64_c(std::f64::consts::PI);
        assert!((val - std::f64::consts::PI).abs() < 1e-14);

        let isize_val: f64 = SinoFloat::isize_as(-5);
        assert_eq!(isize_val, -5.0f64);
    }

    #[test]
    fn test_haar_tap() {
        assert!((f32::FRAC_1_SQRT_2 * f32::FRAC_1_SQRT_2 - 0.5).abs() < 1e-7);
        assert!((f64::FRAC_1_SQRT_2 * f64::FRAC_1_SQRT_2 - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_gaussian_truncate() {
        assert_eq!(f32::GAUSSIAN_TRUNCATE, 4.0f32);
        assert_eq!(f64::GAUSSIAN_TRUNCATE, 4.0f64);
    }
}
