//! Dynamic-range management and sinogram-major to projection-major reslicing.

use log::info;
use ndarray::{Array2, ArrayView2};

/// Largest value of the unsigned 16-bit output.
pub const U16_SPAN: f64 = 65535.0;

/// Target span used when the data range has to be compressed.
pub const RESCALE_TARGET: f64 = 65000.0;

/// Affine map from stored values onto the unsigned 16-bit range.
///
/// Values are shifted by the global minimum; when the resulting span exceeds
/// [`U16_SPAN`] they are also divided by `span / RESCALE_TARGET`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicRange {
    pub min: f64,
    pub max: f64,
    divisor: f64,
}

impl DynamicRange {
    pub fn new(min: f64, max: f64) -> Self {
        let span = (max - min).abs();
        let divisor = if span > U16_SPAN {
            span / RESCALE_TARGET
        } else {
            1.0
        };
        Self { min, max, divisor }
    }

    pub fn span(&self) -> f64 {
        (self.max - self.min).abs()
    }

    pub fn is_compressed(&self) -> bool {
        self.divisor != 1.0
    }

    /// Map one value to the non-negative output scale (before the cast).
    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        (value - self.min) / self.divisor
    }

    /// Map and cast to u16, truncating toward zero and saturating.
    #[inline]
    pub fn to_u16(&self, value: f64) -> u16 {
        // `as` saturates and sends NaN to 0.
        self.apply(value) as u16
    }

    pub fn log_summary(&self) {
        if self.is_compressed() {
            info!(
                "rescale: range [{:.4e}, {:.4e}] compressed by {:.4} into 16 bits",
                self.min, self.max, self.divisor
            );
        } else {
            info!(
                "rescale: range [{:.4e}, {:.4e}] shifted to a zero baseline",
                self.min, self.max
            );
        }
    }
}

/// Turn a `(pixel, slice)` slab of one angle into its `(slice, pixel)`
/// projection image, rescaled and cast to 16 bits.
pub fn reslice_projection(slab: ArrayView2<f32>, range: &DynamicRange) -> Array2<u16> {
    let (pixels, slices) = slab.dim();
    Array2::from_shape_fn((slices, pixels), |(s, p)| range.to_u16(slab[[p, s]] as f64))
}
