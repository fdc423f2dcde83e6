//! Sinogram centering.
//!
//! A parallel-beam projection at angle 0 and the mirrored projection half a
//! rotation later image the same object from opposite sides. When the
//! rotation axis sits on the detector centre they coincide, so the circular
//! roll that maximizes their normalized correlation estimates the optical
//! axis misalignment.

use log::debug;
use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::{SinoError, SinoResult};
use crate::float_trait::SinoFloat;

/// Normalized cross-correlation at zero lag.
///
/// `dot(a, b) / sqrt(dot(a, a)) / sqrt(dot(b, b))`, accumulated in f64.
/// Returns `None` when either input has zero energy.
pub fn correlation_coefficient<F: SinoFloat>(a: ArrayView1<F>, b: ArrayView1<F>) -> Option<f64> {
    let (mut ab, mut aa, mut bb) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x.as_f64(), y.as_f64());
        ab += x * y;
        aa += x * x;
        bb += y * y;
    }
    if aa <= 0.0 || bb <= 0.0 {
        return None;
    }
    let r = ab / aa.sqrt() / bb.sqrt();
    r.is_finite().then_some(r)
}

/// Circularly roll a sinogram along the pixel axis (axis 0).
///
/// Element `p` moves to `(p + shift) mod n`, like `numpy.roll(x, shift, 0)`.
pub fn roll_pixels<F: SinoFloat>(sinogram: ArrayView2<F>, shift: i32) -> Array2<F> {
    let (n, angles) = sinogram.dim();
    if n == 0 {
        return sinogram.to_owned();
    }
    let mut out = Array2::zeros((n, angles));
    for p in 0..n {
        let dst = (p as i64 + shift as i64).rem_euclid(n as i64) as usize;
        out.row_mut(dst).assign(&sinogram.row(p));
    }
    out
}

/// Estimate the centering shift of a sinogram (pixel x angle).
///
/// Candidate `i` in `0..span` rolls the pixel axis by `i - span/2` and
/// correlates the first angle column with the flipped column at the
/// half-rotation angle (`full_rotation`) or the flipped last column. The
/// returned shift lies in `[-span/2, span/2)`; ties keep the first maximum
/// and a sinogram with no valid candidate yields 0.
pub fn estimate_shift<F: SinoFloat>(
    sinogram: ArrayView2<F>,
    span: usize,
    full_rotation: bool,
) -> SinoResult<i32> {
    let (n, angles) = sinogram.dim();
    if n == 0 || angles == 0 {
        return Err(SinoError::DegenerateGeometry(format!(
            "cannot center an empty sinogram ({n}, {angles})"
        )));
    }
    if span == 0 {
        return Err(SinoError::InvalidConfig(
            "centering span must be > 0".to_string(),
        ));
    }

    let opposite = if full_rotation { angles / 2 } else { angles - 1 };
    let first = sinogram.column(0);
    let mirror = sinogram.column(opposite);
    let half_span = (span / 2) as i64;
    let len = n as i64;

    let mut a = vec![F::zero(); n];
    let mut b = vec![F::zero(); n];
    let mut best: Option<(usize, f64)> = None;

    for i in 0..span {
        let s = i as i64 - half_span;
        for p in 0..n {
            // rolled[p] = x[(p - s) mod n]; flipped[p] = rolled[n - 1 - p]
            a[p] = first[(p as i64 - s).rem_euclid(len) as usize];
            b[p] = mirror[(len - 1 - p as i64 - s).rem_euclid(len) as usize];
        }
        let coeff = correlation_coefficient(ArrayView1::from(&a[..]), ArrayView1::from(&b[..]));
        if let Some(c) = coeff {
            if best.map_or(true, |(_, bc)| c > bc) {
                best = Some((i, c));
            }
        }
    }

    let shift = match best {
        Some((i, c)) => {
            let shift = (i as i64 - half_span) as i32;
            debug!("centering: shift {shift} (correlation {c:.4}, span {span})");
            shift
        }
        None => {
            debug!("centering: no candidate with non-zero energy, shift 0");
            0
        }
    };
    Ok(shift)
}
