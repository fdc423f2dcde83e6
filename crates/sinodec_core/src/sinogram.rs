//! Sinogram assembly from per-angle projection images.
//!
//! Projections are addressed by `(slice, angle)` and yield one detector row
//! of `pixel_count` samples; the sinogram of a slice stacks those rows as the
//! columns of a `(pixel, angle)` array.

use ndarray::{Array1, Array2, Array3, ArrayView1};

use crate::error::{SinoError, SinoResult};
use crate::float_trait::SinoFloat;

// =============================================================================
// Angles
// =============================================================================

/// Uniformly spaced acquisition angles in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleSet {
    degrees: Vec<f64>,
}

impl AngleSet {
    /// `count` angles `i * range / count` for `i in 0..count`.
    pub fn uniform(count: usize, range_degrees: f64) -> Self {
        let step = if count == 0 { 0.0 } else { range_degrees / count as f64 };
        Self {
            degrees: (0..count).map(|i| i as f64 * step).collect(),
        }
    }

    /// Full-rotation scan over `[0, 360)`.
    pub fn full_rotation(count: usize) -> Self {
        Self::uniform(count, 360.0)
    }

    pub fn degrees(&self) -> &[f64] {
        &self.degrees
    }

    pub fn len(&self) -> usize {
        self.degrees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.degrees.is_empty()
    }

    /// Angular step in degrees (0 for fewer than two angles).
    pub fn step(&self) -> f64 {
        match self.degrees.as_slice() {
            [a, b, ..] => b - a,
            _ => 0.0,
        }
    }
}

// =============================================================================
// Image Sources
// =============================================================================

/// Supplier of detector rows: the only view the core has of projection files.
pub trait ImageSource<F: SinoFloat>: Send + Sync {
    /// Number of acquired angles (projections).
    fn angle_count(&self) -> usize;

    /// Number of detector rows (slices) per projection.
    fn slice_count(&self) -> usize;

    /// Number of detector columns (sinogram pixel axis).
    fn pixel_count(&self) -> usize;

    /// Row `slice` of projection `angle`.
    fn row(&self, slice: usize, angle: usize) -> SinoResult<Array1<F>>;
}

/// Gather row `slice` of every projection into a `(pixel, angle)` sinogram.
pub fn assemble_sinogram<F: SinoFloat, S: ImageSource<F> + ?Sized>(
    source: &S,
    slice: usize,
) -> SinoResult<Array2<F>> {
    let (pixels, angles, slices) = (
        source.pixel_count(),
        source.angle_count(),
        source.slice_count(),
    );
    if slice >= slices {
        return Err(SinoError::Collaborator(format!(
            "slice {slice} requested from a stack of {slices} slices"
        )));
    }

    let mut sinogram = Array2::zeros((pixels, angles));
    for angle in 0..angles {
        let row = source.row(slice, angle)?;
        SinoError::check_shape("projection row", (pixels, 1), (row.len(), 1))?;
        sinogram.column_mut(angle).assign(&row);
    }
    Ok(sinogram)
}

/// Circularly roll a 1D row by `shift` samples.
fn roll_row<F: SinoFloat>(row: ArrayView1<F>, shift: i32) -> Array1<F> {
    let n = row.len();
    let mut out = Array1::zeros(n);
    for (p, &v) in row.iter().enumerate() {
        let dst = (p as i64 + shift as i64).rem_euclid(n as i64) as usize;
        out[dst] = v;
    }
    out
}

/// In-memory projection stack with axes `(angle, slice, pixel)`.
#[derive(Debug, Clone)]
pub struct StackSource<F: SinoFloat> {
    stack: Array3<F>,
}

impl<F: SinoFloat> StackSource<F> {
    pub fn new(stack: Array3<F>) -> Self {
        Self { stack }
    }

    /// Build a stack from per-slice sinograms (each `(pixel, angle)`).
    pub fn from_sinograms(sinograms: &[Array2<F>]) -> SinoResult<Self> {
        let (pixels, angles) = sinograms.first().map(|s| s.dim()).unwrap_or((0, 0));
        let mut stack = Array3::zeros((angles, sinograms.len(), pixels));
        for (slice, sino) in sinograms.iter().enumerate() {
            SinoError::check_shape("stack sinogram", (pixels, angles), sino.dim())?;
            for angle in 0..angles {
                stack
                    .slice_mut(ndarray::s![angle, slice, ..])
                    .assign(&sino.column(angle));
            }
        }
        Ok(Self { stack })
    }

    pub fn stack(&self) -> &Array3<F> {
        &self.stack
    }
}

impl<F: SinoFloat> ImageSource<F> for StackSource<F> {
    fn angle_count(&self) -> usize {
        self.stack.dim().0
    }

    fn slice_count(&self) -> usize {
        self.stack.dim().1
    }

    fn pixel_count(&self) -> usize {
        self.stack.dim().2
    }

    fn row(&self, slice: usize, angle: usize) -> SinoResult<Array1<F>> {
        let (angles, slices, _) = self.stack.dim();
        if angle >= angles || slice >= slices {
            return Err(SinoError::Collaborator(format!(
                "projection ({angle}, slice {slice}) outside stack of {angles} x {slices}"
            )));
        }
        Ok(self.stack.slice(ndarray::s![angle, slice, ..]).to_owned())
    }
}

// =============================================================================
// Drift Correction
// =============================================================================

/// Per-projection sample drift `(dx, dy)`: `dx` along the pixel axis, `dy`
/// along the slice axis.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectionDrift {
    offsets: Vec<(i32, i32)>,
}

impl ProjectionDrift {
    pub fn new(offsets: Vec<(i32, i32)>) -> Self {
        Self { offsets }
    }

    /// Build from separate `dx` and `dy` columns.
    pub fn from_columns(dx: &[i32], dy: &[i32]) -> SinoResult<Self> {
        if dx.len() != dy.len() {
            return Err(SinoError::ShapeMismatch {
                context: "drift table",
                expected: (dx.len(), 1),
                found: (dy.len(), 1),
            });
        }
        Ok(Self::new(dx.iter().copied().zip(dy.iter().copied()).collect()))
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offset(&self, angle: usize) -> Option<(i32, i32)> {
        self.offsets.get(angle).copied()
    }
}

/// Image source decorator that undoes per-projection drift.
///
/// Each projection is rolled by `dx` along the pixel axis and by `dy` along
/// the slice axis before the requested row is taken.
pub struct DriftCorrectedSource<'a, F: SinoFloat, S: ImageSource<F> + ?Sized> {
    inner: &'a S,
    drift: ProjectionDrift,
    _marker: std::marker::PhantomData<F>,
}

impl<'a, F: SinoFloat, S: ImageSource<F> + ?Sized> DriftCorrectedSource<'a, F, S> {
    pub fn new(inner: &'a S, drift: ProjectionDrift) -> SinoResult<Self> {
        if drift.len() != inner.angle_count() {
            return Err(SinoError::ShapeMismatch {
                context: "drift table",
                expected: (inner.angle_count(), 2),
                found: (drift.len(), 2),
            });
        }
        Ok(Self {
            inner,
            drift,
            _marker: std::marker::PhantomData,
        })
    }
}

impl<F: SinoFloat, S: ImageSource<F> + ?Sized> ImageSource<F> for DriftCorrectedSource<'_, F, S> {
    fn angle_count(&self) -> usize {
        self.inner.angle_count()
    }

    fn slice_count(&self) -> usize {
        self.inner.slice_count()
    }

    fn pixel_count(&self) -> usize {
        self.inner.pixel_count()
    }

    fn row(&self, slice: usize, angle: usize) -> SinoResult<Array1<F>> {
        let (dx, dy) = self.drift.offset(angle).ok_or_else(|| {
            SinoError::Collaborator(format!("no drift entry for projection {angle}"))
        })?;
        let slices = self.inner.slice_count() as i64;
        let source_slice = (slice as i64 - dy as i64).rem_euclid(slices.max(1)) as usize;
        let row = self.inner.row(source_slice, angle)?;
        Ok(roll_row(row.view(), dx))
    }
}
