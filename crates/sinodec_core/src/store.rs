//! Memory-mapped volume store for batch runs.
//!
//! The store is a `.npy` file of `f32` shaped `(pixel, angle, slice)`,
//! created in a scratch directory and mapped read-write. It is owned by one
//! batch run: dropping the store unmaps it and deletes the backing file, on
//! success and on every error path alike.

use std::io;
use std::path::Path;

use log::debug;
use memmap2::MmapMut;
use ndarray::{s, Array2, ArrayView2, ArrayView3, ArrayViewMut3, Ix3};
use ndarray_npy::{write_zeroed_npy, ViewMutNpyExt, ViewNpyExt};
use tempfile::NamedTempFile;

use crate::error::{SinoError, SinoResult};
use crate::float_trait::SinoFloat;

/// Out-of-core `(pixel, angle, slice)` stack of `f32` samples.
pub struct OutOfCoreStore {
    // Field order matters: the mapping must be dropped before the file.
    mmap: MmapMut,
    file: NamedTempFile,
    shape: (usize, usize, usize),
}

fn npy_error(err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

impl OutOfCoreStore {
    /// Create a zero-filled store of `(pixels, angles, slices)` in `dir`.
    pub fn create(dir: &Path, shape: (usize, usize, usize)) -> SinoResult<Self> {
        let (pixels, angles, slices) = shape;
        if pixels == 0 || angles == 0 || slices == 0 {
            return Err(SinoError::InvalidConfig(format!(
                "cannot allocate an empty store of shape {shape:?}"
            )));
        }

        let file = tempfile::Builder::new()
            .prefix("sinodec-")
            .suffix(".npy")
            .tempfile_in(dir)
            .map_err(|e| SinoError::io("create", e))?;
        write_zeroed_npy::<f32, _>(file.as_file(), Ix3(pixels, angles, slices))
            .map_err(|e| SinoError::io("allocate", npy_error(e)))?;

        // SAFETY: the file is private to this store (unique temp name, removed
        // on drop) and nothing else maps or truncates it while mapped.
        let mmap = unsafe { MmapMut::map_mut(file.as_file()) }
            .map_err(|e| SinoError::io("map", e))?;

        debug!(
            "store: mapped {:?} ({} MiB) at {}",
            shape,
            (pixels * angles * slices * 4) >> 20,
            file.path().display()
        );
        Ok(Self { mmap, file, shape })
    }

    /// `(pixels, angles, slices)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn view(&self) -> SinoResult<ArrayView3<'_, f32>> {
        ArrayView3::<f32>::view_npy(&self.mmap).map_err(|e| SinoError::io("view", npy_error(e)))
    }

    pub fn view_mut(&mut self) -> SinoResult<ArrayViewMut3<'_, f32>> {
        ArrayViewMut3::<f32>::view_mut_npy(&mut self.mmap)
            .map_err(|e| SinoError::io("view", npy_error(e)))
    }

    /// Store a `(pixel, angle)` sinogram at slice position `slot`.
    pub fn write_slice<F: SinoFloat>(&mut self, slot: usize, sinogram: ArrayView2<F>) -> SinoResult<()> {
        let (pixels, angles, slices) = self.shape;
        SinoError::check_shape("store slice", (pixels, angles), sinogram.dim())?;
        if slot >= slices {
            return Err(SinoError::io(
                "write",
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("slot {slot} outside store of {slices} slices"),
                ),
            ));
        }
        let mut view = self.view_mut()?;
        view.slice_mut(s![.., .., slot])
            .zip_mut_with(&sinogram, |dst, &src| *dst = src.as_f64() as f32);
        Ok(())
    }

    /// Global `(min, max)` over every stored sample, NaNs ignored.
    pub fn value_range(&self) -> SinoResult<(f32, f32)> {
        let view = self.view()?;
        let (min, max) = view.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
        if min > max {
            return Ok((0.0, 0.0));
        }
        Ok((min, max))
    }

    /// `(pixel, slice)` slab of one angle.
    pub fn angle_slab(&self, angle: usize) -> SinoResult<Array2<f32>> {
        let (_, angles, _) = self.shape;
        if angle >= angles {
            return Err(SinoError::io(
                "read",
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("angle {angle} outside store of {angles} angles"),
                ),
            ));
        }
        Ok(self.view()?.slice(s![.., angle, ..]).to_owned())
    }

    pub fn flush(&self) -> SinoResult<()> {
        self.mmap.flush().map_err(|e| SinoError::io("flush", e))
    }

    /// Unmap and delete the backing file, reporting removal errors.
    pub fn close(self) -> SinoResult<()> {
        let Self { mmap, file, .. } = self;
        drop(mmap);
        file.close().map_err(|e| SinoError::io("remove", e))
    }
}
