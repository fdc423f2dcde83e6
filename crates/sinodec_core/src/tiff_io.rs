//! TIFF projection files.
//!
//! Projections are single-page grayscale TIFFs, one file per angle, whose
//! names contain `_0` (`scan_0000.tif`, `scan_0001.tif`, ...). Rows of a
//! projection are slices, columns are detector pixels.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype::Gray16, TiffEncoder};
use tiff::ColorType;

use crate::error::{SinoError, SinoResult};
use crate::float_trait::SinoFloat;
use crate::sinogram::ImageSource;
use crate::volume::ProjectionSink;

/// Substring identifying projection files in a scan directory.
pub const PROJECTION_MARKER: &str = "_0";

/// Extension of projection files (matched case-insensitively).
pub const PROJECTION_EXTENSION: &str = "tif";

fn file_error(path: &Path, err: impl std::fmt::Display) -> SinoError {
    SinoError::Collaborator(format!("{}: {err}", path.display()))
}

// =============================================================================
// Page I/O
// =============================================================================

/// Decode the first page of a grayscale TIFF as `(rows, cols)` samples.
pub fn read_tiff_page(path: &Path) -> SinoResult<Array2<f32>> {
    let file = File::open(path).map_err(|e| file_error(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(|e| file_error(path, e))?;

    let (width, height) = decoder.dimensions().map_err(|e| file_error(path, e))?;
    let color_type = decoder.colortype().map_err(|e| file_error(path, e))?;
    if !matches!(
        color_type,
        ColorType::Gray(8) | ColorType::Gray(16) | ColorType::Gray(32) | ColorType::Gray(64)
    ) {
        return Err(file_error(
            path,
            format!("unsupported color type {color_type:?}, only grayscale is supported"),
        ));
    }

    let samples: Vec<f32> = match decoder.read_image().map_err(|e| file_error(path, e))? {
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
    };

    Array2::from_shape_vec((height as usize, width as usize), samples)
        .map_err(|e| file_error(path, e))
}

/// Write a 16-bit grayscale single-page TIFF.
pub fn write_tiff_u16(path: &Path, image: ArrayView2<u16>) -> SinoResult<()> {
    let (height, width) = image.dim();
    let file = File::create(path).map_err(|e| file_error(path, e))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(|e| file_error(path, e))?;
    let samples: Vec<u16> = image.iter().copied().collect();
    encoder
        .write_image::<Gray16>(width as u32, height as u32, &samples)
        .map_err(|e| file_error(path, e))
}

/// Projection files of a scan directory, sorted by name.
pub fn list_projection_files(dir: &Path) -> SinoResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| file_error(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| file_error(dir, e))?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file()
            && name.contains(PROJECTION_MARKER)
            && name.to_ascii_lowercase().ends_with(PROJECTION_EXTENSION)
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// =============================================================================
// Directory Source
// =============================================================================

/// Image source over a directory of projection TIFFs.
///
/// Every `row` call decodes the whole page of its angle; nothing is cached.
#[derive(Debug, Clone)]
pub struct TiffDirectorySource {
    files: Vec<PathBuf>,
    slices: usize,
    pixels: usize,
}

impl TiffDirectorySource {
    /// Scan `dir` for projection files; the first file fixes the geometry.
    pub fn open(dir: &Path) -> SinoResult<Self> {
        let files = list_projection_files(dir)?;
        if files.is_empty() {
            return Err(SinoError::Collaborator(format!(
                "no projection files (*{PROJECTION_MARKER}*.{PROJECTION_EXTENSION}) in {}",
                dir.display()
            )));
        }
        Self::from_files(files)
    }

    /// Use `files` in the given order, one per angle.
    pub fn from_files(files: Vec<PathBuf>) -> SinoResult<Self> {
        let first = files
            .first()
            .ok_or_else(|| SinoError::Collaborator("empty projection list".to_string()))?;
        let (slices, pixels) = read_tiff_page(first)?.dim();
        info!(
            "tiff: {} projections of {slices} slices x {pixels} pixels",
            files.len()
        );
        Ok(Self {
            files,
            slices,
            pixels,
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl<F: SinoFloat> ImageSource<F> for TiffDirectorySource {
    fn angle_count(&self) -> usize {
        self.files.len()
    }

    fn slice_count(&self) -> usize {
        self.slices
    }

    fn pixel_count(&self) -> usize {
        self.pixels
    }

    fn row(&self, slice: usize, angle: usize) -> SinoResult<Array1<F>> {
        let path = self.files.get(angle).ok_or_else(|| {
            SinoError::Collaborator(format!(
                "projection {angle} requested from {} files",
                self.files.len()
            ))
        })?;
        let page = read_tiff_page(path)?;
        SinoError::check_shape("projection page", (self.slices, self.pixels), page.dim())?;
        if slice >= self.slices {
            return Err(SinoError::Collaborator(format!(
                "slice {slice} requested from projections of {} rows",
                self.slices
            )));
        }
        Ok(page.row(slice).mapv(|v| F::from_f64_c(v as f64)))
    }
}

// =============================================================================
// Projection Sink
// =============================================================================

/// Writes each projection to `<dir>/<prefix><angle:04>.tif`.
#[derive(Debug, Clone)]
pub struct TiffProjectionSink {
    dir: PathBuf,
    prefix: String,
}

impl TiffProjectionSink {
    /// Create the output directory if needed.
    pub fn new(dir: &Path, prefix: impl Into<String>) -> SinoResult<Self> {
        fs::create_dir_all(dir).map_err(|e| file_error(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.into(),
        })
    }

    pub fn path_for(&self, angle: usize) -> PathBuf {
        self.dir.join(format!("{}{angle:04}.tif", self.prefix))
    }
}

impl ProjectionSink for TiffProjectionSink {
    fn emit(&mut self, angle: usize, image: Array2<u16>) -> SinoResult<()> {
        let path = self.path_for(angle);
        write_tiff_u16(&path, image.view())?;
        debug!("tiff: wrote {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinogram::assemble_sinogram;

    fn projection(angle: usize) -> Array2<u16> {
        Array2::from_shape_fn((3, 5), |(s, p)| (angle * 100 + s * 10 + p) as u16)
    }

    fn write_scan(dir: &Path, angles: usize) {
        for a in 0..angles {
            write_tiff_u16(&dir.join(format!("scan_{a:04}.tif")), projection(a).view()).unwrap();
        }
    }

    // ==================== Page I/O Tests ====================

    #[test]
    fn test_u16_page_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.tif");
        let image = projection(7);
        write_tiff_u16(&path, image.view()).unwrap();
        let page = read_tiff_page(&path).unwrap();
        assert_eq!(page.dim(), (3, 5));
        assert_eq!(page.mapv(|v| v as u16), image);
    }

    #[test]
    fn test_listing_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write_scan(dir.path(), 3);
        fs::write(dir.path().join("scan.log"), "log").unwrap();
        fs::write(dir.path().join("preview.tif"), "not a projection").unwrap();

        let files = list_projection_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["scan_0000.tif", "scan_0001.tif", "scan_0002.tif"]);
    }

    // ==================== Source and Sink Tests ====================

    #[test]
    fn test_directory_source_assembles_sinogram() {
        let dir = tempfile::tempdir().unwrap();
        write_scan(dir.path(), 4);
        let source = TiffDirectorySource::open(dir.path()).unwrap();
        assert_eq!(ImageSource::<f64>::angle_count(&source), 4);
        assert_eq!(ImageSource::<f64>::slice_count(&source), 3);

        let sino = assemble_sinogram::<f64, _>(&source, 2).unwrap();
        assert_eq!(sino.dim(), (5, 4));
        // angle 3, slice 2, pixel 4
        assert_eq!(sino[[4, 3]], 324.0);
        assert!(ImageSource::<f64>::row(&source, 3, 0).is_err());
    }

    #[test]
    fn test_empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TiffDirectorySource::open(dir.path()),
            Err(SinoError::Collaborator(_))
        ));
    }

    #[test]
    fn test_sink_names_projections() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("deconvolved");
        let mut sink = TiffProjectionSink::new(&out, "scan").unwrap();
        sink.emit(12, projection(1)).unwrap();

        let path = out.join("scan0012.tif");
        assert_eq!(sink.path_for(12), path);
        assert_eq!(read_tiff_page(&path).unwrap().mapv(|v| v as u16), projection(1));
    }
}
