//! Acquisition metadata written by the OPT scanner.
//!
//! - Scan log: a `key=value` text file; the pixel size and the 360-degree
//!   flag are read from fixed line positions.
//! - Drift table: a CSV file with two preamble lines and per-projection
//!   offsets in the `Y1` (pixel axis) and `Y2` (slice axis) columns.

use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use log::debug;

use crate::config::PipelineConfig;
use crate::error::{SinoError, SinoResult};
use crate::sinogram::ProjectionDrift;

/// Zero-based line of the scan log holding the pixel size.
pub const PIXEL_SIZE_LINE: usize = 5;

/// Zero-based line of the scan log holding the 360-degree flag.
pub const ROTATION_LINE: usize = 14;

/// Lines preceding the drift table header.
pub const DRIFT_PREAMBLE_LINES: usize = 2;

/// Drift column with the pixel-axis offset.
pub const DRIFT_DX_COLUMN: &str = "Y1";

/// Drift column with the slice-axis offset.
pub const DRIFT_DY_COLUMN: &str = "Y2";

fn read_text(path: &Path) -> SinoResult<String> {
    fs::read_to_string(path)
        .map_err(|e| SinoError::Collaborator(format!("cannot read {}: {e}", path.display())))
}

// =============================================================================
// Scan Log
// =============================================================================

/// Geometry recorded in a scan log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanLog {
    pub pixel_size: f64,
    pub full_rotation: bool,
}

fn log_value<'a>(lines: &[&'a str], index: usize, what: &str) -> SinoResult<&'a str> {
    let line = lines.get(index).ok_or_else(|| {
        SinoError::Collaborator(format!(
            "scan log has {} lines, {what} expected on line {}",
            lines.len(),
            index + 1
        ))
    })?;
    Ok(line.rsplit('=').next().unwrap_or_default().trim())
}

impl ScanLog {
    pub fn parse(text: &str) -> SinoResult<Self> {
        let lines: Vec<&str> = text.lines().collect();

        let raw = log_value(&lines, PIXEL_SIZE_LINE, "pixel size")?;
        let pixel_size = raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| SinoError::Collaborator(format!("invalid pixel size {raw:?} in scan log")))?;

        let full_rotation = match log_value(&lines, ROTATION_LINE, "rotation flag")? {
            "YES" => true,
            "NO" => false,
            other => {
                return Err(SinoError::Collaborator(format!(
                    "invalid rotation flag {other:?} in scan log (expected YES or NO)"
                )))
            }
        };

        debug!("scan log: pixel size {pixel_size}, full rotation {full_rotation}");
        Ok(Self {
            pixel_size,
            full_rotation,
        })
    }

    pub fn from_path(path: &Path) -> SinoResult<Self> {
        Self::parse(&read_text(path)?)
    }

    /// Copy the recorded geometry into `config`.
    pub fn apply(&self, config: &mut PipelineConfig) {
        config.pixel_size = self.pixel_size;
        config.full_rotation = self.full_rotation;
    }
}

// =============================================================================
// Drift Table
// =============================================================================

fn csv_error(err: csv::Error) -> SinoError {
    SinoError::Collaborator(format!("malformed drift table: {err}"))
}

/// Offsets are stored as decimals and truncated toward zero.
fn parse_offset(field: Option<&str>, row: usize, column: &str) -> SinoResult<i32> {
    let raw = field.unwrap_or_default();
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= i32::MAX as f64)
        .map(|v| v.trunc() as i32)
        .ok_or_else(|| {
            SinoError::Collaborator(format!(
                "drift table row {row}: invalid {column} offset {raw:?}"
            ))
        })
}

/// Parse a drift table into one `(dx, dy)` pair per projection.
pub fn parse_drift_csv(text: &str) -> SinoResult<ProjectionDrift> {
    let body = text
        .lines()
        .skip(DRIFT_PREAMBLE_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = reader.headers().map_err(csv_error)?.clone();
    let column = |name: &str| {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            SinoError::Collaborator(format!("drift table has no {name} column"))
        })
    };
    let (x_col, y_col) = (column(DRIFT_DX_COLUMN)?, column(DRIFT_DY_COLUMN)?);

    let mut dx = Vec::new();
    let mut dy = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        dx.push(parse_offset(record.get(x_col), row, DRIFT_DX_COLUMN)?);
        dy.push(parse_offset(record.get(y_col), row, DRIFT_DY_COLUMN)?);
    }

    debug!("drift table: {} projections", dx.len());
    ProjectionDrift::from_columns(&dx, &dy)
}

pub fn read_drift_csv(path: &Path) -> SinoResult<ProjectionDrift> {
    parse_drift_csv(&read_text(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_log(pixel: &str, rotation: &str) -> String {
        let mut lines: Vec<String> = (0..20).map(|i| format!("Entry {i}=value")).collect();
        lines[PIXEL_SIZE_LINE] = format!("Image Pixel Size (um)={pixel}");
        lines[ROTATION_LINE] = format!("Use 360 Rotation={rotation}");
        lines.join("\r\n")
    }

    // ==================== Scan Log Tests ====================

    #[test]
    fn test_scan_log_reads_fixed_lines() {
        let log = ScanLog::parse(&scan_log("6.5", "YES")).unwrap();
        assert_eq!(
            log,
            ScanLog {
                pixel_size: 6.5,
                full_rotation: true
            }
        );

        let mut config = PipelineConfig::default();
        ScanLog::parse(&scan_log("2", "NO")).unwrap().apply(&mut config);
        assert_eq!(config.pixel_size, 2.0);
        assert!(!config.full_rotation);
    }

    #[test]
    fn test_scan_log_rejects_bad_values() {
        assert!(ScanLog::parse(&scan_log("abc", "YES")).is_err());
        assert!(ScanLog::parse(&scan_log("-1", "YES")).is_err());
        assert!(ScanLog::parse(&scan_log("1.0", "MAYBE")).is_err());
        assert!(matches!(
            ScanLog::parse("a=1\nb=2"),
            Err(SinoError::Collaborator(_))
        ));
    }

    // ==================== Drift Table Tests ====================

    #[test]
    fn test_drift_csv_columns_and_truncation() {
        let text = "Tracking export\nsecond line\nFrame, Y1, Y2\n0, 1.7, -2.4\n1, -0.9, 3\n2, 0, 0\n";
        let drift = parse_drift_csv(text).unwrap();
        assert_eq!(drift.len(), 3);
        assert_eq!(drift.offset(0), Some((1, -2)));
        assert_eq!(drift.offset(1), Some((0, 3)));
        assert_eq!(drift.offset(2), Some((0, 0)));
    }

    #[test]
    fn test_drift_csv_errors() {
        let missing = "a\nb\nFrame, Y1\n0, 1\n";
        assert!(parse_drift_csv(missing).is_err());
        let garbage = "a\nb\nFrame, Y1, Y2\n0, x, 1\n";
        assert!(parse_drift_csv(garbage).is_err());
    }

    #[test]
    fn test_read_drift_csv_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_TS.csv");
        fs::write(&path, "x\ny\nFrame,Y1,Y2\n0,2,1\n").unwrap();
        assert_eq!(read_drift_csv(&path).unwrap().offset(0), Some((2, 1)));
        assert!(read_drift_csv(&dir.path().join("missing.csv")).is_err());
    }
}
