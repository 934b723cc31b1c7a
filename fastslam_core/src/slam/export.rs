// fastslam_core/src/slam/export.rs

//! Plain-text landmark tables: an `x,y` header and one row per landmark.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::SlamError;
use crate::types::Point2;

pub const HEADER: &str = "x,y";

/// Writes `points` as an `x,y` table, replacing any existing file.
pub fn write_points(path: &Path, points: &[Point2]) -> Result<(), SlamError> {
    let to_export_error = |source| SlamError::Export {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(to_export_error)?;
    let mut out = BufWriter::new(file);
    write_table(&mut out, points).map_err(to_export_error)?;
    out.flush().map_err(to_export_error)
}

fn write_table<W: Write>(out: &mut W, points: &[Point2]) -> std::io::Result<()> {
    writeln!(out, "{HEADER}")?;
    for p in points {
        writeln!(out, "{},{}", p.x, p.y)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_header_and_one_row_per_point() {
        let mut buf = Vec::new();
        write_table(&mut buf, &[Point2::new(1.5, -2.0), Point2::new(0.0, 3.25)]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "x,y\n1.5,-2\n0,3.25\n");
    }

    #[test]
    fn missing_directory_is_reported_with_its_path() {
        let path = std::env::temp_dir()
            .join("fastslam-export-test-missing-dir")
            .join("landmarks.csv");
        let err = write_points(&path, &[]).unwrap_err();
        match err {
            SlamError::Export { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
