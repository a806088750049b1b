//! Reference surface text inputs
//!
//! Reference surveys are exchanged as plain delimited text: one point per
//! line, easting northing depth and an optional uncertainty column, with
//! depths positive down. Sounding-density exports use the same shape with a
//! per-node count in the third column. Both tolerate comma or whitespace
//! delimiters, `#` comments and blank lines.

use std::fs;
use std::path::Path;

use log::info;

use crate::types::{SwathError, SwathResult};

/// One reference survey point
///
/// `z` is stored positive up, so depths below the datum are negative. The
/// sign flip happens at parse time; everything downstream assumes it.
#[derive(Debug, Clone, Copy)]
pub struct ReferencePoint {
    pub easting: f64,
    pub northing: f64,
    pub z: f64,
    pub uncertainty_m: Option<f64>,
}

/// One sounding-density value at a reference grid node
#[derive(Debug, Clone, Copy)]
pub struct DensityPoint {
    pub easting: f64,
    pub northing: f64,
    pub count: f64,
}

fn fields(line: &str) -> Vec<&str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_f64(token: &str, label: &str, line_no: usize) -> SwathResult<f64> {
    token.parse().map_err(|_| {
        SwathError::InvalidFormat(format!(
            "{} line {}: expected a number, found '{}'",
            label, line_no, token
        ))
    })
}

/// Parse reference survey text into points
pub fn parse_reference_points(text: &str, label: &str) -> SwathResult<Vec<ReferencePoint>> {
    let mut points = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields = fields(line);
        if fields.len() < 3 {
            return Err(SwathError::InvalidFormat(format!(
                "{} line {}: expected easting northing depth, found {} fields",
                label,
                idx + 1,
                fields.len()
            )));
        }
        let easting = parse_f64(fields[0], label, idx + 1)?;
        let northing = parse_f64(fields[1], label, idx + 1)?;
        let depth = parse_f64(fields[2], label, idx + 1)?;
        let uncertainty_m = match fields.get(3) {
            Some(tok) => Some(parse_f64(tok, label, idx + 1)?),
            None => None,
        };
        points.push(ReferencePoint {
            easting,
            northing,
            z: -depth,
            uncertainty_m,
        });
    }
    if points.is_empty() {
        return Err(SwathError::InvalidFormat(format!(
            "{}: no data lines",
            label
        )));
    }
    Ok(points)
}

/// Read a reference survey file
pub fn read_reference_points(path: &Path) -> SwathResult<Vec<ReferencePoint>> {
    let label = path.display().to_string();
    let text = fs::read_to_string(path)?;
    let points = parse_reference_points(&text, &label)?;
    info!("Loaded {} reference points from {}", points.len(), label);
    Ok(points)
}

/// Parse sounding-density text into points
pub fn parse_density_points(text: &str, label: &str) -> SwathResult<Vec<DensityPoint>> {
    let mut points = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields = fields(line);
        if fields.len() < 3 {
            return Err(SwathError::InvalidFormat(format!(
                "{} line {}: expected easting northing count, found {} fields",
                label,
                idx + 1,
                fields.len()
            )));
        }
        points.push(DensityPoint {
            easting: parse_f64(fields[0], label, idx + 1)?,
            northing: parse_f64(fields[1], label, idx + 1)?,
            count: parse_f64(fields[2], label, idx + 1)?,
        });
    }
    if points.is_empty() {
        return Err(SwathError::InvalidFormat(format!(
            "{}: no data lines",
            label
        )));
    }
    Ok(points)
}

/// Read a sounding-density file
pub fn read_density_points(path: &Path) -> SwathResult<Vec<DensityPoint>> {
    let label = path.display().to_string();
    let text = fs::read_to_string(path)?;
    let points = parse_density_points(&text, &label)?;
    info!("Loaded {} density points from {}", points.len(), label);
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimiters_and_sign_flip() {
        let text = "# surveyed 2023-08\n371000.0, 4640000.0, 25.4, 0.3\n371002 4640000 26.0\n";
        let points = parse_reference_points(text, "ref").unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].z, -25.4);
        assert_eq!(points[0].uncertainty_m, Some(0.3));
        assert_eq!(points[1].z, -26.0);
        assert_eq!(points[1].uncertainty_m, None);
    }

    #[test]
    fn test_bad_lines_are_reported_with_context() {
        let err = parse_reference_points("371000 4640000\n", "ref.xyz").unwrap_err();
        match err {
            SwathError::InvalidFormat(msg) => {
                assert!(msg.contains("ref.xyz line 1"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = parse_reference_points("a b c\n", "ref.xyz").unwrap_err();
        assert!(matches!(err, SwathError::InvalidFormat(_)));

        let err = parse_reference_points("# only comments\n", "ref.xyz").unwrap_err();
        assert!(matches!(err, SwathError::InvalidFormat(_)));
    }
}
