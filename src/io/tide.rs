//! Tide observation files
//!
//! Tide exports come from whatever gauge software the survey had on hand, so
//! the reader normalizes the common timestamp shapes (`2023/08/14 12:30:00`,
//! `2023-08-14T12:30`, `20230814 123000` with `,` also accepted between date
//! and time) instead of demanding one format. Amplitudes are positive up;
//! heights may carry a unit column and are converted to meters.

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use log::info;
use regex::Regex;

use crate::types::{SwathError, SwathResult};

const METERS_PER_FOOT: f64 = 0.3048;
const METERS_PER_SMOOT: f64 = 1.7018;

/// One tide observation, height in meters positive up
#[derive(Debug, Clone, Copy)]
pub struct TidePoint {
    pub time: DateTime<Utc>,
    pub height_m: f64,
}

/// Time-sorted tide series for one survey day
#[derive(Debug, Clone)]
pub struct TideSeries {
    points: Vec<TidePoint>,
}

impl TideSeries {
    /// Build a series from observations, sorting by time and dropping exact
    /// duplicate timestamps (first wins)
    pub fn from_points(mut points: Vec<TidePoint>) -> SwathResult<Self> {
        if points.is_empty() {
            return Err(SwathError::InvalidFormat(
                "tide series has no observations".to_string(),
            ));
        }
        points.sort_by_key(|p| p.time);
        points.dedup_by_key(|p| p.time);
        Ok(TideSeries { points })
    }

    /// Parse tide text
    pub fn parse(text: &str, label: &str) -> SwathResult<Self> {
        let stamp = Regex::new(
            r"^(\d{4})[/-]?(\d{2})[/-]?(\d{2})[T,\s]+(\d{1,2}):?(\d{2}):?(\d{2})?",
        )
        .map_err(|e| SwathError::Processing(format!("tide timestamp regex: {}", e)))?;

        let mut points = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let caps = stamp.captures(line).ok_or_else(|| {
                SwathError::InvalidFormat(format!(
                    "{} line {}: unrecognized timestamp in '{}'",
                    label,
                    idx + 1,
                    line
                ))
            })?;
            let time = timestamp_from_captures(&caps, label, idx + 1)?;

            let rest = line[caps.get(0).map(|m| m.end()).unwrap_or(0)..].trim();
            let mut tokens = rest.split_whitespace();
            let height_tok = tokens.next().ok_or_else(|| {
                SwathError::InvalidFormat(format!(
                    "{} line {}: missing tide amplitude",
                    label,
                    idx + 1
                ))
            })?;
            let height: f64 = height_tok.parse().map_err(|_| {
                SwathError::InvalidFormat(format!(
                    "{} line {}: bad tide amplitude '{}'",
                    label,
                    idx + 1,
                    height_tok
                ))
            })?;
            let scale = match tokens.next() {
                None => 1.0,
                Some(unit) => unit_to_meters(unit, label, idx + 1)?,
            };
            points.push(TidePoint {
                time,
                height_m: height * scale,
            });
        }
        TideSeries::from_points(points)
    }

    /// Read a tide file
    pub fn read(path: &Path) -> SwathResult<Self> {
        let label = path.display().to_string();
        let text = fs::read_to_string(path)?;
        let series = TideSeries::parse(&text, &label)?;
        let (start, end) = series.span();
        info!(
            "Loaded {} tide observations from {} ({} to {})",
            series.len(),
            label,
            start,
            end
        );
        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[TidePoint] {
        &self.points
    }

    /// First and last observation times
    pub fn span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.points[0].time,
            self.points[self.points.len() - 1].time,
        )
    }

    /// Tide height at a time, or None outside the observed span
    ///
    /// Pings outside the span are the caller's policy decision; the series
    /// itself never extrapolates a tide.
    pub fn interpolate(&self, time: DateTime<Utc>) -> Option<f64> {
        if self.points.len() == 1 {
            return (self.points[0].time == time).then_some(self.points[0].height_m);
        }
        let seg = self
            .points
            .windows(2)
            .find(|w| time >= w[0].time && time <= w[1].time)?;
        let span_ms = (seg[1].time - seg[0].time).num_milliseconds() as f64;
        let alpha = (time - seg[0].time).num_milliseconds() as f64 / span_ms;
        Some(seg[0].height_m + alpha * (seg[1].height_m - seg[0].height_m))
    }
}

fn timestamp_from_captures(
    caps: &regex::Captures,
    label: &str,
    line_no: usize,
) -> SwathResult<DateTime<Utc>> {
    let num =
        |i: usize| -> u32 { caps.get(i).map_or(0, |m| m.as_str().parse().unwrap_or(0)) };
    let date = NaiveDate::from_ymd_opt(num(1) as i32, num(2), num(3))
        .and_then(|d| d.and_hms_opt(num(4), num(5), num(6)))
        .ok_or_else(|| {
            SwathError::InvalidFormat(format!(
                "{} line {}: timestamp out of range",
                label, line_no
            ))
        })?;
    Ok(Utc.from_utc_datetime(&date))
}

fn unit_to_meters(unit: &str, label: &str, line_no: usize) -> SwathResult<f64> {
    match unit.to_ascii_lowercase().as_str() {
        "m" | "meter" | "meters" => Ok(1.0),
        "ft" | "feet" | "foot" => Ok(METERS_PER_FOOT),
        "smoot" | "smoots" => Ok(METERS_PER_SMOOT),
        other => Err(SwathError::InvalidFormat(format!(
            "{} line {}: unknown tide unit '{}'",
            label, line_no, other
        ))),
    }
}
