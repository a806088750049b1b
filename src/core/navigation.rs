//! Navigation track assembly and time interpolation
//!
//! Sounders ping faster than positioning systems report, so every ping time
//! lands between two fixes. The track keeps the active system's fixes in
//! strict time order and interpolates linearly; ping times slightly outside
//! the fix span extrapolate from the boundary segment rather than failing,
//! since logging always starts and stops mid-line.

use chrono::{DateTime, Utc};
use log::debug;

use crate::types::{NavigationFix, PositionFix, SwathError, SwathResult};

/// Time-sorted navigation for one logger file
///
/// Tracks are per-file: lines are surveyed independently and fixes are never
/// chained across file boundaries.
#[derive(Debug, Clone)]
pub struct NavigationTrack {
    fixes: Vec<NavigationFix>,
}

impl NavigationTrack {
    /// Build a track from decoded position fixes
    ///
    /// Keeps only fixes whose system descriptor matches the active
    /// positioning system (the descriptor low bits are 1-based where the
    /// installation APS value is 0-based), sorts by time, and drops exact
    /// duplicate timestamps keeping the first occurrence.
    pub fn from_fixes(
        fixes: &[PositionFix],
        active_system: u8,
        label: &str,
    ) -> SwathResult<Self> {
        let wanted = active_system + 1;
        let mut kept: Vec<NavigationFix> = fixes
            .iter()
            .filter(|f| f.positioning_system() == wanted)
            .map(|f| NavigationFix {
                time: f.header.timestamp,
                latitude: f.latitude,
                longitude: f.longitude,
                system: f.positioning_system(),
            })
            .collect();

        if kept.is_empty() {
            return Err(SwathError::NoActivePositionData(format!(
                "{}: no fixes from positioning system {} among {} position records",
                label,
                wanted,
                fixes.len()
            )));
        }

        kept.sort_by_key(|f| f.time);
        kept.dedup_by_key(|f| f.time);
        debug!(
            "{}: navigation track has {} of {} fixes (system {})",
            label,
            kept.len(),
            fixes.len(),
            wanted
        );
        Ok(NavigationTrack { fixes: kept })
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn fixes(&self) -> &[NavigationFix] {
        &self.fixes
    }

    /// First and last fix times
    pub fn time_span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.fixes[0].time,
            self.fixes[self.fixes.len() - 1].time,
        )
    }

    /// Position at an arbitrary time as (latitude, longitude)
    ///
    /// Piecewise linear between fixes, exact at fix times. Times outside the
    /// span extrapolate from the first or last segment; a single-fix track
    /// returns that fix for every time.
    pub fn interpolate(&self, time: DateTime<Utc>) -> (f64, f64) {
        if self.fixes.len() == 1 {
            return (self.fixes[0].latitude, self.fixes[0].longitude);
        }
        let idx = match self.fixes.binary_search_by_key(&time, |f| f.time) {
            Ok(i) => return (self.fixes[i].latitude, self.fixes[i].longitude),
            Err(0) => 0,
            Err(i) if i >= self.fixes.len() => self.fixes.len() - 2,
            Err(i) => i - 1,
        };
        let a = &self.fixes[idx];
        let b = &self.fixes[idx + 1];
        let span_ms = (b.time - a.time).num_milliseconds() as f64;
        let alpha = (time - a.time).num_milliseconds() as f64 / span_ms;
        (
            a.latitude + alpha * (b.latitude - a.latitude),
            a.longitude + alpha * (b.longitude - a.longitude),
        )
    }
}
