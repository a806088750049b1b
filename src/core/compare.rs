//! Crossline vs reference comparison
//!
//! Every accepted crossline sounding is reduced to a depth difference
//! against the reference surface under its footprint. The comparison runs
//! in the positive-up convention: the sounding depth (positive down, tide
//! removed) is negated before subtracting the reference node depth, so a
//! positive difference always means the crossline saw shallower water than
//! the reference. The water-depth percentage flips sign once more because
//! the reference depth is negative below the datum.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core::geodesy::utm_to_utm;
use crate::core::refgrid::ReferenceGrid;
use crate::io::tide::TideSeries;
use crate::types::GeoreferencedSounding;

/// One sounding that landed on a usable reference node
#[derive(Debug, Clone)]
pub struct ComparedSounding {
    pub sounding: GeoreferencedSounding,
    /// Tide applied to the sounding depth (meters, positive up)
    pub tide_m: f64,
    /// Reference depth under the footprint (positive up)
    pub ref_z_m: f64,
    /// Depth difference, positive when the sounding is shallower
    pub dz_m: f64,
    /// Difference as a percentage of the reference water depth
    pub dz_pct_wd: f64,
}

/// Tally of one comparison pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub num_soundings: usize,
    pub num_on_ref: usize,
    pub num_off_ref: usize,
    pub num_tide_out_of_range: usize,
    pub num_zone_transformed: usize,
}

/// Comparison rows plus the tally
#[derive(Debug, Clone)]
pub struct CrosslineComparison {
    pub soundings: Vec<ComparedSounding>,
    pub report: ComparisonReport,
}

/// Compare georeferenced soundings against a reference surface
///
/// Soundings in a different UTM zone than the grid are re-projected first.
/// Ping times outside the tide span get zero tide and are counted, never
/// dropped; soundings whose footprint reads NaN from the masked grid are
/// excluded from the rows but kept in the off-reference tally. An empty row
/// set is a valid outcome.
pub fn compare_soundings(
    grid: &ReferenceGrid,
    tide: Option<&TideSeries>,
    soundings: &[GeoreferencedSounding],
) -> CrosslineComparison {
    let mut report = ComparisonReport {
        num_soundings: soundings.len(),
        ..ComparisonReport::default()
    };
    let mut rows = Vec::with_capacity(soundings.len());

    for s in soundings {
        let (easting, northing) = if s.utm_zone != grid.zone {
            report.num_zone_transformed += 1;
            utm_to_utm(s.easting, s.northing, s.utm_zone, grid.zone)
        } else {
            (s.easting, s.northing)
        };

        let tide_m = match tide {
            None => 0.0,
            Some(series) => match series.interpolate(s.time) {
                Some(h) => h,
                None => {
                    report.num_tide_out_of_range += 1;
                    0.0
                }
            },
        };

        let ref_z_m = grid.sample_masked(easting, northing);
        if ref_z_m.is_nan() {
            report.num_off_ref += 1;
            continue;
        }
        report.num_on_ref += 1;

        let z_sounding = -(s.depth_m - tide_m);
        let dz_m = z_sounding - ref_z_m;
        let dz_pct_wd = -100.0 * dz_m / ref_z_m;
        rows.push(ComparedSounding {
            sounding: s.clone(),
            tide_m,
            ref_z_m,
            dz_m,
            dz_pct_wd,
        });
    }

    if report.num_tide_out_of_range > 0 {
        warn!(
            "{} of {} ping times fell outside the tide span, applied zero tide",
            report.num_tide_out_of_range, report.num_soundings
        );
    }
    info!(
        "Compared {} soundings: {} on reference, {} off, {} re-zoned",
        report.num_soundings, report.num_on_ref, report.num_off_ref, report.num_zone_transformed
    );
    CrosslineComparison {
        soundings: rows,
        report,
    }
}
