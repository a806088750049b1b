//! Beamwise accuracy statistics
//!
//! Accepted depth differences are partitioned into fixed-width beam angle
//! bins across the swath and reduced to count, mean and population standard
//! deviation, for dz in meters and as a percentage of water depth. The
//! whole pass is deterministic: the same rows and policy produce
//! bit-identical bins, which keeps regression baselines trustworthy.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::core::compare::ComparedSounding;
use crate::types::{AccuracyBin, SwathError, SwathResult};

/// Mean removal applied to accepted differences before binning
///
/// Flattening takes the constant vertical offset (sound speed, draft or
/// tide bias) out of the picture so the binned spread shows the angular
/// behavior. It shifts every accepted sounding equally; standard deviations
/// are untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FlattenMode {
    /// Keep raw differences
    Off,
    /// Subtract the mean difference of the whole accepted swath
    WholeSwath,
    /// Subtract the mean difference of a central angle sector
    Sector { min_deg: f64, max_deg: f64 },
}

impl Default for FlattenMode {
    fn default() -> Self {
        FlattenMode::Off
    }
}

/// Sounding acceptance and binning policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterPolicy {
    /// Accepted beam angle window in degrees, port side negative
    pub min_angle_deg: f64,
    pub max_angle_deg: f64,
    /// Accepted sounding depth window in meters, positive down
    pub min_depth_m: f64,
    pub max_depth_m: f64,
    /// Reject rows with |dz| above this many meters
    pub max_abs_dz_m: Option<f64>,
    /// Reject rows with |dz| above this percentage of water depth
    pub max_abs_dz_pct: Option<f64>,
    /// Accepted backscatter window in dB
    pub min_backscatter_db: f64,
    pub max_backscatter_db: f64,
    /// Keep only rows pinged in a specific mode; None accepts any
    pub ping_mode: Option<u8>,
    pub pulse_form: Option<u8>,
    pub swath_mode: Option<u8>,
    /// Bins with fewer accepted rows report NaN statistics
    pub min_bin_count: usize,
    /// Angle bin width in degrees
    pub bin_width_deg: f64,
    /// Bins cover [-limit, +limit)
    pub angle_limit_deg: f64,
    /// Mean removal before binning
    pub flatten: FlattenMode,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        FilterPolicy {
            min_angle_deg: -90.0,
            max_angle_deg: 90.0,
            min_depth_m: 0.0,
            max_depth_m: 12_000.0,
            max_abs_dz_m: None,
            max_abs_dz_pct: None,
            min_backscatter_db: -100.0,
            max_backscatter_db: 50.0,
            ping_mode: None,
            pulse_form: None,
            swath_mode: None,
            min_bin_count: 2,
            bin_width_deg: 1.0,
            angle_limit_deg: 75.0,
            flatten: FlattenMode::Off,
        }
    }
}

impl FilterPolicy {
    fn accepts(&self, row: &ComparedSounding) -> bool {
        let s = &row.sounding;
        if s.beam_angle_deg < self.min_angle_deg || s.beam_angle_deg > self.max_angle_deg {
            return false;
        }
        if s.depth_m < self.min_depth_m || s.depth_m > self.max_depth_m {
            return false;
        }
        if let Some(limit) = self.max_abs_dz_m {
            if row.dz_m.abs() > limit {
                return false;
            }
        }
        if let Some(limit) = self.max_abs_dz_pct {
            if row.dz_pct_wd.abs() > limit {
                return false;
            }
        }
        if s.backscatter_db < self.min_backscatter_db || s.backscatter_db > self.max_backscatter_db
        {
            return false;
        }
        if let Some(mode) = self.ping_mode {
            if s.ping_mode != mode {
                return false;
            }
        }
        if let Some(form) = self.pulse_form {
            if s.pulse_form != form {
                return false;
            }
        }
        if let Some(mode) = self.swath_mode {
            if s.swath_mode != mode {
                return false;
            }
        }
        true
    }
}

/// Reduces comparison rows to per-angle-bin statistics
pub struct AccuracyBinner {
    policy: FilterPolicy,
}

impl AccuracyBinner {
    pub fn new(policy: FilterPolicy) -> Self {
        AccuracyBinner { policy }
    }

    /// Binner with the default policy
    pub fn standard() -> Self {
        AccuracyBinner::new(FilterPolicy::default())
    }

    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    /// Filter, optionally flatten, and bin comparison rows
    ///
    /// Always returns the full bin ladder over [-limit, +limit); bins with
    /// fewer than the minimum count keep their true count alongside NaN
    /// statistics so sparse swath edges stay visible.
    pub fn bin(&self, rows: &[ComparedSounding]) -> SwathResult<Vec<AccuracyBin>> {
        let policy = &self.policy;
        if policy.bin_width_deg <= 0.0 || policy.angle_limit_deg <= 0.0 {
            return Err(SwathError::InvalidInput(format!(
                "bin width {} and angle limit {} must both be positive",
                policy.bin_width_deg, policy.angle_limit_deg
            )));
        }

        let mut accepted: Vec<(f64, f64, f64)> = rows
            .iter()
            .filter(|r| policy.accepts(r))
            .map(|r| (r.sounding.beam_angle_deg, r.dz_m, r.dz_pct_wd))
            .collect();
        debug!("{} of {} rows pass the filter policy", accepted.len(), rows.len());

        if let Some((dz_shift, pct_shift)) = flatten_offsets(&accepted, policy.flatten) {
            debug!(
                "flattening differences by {:.4} m / {:.4} %",
                dz_shift, pct_shift
            );
            for (_, dz, pct) in accepted.iter_mut() {
                *dz -= dz_shift;
                *pct -= pct_shift;
            }
        }

        let n_bins = (2.0 * policy.angle_limit_deg / policy.bin_width_deg).round() as usize;
        let mut members: Vec<Vec<(f64, f64)>> = vec![Vec::new(); n_bins];
        for &(angle, dz, pct) in &accepted {
            let idx = ((angle + policy.angle_limit_deg) / policy.bin_width_deg).floor();
            if idx >= 0.0 && (idx as usize) < n_bins {
                members[idx as usize].push((dz, pct));
            }
        }

        let bins: Vec<AccuracyBin> = members
            .iter()
            .enumerate()
            .map(|(i, vals)| {
                let angle_lo_deg = -policy.angle_limit_deg + i as f64 * policy.bin_width_deg;
                let angle_hi_deg = angle_lo_deg + policy.bin_width_deg;
                let count = vals.len();
                if count == 0 || count < policy.min_bin_count {
                    return AccuracyBin {
                        angle_lo_deg,
                        angle_hi_deg,
                        count,
                        mean_dz_m: f64::NAN,
                        std_dz_m: f64::NAN,
                        mean_dz_pct_wd: f64::NAN,
                        std_dz_pct_wd: f64::NAN,
                    };
                }
                let (mean_dz_m, std_dz_m) = mean_std(vals.iter().map(|v| v.0));
                let (mean_dz_pct_wd, std_dz_pct_wd) = mean_std(vals.iter().map(|v| v.1));
                AccuracyBin {
                    angle_lo_deg,
                    angle_hi_deg,
                    count,
                    mean_dz_m,
                    std_dz_m,
                    mean_dz_pct_wd,
                    std_dz_pct_wd,
                }
            })
            .collect();

        let populated = bins.iter().filter(|b| b.count > 0).count();
        info!(
            "Binned {} accepted rows into {} of {} angle bins",
            accepted.len(),
            populated,
            n_bins
        );
        Ok(bins)
    }
}

/// Mean and population standard deviation, in input order
fn mean_std(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let n = values.clone().count() as f64;
    let mean = values.clone().sum::<f64>() / n;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// The (dz, dz_pct) shift a flatten mode asks for, if any
fn flatten_offsets(accepted: &[(f64, f64, f64)], mode: FlattenMode) -> Option<(f64, f64)> {
    let scope: Vec<&(f64, f64, f64)> = match mode {
        FlattenMode::Off => return None,
        FlattenMode::WholeSwath => accepted.iter().collect(),
        FlattenMode::Sector { min_deg, max_deg } => accepted
            .iter()
            .filter(|(angle, _, _)| *angle >= min_deg && *angle <= max_deg)
            .collect(),
    };
    if scope.is_empty() {
        warn!("flatten sector holds no accepted soundings, leaving differences raw");
        return None;
    }
    let n = scope.len() as f64;
    let dz = scope.iter().map(|v| v.1).sum::<f64>() / n;
    let pct = scope.iter().map(|v| v.2).sum::<f64>() / n;
    Some((dz, pct))
}
