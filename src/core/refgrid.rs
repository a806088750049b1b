//! Reference surface construction
//!
//! The reference survey arrives as scattered grid-node exports, not as a
//! raster, so the builder recovers the grid: detect the cell size from the
//! coordinates themselves, bin samples to nodes, fill interior voids, and
//! derive the slope layer the validity mask needs. Nodes too far from any
//! original sample are masked rather than interpolated into existence, and
//! the final mask ANDs every enabled acceptance criterion so the comparator
//! only ever reads nodes the surveyor would trust.

use std::collections::HashMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core::geodesy::UtmZone;
use crate::io::reference::{DensityPoint, ReferencePoint};
use crate::types::{GridLayer, GridMask, SwathError, SwathResult};

/// Relative cell-size disagreement between axes worth a warning
const CELL_MISMATCH_WARN: f64 = 0.01;
/// Tolerance for matching density points onto nodes, as a cell fraction
const NODE_MATCH_TOL: f64 = 1e-6;
/// Upper bound on grid nodes, to catch corrupt coordinate columns
const MAX_GRID_NODES: usize = 100_000_000;

/// Node acceptance thresholds
///
/// Each criterion can be toggled independently; disabled criteria and
/// criteria whose layer is absent accept every node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskThresholds {
    /// Apply the depth window
    pub enable_depth_masking: bool,
    /// Accepted depth window in meters, positive down
    pub min_depth_m: f64,
    pub max_depth_m: f64,
    /// Apply the slope window
    pub enable_slope_masking: bool,
    /// Accepted slope window in degrees
    pub min_slope_deg: f64,
    pub max_slope_deg: f64,
    /// Require a minimum sounding density per node
    pub enable_density_masking: bool,
    pub min_density: f64,
    /// Reject nodes above an uncertainty ceiling
    pub enable_uncertainty_masking: bool,
    pub max_uncertainty_m: f64,
}

impl Default for MaskThresholds {
    fn default() -> Self {
        MaskThresholds {
            enable_depth_masking: false,
            min_depth_m: 0.0,
            max_depth_m: 12_000.0,
            enable_slope_masking: true,
            min_slope_deg: 0.0,
            max_slope_deg: 5.0, // accuracy work wants a flat reference
            enable_density_masking: false,
            min_density: 5.0,
            enable_uncertainty_masking: false,
            max_uncertainty_m: 1.0,
        }
    }
}

/// Reference surface builder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Moving-average window (nodes) applied before slope estimation
    pub smoothing_window: usize,
    /// Maximum distance to the nearest original sample, as a fraction of
    /// the cell size; nodes beyond it are masked
    pub max_sample_distance_frac: f64,
    /// Node acceptance thresholds
    pub thresholds: MaskThresholds,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            smoothing_window: 3,
            max_sample_distance_frac: 0.5,
            thresholds: MaskThresholds::default(),
        }
    }
}

/// Gridded reference surface with validity mask
///
/// All layers share one shape, indexed `[easting, northing]`. Depth is
/// stored positive up, so below-datum values are negative. The grid is
/// immutable; threshold changes rebuild it from the original points.
#[derive(Debug, Clone)]
pub struct ReferenceGrid {
    pub easting_nodes: Vec<f64>,
    pub northing_nodes: Vec<f64>,
    /// Node depth, positive up, NaN where unusable
    pub depth: GridLayer,
    pub density: Option<GridLayer>,
    pub uncertainty: Option<GridLayer>,
    pub slope_deg: GridLayer,
    /// True only where every enabled criterion accepts the node
    pub mask: GridMask,
    pub cell_size_east: f64,
    pub cell_size_north: f64,
    pub zone: UtmZone,
}

impl ReferenceGrid {
    pub fn shape(&self) -> (usize, usize) {
        self.depth.dim()
    }

    /// Count of nodes passing the combined mask
    pub fn valid_nodes(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    /// Masked bilinear depth lookup at a projected position
    ///
    /// Returns NaN off the grid, when the nearest node fails the mask, or
    /// when any of the four interpolation corners is masked out or has no
    /// depth; a rejected node never contributes to the blend. NaN is the
    /// comparator's signal to count the sounding as off-reference.
    pub fn sample_masked(&self, easting: f64, northing: f64) -> f64 {
        let ne = self.easting_nodes.len();
        let nn = self.northing_nodes.len();
        let fx = (easting - self.easting_nodes[0]) / self.cell_size_east;
        let fy = (northing - self.northing_nodes[0]) / self.cell_size_north;
        if fx < 0.0 || fy < 0.0 || fx > (ne - 1) as f64 || fy > (nn - 1) as f64 {
            return f64::NAN;
        }

        let nearest = (fx.round() as usize, fy.round() as usize);
        if !self.mask[[nearest.0, nearest.1]] {
            return f64::NAN;
        }

        let i0 = fx.floor() as usize;
        let j0 = fy.floor() as usize;
        let i1 = (i0 + 1).min(ne - 1);
        let j1 = (j0 + 1).min(nn - 1);
        if !self.mask[[i0, j0]]
            || !self.mask[[i1, j0]]
            || !self.mask[[i0, j1]]
            || !self.mask[[i1, j1]]
        {
            return f64::NAN;
        }
        let wx = fx - i0 as f64;
        let wy = fy - j0 as f64;

        let z00 = self.depth[[i0, j0]];
        let z10 = self.depth[[i1, j0]];
        let z01 = self.depth[[i0, j1]];
        let z11 = self.depth[[i1, j1]];
        if z00.is_nan() || z10.is_nan() || z01.is_nan() || z11.is_nan() {
            return f64::NAN;
        }

        let bottom = z00 * (1.0 - wx) + z10 * wx;
        let top = z01 * (1.0 - wx) + z11 * wx;
        bottom * (1.0 - wy) + top * wy
    }
}

/// Builds a [`ReferenceGrid`] from scattered survey points
pub struct ReferenceSurfaceBuilder {
    config: GridConfig,
}

impl ReferenceSurfaceBuilder {
    pub fn new(config: GridConfig) -> Self {
        ReferenceSurfaceBuilder { config }
    }

    /// Builder with the default configuration
    pub fn standard() -> Self {
        ReferenceSurfaceBuilder::new(GridConfig::default())
    }

    /// Grid a reference survey, with an optional density overlay
    pub fn build(
        &self,
        points: &[ReferencePoint],
        density: Option<&[DensityPoint]>,
        zone: UtmZone,
    ) -> SwathResult<ReferenceGrid> {
        if points.is_empty() {
            return Err(SwathError::InvalidInput(
                "reference survey has no points".to_string(),
            ));
        }

        let cell_e = detect_cell_size(points.iter().map(|p| p.easting), "easting")?;
        let cell_n = detect_cell_size(points.iter().map(|p| p.northing), "northing")?;
        let rel = (cell_e - cell_n).abs() / cell_e.max(cell_n);
        if rel > CELL_MISMATCH_WARN {
            warn!(
                "reference cell size differs between axes: {:.3} m east vs {:.3} m north",
                cell_e, cell_n
            );
        }

        let e0 = points.iter().map(|p| p.easting).fold(f64::INFINITY, f64::min);
        let e1 = points.iter().map(|p| p.easting).fold(f64::NEG_INFINITY, f64::max);
        let n0 = points.iter().map(|p| p.northing).fold(f64::INFINITY, f64::min);
        let n1 = points.iter().map(|p| p.northing).fold(f64::NEG_INFINITY, f64::max);
        let ne = ((e1 - e0) / cell_e).round() as usize + 1;
        let nn = ((n1 - n0) / cell_n).round() as usize + 1;
        if ne.saturating_mul(nn) > MAX_GRID_NODES {
            return Err(SwathError::InvalidInput(format!(
                "reference grid of {}x{} nodes is implausible (cell {:.3} x {:.3} m)",
                ne, nn, cell_e, cell_n
            )));
        }
        let easting_nodes: Vec<f64> = (0..ne).map(|i| e0 + i as f64 * cell_e).collect();
        let northing_nodes: Vec<f64> = (0..nn).map(|j| n0 + j as f64 * cell_n).collect();

        // Average samples into nodes
        let mut sum = GridLayer::zeros((ne, nn));
        let mut count = GridLayer::zeros((ne, nn));
        let mut unc_sum = GridLayer::zeros((ne, nn));
        let mut unc_count = GridLayer::zeros((ne, nn));
        for p in points {
            let i = node_index(p.easting, e0, cell_e, ne);
            let j = node_index(p.northing, n0, cell_n, nn);
            sum[[i, j]] += p.z;
            count[[i, j]] += 1.0;
            if let Some(u) = p.uncertainty_m {
                unc_sum[[i, j]] += u;
                unc_count[[i, j]] += 1.0;
            }
        }
        let mut depth = GridLayer::from_elem((ne, nn), f64::NAN);
        for i in 0..ne {
            for j in 0..nn {
                if count[[i, j]] > 0.0 {
                    depth[[i, j]] = sum[[i, j]] / count[[i, j]];
                }
            }
        }
        let binned_nodes = depth.iter().filter(|v| v.is_finite()).count();

        // Interior void fill, then drop nodes with no nearby original sample
        let filled = fill_voids_linear(&depth);
        let index = SampleIndex::new(points, cell_e, cell_n);
        let max_dist = self.config.max_sample_distance_frac * cell_e.max(cell_n);
        let mut surface = GridLayer::from_elem((ne, nn), f64::NAN);
        for i in 0..ne {
            for j in 0..nn {
                if filled[[i, j]].is_finite()
                    && index.any_within(easting_nodes[i], northing_nodes[j], max_dist)
                {
                    surface[[i, j]] = filled[[i, j]];
                }
            }
        }
        let surface_nodes = surface.iter().filter(|v| v.is_finite()).count();

        // Slope from a smoothed, void-free copy, re-masked to the footprint
        let closed = fill_remaining_voids(&surface);
        let smoothed = smooth_moving_average(&closed, self.config.smoothing_window);
        let mut slope_deg = slope_degrees(&smoothed, cell_e, cell_n);
        for i in 0..ne {
            for j in 0..nn {
                if surface[[i, j]].is_nan() {
                    slope_deg[[i, j]] = f64::NAN;
                }
            }
        }

        let density_layer = density
            .map(|pts| grid_density(pts, &easting_nodes, &northing_nodes, cell_e, cell_n));
        let uncertainty_layer = if unc_count.iter().any(|&c| c > 0.0) {
            let mut unc = GridLayer::from_elem((ne, nn), f64::NAN);
            for i in 0..ne {
                for j in 0..nn {
                    if unc_count[[i, j]] > 0.0 {
                        unc[[i, j]] = unc_sum[[i, j]] / unc_count[[i, j]];
                    }
                }
            }
            Some(unc)
        } else {
            None
        };

        let mask = combined_mask(
            &surface,
            &slope_deg,
            density_layer.as_ref(),
            uncertainty_layer.as_ref(),
            &self.config.thresholds,
        );
        let valid = mask.iter().filter(|&&m| m).count();
        info!(
            "Reference grid {}x{} nodes at {:.2} x {:.2} m: {} binned, {} surfaced, {} pass the mask",
            ne, nn, cell_e, cell_n, binned_nodes, surface_nodes, valid
        );

        Ok(ReferenceGrid {
            easting_nodes,
            northing_nodes,
            depth: surface,
            density: density_layer,
            uncertainty: uncertainty_layer,
            slope_deg,
            mask,
            cell_size_east: cell_e,
            cell_size_north: cell_n,
            zone,
        })
    }
}

fn node_index(coord: f64, origin: f64, cell: f64, n: usize) -> usize {
    let idx = ((coord - origin) / cell).round();
    (idx.max(0.0) as usize).min(n - 1)
}

/// Mean spacing of the unique sorted coordinates along one axis
fn detect_cell_size(coords: impl Iterator<Item = f64>, axis: &str) -> SwathResult<f64> {
    let mut vals: Vec<f64> = coords.collect();
    vals.sort_by(f64::total_cmp);
    vals.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    if vals.len() < 2 {
        return Err(SwathError::InvalidInput(format!(
            "reference survey spans a single {} value, cannot grid it",
            axis
        )));
    }
    let spacing: f64 = vals.windows(2).map(|w| w[1] - w[0]).sum::<f64>() / (vals.len() - 1) as f64;
    if !spacing.is_finite() || spacing <= 0.0 {
        return Err(SwathError::InvalidInput(format!(
            "could not detect a {} cell size",
            axis
        )));
    }
    Ok(spacing)
}

/// Linear interpolation across interior NaN runs of one line
fn fill_line(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    let finite: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, _)| i)
        .collect();
    for w in finite.windows(2) {
        let (a, b) = (w[0], w[1]);
        if b > a + 1 {
            let va = values[a];
            let vb = values[b];
            for k in a + 1..b {
                let alpha = (k - a) as f64 / (b - a) as f64;
                out[k] = va + alpha * (vb - va);
            }
        }
    }
    out
}

/// Axis-wise interior void fill, averaging the two directions where both
/// produced a value
fn fill_voids_linear(grid: &GridLayer) -> GridLayer {
    let (ne, nn) = grid.dim();
    let mut along_e = GridLayer::from_elem((ne, nn), f64::NAN);
    let mut along_n = GridLayer::from_elem((ne, nn), f64::NAN);

    for j in 0..nn {
        let line: Vec<f64> = (0..ne).map(|i| grid[[i, j]]).collect();
        for (i, v) in fill_line(&line).into_iter().enumerate() {
            along_e[[i, j]] = v;
        }
    }
    for i in 0..ne {
        let line: Vec<f64> = (0..nn).map(|j| grid[[i, j]]).collect();
        for (j, v) in fill_line(&line).into_iter().enumerate() {
            along_n[[i, j]] = v;
        }
    }

    let mut out = grid.clone();
    for i in 0..ne {
        for j in 0..nn {
            if out[[i, j]].is_nan() {
                let fe = along_e[[i, j]];
                let fn_ = along_n[[i, j]];
                out[[i, j]] = match (fe.is_finite(), fn_.is_finite()) {
                    (true, true) => 0.5 * (fe + fn_),
                    (true, false) => fe,
                    (false, true) => fn_,
                    (false, false) => f64::NAN,
                };
            }
        }
    }
    out
}

/// Close remaining voids by repeated neighbor averaging, so smoothing and
/// slope differences see a value everywhere the grid has any data at all
fn fill_remaining_voids(grid: &GridLayer) -> GridLayer {
    let (ne, nn) = grid.dim();
    let mut out = grid.clone();
    for _ in 0..ne.max(nn) {
        let prev = out.clone();
        let mut changed = false;
        for i in 0..ne {
            for j in 0..nn {
                if prev[[i, j]].is_nan() {
                    let mut sum = 0.0;
                    let mut cnt = 0u32;
                    if i > 0 && prev[[i - 1, j]].is_finite() {
                        sum += prev[[i - 1, j]];
                        cnt += 1;
                    }
                    if i + 1 < ne && prev[[i + 1, j]].is_finite() {
                        sum += prev[[i + 1, j]];
                        cnt += 1;
                    }
                    if j > 0 && prev[[i, j - 1]].is_finite() {
                        sum += prev[[i, j - 1]];
                        cnt += 1;
                    }
                    if j + 1 < nn && prev[[i, j + 1]].is_finite() {
                        sum += prev[[i, j + 1]];
                        cnt += 1;
                    }
                    if cnt > 0 {
                        out[[i, j]] = sum / cnt as f64;
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
    out
}

/// Truncated box mean over an odd window, NaN values skipped
fn smooth_moving_average(grid: &GridLayer, window: usize) -> GridLayer {
    if window <= 1 {
        return grid.clone();
    }
    let half = (window / 2) as isize;
    let (ne, nn) = grid.dim();
    let mut out = GridLayer::from_elem((ne, nn), f64::NAN);
    for i in 0..ne as isize {
        for j in 0..nn as isize {
            let mut sum = 0.0;
            let mut cnt = 0u32;
            for di in -half..=half {
                for dj in -half..=half {
                    let (pi, pj) = (i + di, j + dj);
                    if pi >= 0 && pj >= 0 && pi < ne as isize && pj < nn as isize {
                        let v = grid[[pi as usize, pj as usize]];
                        if v.is_finite() {
                            sum += v;
                            cnt += 1;
                        }
                    }
                }
            }
            if cnt > 0 {
                out[[i as usize, j as usize]] = sum / cnt as f64;
            }
        }
    }
    out
}

/// Per-axis central-difference slope in degrees, taking the steeper axis
fn slope_degrees(grid: &GridLayer, cell_e: f64, cell_n: f64) -> GridLayer {
    let (ne, nn) = grid.dim();
    let mut out = GridLayer::from_elem((ne, nn), f64::NAN);
    for i in 0..ne {
        for j in 0..nn {
            let de = if ne < 2 {
                0.0
            } else {
                let (a, b, span) = if i == 0 {
                    (i, i + 1, cell_e)
                } else if i == ne - 1 {
                    (i - 1, i, cell_e)
                } else {
                    (i - 1, i + 1, 2.0 * cell_e)
                };
                (grid[[b, j]] - grid[[a, j]]) / span
            };
            let dn = if nn < 2 {
                0.0
            } else {
                let (a, b, span) = if j == 0 {
                    (j, j + 1, cell_n)
                } else if j == nn - 1 {
                    (j - 1, j, cell_n)
                } else {
                    (j - 1, j + 1, 2.0 * cell_n)
                };
                (grid[[i, b]] - grid[[i, a]]) / span
            };
            let slope_e = de.abs().atan().to_degrees();
            let slope_n = dn.abs().atan().to_degrees();
            out[[i, j]] = slope_e.max(slope_n);
        }
    }
    out
}

/// Spatial hash over original samples, one bucket per grid cell
struct SampleIndex {
    cell_e: f64,
    cell_n: f64,
    buckets: HashMap<(i64, i64), Vec<(f64, f64)>>,
}

impl SampleIndex {
    fn new(points: &[ReferencePoint], cell_e: f64, cell_n: f64) -> Self {
        let mut buckets: HashMap<(i64, i64), Vec<(f64, f64)>> = HashMap::new();
        for p in points {
            let key = (
                (p.easting / cell_e).floor() as i64,
                (p.northing / cell_n).floor() as i64,
            );
            buckets.entry(key).or_default().push((p.easting, p.northing));
        }
        SampleIndex {
            cell_e,
            cell_n,
            buckets,
        }
    }

    /// Any original sample within `radius` of the position
    fn any_within(&self, easting: f64, northing: f64, radius: f64) -> bool {
        let ke = (easting / self.cell_e).floor() as i64;
        let kn = (northing / self.cell_n).floor() as i64;
        let re = (radius / self.cell_e).ceil() as i64 + 1;
        let rn = (radius / self.cell_n).ceil() as i64 + 1;
        let r2 = radius * radius;
        for de in -re..=re {
            for dn in -rn..=rn {
                if let Some(bucket) = self.buckets.get(&(ke + de, kn + dn)) {
                    for &(pe, pn) in bucket {
                        let dx = pe - easting;
                        let dy = pn - northing;
                        if dx * dx + dy * dy <= r2 {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }
}

/// Place density points onto their grid nodes by coordinate agreement
fn grid_density(
    points: &[DensityPoint],
    easting_nodes: &[f64],
    northing_nodes: &[f64],
    cell_e: f64,
    cell_n: f64,
) -> GridLayer {
    let ne = easting_nodes.len();
    let nn = northing_nodes.len();
    let mut out = GridLayer::from_elem((ne, nn), f64::NAN);
    let mut unmatched = 0usize;
    for p in points {
        let i = node_index(p.easting, easting_nodes[0], cell_e, ne);
        let j = node_index(p.northing, northing_nodes[0], cell_n, nn);
        let hit = (p.easting - easting_nodes[i]).abs() <= NODE_MATCH_TOL * cell_e
            && (p.northing - northing_nodes[j]).abs() <= NODE_MATCH_TOL * cell_n;
        if hit {
            out[[i, j]] = p.count;
        } else {
            unmatched += 1;
        }
    }
    if unmatched > 0 {
        warn!(
            "{} of {} density points did not land on a reference node",
            unmatched,
            points.len()
        );
    }
    out
}

/// AND of every enabled acceptance criterion over nodes with depth
fn combined_mask(
    depth: &GridLayer,
    slope_deg: &GridLayer,
    density: Option<&GridLayer>,
    uncertainty: Option<&GridLayer>,
    thresholds: &MaskThresholds,
) -> GridMask {
    let (ne, nn) = depth.dim();
    let mut mask = GridMask::from_elem((ne, nn), false);
    for i in 0..ne {
        for j in 0..nn {
            let z = depth[[i, j]];
            if z.is_nan() {
                continue;
            }
            let mut ok = true;
            if thresholds.enable_depth_masking {
                let down = -z;
                ok &= down >= thresholds.min_depth_m && down <= thresholds.max_depth_m;
            }
            if ok && thresholds.enable_slope_masking {
                let s = slope_deg[[i, j]];
                ok &= s.is_finite()
                    && s >= thresholds.min_slope_deg
                    && s <= thresholds.max_slope_deg;
            }
            if ok && thresholds.enable_density_masking {
                if let Some(layer) = density {
                    let d = layer[[i, j]];
                    ok &= d.is_finite() && d >= thresholds.min_density;
                }
            }
            if ok && thresholds.enable_uncertainty_masking {
                if let Some(layer) = uncertainty {
                    let u = layer[[i, j]];
                    ok &= u.is_finite() && u <= thresholds.max_uncertainty_m;
                }
            }
            mask[[i, j]] = ok;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_points(nx: usize, ny: usize, cell: f64, depth: f64) -> Vec<ReferencePoint> {
        let mut points = Vec::new();
        for i in 0..nx {
            for j in 0..ny {
                points.push(ReferencePoint {
                    easting: 371_000.0 + i as f64 * cell,
                    northing: 4_640_000.0 + j as f64 * cell,
                    z: -depth,
                    uncertainty_m: None,
                });
            }
        }
        points
    }

    fn zone() -> UtmZone {
        UtmZone::new(19, false).unwrap()
    }

    #[test]
    fn test_cell_size_detection() {
        let points = flat_points(6, 4, 2.0, 30.0);
        let grid = ReferenceSurfaceBuilder::standard()
            .build(&points, None, zone())
            .unwrap();
        assert!((grid.cell_size_east - 2.0).abs() < 1e-9);
        assert!((grid.cell_size_north - 2.0).abs() < 1e-9);
        assert_eq!(grid.shape(), (6, 4));
    }

    #[test]
    fn test_flat_grid_passes_default_mask() {
        let points = flat_points(5, 5, 1.0, 30.0);
        let grid = ReferenceSurfaceBuilder::standard()
            .build(&points, None, zone())
            .unwrap();
        assert_eq!(grid.valid_nodes(), 25);
        let z = grid.sample_masked(371_002.5, 4_640_002.5);
        assert!((z - (-30.0)).abs() < 1e-9);
    }

    #[test]
    fn test_interior_void_fill() {
        let mut points = flat_points(5, 5, 1.0, 30.0);
        // Dig out the center node; linear fill should restore it
        points.retain(|p| {
            !((p.easting - 371_002.0).abs() < 1e-9 && (p.northing - 4_640_002.0).abs() < 1e-9)
        });
        let config = GridConfig {
            // Keep the distance mask permissive so the filled node survives
            max_sample_distance_frac: 1.5,
            ..GridConfig::default()
        };
        let grid = ReferenceSurfaceBuilder::new(config)
            .build(&points, None, zone())
            .unwrap();
        let center = grid.depth[[2, 2]];
        assert!((center - (-30.0)).abs() < 1e-9);
    }

    #[test]
    fn test_slope_on_a_ramp() {
        // 1 m of depth change per 10 m of easting = 5.71 degrees
        let mut points = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                points.push(ReferencePoint {
                    easting: 1000.0 + i as f64 * 10.0,
                    northing: 2000.0 + j as f64 * 10.0,
                    z: -(30.0 + i as f64),
                    uncertainty_m: None,
                });
            }
        }
        let config = GridConfig {
            smoothing_window: 1,
            thresholds: MaskThresholds {
                enable_slope_masking: false,
                ..MaskThresholds::default()
            },
            ..GridConfig::default()
        };
        let grid = ReferenceSurfaceBuilder::new(config)
            .build(&points, None, zone())
            .unwrap();
        let expected = (0.1f64).atan().to_degrees();
        assert!((grid.slope_deg[[5, 5]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_each_criterion_can_reject() {
        let points = flat_points(4, 4, 1.0, 30.0);

        let deep = GridConfig {
            thresholds: MaskThresholds {
                enable_depth_masking: true,
                min_depth_m: 50.0,
                max_depth_m: 100.0,
                enable_slope_masking: false,
                ..MaskThresholds::default()
            },
            ..GridConfig::default()
        };
        let grid = ReferenceSurfaceBuilder::new(deep)
            .build(&points, None, zone())
            .unwrap();
        assert_eq!(grid.valid_nodes(), 0);
        assert!(grid.sample_masked(371_001.0, 4_640_001.0).is_nan());

        let dense = GridConfig {
            thresholds: MaskThresholds {
                enable_slope_masking: false,
                enable_density_masking: true,
                min_density: 10.0,
                ..MaskThresholds::default()
            },
            ..GridConfig::default()
        };
        let density: Vec<DensityPoint> = points
            .iter()
            .map(|p| DensityPoint {
                easting: p.easting,
                northing: p.northing,
                count: 3.0,
            })
            .collect();
        let grid = ReferenceSurfaceBuilder::new(dense)
            .build(&points, Some(&density), zone())
            .unwrap();
        assert_eq!(grid.valid_nodes(), 0);

        // Density criterion enabled but no density layer loaded: accepts
        let dense2 = GridConfig {
            thresholds: MaskThresholds {
                enable_slope_masking: false,
                enable_density_masking: true,
                min_density: 10.0,
                ..MaskThresholds::default()
            },
            ..GridConfig::default()
        };
        let grid = ReferenceSurfaceBuilder::new(dense2)
            .build(&points, None, zone())
            .unwrap();
        assert_eq!(grid.valid_nodes(), 16);
    }

    #[test]
    fn test_uncertainty_masking() {
        let mut points = flat_points(4, 4, 30.0, 30.0);
        for p in points.iter_mut() {
            p.uncertainty_m = Some(if p.easting < 371_060.0 { 0.2 } else { 2.0 });
        }
        let config = GridConfig {
            thresholds: MaskThresholds {
                enable_slope_masking: false,
                enable_uncertainty_masking: true,
                max_uncertainty_m: 0.5,
                ..MaskThresholds::default()
            },
            ..GridConfig::default()
        };
        let grid = ReferenceSurfaceBuilder::new(config)
            .build(&points, None, zone())
            .unwrap();
        // Two of four easting columns carry acceptable uncertainty
        assert_eq!(grid.valid_nodes(), 8);
    }
}
