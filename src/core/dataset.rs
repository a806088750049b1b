//! Per-file pipeline and multi-file accuracy session
//!
//! `parse_crossline` runs one log file through scan, decode, track building
//! and georeferencing. Files are independent, so batches parse in parallel
//! and merge by value into a `SurveyDataset` in input order. On top of that
//! sits `AccuracySession`, which owns the dataset together with reference,
//! tide and policy inputs and recomputes only the stages an input change
//! actually invalidates.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::core::binning::{AccuracyBinner, FilterPolicy};
use crate::core::compare::{compare_soundings, CrosslineComparison};
use crate::core::geodesy::UtmZone;
use crate::core::georef::{runtime_at, GeorefConfig, SoundingGeoreferencer};
use crate::core::navigation::NavigationTrack;
use crate::core::refgrid::{GridConfig, MaskThresholds, ReferenceGrid, ReferenceSurfaceBuilder};
use crate::io::datagram::scan_frames;
use crate::io::records::{decode_record, decode_soundings_outermost};
use crate::io::reference::{DensityPoint, ReferencePoint};
use crate::io::tide::TideSeries;
use crate::types::{
    AccuracyBin, DatagramType, DecodedRecord, DepthReference, GeoreferencedSounding,
    InstallParams, PositionFix, RuntimeParams, SoundingPing, SwathError, SwathResult,
};

/// Knobs for the per-file parse pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Vertical datum for output sounding depths
    pub depth_reference: DepthReference,
    /// Override the installation's active positioning system (0-based);
    /// None follows the installation record
    pub position_system: Option<u8>,
    /// Keep only the outermost valid beam pair of each ping, the reduction
    /// used for swath extinction checks
    pub outermost_only: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            depth_reference: DepthReference::Waterline,
            position_system: None,
            outermost_only: false,
        }
    }
}

/// What one file contributed, kept for provenance after the merge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseSummary {
    pub file: String,
    pub buffer_len: usize,
    pub frame_count: usize,
    pub skipped_bytes: usize,
    pub dropped_records: usize,
    pub position_fixes: usize,
    pub attitude_records: usize,
    pub runtime_records: usize,
    pub pings: usize,
    pub soundings: usize,
}

/// One parsed crossline file
#[derive(Debug, Clone)]
pub struct CrosslineFile {
    pub name: Arc<str>,
    pub soundings: Vec<GeoreferencedSounding>,
    pub summary: ParseSummary,
}

/// Run one file through scan, decode, track building and georeferencing
///
/// Corrupt spans and malformed records never abort the file: the former
/// surface as skipped bytes, the latter are dropped and counted. The only
/// fatal condition is a file with no usable position fixes, which a
/// georeferenced product cannot be built without.
pub fn parse_crossline(
    name: &str,
    bytes: &[u8],
    options: &ParseOptions,
) -> SwathResult<CrosslineFile> {
    info!("Parsing crossline file {} ({} bytes)", name, bytes.len());
    let (frames, report) = scan_frames(bytes);

    let mut positions: Vec<PositionFix> = Vec::new();
    let mut runtimes: Vec<RuntimeParams> = Vec::new();
    let mut pings: Vec<SoundingPing> = Vec::new();
    let mut install: Option<InstallParams> = None;
    let mut attitude_records = 0usize;
    let mut dropped_records = 0usize;

    for frame in &frames {
        let decoded = if options.outermost_only
            && frame.datagram_type() == Some(DatagramType::Soundings)
        {
            decode_soundings_outermost(frame).map(|p| Some(DecodedRecord::Soundings(p)))
        } else {
            decode_record(frame)
        };
        match decoded {
            Ok(Some(DecodedRecord::Position(fix))) => positions.push(fix),
            Ok(Some(DecodedRecord::Runtime(params))) => runtimes.push(params),
            Ok(Some(DecodedRecord::Soundings(ping))) => pings.push(ping),
            Ok(Some(DecodedRecord::Installation(params))) => {
                // start and stop records repeat the same text; first one wins
                if install.is_none() {
                    install = Some(params);
                }
            }
            Ok(Some(DecodedRecord::Attitude(_))) => attitude_records += 1,
            Ok(Some(_)) | Ok(None) => {}
            Err(e) => {
                dropped_records += 1;
                debug!(
                    "{}: dropped record at offset {}: {}",
                    name, frame.offset, e
                );
            }
        }
    }

    let install = match install {
        Some(params) => params,
        None => {
            warn!("{}: no installation record, using default offsets", name);
            InstallParams::default()
        }
    };
    let active_system = options
        .position_system
        .or(install.active_position_system)
        .unwrap_or(0);
    let track = NavigationTrack::from_fixes(&positions, active_system, name)?;

    runtimes.sort_by_key(|r| r.header.timestamp);
    let georeferencer = SoundingGeoreferencer::new(GeorefConfig {
        depth_reference: options.depth_reference,
    });

    let source: Arc<str> = Arc::from(name);
    let mut soundings = Vec::new();
    for ping in &pings {
        let runtime = runtime_at(&runtimes, ping.header.timestamp);
        soundings.extend(georeferencer.georeference_ping(ping, &track, &install, runtime, &source));
    }

    let summary = ParseSummary {
        file: name.to_string(),
        buffer_len: report.buffer_len,
        frame_count: report.frame_count,
        skipped_bytes: report.skipped_bytes,
        dropped_records,
        position_fixes: positions.len(),
        attitude_records,
        runtime_records: runtimes.len(),
        pings: pings.len(),
        soundings: soundings.len(),
    };
    info!(
        "{}: {} pings -> {} soundings ({} fixes, {} dropped records)",
        name, summary.pings, summary.soundings, summary.position_fixes, summary.dropped_records
    );

    Ok(CrosslineFile {
        name: source,
        soundings,
        summary,
    })
}

/// A batch parse: parsed files in input order plus the files that failed
#[derive(Debug)]
pub struct BatchOutcome {
    pub files: Vec<CrosslineFile>,
    pub failures: Vec<(PathBuf, SwathError)>,
}

fn parse_one_path(
    path: &Path,
    options: &ParseOptions,
) -> Result<CrosslineFile, (PathBuf, SwathError)> {
    let parse = || -> SwathResult<CrosslineFile> {
        let bytes = fs::read(path)?;
        let name = match path.file_name() {
            Some(stem) => stem.to_string_lossy().into_owned(),
            None => path.display().to_string(),
        };
        parse_crossline(&name, &bytes, options)
    };
    parse().map_err(|e| (path.to_path_buf(), e))
}

fn split_outcome(results: Vec<Result<CrosslineFile, (PathBuf, SwathError)>>) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        files: Vec::new(),
        failures: Vec::new(),
    };
    for result in results {
        match result {
            Ok(file) => outcome.files.push(file),
            Err((path, e)) => {
                warn!("Skipping {}: {}", path.display(), e);
                outcome.failures.push((path, e));
            }
        }
    }
    info!(
        "Parsed {} of {} files",
        outcome.files.len(),
        outcome.files.len() + outcome.failures.len()
    );
    outcome
}

/// Parse a batch of crossline files in parallel
///
/// Best effort: a file that fails to read or parse is reported and the rest
/// of the batch still goes through. Output order follows input order
/// regardless of which worker finished first.
#[cfg(feature = "parallel")]
pub fn parse_crossline_files(paths: &[PathBuf], options: &ParseOptions) -> BatchOutcome {
    use rayon::prelude::*;

    let results: Vec<Result<CrosslineFile, (PathBuf, SwathError)>> = paths
        .par_iter()
        .map(|path| parse_one_path(path, options))
        .collect();
    split_outcome(results)
}

/// Parse a batch of crossline files sequentially
#[cfg(not(feature = "parallel"))]
pub fn parse_crossline_files(paths: &[PathBuf], options: &ParseOptions) -> BatchOutcome {
    let results: Vec<Result<CrosslineFile, (PathBuf, SwathError)>> = paths
        .iter()
        .map(|path| parse_one_path(path, options))
        .collect();
    split_outcome(results)
}

/// Soundings from every parsed file, merged by value
///
/// The merge order is input order, then per-file ping order, so a dataset
/// built from the same files is always identical. Per-file summaries ride
/// along for provenance.
#[derive(Debug, Clone, Default)]
pub struct SurveyDataset {
    summaries: Vec<ParseSummary>,
    soundings: Vec<GeoreferencedSounding>,
}

impl SurveyDataset {
    pub fn from_files(files: Vec<CrosslineFile>) -> Self {
        let mut summaries = Vec::with_capacity(files.len());
        let mut soundings = Vec::new();
        for file in files {
            summaries.push(file.summary);
            soundings.extend(file.soundings);
        }
        info!(
            "Survey dataset holds {} soundings from {} files",
            soundings.len(),
            summaries.len()
        );
        SurveyDataset {
            summaries,
            soundings,
        }
    }

    pub fn soundings(&self) -> &[GeoreferencedSounding] {
        &self.soundings
    }

    pub fn summaries(&self) -> &[ParseSummary] {
        &self.summaries
    }

    pub fn num_files(&self) -> usize {
        self.summaries.len()
    }

    pub fn num_soundings(&self) -> usize {
        self.soundings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.soundings.is_empty()
    }
}

/// Dataset plus reference, tide and policy, with staged recomputation
///
/// The stage chain is grid -> comparison -> bins. Each input setter marks
/// the first stage it invalidates; asking for a product recomputes the
/// dirty stages and nothing upstream of them. Changing mask thresholds
/// therefore rebuilds all three, while changing the filter policy only
/// rebins the existing comparison.
pub struct AccuracySession {
    dataset: SurveyDataset,
    reference: Option<(Vec<ReferencePoint>, Option<Vec<DensityPoint>>, UtmZone)>,
    grid_config: GridConfig,
    tide: Option<TideSeries>,
    policy: FilterPolicy,
    grid: Option<ReferenceGrid>,
    comparison: Option<CrosslineComparison>,
    bins: Option<Vec<AccuracyBin>>,
    grid_dirty: bool,
    compare_dirty: bool,
    bins_dirty: bool,
}

impl AccuracySession {
    pub fn new(dataset: SurveyDataset) -> Self {
        AccuracySession {
            dataset,
            reference: None,
            grid_config: GridConfig::default(),
            tide: None,
            policy: FilterPolicy::default(),
            grid: None,
            comparison: None,
            bins: None,
            grid_dirty: true,
            compare_dirty: true,
            bins_dirty: true,
        }
    }

    pub fn dataset(&self) -> &SurveyDataset {
        &self.dataset
    }

    /// Load the reference survey the crosslines are judged against
    pub fn set_reference(
        &mut self,
        points: Vec<ReferencePoint>,
        density: Option<Vec<DensityPoint>>,
        zone: UtmZone,
    ) {
        self.reference = Some((points, density, zone));
        self.grid_dirty = true;
    }

    pub fn set_grid_config(&mut self, config: GridConfig) {
        self.grid_config = config;
        self.grid_dirty = true;
    }

    /// Replace only the validity mask thresholds, keeping cell handling
    pub fn set_mask_thresholds(&mut self, thresholds: MaskThresholds) {
        self.grid_config.thresholds = thresholds;
        self.grid_dirty = true;
    }

    pub fn set_tide(&mut self, tide: Option<TideSeries>) {
        self.tide = tide;
        self.compare_dirty = true;
    }

    pub fn set_filter_policy(&mut self, policy: FilterPolicy) {
        self.policy = policy;
        self.bins_dirty = true;
    }

    pub fn filter_policy(&self) -> &FilterPolicy {
        &self.policy
    }

    fn ensure_grid(&mut self) -> SwathResult<()> {
        if self.grid.is_some() && !self.grid_dirty {
            return Ok(());
        }
        let (points, density, zone) = match &self.reference {
            Some(reference) => reference,
            None => {
                return Err(SwathError::ReferenceUnavailable(
                    "no reference survey loaded".to_string(),
                ))
            }
        };
        let builder = ReferenceSurfaceBuilder::new(self.grid_config.clone());
        self.grid = Some(builder.build(points, density.as_deref(), *zone)?);
        self.grid_dirty = false;
        self.compare_dirty = true;
        Ok(())
    }

    fn ensure_comparison(&mut self) -> SwathResult<()> {
        self.ensure_grid()?;
        if self.comparison.is_some() && !self.compare_dirty {
            return Ok(());
        }
        let grid = match &self.grid {
            Some(grid) => grid,
            None => {
                return Err(SwathError::ReferenceUnavailable(
                    "reference grid missing after build".to_string(),
                ))
            }
        };
        self.comparison = Some(compare_soundings(
            grid,
            self.tide.as_ref(),
            self.dataset.soundings(),
        ));
        self.compare_dirty = false;
        self.bins_dirty = true;
        Ok(())
    }

    fn ensure_bins(&mut self) -> SwathResult<()> {
        self.ensure_comparison()?;
        if self.bins.is_some() && !self.bins_dirty {
            return Ok(());
        }
        let comparison = match &self.comparison {
            Some(comparison) => comparison,
            None => {
                return Err(SwathError::ReferenceUnavailable(
                    "comparison missing after recompute".to_string(),
                ))
            }
        };
        let binner = AccuracyBinner::new(self.policy.clone());
        self.bins = Some(binner.bin(&comparison.soundings)?);
        self.bins_dirty = false;
        Ok(())
    }

    /// The gridded reference surface, building it if needed
    pub fn reference_grid(&mut self) -> SwathResult<&ReferenceGrid> {
        self.ensure_grid()?;
        match &self.grid {
            Some(grid) => Ok(grid),
            None => Err(SwathError::ReferenceUnavailable(
                "reference grid missing after build".to_string(),
            )),
        }
    }

    /// The crossline-vs-reference comparison, recomputing dirty stages
    pub fn comparison(&mut self) -> SwathResult<&CrosslineComparison> {
        self.ensure_comparison()?;
        match &self.comparison {
            Some(comparison) => Ok(comparison),
            None => Err(SwathError::ReferenceUnavailable(
                "comparison missing after recompute".to_string(),
            )),
        }
    }

    /// Beamwise accuracy bins under the current filter policy
    pub fn accuracy_bins(&mut self) -> SwathResult<&[AccuracyBin]> {
        self.ensure_bins()?;
        match &self.bins {
            Some(bins) => Ok(bins),
            None => Err(SwathError::ReferenceUnavailable(
                "bins missing after recompute".to_string(),
            )),
        }
    }
}
