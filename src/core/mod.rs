//! Core georeferencing and accuracy processing modules

pub mod geodesy;
pub mod navigation;
pub mod georef;
pub mod refgrid;
pub mod compare;
pub mod binning;
pub mod dataset;

// Re-export main types
pub use geodesy::{geodetic_to_utm, utm_for_position, utm_to_geodetic, utm_to_utm, UtmZone};
pub use navigation::NavigationTrack;
pub use georef::{GeorefConfig, SoundingGeoreferencer};
pub use refgrid::{GridConfig, MaskThresholds, ReferenceGrid, ReferenceSurfaceBuilder};
pub use compare::{compare_soundings, ComparedSounding, ComparisonReport, CrosslineComparison};
pub use binning::{AccuracyBinner, FilterPolicy, FlattenMode};
pub use dataset::{
    parse_crossline, parse_crossline_files, AccuracySession, BatchOutcome, CrosslineFile,
    ParseOptions, ParseSummary, SurveyDataset,
};
