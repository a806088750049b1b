//! SwathCheck: A Fast, Modular Multibeam Echosounder Accuracy Processor
//!
//! This library decodes proprietary multibeam sonar log files, georeferences
//! every sounding and compares crossline survey passes against a gridded
//! reference surface to quantify system accuracy as a function of beam angle.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AccuracyBin, DatagramType, DecodedRecord, DepthReference, GeoreferencedSounding,
    NavigationFix, SwathError, SwathResult,
};

pub use io::{scan_frames, RawFrame, ScanReport, TideSeries};

pub use core::{
    compare_soundings, parse_crossline, parse_crossline_files, AccuracyBinner, AccuracySession,
    FilterPolicy, NavigationTrack, ReferenceGrid, ReferenceSurfaceBuilder, SoundingGeoreferencer,
    SurveyDataset, UtmZone,
};
