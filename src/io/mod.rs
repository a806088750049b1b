//! Input handling: log file framing, record decoding, survey text files

pub mod datagram;
pub mod records;
pub mod reference;
pub mod tide;

// Re-export main types
pub use datagram::{scan_frames, FrameScanner, RawFrame, ScanReport};
pub use records::decode_record;
pub use reference::{read_density_points, read_reference_points, DensityPoint, ReferencePoint};
pub use tide::{TidePoint, TideSeries};
