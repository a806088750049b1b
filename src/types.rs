use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::geodesy::UtmZone;

/// Real-valued grid layer (easting x northing), NaN marks no-data
pub type GridLayer = Array2<f64>;

/// Boolean validity mask aligned with a grid layer
pub type GridMask = Array2<bool>;

/// Datagram types handled by the decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatagramType {
    Position,      // 'P' 0x50
    Attitude,      // 'A' 0x41
    Runtime,       // 'R' 0x52
    InstallStart,  // 'I' 0x49
    InstallStop,   // 'i' 0x69
    RawRangeAngle, // 'N' 0x4e
    Soundings,     // 'X' 0x58
    SeabedImage,   // 'Y' 0x59
    Clock,         // 'C' 0x43
    PuStatus,      // '1' 0x31
}

impl DatagramType {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x50 => Some(DatagramType::Position),
            0x41 => Some(DatagramType::Attitude),
            0x52 => Some(DatagramType::Runtime),
            0x49 => Some(DatagramType::InstallStart),
            0x69 => Some(DatagramType::InstallStop),
            0x4e => Some(DatagramType::RawRangeAngle),
            0x58 => Some(DatagramType::Soundings),
            0x59 => Some(DatagramType::SeabedImage),
            0x43 => Some(DatagramType::Clock),
            0x31 => Some(DatagramType::PuStatus),
            _ => None,
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            DatagramType::Position => 0x50,
            DatagramType::Attitude => 0x41,
            DatagramType::Runtime => 0x52,
            DatagramType::InstallStart => 0x49,
            DatagramType::InstallStop => 0x69,
            DatagramType::RawRangeAngle => 0x4e,
            DatagramType::Soundings => 0x58,
            DatagramType::SeabedImage => 0x59,
            DatagramType::Clock => 0x43,
            DatagramType::PuStatus => 0x31,
        }
    }
}

impl std::fmt::Display for DatagramType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DatagramType::Position => "POSITION",
            DatagramType::Attitude => "ATTITUDE",
            DatagramType::Runtime => "RUNTIME",
            DatagramType::InstallStart => "INSTALL_START",
            DatagramType::InstallStop => "INSTALL_STOP",
            DatagramType::RawRangeAngle => "RAW_RANGE_ANGLE",
            DatagramType::Soundings => "SOUNDINGS",
            DatagramType::SeabedImage => "SEABED_IMAGE",
            DatagramType::Clock => "CLOCK",
            DatagramType::PuStatus => "PU_STATUS",
        };
        write!(f, "{}", name)
    }
}

/// Common header shared by every datagram body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordHeader {
    pub model: u16,
    pub timestamp: DateTime<Utc>,
    pub counter: u16,
    pub serial: u16,
}

/// Position datagram ('P')
#[derive(Debug, Clone)]
pub struct PositionFix {
    pub header: RecordHeader,
    pub latitude: f64,          // degrees, positive north
    pub longitude: f64,         // degrees, positive east
    pub fix_quality_m: f64,
    pub speed_mps: f64,
    pub course_deg: f64,
    pub heading_deg: f64,
    pub system_descriptor: u8,
    pub input_sentence: String, // raw sentence from the positioning system
}

impl PositionFix {
    /// Positioning system number carried in the descriptor low bits (1-based)
    pub fn positioning_system(&self) -> u8 {
        self.system_descriptor & 0x03
    }
}

/// One attitude sample within an attitude datagram
#[derive(Debug, Clone, Copy)]
pub struct AttitudeSample {
    pub offset_ms: u16, // milliseconds since the record timestamp
    pub status: u16,
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub heave_m: f64,
    pub heading_deg: f64,
}

/// Attitude datagram ('A')
#[derive(Debug, Clone)]
pub struct AttitudeRecord {
    pub header: RecordHeader,
    pub samples: Vec<AttitudeSample>,
    pub sensor_descriptor: u8,
}

/// Runtime parameters datagram ('R')
#[derive(Debug, Clone)]
pub struct RuntimeParams {
    pub header: RecordHeader,
    pub operator_station_status: u8,
    pub pu_status: u8,
    pub bsp_status: u8,
    pub head_status: u8,
    pub mode: u8,
    pub filter_id: u8,
    pub min_depth_m: f64,
    pub max_depth_m: f64,
    pub absorption_db_per_km: f64,
    pub tx_pulse_len_us: f64,
    pub tx_beamwidth_deg: f64,
    pub tx_power_db: i8,
    pub rx_beamwidth_deg: f64,
    pub rx_bandwidth_hz: f64,
    pub rx_gain: u8,
    pub tvg_crossover_deg: u8,
    pub sound_speed_source: u8,
    pub max_port_swath_m: u16,
    pub beam_spacing: u8,
    pub max_port_coverage_deg: u8,
    pub stabilization: u8,
    pub max_stbd_coverage_deg: u8,
    pub max_stbd_swath_m: u16,
    pub tx_along_tilt_deg: f64,
    pub filter_id2: u8,
}

impl RuntimeParams {
    /// Ping mode (bits 0-3 of the mode byte); meaning is model-dependent
    pub fn ping_mode(&self) -> u8 {
        self.mode & 0x0f
    }

    /// Pulse form (bits 4-5): 0 = CW, 1 = mixed, 2 = FM
    pub fn pulse_form(&self) -> u8 {
        (self.mode >> 4) & 0x03
    }

    /// Dual-swath mode (bits 6-7): 0 = off, 1 = fixed, 2 = dynamic
    pub fn swath_mode(&self) -> u8 {
        (self.mode >> 6) & 0x03
    }
}

/// Installation parameters datagram ('I'/'i'), known keys scanned from the
/// ASCII body
#[derive(Debug, Clone, Default)]
pub struct InstallParams {
    pub header: Option<RecordHeader>,
    pub secondary_serial: u16,
    pub waterline_z_m: Option<f64>,     // WLZ, positive down from origin
    pub tx_x_m: Option<f64>,            // S1X, forward
    pub tx_y_m: Option<f64>,            // S1Y, starboard
    pub tx_z_m: Option<f64>,            // S1Z, down
    pub active_position_system: Option<u8>, // APS, 0-based
    pub pos_x_m: Option<f64>,           // P1X
    pub pos_y_m: Option<f64>,           // P1Y
    pub pos_z_m: Option<f64>,           // P1Z
    pub unknown_keys: usize,
}

/// One transmit sector from a raw range/angle datagram
#[derive(Debug, Clone, Copy)]
pub struct TxSector {
    pub tilt_deg: f64,
    pub focus_range_m: f64, // 0 = no focusing
    pub signal_length_s: f64,
    pub sector_delay_s: f64,
    pub centre_freq_hz: f64,
    pub absorption_db_per_km: f64,
    pub waveform: u8,
    pub sector_index: u8,
    pub bandwidth_hz: f64,
}

/// One receive beam from a raw range/angle datagram
#[derive(Debug, Clone, Copy)]
pub struct RxBeam {
    pub pointing_angle_deg: f64,
    pub tx_sector: u8,
    pub detection_info: u8,
    pub window_len: u16,
    pub quality: u8,
    pub d_corr: i8,
    pub travel_time_s: f64, // two-way
    pub backscatter_db: f64,
    pub cleaning_info: i8,
}

/// Raw range and beam angle datagram ('N')
#[derive(Debug, Clone)]
pub struct RawRangeAngle {
    pub header: RecordHeader,
    pub sound_speed_mps: f64,
    pub valid_count: u16,
    pub sampling_freq_hz: f64,
    pub doppler_scale: u32,
    pub tx_sectors: Vec<TxSector>,
    pub rx_beams: Vec<RxBeam>,
}

/// One bottom detection within a soundings datagram
#[derive(Debug, Clone, Copy)]
pub struct BeamSounding {
    pub depth_m: f64,  // positive down re the transmit transducer
    pub across_m: f64, // positive starboard
    pub along_m: f64,  // positive forward
    pub window_len: u16,
    pub quality: u8,
    pub angle_adjust_deg: f64,
    pub detection_info: u8,
    pub cleaning_info: i8,
    pub backscatter_db: f64,
}

impl BeamSounding {
    /// Bit 7 of detection info flags an invalid (rejected) detection
    pub fn is_valid(&self) -> bool {
        self.detection_info & 0x80 == 0
    }

    /// Nadir-relative beam angle, positive toward starboard
    pub fn beam_angle_deg(&self) -> f64 {
        self.across_m.atan2(self.depth_m).to_degrees()
    }
}

/// Soundings (XYZ) datagram ('X'): one ping of bottom detections
#[derive(Debug, Clone)]
pub struct SoundingPing {
    pub header: RecordHeader,
    pub heading_deg: f64,
    pub sound_speed_mps: f64,
    pub tx_depth_m: f64, // transmit transducer depth below waterline at ping time
    pub beam_count: u16,
    pub valid_count: u16,
    pub sampling_freq_hz: f64,
    pub beams: Vec<BeamSounding>,
}

/// One beam summary within a seabed image datagram
#[derive(Debug, Clone, Copy)]
pub struct SeabedImageBeam {
    pub sort_direction: i8,
    pub detection_info: u8,
    pub sample_count: u16,
    pub centre_sample: u16,
}

/// Seabed image datagram ('Y'): per-beam backscatter sample series
#[derive(Debug, Clone)]
pub struct SeabedImage {
    pub header: RecordHeader,
    pub sampling_freq_hz: f64,
    pub range_to_normal: u16,
    pub bsn_db: f64, // normal-incidence backscatter
    pub bso_db: f64, // oblique backscatter
    pub tx_beamwidth_deg: f64,
    pub tvg_crossover_deg: f64,
    pub beams: Vec<SeabedImageBeam>,
    pub samples_db: Vec<f64>,
}

/// Clock datagram ('C'): sonar time vs external reference time
#[derive(Debug, Clone)]
pub struct ClockSync {
    pub header: RecordHeader,
    pub external_time: DateTime<Utc>,
    pub pps_active: bool,
}

/// PU status datagram ('1'): processing-unit health and last sensor inputs
#[derive(Debug, Clone)]
pub struct PuStatus {
    pub header: RecordHeader,
    pub ping_rate_hz: f64,
    pub ping_counter: u16,
    pub sensor_status: [u8; 8],
    pub heading_deg: f64,
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub heave_m: f64,
    pub sound_speed_mps: f64,
}

/// Any decoded datagram from the handled subset
#[derive(Debug, Clone)]
pub enum DecodedRecord {
    Position(PositionFix),
    Attitude(AttitudeRecord),
    Runtime(RuntimeParams),
    Installation(InstallParams),
    RawRangeAngle(RawRangeAngle),
    Soundings(SoundingPing),
    SeabedImage(SeabedImage),
    Clock(ClockSync),
    PuStatus(PuStatus),
}

/// One navigation fix kept for track interpolation
#[derive(Debug, Clone, Copy)]
pub struct NavigationFix {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub system: u8,
}

/// Vertical reference for reported sounding depths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthReference {
    /// As parsed: depths below the transmit transducer
    TxArray,
    /// Depths below the waterline at ping time
    Waterline,
    /// Depths below the vessel reference point
    Origin,
}

impl Default for DepthReference {
    fn default() -> Self {
        DepthReference::Waterline
    }
}

/// One fully georeferenced sounding; immutable once created
#[derive(Debug, Clone)]
pub struct GeoreferencedSounding {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub easting: f64,
    pub northing: f64,
    pub utm_zone: UtmZone,
    pub depth_m: f64, // positive down re the selected vertical reference
    pub beam_angle_deg: f64,
    pub backscatter_db: f64,
    pub ping_mode: u8,
    pub pulse_form: u8,
    pub swath_mode: u8,
    pub source: Arc<str>, // originating file label
}

/// Per-angle-bin accuracy statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyBin {
    pub angle_lo_deg: f64,
    pub angle_hi_deg: f64,
    pub count: usize,
    pub mean_dz_m: f64,
    pub std_dz_m: f64,
    pub mean_dz_pct_wd: f64,
    pub std_dz_pct_wd: f64,
}

/// Error types for swath processing
#[derive(Debug, thiserror::Error)]
pub enum SwathError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("No active position data: {0}")]
    NoActivePositionData(String),

    #[error("Reference surface unavailable: {0}")]
    ReferenceUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for swath operations
pub type SwathResult<T> = Result<T, SwathError>;
