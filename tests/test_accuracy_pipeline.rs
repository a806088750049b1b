use std::fs;

use approx::assert_relative_eq;
use swathcheck::core::binning::{AccuracyBinner, FilterPolicy, FlattenMode};
use swathcheck::core::dataset::{
    parse_crossline, parse_crossline_files, AccuracySession, ParseOptions, SurveyDataset,
};
use swathcheck::core::geodesy::utm_for_position;
use swathcheck::core::refgrid::MaskThresholds;
use swathcheck::io::datagram::checksum;
use swathcheck::io::reference::ReferencePoint;
use swathcheck::types::SwathError;
use tempfile::TempDir;

/// Little-endian record byte builder for fixtures
#[derive(Default)]
struct Rec(Vec<u8>);

impl Rec {
    fn u8(mut self, v: u8) -> Self {
        self.0.push(v);
        self
    }
    fn i8(mut self, v: i8) -> Self {
        self.0.push(v as u8);
        self
    }
    fn u16(mut self, v: u16) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn i16(mut self, v: i16) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn i32(mut self, v: i32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn f32(mut self, v: f32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn bytes(mut self, v: &[u8]) -> Self {
        self.0.extend_from_slice(v);
        self
    }
    /// Common record header: model, date, time-of-day ms, counter, serial
    fn header(self, time_ms: u32, counter: u16) -> Self {
        self.u16(712).u32(20230814).u32(time_ms).u16(counter).u16(901)
    }
}

fn wrap(type_id: u8, rec: Rec) -> Vec<u8> {
    let mut body = vec![type_id];
    body.extend_from_slice(&rec.0);
    let sum = checksum(&body);
    let mut out = ((body.len() + 4) as u32).to_le_bytes().to_vec();
    out.push(0x02);
    out.extend_from_slice(&body);
    out.push(0x03);
    out.extend_from_slice(&sum.to_le_bytes());
    out
}

/// Position fix at 41.9 N, 70.6 W from the given system descriptor
fn position_frame(time_ms: u32, counter: u16, descriptor: u8) -> Vec<u8> {
    let sentence = b"$INGGA,120000.00,4154.0000,N,07036.0000,W";
    let rec = Rec::default()
        .header(time_ms, counter)
        .i32(838_000_000)
        .i32(-706_000_000)
        .u16(120)
        .u16(250)
        .u16(9000)
        .u16(0)
        .u8(descriptor)
        .u8(sentence.len() as u8)
        .bytes(sentence)
        .u8(0);
    wrap(0x50, rec)
}

fn install_frame(time_ms: u32) -> Vec<u8> {
    let rec = Rec::default()
        .header(time_ms, 1)
        .u16(0)
        .bytes(b"WLZ=0.50,S1X=6.00,S1Y=0.00,S1Z=2.50,APS=0,");
    wrap(0x49, rec)
}

fn clock_frame(time_ms: u32) -> Vec<u8> {
    let rec = Rec::default()
        .header(time_ms, 2)
        .u32(20230814)
        .u32(time_ms)
        .u8(1);
    wrap(0x43, rec)
}

/// Runtime record in mode 0x12: deep ping mode, FM pulse, single swath
fn runtime_frame(time_ms: u32) -> Vec<u8> {
    let rec = Rec::default()
        .header(time_ms, 3)
        .u8(0)
        .u8(0)
        .u8(0)
        .u8(0)
        .u8(0x12)
        .u8(5)
        .u16(10)
        .u16(800)
        .u16(3055)
        .u16(200)
        .u16(10)
        .i8(0)
        .u8(15)
        .u8(50)
        .u8(30)
        .u8(6)
        .u8(0)
        .u16(200)
        .u8(3)
        .u8(65)
        .u8(0x25)
        .u8(65)
        .u16(200)
        .i16(-50)
        .u8(0);
    wrap(0x52, rec)
}

fn beam(depth: f32, across: f32, along: f32, detection: u8, bs_tenth_db: i16) -> Rec {
    Rec::default()
        .f32(depth)
        .f32(across)
        .f32(along)
        .u16(200)
        .u8(30)
        .i8(0)
        .u8(detection)
        .i8(0)
        .i16(bs_tenth_db)
}

/// Depth ping with heading 0, sound speed 1495.0, transducer at 1.5 m
fn soundings_frame(time_ms: u32, counter: u16, beams: Vec<Rec>) -> Vec<u8> {
    let mut rec = Rec::default()
        .header(time_ms, counter)
        .u16(0)
        .u16(14950)
        .f32(1.5)
        .u16(beams.len() as u16)
        .u16(beams.len() as u16)
        .f32(30_000.0)
        .u8(0)
        .bytes(&[0, 0, 0]);
    for b in beams {
        rec = rec.bytes(&b.0);
    }
    wrap(0x58, rec)
}

/// Attitude record declaring ten entries while carrying one
fn malformed_attitude_frame(time_ms: u32) -> Vec<u8> {
    let rec = Rec::default()
        .header(time_ms, 4)
        .u16(10)
        .u16(0)
        .u16(0)
        .i16(0)
        .i16(0)
        .i16(0)
        .u16(0);
    wrap(0x41, rec)
}

/// A short surveyed line: installation, clock, runtime, three fixes on a
/// stationary track and two pings, each with one valid and one rejected
/// beam, plus one malformed and one unhandled frame
fn survey_bytes() -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&install_frame(43_200_000));
    buf.extend_from_slice(&clock_frame(43_200_250));
    buf.extend_from_slice(&runtime_frame(43_200_000));
    buf.extend_from_slice(&position_frame(43_200_000, 10, 0x01));
    buf.extend_from_slice(&position_frame(43_210_000, 11, 0x01));
    buf.extend_from_slice(&malformed_attitude_frame(43_202_000));
    buf.extend_from_slice(&soundings_frame(
        43_205_000,
        7,
        vec![
            beam(48.0, 20.0, 0.0, 0x00, -205),
            beam(47.0, -15.0, 0.0, 0x80, 0),
        ],
    ));
    buf.extend_from_slice(&wrap(0x47, Rec::default().header(43_206_000, 5).u32(9)));
    buf.extend_from_slice(&position_frame(43_220_000, 12, 0x01));
    buf.extend_from_slice(&soundings_frame(
        43_215_000,
        8,
        vec![
            beam(48.0, 20.0, 0.0, 0x00, -205),
            beam(47.0, -15.0, 0.0, 0x80, 0),
        ],
    ));
    buf
}

/// Flat 31x31 reference patch at 2 m spacing and 50 m water depth,
/// centered on the survey position
fn reference_patch(ship_e: f64, ship_n: f64) -> Vec<ReferencePoint> {
    let mut points = Vec::new();
    for i in 0..31 {
        for j in 0..31 {
            points.push(ReferencePoint {
                easting: ship_e + (2 * i - 30) as f64,
                northing: ship_n + (2 * j - 30) as f64,
                z: -50.0,
                uncertainty_m: None,
            });
        }
    }
    points
}

/// Parsed single-line dataset with the flat reference already loaded
fn loaded_session() -> AccuracySession {
    let file = parse_crossline("line_0042.all", &survey_bytes(), &ParseOptions::default())
        .expect("parse failed");
    let (ship_e, ship_n, zone) = utm_for_position(41.9, -70.6);
    let mut session = AccuracySession::new(SurveyDataset::from_files(vec![file]));
    session.set_reference(reference_patch(ship_e, ship_n), None, zone);
    session
}

#[test]
fn test_parse_summary_accounting() {
    env_logger::init();
    println!("=== Crossline Parse Accounting ===");

    let bytes = survey_bytes();
    let file = parse_crossline("line_0042.all", &bytes, &ParseOptions::default())
        .expect("parse failed");
    let s = &file.summary;
    println!(
        "{} frames, {} fixes, {} pings -> {} soundings",
        s.frame_count, s.position_fixes, s.pings, s.soundings
    );

    assert_eq!(s.buffer_len, bytes.len());
    assert_eq!(s.frame_count, 10);
    assert_eq!(s.skipped_bytes, 0);
    assert_eq!(s.dropped_records, 1, "the overrunning attitude record");
    assert_eq!(s.position_fixes, 3);
    assert_eq!(s.attitude_records, 0);
    assert_eq!(s.runtime_records, 1);
    assert_eq!(s.pings, 2);
    assert_eq!(s.soundings, 2, "one valid beam per ping");

    let (ship_e, ship_n, zone) = utm_for_position(41.9, -70.6);
    for sounding in &file.soundings {
        // Waterline reference: parsed depth plus the 1.5 m transducer depth
        assert_relative_eq!(sounding.depth_m, 49.5, epsilon = 1e-9);
        assert_relative_eq!(
            sounding.beam_angle_deg,
            (20.0f64 / 48.0).atan().to_degrees(),
            epsilon = 1e-9
        );
        // Heading 0: the starboard beam lands due east of the ship
        assert_relative_eq!(sounding.easting, ship_e + 20.0, epsilon = 1e-9);
        assert_relative_eq!(sounding.northing, ship_n, epsilon = 1e-9);
        assert_eq!(sounding.utm_zone, zone);
        assert_eq!(sounding.ping_mode, 2);
        assert_eq!(sounding.pulse_form, 1);
        assert_eq!(sounding.swath_mode, 0);
        assert_eq!(sounding.source.as_ref(), "line_0042.all");
    }
}

#[test]
fn test_comparison_sign_convention() {
    let mut session = loaded_session();
    let comparison = session.comparison().expect("comparison failed");

    assert_eq!(comparison.report.num_soundings, 2);
    assert_eq!(comparison.report.num_on_ref, 2);
    assert_eq!(comparison.report.num_off_ref, 0);
    assert_eq!(comparison.report.num_zone_transformed, 0);
    assert_eq!(comparison.report.num_tide_out_of_range, 0);

    for row in &comparison.soundings {
        assert_relative_eq!(row.tide_m, 0.0);
        assert_relative_eq!(row.ref_z_m, -50.0, epsilon = 1e-9);
        // 49.5 m sounding over a 50 m reference reads 0.5 m shallow,
        // and shallower is positive
        assert_relative_eq!(row.dz_m, 0.5, epsilon = 1e-9);
        assert_relative_eq!(row.dz_pct_wd, 1.0, epsilon = 1e-9);
    }
}

#[test]
fn test_binned_accuracy_end_to_end() {
    println!("=== Crossline Accuracy Pipeline ===");
    let mut session = loaded_session();

    let grid = session.reference_grid().expect("grid failed");
    println!(
        "reference grid {:?}, {} valid nodes",
        grid.shape(),
        grid.valid_nodes()
    );
    assert_eq!(grid.shape(), (31, 31));
    assert_eq!(grid.valid_nodes(), 31 * 31);

    let bins = session.accuracy_bins().expect("binning failed");
    assert_eq!(bins.len(), 150, "one degree bins across [-75, 75)");

    // Both soundings lean 22.62 degrees to starboard
    let hit = &bins[97];
    assert_relative_eq!(hit.angle_lo_deg, 22.0);
    assert_relative_eq!(hit.angle_hi_deg, 23.0);
    assert_eq!(hit.count, 2);
    assert_relative_eq!(hit.mean_dz_m, 0.5, epsilon = 1e-9);
    assert_relative_eq!(hit.std_dz_m, 0.0, epsilon = 1e-12);
    assert_relative_eq!(hit.mean_dz_pct_wd, 1.0, epsilon = 1e-9);

    let empty = &bins[0];
    assert_eq!(empty.count, 0);
    assert!(empty.mean_dz_m.is_nan());
    assert!(empty.std_dz_m.is_nan());
}

#[test]
fn test_fully_masked_reference_stays_quiet() {
    let mut session = loaded_session();
    session.set_mask_thresholds(MaskThresholds {
        enable_depth_masking: true,
        min_depth_m: 0.0,
        max_depth_m: 10.0,
        ..MaskThresholds::default()
    });

    // 50 m of water against a 10 m ceiling masks every node
    let valid = session.reference_grid().expect("grid failed").valid_nodes();
    assert_eq!(valid, 0);

    let report = session.comparison().expect("comparison failed").report.clone();
    assert_eq!(report.num_on_ref, 0);
    assert_eq!(report.num_off_ref, 2);

    let bins = session.accuracy_bins().expect("binning failed");
    assert_eq!(bins.len(), 150);
    assert!(bins.iter().all(|b| b.count == 0));
}

#[test]
fn test_policy_rebin_flatten_and_min_count() {
    let mut session = loaded_session();
    let baseline = session.accuracy_bins().expect("binning failed")[97];
    assert_relative_eq!(baseline.mean_dz_m, 0.5, epsilon = 1e-9);

    // Whole-swath flattening removes the common 0.5 m offset
    session.set_filter_policy(FilterPolicy {
        flatten: FlattenMode::WholeSwath,
        ..FilterPolicy::default()
    });
    let flattened = session.accuracy_bins().expect("binning failed")[97];
    assert_eq!(flattened.count, 2);
    assert_relative_eq!(flattened.mean_dz_m, 0.0, epsilon = 1e-9);
    assert_relative_eq!(flattened.std_dz_m, baseline.std_dz_m, epsilon = 1e-12);

    // A stricter minimum keeps the true count but blanks the statistics
    session.set_filter_policy(FilterPolicy {
        min_bin_count: 3,
        ..FilterPolicy::default()
    });
    let sparse = session.accuracy_bins().expect("binning failed")[97];
    assert_eq!(sparse.count, 2);
    assert!(sparse.mean_dz_m.is_nan());
    assert!(sparse.std_dz_m.is_nan());
}

#[test]
fn test_rebinning_is_bitwise_deterministic() {
    let mut session = loaded_session();
    let rows = session.comparison().expect("comparison failed").soundings.clone();

    let binner = AccuracyBinner::standard();
    let first = binner.bin(&rows).expect("binning failed");
    let second = binner.bin(&rows).expect("binning failed");

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.count, b.count);
        assert_eq!(a.mean_dz_m.to_bits(), b.mean_dz_m.to_bits());
        assert_eq!(a.std_dz_m.to_bits(), b.std_dz_m.to_bits());
        assert_eq!(a.mean_dz_pct_wd.to_bits(), b.mean_dz_pct_wd.to_bits());
        assert_eq!(a.std_dz_pct_wd.to_bits(), b.std_dz_pct_wd.to_bits());
    }
}

#[test]
fn test_outermost_reduction_option() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&install_frame(43_200_000));
    buf.extend_from_slice(&position_frame(43_200_000, 10, 0x01));
    buf.extend_from_slice(&position_frame(43_210_000, 11, 0x01));
    buf.extend_from_slice(&soundings_frame(
        43_205_000,
        7,
        vec![
            beam(50.0, -30.0, 0.0, 0x00, -150),
            beam(50.0, -10.0, 0.0, 0x00, -140),
            beam(50.0, 0.0, 0.0, 0x00, -140),
            beam(50.0, 10.0, 0.0, 0x00, -140),
            beam(50.0, 31.0, 0.0, 0x00, -160),
        ],
    ));

    let full = parse_crossline("full.all", &buf, &ParseOptions::default())
        .expect("parse failed");
    assert_eq!(full.summary.soundings, 5);

    let options = ParseOptions {
        outermost_only: true,
        ..ParseOptions::default()
    };
    let edges = parse_crossline("edges.all", &buf, &options).expect("parse failed");
    assert_eq!(edges.summary.soundings, 2);
    assert!(edges.soundings[0].beam_angle_deg < 0.0);
    assert!(edges.soundings[1].beam_angle_deg > 0.0);
}

#[test]
fn test_batch_parse_is_best_effort() {
    let dir = TempDir::new().expect("create temp dir");
    let good = dir.path().join("good.all");
    fs::write(&good, survey_bytes()).expect("write good file");

    // Fixes only from system 2 while the installation selects system 1
    let mut orphan = Vec::new();
    orphan.extend_from_slice(&install_frame(43_200_000));
    orphan.extend_from_slice(&position_frame(43_200_000, 10, 0x02));
    orphan.extend_from_slice(&position_frame(43_210_000, 11, 0x02));
    let bad = dir.path().join("bad.all");
    fs::write(&bad, &orphan).expect("write bad file");

    let missing = dir.path().join("missing.all");
    let paths = vec![good, bad, missing];
    let outcome = parse_crossline_files(&paths, &ParseOptions::default());

    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.files[0].name.as_ref(), "good.all");
    assert_eq!(outcome.files[0].summary.soundings, 2);

    assert_eq!(outcome.failures.len(), 2);
    let (path, err) = &outcome.failures[0];
    assert!(path.ends_with("bad.all"));
    assert!(matches!(err, SwathError::NoActivePositionData(_)));
    let (path, err) = &outcome.failures[1];
    assert!(path.ends_with("missing.all"));
    assert!(matches!(err, SwathError::Io(_)));
}
