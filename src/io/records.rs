//! Typed decoders for the handled datagram subset
//!
//! Every decoder takes a frame the scanner already validated and reads the
//! vendor's fixed field layout, applying the documented scale factors so the
//! typed records carry SI units (meters, m/s, degrees, dB). Short or
//! inconsistent payloads come back as `MalformedRecord`; the caller drops
//! the record and keeps going.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use log::debug;

use crate::io::datagram::RawFrame;
use crate::types::{
    AttitudeRecord, AttitudeSample, BeamSounding, ClockSync, DatagramType, DecodedRecord,
    InstallParams, PositionFix, PuStatus, RawRangeAngle, RecordHeader, RuntimeParams, RxBeam,
    SeabedImage, SeabedImageBeam, SoundingPing, SwathError, SwathResult, TxSector,
};

/// Bytes per beam block in a soundings datagram
const XYZ_BEAM_LEN: usize = 20;
/// Offset of the detection-info byte within a beam block
const XYZ_DETECT_OFFSET: usize = 16;
/// Bytes per transmit sector block in a raw range/angle datagram
const RRA_TX_LEN: usize = 24;
/// Bytes per receive beam block in a raw range/angle datagram
const RRA_RX_LEN: usize = 16;

/// Bounds-checked little-endian cursor over one record's bytes
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8], context: &'static str) -> Self {
        ByteReader {
            buf,
            pos: 0,
            context,
        }
    }

    fn underrun(&self, need: usize) -> SwathError {
        SwathError::MalformedRecord(format!(
            "{}: need {} bytes at offset {}, record has {}",
            self.context,
            need,
            self.pos,
            self.buf.len()
        ))
    }

    fn take(&mut self, n: usize) -> SwathResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(self.underrun(n));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn u8(&mut self) -> SwathResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn i8(&mut self) -> SwathResult<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    fn u16(&mut self) -> SwathResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> SwathResult<i16> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> SwathResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> SwathResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32(&mut self) -> SwathResult<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Datagram date (YYYYMMDD) plus milliseconds since midnight, as UTC
fn decode_timestamp(date: u32, time_ms: u32, context: &'static str) -> SwathResult<DateTime<Utc>> {
    let year = (date / 10000) as i32;
    let month = date / 100 % 100;
    let day = date % 100;
    let base = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| {
            SwathError::MalformedRecord(format!("{}: invalid record date {}", context, date))
        })?;
    Ok(Utc.from_utc_datetime(&base) + Duration::milliseconds(time_ms as i64))
}

fn decode_header(r: &mut ByteReader) -> SwathResult<RecordHeader> {
    let model = r.u16()?;
    let date = r.u32()?;
    let time_ms = r.u32()?;
    let counter = r.u16()?;
    let serial = r.u16()?;
    Ok(RecordHeader {
        model,
        timestamp: decode_timestamp(date, time_ms, r.context)?,
        counter,
        serial,
    })
}

/// Position datagram ('P'): latitude/longitude plus the raw input sentence
pub fn decode_position(frame: &RawFrame) -> SwathResult<PositionFix> {
    let mut r = ByteReader::new(frame.record_bytes(), "position");
    let header = decode_header(&mut r)?;
    let latitude = r.i32()? as f64 / 2.0e7;
    let longitude = r.i32()? as f64 / 1.0e7;
    let fix_quality_m = r.u16()? as f64 / 100.0;
    let speed_mps = r.u16()? as f64 / 100.0;
    let course_deg = r.u16()? as f64 / 100.0;
    let heading_deg = r.u16()? as f64 / 100.0;
    let system_descriptor = r.u8()?;
    let n_input = r.u8()? as usize;
    // Input sentences may be padded to even record length
    let sentence = r.take(n_input.min(r.remaining()))?;
    Ok(PositionFix {
        header,
        latitude,
        longitude,
        fix_quality_m,
        speed_mps,
        course_deg,
        heading_deg,
        system_descriptor,
        input_sentence: String::from_utf8_lossy(sentence)
            .trim_end_matches('\0')
            .trim_end()
            .to_string(),
    })
}

/// Attitude datagram ('A'): time series of roll/pitch/heave/heading samples
pub fn decode_attitude(frame: &RawFrame) -> SwathResult<AttitudeRecord> {
    let mut r = ByteReader::new(frame.record_bytes(), "attitude");
    let header = decode_header(&mut r)?;
    let count = r.u16()? as usize;
    if r.remaining() < count * 12 {
        return Err(SwathError::MalformedRecord(format!(
            "attitude: {} entries declared, {} bytes left",
            count,
            r.remaining()
        )));
    }
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        samples.push(AttitudeSample {
            offset_ms: r.u16()?,
            status: r.u16()?,
            roll_deg: r.i16()? as f64 / 100.0,
            pitch_deg: r.i16()? as f64 / 100.0,
            heave_m: r.i16()? as f64 / 100.0,
            heading_deg: r.u16()? as f64 / 100.0,
        });
    }
    let sensor_descriptor = r.u8()?;
    Ok(AttitudeRecord {
        header,
        samples,
        sensor_descriptor,
    })
}

/// Runtime parameters datagram ('R'): sounder operating configuration
pub fn decode_runtime(frame: &RawFrame) -> SwathResult<RuntimeParams> {
    let mut r = ByteReader::new(frame.record_bytes(), "runtime");
    let header = decode_header(&mut r)?;
    Ok(RuntimeParams {
        header,
        operator_station_status: r.u8()?,
        pu_status: r.u8()?,
        bsp_status: r.u8()?,
        head_status: r.u8()?,
        mode: r.u8()?,
        filter_id: r.u8()?,
        min_depth_m: r.u16()? as f64,
        max_depth_m: r.u16()? as f64,
        absorption_db_per_km: r.u16()? as f64 / 100.0,
        tx_pulse_len_us: r.u16()? as f64,
        tx_beamwidth_deg: r.u16()? as f64 / 10.0,
        tx_power_db: r.i8()?,
        rx_beamwidth_deg: r.u8()? as f64 / 10.0,
        rx_bandwidth_hz: r.u8()? as f64 * 50.0,
        rx_gain: r.u8()?,
        tvg_crossover_deg: r.u8()?,
        sound_speed_source: r.u8()?,
        max_port_swath_m: r.u16()?,
        beam_spacing: r.u8()?,
        max_port_coverage_deg: r.u8()?,
        stabilization: r.u8()?,
        max_stbd_coverage_deg: r.u8()?,
        max_stbd_swath_m: r.u16()?,
        tx_along_tilt_deg: r.i16()? as f64 / 10.0,
        filter_id2: r.u8()?,
    })
}

/// Installation parameters datagram ('I'/'i'): ASCII key=value settings
///
/// The body is a comma-separated text blob whose key set varies by model and
/// installation, so known keys are scanned rather than read at fixed offsets.
pub fn decode_installation(frame: &RawFrame) -> SwathResult<InstallParams> {
    let mut r = ByteReader::new(frame.record_bytes(), "installation");
    let header = decode_header(&mut r)?;
    let secondary_serial = r.u16()?;
    let text = String::from_utf8_lossy(r.take(r.remaining())?).to_string();

    let mut params = InstallParams {
        header: Some(header),
        secondary_serial,
        ..InstallParams::default()
    };
    for entry in text.split(',') {
        let entry = entry.trim().trim_end_matches('\0');
        if entry.is_empty() {
            continue;
        }
        let Some((key, value)) = entry.split_once('=') else {
            params.unknown_keys += 1;
            continue;
        };
        match key.trim() {
            "WLZ" => params.waterline_z_m = value.trim().parse().ok(),
            "S1X" => params.tx_x_m = value.trim().parse().ok(),
            "S1Y" => params.tx_y_m = value.trim().parse().ok(),
            "S1Z" => params.tx_z_m = value.trim().parse().ok(),
            "APS" => params.active_position_system = value.trim().parse().ok(),
            "P1X" => params.pos_x_m = value.trim().parse().ok(),
            "P1Y" => params.pos_y_m = value.trim().parse().ok(),
            "P1Z" => params.pos_z_m = value.trim().parse().ok(),
            other => {
                debug!("installation: unhandled key {}", other);
                params.unknown_keys += 1;
            }
        }
    }
    Ok(params)
}

fn decode_xyz_beam(r: &mut ByteReader) -> SwathResult<BeamSounding> {
    Ok(BeamSounding {
        depth_m: r.f32()? as f64,
        across_m: r.f32()? as f64,
        along_m: r.f32()? as f64,
        window_len: r.u16()?,
        quality: r.u8()?,
        angle_adjust_deg: r.i8()? as f64 / 10.0,
        detection_info: r.u8()?,
        cleaning_info: r.i8()?,
        backscatter_db: r.i16()? as f64 / 10.0,
    })
}

struct XyzFixed {
    header: RecordHeader,
    heading_deg: f64,
    sound_speed_mps: f64,
    tx_depth_m: f64,
    beam_count: u16,
    valid_count: u16,
    sampling_freq_hz: f64,
}

fn decode_xyz_fixed(r: &mut ByteReader) -> SwathResult<XyzFixed> {
    let header = decode_header(r)?;
    let heading_deg = r.u16()? as f64 / 100.0;
    let sound_speed_mps = r.u16()? as f64 / 10.0;
    let tx_depth_m = r.f32()? as f64;
    let beam_count = r.u16()?;
    let valid_count = r.u16()?;
    let sampling_freq_hz = r.f32()? as f64;
    r.u8()?; // scanning info
    r.take(3)?; // spare
    if r.remaining() < beam_count as usize * XYZ_BEAM_LEN {
        return Err(SwathError::MalformedRecord(format!(
            "soundings: {} beams declared, {} bytes left",
            beam_count,
            r.remaining()
        )));
    }
    Ok(XyzFixed {
        header,
        heading_deg,
        sound_speed_mps,
        tx_depth_m,
        beam_count,
        valid_count,
        sampling_freq_hz,
    })
}

/// Soundings datagram ('X'): one ping of bottom detections
pub fn decode_soundings(frame: &RawFrame) -> SwathResult<SoundingPing> {
    let mut r = ByteReader::new(frame.record_bytes(), "soundings");
    let fixed = decode_xyz_fixed(&mut r)?;
    let mut beams = Vec::with_capacity(fixed.beam_count as usize);
    for _ in 0..fixed.beam_count {
        beams.push(decode_xyz_beam(&mut r)?);
    }
    Ok(SoundingPing {
        header: fixed.header,
        heading_deg: fixed.heading_deg,
        sound_speed_mps: fixed.sound_speed_mps,
        tx_depth_m: fixed.tx_depth_m,
        beam_count: fixed.beam_count,
        valid_count: fixed.valid_count,
        sampling_freq_hz: fixed.sampling_freq_hz,
        beams,
    })
}

/// Soundings datagram, decoding only the outermost valid beam on each side
///
/// Coverage-extents work wants just the port-most and starboard-most
/// accepted detections, so this scans the detection flags and decodes at
/// most two beam blocks instead of the whole table. Beam order within the
/// record is across-track, so the first and last valid entries are the
/// swath edges.
pub fn decode_soundings_outermost(frame: &RawFrame) -> SwathResult<SoundingPing> {
    let mut r = ByteReader::new(frame.record_bytes(), "soundings");
    let fixed = decode_xyz_fixed(&mut r)?;
    let table = r.take(fixed.beam_count as usize * XYZ_BEAM_LEN)?;

    let valid = |i: usize| table[i * XYZ_BEAM_LEN + XYZ_DETECT_OFFSET] & 0x80 == 0;
    let first = (0..fixed.beam_count as usize).find(|&i| valid(i));
    let last = (0..fixed.beam_count as usize).rev().find(|&i| valid(i));

    let mut beams = Vec::new();
    if let (Some(first), Some(last)) = (first, last) {
        let mut edge = |i: usize| -> SwathResult<()> {
            let block = &table[i * XYZ_BEAM_LEN..(i + 1) * XYZ_BEAM_LEN];
            beams.push(decode_xyz_beam(&mut ByteReader::new(block, "soundings"))?);
            Ok(())
        };
        edge(first)?;
        if last != first {
            edge(last)?;
        }
    }
    Ok(SoundingPing {
        header: fixed.header,
        heading_deg: fixed.heading_deg,
        sound_speed_mps: fixed.sound_speed_mps,
        tx_depth_m: fixed.tx_depth_m,
        beam_count: fixed.beam_count,
        valid_count: fixed.valid_count,
        sampling_freq_hz: fixed.sampling_freq_hz,
        beams,
    })
}

/// Raw range and beam angle datagram ('N'): transmit sectors plus per-beam
/// travel times and pointing angles
pub fn decode_raw_range(frame: &RawFrame) -> SwathResult<RawRangeAngle> {
    let mut r = ByteReader::new(frame.record_bytes(), "raw range/angle");
    let header = decode_header(&mut r)?;
    let sound_speed_mps = r.u16()? as f64 / 10.0;
    let tx_count = r.u16()? as usize;
    let rx_count = r.u16()? as usize;
    let valid_count = r.u16()?;
    let sampling_freq_hz = r.f32()? as f64;
    let doppler_scale = r.u32()?;
    if r.remaining() < tx_count * RRA_TX_LEN + rx_count * RRA_RX_LEN {
        return Err(SwathError::MalformedRecord(format!(
            "raw range/angle: {} sectors + {} beams declared, {} bytes left",
            tx_count,
            rx_count,
            r.remaining()
        )));
    }

    let mut tx_sectors = Vec::with_capacity(tx_count);
    for _ in 0..tx_count {
        tx_sectors.push(TxSector {
            tilt_deg: r.i16()? as f64 / 100.0,
            focus_range_m: r.u16()? as f64 / 10.0,
            signal_length_s: r.f32()? as f64,
            sector_delay_s: r.f32()? as f64,
            centre_freq_hz: r.f32()? as f64,
            absorption_db_per_km: r.u16()? as f64 / 100.0,
            waveform: r.u8()?,
            sector_index: r.u8()?,
            bandwidth_hz: r.f32()? as f64,
        });
    }
    let mut rx_beams = Vec::with_capacity(rx_count);
    for _ in 0..rx_count {
        let beam = RxBeam {
            pointing_angle_deg: r.i16()? as f64 / 100.0,
            tx_sector: r.u8()?,
            detection_info: r.u8()?,
            window_len: r.u16()?,
            quality: r.u8()?,
            d_corr: r.i8()?,
            travel_time_s: r.f32()? as f64,
            backscatter_db: r.i16()? as f64 / 10.0,
            cleaning_info: r.i8()?,
        };
        r.u8()?; // spare
        rx_beams.push(beam);
    }
    Ok(RawRangeAngle {
        header,
        sound_speed_mps,
        valid_count,
        sampling_freq_hz,
        doppler_scale,
        tx_sectors,
        rx_beams,
    })
}

/// Seabed image datagram ('Y'): per-beam backscatter sample series
pub fn decode_seabed_image(frame: &RawFrame) -> SwathResult<SeabedImage> {
    let mut r = ByteReader::new(frame.record_bytes(), "seabed image");
    let header = decode_header(&mut r)?;
    let sampling_freq_hz = r.f32()? as f64;
    let range_to_normal = r.u16()?;
    let bsn_db = r.i16()? as f64 / 10.0;
    let bso_db = r.i16()? as f64 / 10.0;
    let tx_beamwidth_deg = r.u16()? as f64 / 10.0;
    let tvg_crossover_deg = r.u16()? as f64 / 10.0;
    let beam_count = r.u16()? as usize;
    if r.remaining() < beam_count * 6 {
        return Err(SwathError::MalformedRecord(format!(
            "seabed image: {} beams declared, {} bytes left",
            beam_count,
            r.remaining()
        )));
    }
    let mut beams = Vec::with_capacity(beam_count);
    let mut total_samples = 0usize;
    for _ in 0..beam_count {
        let beam = SeabedImageBeam {
            sort_direction: r.i8()?,
            detection_info: r.u8()?,
            sample_count: r.u16()?,
            centre_sample: r.u16()?,
        };
        total_samples += beam.sample_count as usize;
        beams.push(beam);
    }
    if r.remaining() < total_samples * 2 {
        return Err(SwathError::MalformedRecord(format!(
            "seabed image: {} samples declared, {} bytes left",
            total_samples,
            r.remaining()
        )));
    }
    let mut samples_db = Vec::with_capacity(total_samples);
    for _ in 0..total_samples {
        samples_db.push(r.i16()? as f64 / 10.0);
    }
    Ok(SeabedImage {
        header,
        sampling_freq_hz,
        range_to_normal,
        bsn_db,
        bso_db,
        tx_beamwidth_deg,
        tvg_crossover_deg,
        beams,
        samples_db,
    })
}

/// Clock datagram ('C'): sonar clock vs the external time reference
pub fn decode_clock(frame: &RawFrame) -> SwathResult<ClockSync> {
    let mut r = ByteReader::new(frame.record_bytes(), "clock");
    let header = decode_header(&mut r)?;
    let date = r.u32()?;
    let time_ms = r.u32()?;
    let pps = r.u8()?;
    Ok(ClockSync {
        header,
        external_time: decode_timestamp(date, time_ms, "clock")?,
        pps_active: pps != 0,
    })
}

/// PU status datagram ('1'): processing-unit health and last sensor inputs
pub fn decode_pu_status(frame: &RawFrame) -> SwathResult<PuStatus> {
    let mut r = ByteReader::new(frame.record_bytes(), "pu status");
    let header = decode_header(&mut r)?;
    let ping_rate_hz = r.u16()? as f64 / 100.0;
    let ping_counter = r.u16()?;
    let status = r.take(8)?;
    let mut sensor_status = [0u8; 8];
    sensor_status.copy_from_slice(status);
    Ok(PuStatus {
        header,
        ping_rate_hz,
        ping_counter,
        sensor_status,
        heading_deg: r.u16()? as f64 / 100.0,
        roll_deg: r.i16()? as f64 / 100.0,
        pitch_deg: r.i16()? as f64 / 100.0,
        heave_m: r.i16()? as f64 / 100.0,
        sound_speed_mps: r.u16()? as f64 / 10.0,
    })
}

/// Decode one frame into its typed record
///
/// Returns `Ok(None)` for datagram types outside the handled subset; those
/// are tallied by the scanner but carry nothing this pipeline needs.
pub fn decode_record(frame: &RawFrame) -> SwathResult<Option<DecodedRecord>> {
    let Some(dtype) = frame.datagram_type() else {
        return Ok(None);
    };
    let record = match dtype {
        DatagramType::Position => DecodedRecord::Position(decode_position(frame)?),
        DatagramType::Attitude => DecodedRecord::Attitude(decode_attitude(frame)?),
        DatagramType::Runtime => DecodedRecord::Runtime(decode_runtime(frame)?),
        DatagramType::InstallStart | DatagramType::InstallStop => {
            DecodedRecord::Installation(decode_installation(frame)?)
        }
        DatagramType::RawRangeAngle => DecodedRecord::RawRangeAngle(decode_raw_range(frame)?),
        DatagramType::Soundings => DecodedRecord::Soundings(decode_soundings(frame)?),
        DatagramType::SeabedImage => DecodedRecord::SeabedImage(decode_seabed_image(frame)?),
        DatagramType::Clock => DecodedRecord::Clock(decode_clock(frame)?),
        DatagramType::PuStatus => DecodedRecord::PuStatus(decode_pu_status(frame)?),
    };
    Ok(Some(record))
}
