use swathcheck::io::datagram::{checksum, scan_frames, FrameScanner};
use swathcheck::types::DatagramType;

/// Wrap record bytes in the logger frame layout: LE u32 length, STX, type id,
/// record, ETX, LE u16 checksum over type id + record.
fn frame(type_id: u8, record: &[u8]) -> Vec<u8> {
    let mut body = vec![type_id];
    body.extend_from_slice(record);
    let sum = checksum(&body);
    let mut out = ((body.len() + 4) as u32).to_le_bytes().to_vec();
    out.push(0x02);
    out.extend_from_slice(&body);
    out.push(0x03);
    out.extend_from_slice(&sum.to_le_bytes());
    out
}

#[test]
fn test_concatenated_frames_scan_clean() {
    env_logger::init();

    let mut buf = Vec::new();
    let records: [(u8, &[u8]); 4] = [
        (0x50, &[1, 2, 3, 4, 5, 6]),
        (0x58, &[10; 40]),
        (0x41, &[7; 14]),
        (0x58, &[11; 40]),
    ];
    let mut expected_offsets = Vec::new();
    for (type_id, record) in records {
        expected_offsets.push(buf.len());
        buf.extend_from_slice(&frame(type_id, record));
    }

    println!("=== Clean Buffer Scan ===");
    println!("Buffer: {} bytes, {} frames", buf.len(), records.len());

    let (frames, report) = scan_frames(&buf);
    assert_eq!(frames.len(), 4);
    assert_eq!(report.frame_count, 4);
    assert_eq!(report.skipped_bytes, 0, "clean buffer must skip nothing");
    assert_eq!(report.count_for(DatagramType::Soundings), 2);
    assert_eq!(report.count_for(DatagramType::Position), 1);
    assert_eq!(report.count_for(DatagramType::Attitude), 1);

    for (frame, expected) in frames.iter().zip(expected_offsets) {
        assert_eq!(frame.offset, expected);
        assert!(frame.checksum_ok(), "offset {}: checksum mismatch", expected);
    }
    println!("All frames recovered at their written offsets");
}

#[test]
fn test_corrupt_span_resyncs_one_byte_at_a_time() {
    // A span whose first four bytes happen to read as a tiny valid length.
    // The scanner must try it, see bad markers, and slide a single byte so
    // it cannot step over a real frame start hiding inside the span.
    let corrupt: [u8; 9] = [0x03, 0x00, 0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE];

    let mut buf = frame(0x50, &[1, 2, 3, 4]);
    buf.extend_from_slice(&corrupt);
    let second_offset = buf.len();
    buf.extend_from_slice(&frame(0x58, &[9; 30]));

    println!("=== Corrupt Span Recovery ===");
    let (frames, report) = scan_frames(&buf);

    assert_eq!(frames.len(), 2, "both real frames must survive the span");
    assert_eq!(frames[0].type_id, 0x50);
    assert_eq!(frames[1].type_id, 0x58);
    assert_eq!(frames[1].offset, second_offset);
    assert_eq!(
        report.skipped_bytes,
        corrupt.len(),
        "exactly the corrupt span is skipped"
    );
    println!("Skipped {} bytes, resynced at {}", report.skipped_bytes, second_offset);
}

#[test]
fn test_corrupt_span_with_bogus_lengths() {
    // All-0xFF bytes read as absurd length fields, so each attempt steps
    // the cursor by the width of the length field.
    let mut buf = frame(0x43, &[1; 9]);
    buf.extend_from_slice(&[0xFF; 16]);
    buf.extend_from_slice(&frame(0x50, &[2; 20]));

    let (frames, report) = scan_frames(&buf);
    assert_eq!(frames.len(), 2);
    assert_eq!(report.skipped_bytes, 16);
}

#[test]
fn test_truncated_tail_is_counted_not_fatal() {
    let keep = frame(0x50, &[5; 12]);
    let mut buf = keep.clone();
    let cut = frame(0x58, &[6; 60]);
    buf.extend_from_slice(&cut[..10]); // logger died mid-write

    let (frames, report) = scan_frames(&buf);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].offset, 0);
    assert_eq!(report.skipped_bytes, 10);
    assert_eq!(report.buffer_len, keep.len() + 10);
}

#[test]
fn test_bad_checksum_surfaces_on_the_frame() {
    // Framing is intact, one record byte flipped: the scanner still yields
    // the frame and the checksum flag tells the decoder layer about it.
    let mut buf = frame(0x50, &[1, 2, 3, 4, 5, 6, 7, 8]);
    buf[9] ^= 0xFF;

    let (frames, report) = scan_frames(&buf);
    assert_eq!(frames.len(), 1);
    assert_eq!(report.skipped_bytes, 0);
    assert!(!frames[0].checksum_ok());
}

#[test]
fn test_scanner_reports_cursor_progress() {
    let mut buf = frame(0x50, &[1; 8]);
    buf.extend_from_slice(&frame(0x58, &[2; 8]));

    let mut scanner = FrameScanner::new(&buf);
    assert_eq!(scanner.offset(), 0);
    let first = scanner.next().expect("first frame");
    assert_eq!(scanner.offset(), first.payload.len() + 4);
    let _ = scanner.next().expect("second frame");
    assert!(scanner.next().is_none());
    assert_eq!(scanner.offset(), buf.len());
    assert_eq!(scanner.skipped_bytes(), 0);
}
