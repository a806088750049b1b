//! Length-prefixed datagram framing for multibeam logger files
//!
//! Logger files are a stream of frames, each introduced by a little-endian
//! u32 length that counts STX through the trailing checksum. Logger restarts
//! and dropped UDP packets leave truncated or garbled spans in real files, so
//! the scanner treats framing damage as data, not as an error: it resyncs
//! and reports how many bytes it had to skip.

use std::collections::HashMap;

use log::info;

use crate::types::DatagramType;

/// Start-of-frame marker, first byte covered by the length field
pub const STX: u8 = 0x02;
/// End-of-frame marker, third byte from the end of the covered span
pub const ETX: u8 = 0x03;

/// Smallest declared length the scanner will consider (STX..ETX indexable)
const MIN_FRAME_LEN: u32 = 3;

/// One frame located in a scan buffer
///
/// `payload` spans exactly the declared length: STX, type id, record fields,
/// ETX, two checksum bytes. Borrowed from the scan buffer; decode it before
/// the buffer goes away.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub type_id: u8,
    /// Byte offset of the length field within the scanned buffer
    pub offset: usize,
    /// Declared length (STX through checksum inclusive)
    pub length: u32,
    pub payload: &'a [u8],
}

impl<'a> RawFrame<'a> {
    /// Bytes between STX and ETX: type id plus record fields
    pub fn body(&self) -> &'a [u8] {
        &self.payload[1..self.payload.len() - 3]
    }

    /// Record fields after the type id; empty for marker-only frames
    pub fn record_bytes(&self) -> &'a [u8] {
        let end = self.payload.len() - 3;
        if end <= 2 {
            &[]
        } else {
            &self.payload[2..end]
        }
    }

    /// Checksum carried in the last two payload bytes
    pub fn declared_checksum(&self) -> u16 {
        let n = self.payload.len();
        u16::from_le_bytes([self.payload[n - 2], self.payload[n - 1]])
    }

    /// Declared checksum matches the body sum
    pub fn checksum_ok(&self) -> bool {
        checksum(self.body()) == self.declared_checksum()
    }

    pub fn datagram_type(&self) -> Option<DatagramType> {
        DatagramType::from_id(self.type_id)
    }
}

/// Vendor frame checksum: wrapping byte sum over everything between STX and
/// ETX (exclusive of both)
///
/// This is the canonical implementation shared by the scanner, the decoders
/// and test fixtures.
#[inline]
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |sum, &b| sum.wrapping_add(b as u16))
}

/// Lazy frame iterator over one in-memory logger buffer
///
/// Candidate lengths that cannot fit the buffer advance the cursor by the
/// width of the length field (a false positive, not a frame start); a
/// candidate with bad STX/ETX markers advances by a single byte so a real
/// frame boundary inside the span is not stepped over. The scanner never
/// fails; damage shows up only in `skipped_bytes`.
pub struct FrameScanner<'a> {
    buf: &'a [u8],
    cursor: usize,
    skipped: usize,
    done: bool,
}

impl<'a> FrameScanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        FrameScanner {
            buf,
            cursor: 0,
            skipped: 0,
            done: false,
        }
    }

    /// Bytes skipped so far during resynchronization
    pub fn skipped_bytes(&self) -> usize {
        self.skipped
    }

    /// Current cursor position within the buffer
    pub fn offset(&self) -> usize {
        self.cursor
    }
}

impl<'a> Iterator for FrameScanner<'a> {
    type Item = RawFrame<'a>;

    fn next(&mut self) -> Option<RawFrame<'a>> {
        if self.done {
            return None;
        }
        while self.cursor + 4 <= self.buf.len() {
            let start = self.cursor;
            let length = u32::from_le_bytes([
                self.buf[start],
                self.buf[start + 1],
                self.buf[start + 2],
                self.buf[start + 3],
            ]);
            let end = start + 4 + length as usize;

            if length < MIN_FRAME_LEN || end > self.buf.len() {
                // Not a plausible length field here
                self.cursor += 4;
                self.skipped += 4;
                continue;
            }

            let payload = &self.buf[start + 4..end];
            if payload[0] != STX || payload[payload.len() - 3] != ETX {
                // Plausible length but no frame markers: resync one byte
                self.cursor += 1;
                self.skipped += 1;
                continue;
            }

            self.cursor = end;
            return Some(RawFrame {
                type_id: payload[1],
                offset: start,
                length,
                payload,
            });
        }
        // Trailing bytes too short to hold a length field
        self.skipped += self.buf.len() - self.cursor;
        self.cursor = self.buf.len();
        self.done = true;
        None
    }
}

/// Tally of one scan pass over a buffer
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub buffer_len: usize,
    pub frame_count: usize,
    pub skipped_bytes: usize,
    /// Frames seen per raw type id, including types the decoders skip
    pub type_counts: HashMap<u8, usize>,
}

impl ScanReport {
    pub fn count_for(&self, dtype: DatagramType) -> usize {
        self.type_counts.get(&dtype.id()).copied().unwrap_or(0)
    }
}

/// Scan a whole buffer, returning every frame plus the tally
pub fn scan_frames(buf: &[u8]) -> (Vec<RawFrame<'_>>, ScanReport) {
    let mut scanner = FrameScanner::new(buf);
    let mut frames = Vec::new();
    let mut type_counts: HashMap<u8, usize> = HashMap::new();

    for frame in &mut scanner {
        *type_counts.entry(frame.type_id).or_insert(0) += 1;
        frames.push(frame);
    }

    let report = ScanReport {
        buffer_len: buf.len(),
        frame_count: frames.len(),
        skipped_bytes: scanner.skipped_bytes(),
        type_counts,
    };
    info!(
        "Scanned {} frames from {} bytes ({} skipped)",
        report.frame_count, report.buffer_len, report.skipped_bytes
    );
    (frames, report)
}
