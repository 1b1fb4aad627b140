use super::FrameScan;

pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;
const MARKER_SOI: u8 = 0xD8;
const MARKER_TEM: u8 = 0x01;

#[inline]
pub fn is_valid_marker(marker: u8) -> bool {
    matches!(
        marker,
        0xC0..=0xCF |
        0xD0..=0xD9 |
        0xDA |
        0xDB |
        0xDC..=0xDF |
        0xE0..=0xEF |
        0xFE
    )
}

#[inline]
fn is_restart(marker: u8) -> bool {
    matches!(marker, 0xD0..=0xD7)
}

/// Walks marker segments and entropy-coded scans up to EOI.
///
/// Progressive files interleave several scans with table segments, so a
/// marker inside scan data ends the scan rather than the frame.
#[derive(Debug, Clone, Default)]
pub struct JpegScanner {
    pos: usize,
    in_scan: bool,
}

impl JpegScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, data: &[u8]) -> FrameScan {
        if self.pos == 0 {
            if data.len() < 2 {
                return FrameScan::Incomplete;
            }
            if data[..2] != JPEG_SOI {
                return FrameScan::Invalid("JPEG data does not start with SOI".into());
            }
            self.pos = 2;
        }

        loop {
            if self.in_scan {
                let Some(rel) = data[self.pos..].iter().position(|&b| b == 0xFF) else {
                    self.pos = data.len();
                    return FrameScan::Incomplete;
                };
                let i = self.pos + rel;
                if i + 1 >= data.len() {
                    self.pos = i;
                    return FrameScan::Incomplete;
                }
                let next = data[i + 1];
                if next == 0x00 || is_restart(next) {
                    self.pos = i + 2;
                    continue;
                }
                if next == 0xFF {
                    self.pos = i + 1;
                    continue;
                }
                self.pos = i;
                self.in_scan = false;
            }

            if self.pos >= data.len() {
                return FrameScan::Incomplete;
            }
            if data[self.pos] != 0xFF {
                return FrameScan::Invalid(format!("expected JPEG marker at offset {}", self.pos));
            }

            let mut p = self.pos;
            while p < data.len() && data[p] == 0xFF {
                p += 1;
            }
            if p >= data.len() {
                return FrameScan::Incomplete;
            }

            let marker = data[p];
            let after = p + 1;

            if marker == MARKER_EOI {
                return FrameScan::Complete(after);
            }
            if marker == MARKER_TEM || is_restart(marker) {
                self.pos = after;
                continue;
            }
            if marker == MARKER_SOI || !is_valid_marker(marker) {
                return FrameScan::Invalid(format!(
                    "unexpected JPEG marker 0xFF{marker:02X} at offset {p}"
                ));
            }

            if after + 2 > data.len() {
                return FrameScan::Incomplete;
            }
            let seg_len = u16::from_be_bytes([data[after], data[after + 1]]) as usize;
            if seg_len < 2 {
                return FrameScan::Invalid(format!("JPEG segment length {seg_len} at offset {p}"));
            }
            let seg_end = after + seg_len;
            if seg_end > data.len() {
                return FrameScan::Incomplete;
            }

            self.pos = seg_end;
            if marker == MARKER_SOS {
                self.in_scan = true;
            }
        }
    }
}
