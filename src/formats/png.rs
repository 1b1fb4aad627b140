use super::FrameScan;
use crate::signatures::PNG_SIGNATURE;

pub const IHDR: [u8; 4] = *b"IHDR";
pub const IEND: [u8; 4] = *b"IEND";
pub const ACTL: [u8; 4] = *b"acTL";
pub const IDAT: [u8; 4] = *b"IDAT";

const MAX_CHUNK_LEN: usize = 0x7FFF_FFFF;

/// Walks length-prefixed chunks from the signature to `IEND`.
///
/// The CRCs of `IHDR` and `IEND` are verified so that a stray `IEND`
/// inside corrupt data is not mistaken for the end of the frame.
#[derive(Debug, Clone, Default)]
pub struct PngScanner {
    pos: usize,
    seen_ihdr: bool,
}

impl PngScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, data: &[u8]) -> FrameScan {
        if self.pos == 0 {
            if data.len() < PNG_SIGNATURE.len() {
                return FrameScan::Incomplete;
            }
            if data[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
                return FrameScan::Invalid("PNG signature mismatch".into());
            }
            self.pos = PNG_SIGNATURE.len();
        }

        loop {
            let pos = self.pos;
            if pos + 8 > data.len() {
                return FrameScan::Incomplete;
            }

            let length = read_u32(data, pos) as usize;
            if length > MAX_CHUNK_LEN {
                return FrameScan::Invalid(format!("PNG chunk length {length} at offset {pos}"));
            }

            let chunk_type = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];
            if !chunk_type.iter().all(u8::is_ascii_alphabetic) {
                return FrameScan::Invalid(format!("malformed PNG chunk type at offset {pos}"));
            }
            if !self.seen_ihdr && chunk_type != IHDR {
                return FrameScan::Invalid("first PNG chunk is not IHDR".into());
            }

            let end = pos + 12 + length;
            if end > data.len() {
                return FrameScan::Incomplete;
            }

            if chunk_type == IHDR || chunk_type == IEND {
                let crc_at = pos + 8 + length;
                let stored = read_u32(data, crc_at);
                if crc32fast::hash(&data[pos + 4..crc_at]) != stored {
                    return FrameScan::Invalid(format!(
                        "{} CRC mismatch at offset {pos}",
                        String::from_utf8_lossy(&chunk_type)
                    ));
                }
            }

            self.seen_ihdr = true;
            self.pos = end;

            if chunk_type == IEND {
                return FrameScan::Complete(end);
            }
        }
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// True when the file declares an animation: an `acTL` with a non-zero
/// frame count ahead of the first `IDAT`.
pub fn is_animated(data: &[u8]) -> bool {
    let Some(chunks) = PngChunkIterator::new(data) else {
        return false;
    };
    for (chunk_type, payload) in chunks {
        if chunk_type == ACTL {
            return payload.len() >= 8 && read_u32(payload, 0) > 0;
        }
        if chunk_type == IDAT || chunk_type == IEND {
            return false;
        }
    }
    false
}

pub struct PngChunkIterator<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PngChunkIterator<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < 8 || data[..8] != PNG_SIGNATURE {
            return None;
        }

        Some(Self { data, pos: 8 })
    }
}

impl<'a> Iterator for PngChunkIterator<'a> {
    /// Chunk type and payload.
    type Item = ([u8; 4], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + 12 > self.data.len() {
            return None;
        }

        let length = read_u32(self.data, self.pos) as usize;

        let chunk_type: [u8; 4] = [
            self.data[self.pos + 4],
            self.data[self.pos + 5],
            self.data[self.pos + 6],
            self.data[self.pos + 7],
        ];

        let total_size = 4 + 4 + length + 4;
        if self.pos + total_size > self.data.len() {
            return None;
        }

        let payload = &self.data[self.pos + 8..self.pos + 8 + length];
        self.pos += total_size;

        Some((chunk_type, payload))
    }
}
