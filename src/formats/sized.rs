use super::FrameScan;
use crate::types::ImageFormat;

const BMP_MIN_FILE_LEN: usize = 26;
const BMP_FILE_HEADER_LEN: usize = 14;
/// BITMAPCOREHEADER through BITMAPV5HEADER.
const BMP_DIB_HEADER_LENS: [usize; 7] = [12, 40, 52, 56, 64, 108, 124];
const RIFF_HEADER_LEN: usize = 8;

/// Formats whose header states the total file length (BMP, RIFF/WebP).
#[derive(Debug, Clone)]
pub struct SizedScanner {
    format: ImageFormat,
}

impl SizedScanner {
    pub fn new(format: ImageFormat) -> Self {
        Self { format }
    }

    pub fn advance(&self, data: &[u8]) -> FrameScan {
        let declared = match self.format {
            ImageFormat::Bmp => match bmp_declared_len(data) {
                Ok(Some(size)) => size,
                Ok(None) => return FrameScan::Incomplete,
                Err(reason) => return FrameScan::Invalid(reason),
            },
            ImageFormat::WebP => {
                if data.len() < RIFF_HEADER_LEN {
                    return FrameScan::Incomplete;
                }
                let riff = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
                if riff < 4 {
                    return FrameScan::Invalid(format!("RIFF header declares {riff} bytes"));
                }
                // chunks are padded to even length
                RIFF_HEADER_LEN + riff + (riff & 1)
            }
            other => return FrameScan::Invalid(format!("{other} does not declare its length")),
        };

        if data.len() >= declared {
            FrameScan::Complete(declared)
        } else {
            FrameScan::Incomplete
        }
    }
}

fn le_u32(data: &[u8], at: usize) -> usize {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]) as usize
}

/// "BM" alone says little, so the file header and DIB header length must be
/// consistent before the declared size is trusted.
fn bmp_declared_len(data: &[u8]) -> Result<Option<usize>, String> {
    if data.len() < 6 {
        return Ok(None);
    }
    let size = le_u32(data, 2);
    if size < BMP_MIN_FILE_LEN {
        return Err(format!("BMP header declares {size} bytes"));
    }
    if data.len() < 10 {
        return Ok(None);
    }
    if data[6..10] != [0; 4] {
        return Err("BMP reserved header bytes are not zero".into());
    }
    if data.len() < BMP_FILE_HEADER_LEN + 4 {
        return Ok(None);
    }
    let dib = le_u32(data, BMP_FILE_HEADER_LEN);
    if !BMP_DIB_HEADER_LENS.contains(&dib) {
        return Err(format!("BMP DIB header length {dib}"));
    }
    let pixels_at = le_u32(data, 10);
    if pixels_at < BMP_FILE_HEADER_LEN + dib || pixels_at > size {
        return Err(format!("BMP pixel offset {pixels_at} outside a {size} byte file"));
    }
    Ok(Some(size))
}
