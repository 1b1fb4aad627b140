use super::FrameScan;
use crate::signatures::{GIF87A, GIF89A};

const HEADER_LEN: usize = 13;
const IMAGE_DESCRIPTOR_LEN: usize = 10;
const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    Header,
    Blocks,
    SubBlocks,
}

/// Walks GIF blocks and data sub-block chains up to the trailer byte.
#[derive(Debug, Clone, Default)]
pub struct GifScanner {
    pos: usize,
    stage: Stage,
}

#[inline]
fn color_table_len(flags: u8) -> usize {
    if flags & 0x80 != 0 {
        3 << ((flags & 0x07) + 1)
    } else {
        0
    }
}

impl GifScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, data: &[u8]) -> FrameScan {
        loop {
            match self.stage {
                Stage::Header => {
                    if data.len() < HEADER_LEN {
                        return FrameScan::Incomplete;
                    }
                    if data[..6] != GIF87A && data[..6] != GIF89A {
                        return FrameScan::Invalid("GIF header mismatch".into());
                    }
                    self.pos = HEADER_LEN + color_table_len(data[10]);
                    self.stage = Stage::Blocks;
                }
                Stage::Blocks => {
                    let pos = self.pos;
                    if pos >= data.len() {
                        return FrameScan::Incomplete;
                    }
                    match data[pos] {
                        TRAILER => return FrameScan::Complete(pos + 1),
                        EXTENSION_INTRODUCER => {
                            if pos + 2 > data.len() {
                                return FrameScan::Incomplete;
                            }
                            self.pos = pos + 2;
                        }
                        IMAGE_SEPARATOR => {
                            if pos + IMAGE_DESCRIPTOR_LEN > data.len() {
                                return FrameScan::Incomplete;
                            }
                            let local_table = color_table_len(data[pos + 9]);
                            // +1 for the LZW minimum code size byte
                            let start = pos + IMAGE_DESCRIPTOR_LEN + local_table + 1;
                            if start > data.len() {
                                return FrameScan::Incomplete;
                            }
                            self.pos = start;
                        }
                        other => {
                            return FrameScan::Invalid(format!(
                                "unexpected GIF block 0x{other:02X} at offset {pos}"
                            ));
                        }
                    }
                    self.stage = Stage::SubBlocks;
                }
                Stage::SubBlocks => {
                    let pos = self.pos;
                    if pos >= data.len() {
                        return FrameScan::Incomplete;
                    }
                    let size = data[pos] as usize;
                    if size == 0 {
                        self.pos = pos + 1;
                        self.stage = Stage::Blocks;
                        continue;
                    }
                    if pos + 1 + size > data.len() {
                        return FrameScan::Incomplete;
                    }
                    self.pos = pos + 1 + size;
                }
            }
        }
    }
}
