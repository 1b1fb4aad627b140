//! Magic-byte registry
//!
//! Identifies container formats from their leading bytes, answers
//! "could this still become a known header?" for partially received
//! streams, and finds the next plausible frame start after corrupt data.

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;

use crate::types::ImageFormat;

pub const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
pub const GIF87A: [u8; 6] = *b"GIF87a";
pub const GIF89A: [u8; 6] = *b"GIF89a";
pub const BMP_MAGIC: [u8; 2] = *b"BM";
pub const RIFF_MAGIC: [u8; 4] = *b"RIFF";
pub const WEBP_TAG: [u8; 4] = *b"WEBP";
pub const TIFF_LE: [u8; 4] = [0x49, 0x49, 0x2A, 0x00];
pub const TIFF_BE: [u8; 4] = [0x4D, 0x4D, 0x00, 0x2A];

static DEFAULT_REGISTRY: LazyLock<SignatureRegistry> =
    LazyLock::new(SignatureRegistry::default_images);

/// Shared registry of the built-in image signatures.
pub fn registry() -> &'static SignatureRegistry {
    &DEFAULT_REGISTRY
}

/// A header pattern identifying one container format.
#[derive(Debug, Clone)]
pub struct Signature {
    format: ImageFormat,
    magic: &'static [u8],
    /// Secondary tag that must appear at a fixed offset (`RIFF....WEBP`).
    tag: Option<(usize, &'static [u8])>,
    /// Strong signatures are distinctive enough to resynchronise on mid-stream.
    strong: bool,
}

impl Signature {
    pub const fn new(format: ImageFormat, magic: &'static [u8]) -> Self {
        Self {
            format,
            magic,
            tag: None,
            strong: true,
        }
    }

    pub const fn with_tag(mut self, offset: usize, tag: &'static [u8]) -> Self {
        self.tag = Some((offset, tag));
        self
    }

    pub const fn weak(mut self) -> Self {
        self.strong = false;
        self
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn magic(&self) -> &[u8] {
        self.magic
    }

    pub fn is_strong(&self) -> bool {
        self.strong
    }

    /// Bytes needed before the signature can be fully confirmed.
    pub fn required_len(&self) -> usize {
        match self.tag {
            Some((offset, tag)) => (offset + tag.len()).max(self.magic.len()),
            None => self.magic.len(),
        }
    }

    fn check(&self, data: &[u8]) -> Sniff {
        let n = data.len().min(self.magic.len());
        if data[..n] != self.magic[..n] {
            return Sniff::NoMatch;
        }
        if let Some((offset, tag)) = self.tag {
            if data.len() > offset {
                let end = data.len().min(offset + tag.len());
                if data[offset..end] != tag[..end - offset] {
                    return Sniff::NoMatch;
                }
            }
        }
        if data.len() >= self.required_len() {
            Sniff::Match(self.format)
        } else {
            Sniff::NeedMore
        }
    }
}

/// Outcome of checking a possibly incomplete header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniff {
    Match(ImageFormat),
    NeedMore,
    NoMatch,
}

#[derive(Debug)]
pub struct SignatureRegistry {
    signatures: Vec<Signature>,
    /// Automaton over the strong signatures' magic bytes.
    pattern_matcher: Option<AhoCorasick>,
    pattern_map: Vec<usize>,
}

impl SignatureRegistry {
    pub fn new(signatures: Vec<Signature>) -> Self {
        let mut registry = Self {
            signatures,
            pattern_matcher: None,
            pattern_map: Vec::new(),
        };
        registry.build_pattern_matcher();
        registry
    }

    pub fn default_images() -> Self {
        Self::new(vec![
            Signature::new(ImageFormat::Jpeg, &JPEG_SOI),
            Signature::new(ImageFormat::Png, &PNG_SIGNATURE),
            Signature::new(ImageFormat::Gif, &GIF89A),
            Signature::new(ImageFormat::Gif, &GIF87A),
            Signature::new(ImageFormat::WebP, &RIFF_MAGIC).with_tag(8, &WEBP_TAG),
            Signature::new(ImageFormat::Tiff, &TIFF_LE),
            Signature::new(ImageFormat::Tiff, &TIFF_BE),
            // "BM" shows up constantly inside compressed data
            Signature::new(ImageFormat::Bmp, &BMP_MAGIC).weak(),
        ])
    }

    fn build_pattern_matcher(&mut self) {
        let mut patterns: Vec<&[u8]> = Vec::new();
        let mut pattern_map = Vec::new();

        for (idx, sig) in self.signatures.iter().enumerate() {
            if sig.strong {
                patterns.push(sig.magic);
                pattern_map.push(idx);
            }
        }

        self.pattern_matcher = if patterns.is_empty() {
            None
        } else {
            AhoCorasick::new(&patterns).ok()
        };
        self.pattern_map = pattern_map;
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// True when `format` has at least one signature distinctive enough to
    /// resynchronise on.
    pub fn has_strong_signature(&self, format: ImageFormat) -> bool {
        self.signatures
            .iter()
            .any(|sig| sig.format == format && sig.strong)
    }

    /// Longest header any registered signature needs to be confirmed.
    pub fn max_required_len(&self) -> usize {
        self.signatures
            .iter()
            .map(Signature::required_len)
            .max()
            .unwrap_or(0)
    }

    /// Identifies a complete buffer by its leading bytes.
    pub fn detect(&self, data: &[u8]) -> Option<ImageFormat> {
        match self.sniff(data) {
            Sniff::Match(format) => Some(format),
            _ => None,
        }
    }

    /// Like [`detect`](Self::detect), but distinguishes "not yet enough bytes"
    /// from "cannot be any known format".
    pub fn sniff(&self, data: &[u8]) -> Sniff {
        if data.is_empty() {
            return Sniff::NeedMore;
        }

        let mut need_more = false;
        for sig in &self.signatures {
            match sig.check(data) {
                Sniff::Match(format) => return Sniff::Match(format),
                Sniff::NeedMore => need_more = true,
                Sniff::NoMatch => {}
            }
        }

        if need_more { Sniff::NeedMore } else { Sniff::NoMatch }
    }

    /// Offset of the first strong signature starting at or after `from`.
    ///
    /// A match near the end of `data` is reported even when its tag cannot be
    /// checked yet; the caller re-sniffs once more bytes arrive.
    pub fn find_next(&self, data: &[u8], from: usize) -> Option<usize> {
        if from >= data.len() {
            return None;
        }
        let haystack = &data[from..];

        match &self.pattern_matcher {
            Some(matcher) => matcher
                .find_overlapping_iter(haystack)
                .map(|mat| {
                    let sig = &self.signatures[self.pattern_map[mat.pattern().as_usize()]];
                    (mat.start(), sig)
                })
                .find(|(start, sig)| sig.check(&haystack[*start..]) != Sniff::NoMatch)
                .map(|(start, _)| from + start),
            None => self.find_next_linear(haystack).map(|start| from + start),
        }
    }

    fn find_next_linear(&self, haystack: &[u8]) -> Option<usize> {
        (0..haystack.len()).find(|&start| {
            self.signatures
                .iter()
                .filter(|sig| sig.strong)
                .any(|sig| sig.check(&haystack[start..]) != Sniff::NoMatch)
        })
    }

    /// Length of the longest suffix of `data` that is a proper prefix of a
    /// strong signature. Those bytes must be kept while skipping garbage.
    pub fn partial_suffix_len(&self, data: &[u8]) -> usize {
        let longest = self.max_required_len().saturating_sub(1).min(data.len());
        (1..=longest)
            .rev()
            .find(|&n| {
                let tail = &data[data.len() - n..];
                self.signatures
                    .iter()
                    .filter(|sig| sig.strong)
                    .any(|sig| sig.check(tail) == Sniff::NeedMore)
            })
            .unwrap_or(0)
    }
}

impl Default for SignatureRegistry {
    fn default() -> Self {
        Self::default_images()
    }
}
