#![allow(dead_code)]

use std::io::Cursor;

use image::codecs::gif::GifEncoder;
use image::{DynamicImage, Frame, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use tiff::encoder::{TiffEncoder, colortype};

pub fn rgb(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 3) as u8, (y * 5) as u8, (x ^ y) as u8])
    }))
}

pub fn rgba(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([x as u8, y as u8, (x + y) as u8, 200])
    }))
}

pub fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    encode(&rgba(width, height), ImageFormat::Png)
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(&rgb(width, height), ImageFormat::Jpeg)
}

pub fn bmp(width: u32, height: u32) -> Vec<u8> {
    encode(&rgb(width, height), ImageFormat::Bmp)
}

pub fn still_gif(width: u32, height: u32) -> Vec<u8> {
    animated_gif(1, width, height)
}

pub fn animated_gif(frames: usize, width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        for i in 0..frames {
            let buf = RgbaImage::from_fn(width, height, |x, y| {
                Rgba([(x as usize * 8 + i * 20) as u8, (y * 4) as u8, 90, 255])
            });
            encoder.encode_frame(Frame::new(buf)).unwrap();
        }
    }
    out
}

/// `pages` RGB8 pages, each `width`x`height`.
pub fn multipage_tiff(pages: usize, width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut out).unwrap();
        for page in 0..pages {
            let data: Vec<u8> = (0..width * height * 3)
                .map(|i| (i as usize + page * 7) as u8)
                .collect();
            encoder
                .write_image::<colortype::RGB8>(width, height, &data)
                .unwrap();
        }
    }
    out.into_inner()
}

pub fn gray16_tiff(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut out).unwrap();
        let data: Vec<u16> = (0..width * height).map(|i| (i * 300) as u16).collect();
        encoder
            .write_image::<colortype::Gray16>(width, height, &data)
            .unwrap();
    }
    out.into_inner()
}

pub fn png_chunk(chunk_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut chunk = Vec::new();
    chunk.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    chunk.extend_from_slice(chunk_type);
    chunk.extend_from_slice(payload);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(payload);
    chunk.extend_from_slice(&hasher.finalize().to_be_bytes());
    chunk
}

/// zlib stream holding `raw` in one stored (uncompressed) deflate block.
fn zlib_stored(raw: &[u8]) -> Vec<u8> {
    assert!(raw.len() <= u16::MAX as usize);
    let len = raw.len() as u16;
    let mut out = vec![0x78, 0x01, 0x01];
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&(!len).to_le_bytes());
    out.extend_from_slice(raw);

    let (mut a, mut b) = (1u32, 0u32);
    for &byte in raw {
        a = (a + byte as u32) % 65521;
        b = (b + a) % 65521;
    }
    out.extend_from_slice(&((b << 16) | a).to_be_bytes());
    out
}

/// Animated PNG with `frames` full-size RGBA8 frames; frame `i` is filled
/// with the value `100 + i * 40`.
pub fn apng(frames: u32, width: u32, height: u32) -> Vec<u8> {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);
    data.extend(png_chunk(b"IHDR", &ihdr));

    let mut actl = frames.to_be_bytes().to_vec();
    actl.extend_from_slice(&0u32.to_be_bytes());
    data.extend(png_chunk(b"acTL", &actl));

    let mut sequence = 0u32;
    for frame in 0..frames {
        let mut fctl = sequence.to_be_bytes().to_vec();
        fctl.extend_from_slice(&width.to_be_bytes());
        fctl.extend_from_slice(&height.to_be_bytes());
        fctl.extend_from_slice(&[0; 8]);
        fctl.extend_from_slice(&1u16.to_be_bytes());
        fctl.extend_from_slice(&10u16.to_be_bytes());
        fctl.extend_from_slice(&[0, 0]);
        data.extend(png_chunk(b"fcTL", &fctl));
        sequence += 1;

        let mut raw = Vec::new();
        for _ in 0..height {
            raw.push(0);
            raw.extend(std::iter::repeat_n((100 + frame * 40) as u8, width as usize * 4));
        }
        let compressed = zlib_stored(&raw);

        if frame == 0 {
            data.extend(png_chunk(b"IDAT", &compressed));
        } else {
            let mut fdat = sequence.to_be_bytes().to_vec();
            fdat.extend_from_slice(&compressed);
            data.extend(png_chunk(b"fdAT", &fdat));
            sequence += 1;
        }
    }

    data.extend(png_chunk(b"IEND", &[]));
    data
}
