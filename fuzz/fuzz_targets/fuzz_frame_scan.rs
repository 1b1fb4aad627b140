#![no_main]

use imgest::formats::{frame_length, FrameScan, FrameScanner};
use imgest::ImageFormat;
use libfuzzer_sys::fuzz_target;

const FORMATS: [ImageFormat; 6] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::WebP,
    ImageFormat::Tiff,
];

fuzz_target!(|data: &[u8]| {
    for format in FORMATS {
        let whole = frame_length(format, data);
        if let FrameScan::Complete(len) = whole {
            assert!(len <= data.len());
        }

        // feeding the same bytes in two steps must agree with one pass
        let split = data.len() / 2;
        let mut scanner = FrameScanner::for_format(format);
        let first = scanner.advance(&data[..split]);
        let resumed = match first {
            FrameScan::Incomplete => scanner.advance(data),
            other => other,
        };
        if let (FrameScan::Complete(a), FrameScan::Complete(b)) = (&whole, &resumed) {
            assert!(*b <= *a);
        }
    }
});
