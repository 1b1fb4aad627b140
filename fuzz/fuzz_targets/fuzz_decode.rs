#![no_main]

use imgest::{decode, demux, DecodeLimits, DecodeOptions, EncodedBlob, ReadMode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let limits = DecodeLimits {
        max_width: Some(4096),
        max_height: Some(4096),
        max_alloc: Some(64 * 1024 * 1024),
    };
    let options = DecodeOptions::new(ReadMode::Unchanged).with_limits(limits);
    let blob = EncodedBlob::new(data.to_vec());

    if let Ok(img) = decode(&blob, &options) {
        let expected = img.width() as usize
            * img.height() as usize
            * img.channels() as usize
            * img.element_type().size();
        assert_eq!(img.data().len(), expected);
    }
    let _ = demux(&blob, &options);
});
