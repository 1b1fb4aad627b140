#![no_main]

use imgest::{DecodeOptions, StreamEvent, StreamOptions, StreamSession};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&step, body)) = data.split_first() else {
        return;
    };
    let step = usize::from(step).max(1);

    let mut session = StreamSession::new(
        StreamOptions::default().with_max_frame_bytes(1 << 20),
        DecodeOptions::default(),
    );
    let mut ends = 0;
    for chunk in body.chunks(step) {
        let Ok(events) = session.write(chunk) else {
            break;
        };
        ends += events.iter().filter(|e| matches!(e, StreamEvent::End)).count();
    }
    if let Ok(events) = session.end() {
        ends += events.iter().filter(|e| matches!(e, StreamEvent::End)).count();
    }
    assert_eq!(ends, 1);
});
