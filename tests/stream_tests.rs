mod common;

use std::io::Cursor;

use imgest::{
    DecodeError, DecodeOptions, DecodedImage, FrameErrorPolicy, FrameReader, Ingest,
    IngestOptions, SessionState, StreamEvent, StreamMode, StreamOptions, StreamSession,
};
use proptest::prelude::*;

fn session(options: StreamOptions) -> StreamSession {
    StreamSession::new(options, DecodeOptions::default())
}

/// Writes `chunks` then ends the session, collecting every event.
fn run(session: &mut StreamSession, chunks: &[&[u8]]) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    for chunk in chunks {
        events.extend(session.write(chunk).unwrap());
    }
    events.extend(session.end().unwrap());
    events
}

fn frames(events: &[StreamEvent]) -> Vec<&DecodedImage> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Frame(img) => Some(img),
            _ => None,
        })
        .collect()
}

fn errors(events: &[StreamEvent]) -> Vec<&DecodeError> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Error(err) => Some(err),
            _ => None,
        })
        .collect()
}

fn assert_single_end(events: &[StreamEvent]) {
    assert_eq!(events.iter().filter(|e| e.is_end()).count(), 1);
    assert!(events.last().is_some_and(StreamEvent::is_end));
}

#[test]
fn test_one_chunk_vs_bytewise() {
    let png = common::png(30, 20);

    let whole = run(&mut session(StreamOptions::default()), &[&png[..]]);
    let chunks: Vec<&[u8]> = png.chunks(1).collect();
    let split = run(&mut session(StreamOptions::default()), &chunks);

    assert_eq!(frames(&whole).len(), 1);
    assert_eq!(frames(&split).len(), 1);
    assert_eq!(frames(&whole)[0], frames(&split)[0]);
    assert!(errors(&split).is_empty());
    assert_single_end(&split);
}

#[test]
fn test_concatenated_formats_in_order() {
    let mut stream = Vec::new();
    stream.extend(common::png(10, 11));
    stream.extend(common::jpeg(12, 13));
    stream.extend(common::still_gif(14, 15));
    stream.extend(common::bmp(16, 17));

    let events = run(&mut session(StreamOptions::default()), &[&stream[..]]);
    let sizes: Vec<(u32, u32)> = frames(&events).iter().map(|f| f.size()).collect();
    assert_eq!(sizes, vec![(10, 11), (12, 13), (14, 15), (16, 17)]);
    assert!(errors(&events).is_empty());
    assert_single_end(&events);
}

#[test]
fn test_truncated_tail_reports_truncated() {
    let png = common::png(30, 20);
    let cut = &png[..png.len() - 20];

    let mut s = session(StreamOptions::default());
    let events = run(&mut s, &[cut]);

    assert!(frames(&events).is_empty());
    let errs = errors(&events);
    assert_eq!(errs.len(), 1);
    assert!(matches!(errs[0], DecodeError::Truncated { buffered } if *buffered == cut.len()));
    assert_single_end(&events);
    assert_eq!(s.state(), SessionState::Closed);
}

#[test]
fn test_frame_then_truncated_fragment() {
    let mut stream = common::jpeg(8, 8);
    let second = common::jpeg(9, 9);
    stream.extend_from_slice(&second[..second.len() / 2]);

    let events = run(&mut session(StreamOptions::default()), &[&stream[..]]);
    assert_eq!(frames(&events).len(), 1);
    assert!(matches!(errors(&events)[..], [DecodeError::Truncated { .. }]));
}

#[test]
fn test_garbage_between_frames_reported_once() {
    let mut stream = common::png(5, 5);
    stream.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
    stream.extend(common::png(6, 6));

    let chunks: Vec<&[u8]> = stream.chunks(3).collect();
    let events = run(&mut session(StreamOptions::default()), &chunks);

    assert_eq!(frames(&events).len(), 2);
    let errs = errors(&events);
    assert_eq!(errs.len(), 1);
    assert!(errs[0].to_string().contains("skipped 7 bytes"));
}

/// "BM" followed by a file size but nothing else a bitmap header needs.
fn fake_bmp_head() -> Vec<u8> {
    let mut junk = b"BM".to_vec();
    junk.extend_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
    junk.extend_from_slice(b" garbage garbage");
    junk
}

/// A well-formed bitmap header that declares far more bytes than follow.
fn overlong_bmp_head() -> Vec<u8> {
    let mut head = b"BM".to_vec();
    head.extend_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
    head.extend_from_slice(&[0; 4]);
    head.extend_from_slice(&54u32.to_le_bytes());
    head.extend_from_slice(&40u32.to_le_bytes());
    head.extend_from_slice(&[0; 20]);
    head
}

fn sizes(events: &[StreamEvent]) -> Vec<(u32, u32)> {
    frames(events).iter().map(|f| f.size()).collect()
}

#[test]
fn test_bm_junk_does_not_swallow_following_frames() {
    let mut stream = common::png(5, 5);
    stream.extend(fake_bmp_head());
    stream.extend(common::png(6, 6));
    stream.extend(common::jpeg(7, 7));

    for chunk_len in [stream.len(), 5] {
        let chunks: Vec<&[u8]> = stream.chunks(chunk_len).collect();
        let events = run(&mut session(StreamOptions::default()), &chunks);

        assert_eq!(sizes(&events), vec![(5, 5), (6, 6), (7, 7)]);
        let errs = errors(&events);
        assert_eq!(errs.len(), 1, "{errs:?}");
        assert_eq!(errs[0].kind(), imgest::ErrorKind::InvalidFormat);
        assert_single_end(&events);
    }
}

#[test]
fn test_overlong_bmp_abandoned_for_next_frame() {
    let mut stream = overlong_bmp_head();
    stream.extend(common::png(6, 6));
    stream.extend(common::jpeg(7, 7));

    for chunk_len in [stream.len(), 7] {
        let chunks: Vec<&[u8]> = stream.chunks(chunk_len).collect();
        let events = run(&mut session(StreamOptions::default()), &chunks);

        assert_eq!(sizes(&events), vec![(6, 6), (7, 7)]);
        let errs = errors(&events);
        assert_eq!(errs.len(), 1, "{errs:?}");
        assert!(errs[0].to_string().contains("BMP frame of 38 bytes"));
    }
}

#[test]
fn test_real_bmp_still_cut_from_stream() {
    let mut stream = common::bmp(9, 4);
    stream.extend(common::png(3, 3));
    let chunks: Vec<&[u8]> = stream.chunks(11).collect();
    let events = run(&mut session(StreamOptions::default()), &chunks);
    assert_eq!(sizes(&events), vec![(9, 4), (3, 3)]);
    assert!(errors(&events).is_empty());
}

#[test]
fn test_unrecognised_tail_is_skipped_not_truncated() {
    let mut stream = common::png(4, 4);
    stream.extend_from_slice(&[0, 1, 2, 3]);
    let events = run(&mut session(StreamOptions::default()), &[&stream[..]]);

    assert_eq!(frames(&events).len(), 1);
    let errs = errors(&events);
    assert_eq!(errs.len(), 1);
    assert!(matches!(errs[0], DecodeError::InvalidFormat(msg) if msg.contains("skipped 4 bytes")));
}

#[test]
fn test_corrupt_frame_continue_policy() {
    let mut bad = common::png(5, 5);
    bad[8 + 8 + 13] ^= 0xFF;
    let mut stream = bad;
    stream.extend(common::png(7, 7));

    let events = run(&mut session(StreamOptions::default()), &[&stream[..]]);
    let errs = errors(&events);
    assert!(!errs.is_empty());
    assert!(errs.iter().all(|e| matches!(e, DecodeError::InvalidFormat(_))));
    let sizes: Vec<(u32, u32)> = frames(&events).iter().map(|f| f.size()).collect();
    assert_eq!(sizes, vec![(7, 7)]);
}

#[test]
fn test_corrupt_frame_abort_policy_closes() {
    let mut bad = common::png(5, 5);
    bad[8 + 8 + 13] ^= 0xFF;
    let mut stream = bad;
    stream.extend(common::png(7, 7));

    let mut s = session(StreamOptions::default().with_policy(FrameErrorPolicy::Abort));
    let events = s.write(&stream).unwrap();

    assert!(frames(&events).is_empty());
    assert_eq!(errors(&events).len(), 1);
    assert_single_end(&events);
    assert!(s.is_closed());

    let err = s.write(b"more").unwrap_err();
    assert!(matches!(err, DecodeError::Unsupported(_)));
    assert!(s.end().is_err());
}

#[test]
fn test_end_twice_fails() {
    let mut s = session(StreamOptions::default());
    let events = s.end().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].is_end());
    assert!(matches!(s.end(), Err(DecodeError::Unsupported(_))));
}

#[test]
fn test_state_transitions() {
    let png = common::png(4, 4);
    let mut s = session(StreamOptions::default());
    assert_eq!(s.state(), SessionState::Empty);

    s.write(&png[..10]).unwrap();
    assert_eq!(s.state(), SessionState::Accumulating);
    assert_eq!(s.buffered(), 10);

    let events = s.write(&png[10..]).unwrap();
    assert_eq!(frames(&events).len(), 1);
    assert_eq!(s.state(), SessionState::Accumulating);
    assert_eq!(s.buffered(), 0);
    assert_eq!(s.frames_emitted(), 1);
}

#[test]
fn test_whole_stream_mode_decodes_at_end() {
    let png = common::png(21, 12);
    let mut s = session(StreamOptions::default().with_mode(StreamMode::WholeStream));

    for chunk in png.chunks(64) {
        assert!(s.write(chunk).unwrap().is_empty());
    }
    let events = s.end().unwrap();
    assert_eq!(frames(&events)[0].size(), (21, 12));
    assert_single_end(&events);
}

#[test]
fn test_whole_stream_empty_is_just_end() {
    let events = run(
        &mut session(StreamOptions::default().with_mode(StreamMode::WholeStream)),
        &[],
    );
    assert_eq!(events.len(), 1);
}

#[test]
fn test_per_write_mode_one_image_per_write() {
    let a = common::png(3, 3);
    let b = common::jpeg(4, 4);
    let events = run(
        &mut session(StreamOptions::default().with_mode(StreamMode::PerWrite)),
        &[&a[..], &b[..], &b"junk"[..]],
    );
    assert_eq!(frames(&events).len(), 2);
    assert_eq!(errors(&events).len(), 1);
    assert_single_end(&events);
}

#[test]
fn test_tiff_frame_decoded_at_end() {
    let tiff = common::multipage_tiff(2, 8, 6);
    let mut s = session(StreamOptions::default());
    for chunk in tiff.chunks(100) {
        assert!(frames(&s.write(chunk).unwrap()).is_empty());
    }
    let events = s.end().unwrap();
    assert_eq!(frames(&events)[0].size(), (8, 6));
}

#[test]
fn test_oversized_frame_rejected() {
    let png = common::png(40, 40);
    let mut s = session(StreamOptions::default().with_max_frame_bytes(40));
    let events = run(&mut s, &png.chunks(50).collect::<Vec<_>>());
    assert!(frames(&events).is_empty());
    assert!(
        errors(&events)
            .iter()
            .any(|e| e.to_string().contains("exceeds the 40 byte limit"))
    );
}

#[test]
fn test_frame_reader_yields_until_end() {
    let mut stream = common::jpeg(10, 10);
    stream.extend(common::png(11, 11));

    let ingest = Ingest::new(
        IngestOptions::default()
            .with_workers(1)
            .with_stream(StreamOptions::default().with_read_chunk_size(7)),
    )
    .unwrap();
    let events: Vec<StreamEvent> = ingest.frame_reader(Cursor::new(stream)).collect();

    assert_eq!(frames(&events).len(), 2);
    assert_single_end(&events);
}

#[test]
fn test_frame_reader_reports_read_error() {
    struct Failing;
    impl std::io::Read for Failing {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("device gone"))
        }
    }

    let reader = FrameReader::new(Failing, session(StreamOptions::default()), 16);
    let events: Vec<StreamEvent> = reader.collect();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], StreamEvent::Error(DecodeError::Io { .. })));
    assert!(events[1].is_end());
}

#[tokio::test]
async fn test_open_stream_push_protocol() {
    let ingest = Ingest::new(IngestOptions::default().with_workers(1)).unwrap();
    let (writer, events) = ingest.open_stream().unwrap();

    let mut stream = common::png(9, 9);
    stream.extend(common::jpeg(10, 10));
    for chunk in stream.chunks(128) {
        writer.write(chunk.to_vec()).await.unwrap();
    }
    writer.end();

    let events = events.collect().await;
    assert_eq!(frames(&events).len(), 2);
    assert_single_end(&events);
}

#[tokio::test]
async fn test_decode_stream_from_async_reader() {
    let ingest = Ingest::new(
        IngestOptions::default()
            .with_workers(1)
            .with_stream(StreamOptions::default().with_read_chunk_size(33)),
    )
    .unwrap();

    let mut stream = common::still_gif(5, 5);
    stream.extend(common::bmp(6, 6));
    let mut events = ingest.decode_stream(Cursor::new(stream)).unwrap();

    let mut sizes = Vec::new();
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Frame(img) => sizes.push(img.size()),
            StreamEvent::Error(err) => panic!("unexpected error: {err}"),
            StreamEvent::End => break,
        }
    }
    assert_eq!(sizes, vec![(5, 5), (6, 6)]);
}

#[test]
fn test_open_stream_outside_runtime_fails() {
    let ingest = Ingest::new(IngestOptions::default().with_workers(1)).unwrap();
    assert!(matches!(ingest.open_stream(), Err(DecodeError::Unsupported(_))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_chunking_does_not_change_frames(cuts in prop::collection::vec(1usize..400, 0..12)) {
        let mut stream = common::png(13, 7);
        stream.extend(common::jpeg(9, 5));

        let mut points: Vec<usize> = cuts.into_iter().filter(|&c| c < stream.len()).collect();
        points.sort_unstable();
        points.dedup();

        let mut chunks = Vec::new();
        let mut start = 0;
        for p in points {
            chunks.push(&stream[start..p]);
            start = p;
        }
        chunks.push(&stream[start..]);

        let reference = run(&mut session(StreamOptions::default()), &[&stream[..]]);
        let events = run(&mut session(StreamOptions::default()), &chunks);

        prop_assert!(errors(&events).is_empty());
        prop_assert_eq!(frames(&events), frames(&reference));
        prop_assert_eq!(frames(&events).len(), 2);
    }
}
