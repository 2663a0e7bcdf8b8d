//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder and
//! asserts that it never panics, never yields an empty or over-limit
//! payload, and never claims to consume more than it was given.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use oscdev::osc::framing::FrameDecoder;

const MAX_FRAME: usize = 2048;

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new(MAX_FRAME);

    let mut rest = data;
    while let Some((payload, used)) = decoder.feed(rest) {
        assert!(!payload.is_empty(), "decoder must not yield empty payload");
        assert!(payload.len() <= MAX_FRAME, "payload exceeds max frame");
        assert!(used > 0 && used <= rest.len(), "consumed count out of bounds");
        rest = &rest[used..];
    }

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    let _ = decoder.feed(data);
});
