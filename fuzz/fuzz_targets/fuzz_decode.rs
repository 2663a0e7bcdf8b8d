//! Fuzz target: packet decoding
//!
//! Feeds arbitrary bytes to the strict and the lenient decoder. Neither
//! may panic, and a packet the strict decoder accepts must survive the
//! lenient decoder with no rejected elements and re-encode to bytes that
//! decode to the same bytes again.
//!
//! cargo fuzz run fuzz_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use oscdev::osc::codec::{self, DecodeLimits};

fuzz_target!(|data: &[u8]| {
    let limits = DecodeLimits::default();
    let lenient = codec::decode_lenient(data, limits);

    if let Ok(messages) = codec::decode_with(data, limits) {
        let elements = lenient.expect("strict success implies lenient success");
        assert_eq!(elements.len(), messages.len());
        assert!(elements.iter().all(Result::is_ok));

        for msg in &messages {
            let bytes = codec::encode_message(msg);
            assert_eq!(bytes.len() % 4, 0);
            let again = codec::decode(&bytes).expect("re-encoded message must decode");
            // Compared as bytes: NaN payloads never compare equal as values.
            assert_eq!(again.len(), 1);
            assert_eq!(codec::encode_message(&again[0]), bytes);
        }
    }
});
