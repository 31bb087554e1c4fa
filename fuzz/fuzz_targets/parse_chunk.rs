#![no_main]

use libfuzzer_sys::fuzz_target;
use pixconv_core::source::jsonl::decode_chunk;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    // Errors are expected; panics and oversized chunks are not.
    if let Ok(rows) = decode_chunk(line, 1, 1, 1024) {
        assert!(rows.len() <= 1024);
    }
});
