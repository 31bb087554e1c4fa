#![no_main]

use libfuzzer_sys::fuzz_target;
use pixconv_core::model::{FlatHitRow, MAX_HITS};
use pixconv_core::segment::{AuthorStrategy, Segmenter};
use pixconv_core::sink::MemorySink;
use pixconv_core::source::MemorySource;

fuzz_target!(|data: &[u8]| {
    // Four bytes per row: event id delta, column, row low byte, row high bit.
    let mut event_id = 0_i64;
    let rows: Vec<FlatHitRow> = data
        .chunks_exact(4)
        .map(|b| {
            event_id += i64::from(b[0] % 3);
            FlatHitRow {
                event_id,
                column: b[1],
                row: u16::from(b[2]) | (u16::from(b[3] & 1) << 8),
                ..FlatHitRow::default()
            }
        })
        .collect();
    let chunk_size = data.first().map_or(1, |&b| usize::from(b % 16) + 1);

    let mut source = MemorySource::chunked(&rows, chunk_size);
    if let Ok((summary, sink)) =
        Segmenter::new(AuthorStrategy::new(None), MemorySink::new()).run(&mut source)
    {
        assert_eq!(summary.events as usize, sink.events.len());
        assert!(sink.groups().all(|g| g.len() <= MAX_HITS));
    }
});
