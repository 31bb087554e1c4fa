use proptest::prelude::*;

use pixconv_core::model::HitGroup;
use pixconv_core::segment::{AuthorStrategy, Segmenter};
use pixconv_core::sink::MemorySink;
use pixconv_core::source::MemorySource;

#[path = "generators.rs"]
mod generators;
use generators::*;

fn segment(rows: &[pixconv_core::model::FlatHitRow], chunk_size: usize) -> MemorySink {
    let mut source = MemorySource::chunked(rows, chunk_size);
    let (_, sink) = Segmenter::new(AuthorStrategy::new(None), MemorySink::new())
        .run(&mut source)
        .expect("generated streams are valid");
    sink
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    #[test]
    fn one_group_per_contiguous_run(events in arb_events(40, 12)) {
        let rows = flatten(&events);
        let sink = segment(&rows, 64);

        prop_assert_eq!(sink.events.len(), events.len());
        for (spec, (record, group)) in events.iter().zip(&sink.events) {
            let record = record.expect("author mode carries records");
            prop_assert_eq!(record.frame_number, u64::try_from(spec.event_id).unwrap());
            prop_assert_eq!(group.len(), spec.hits.len());
            let coords: Vec<(i32, i32)> = group.iter().map(|h| (h.pixel_x, h.pixel_y)).collect();
            let expected: Vec<(i32, i32)> = spec
                .hits
                .iter()
                .map(|&(c, r)| (i32::from(c) - 1, i32::from(r) - 1))
                .collect();
            prop_assert_eq!(coords, expected);
        }
    }

    #[test]
    fn chunking_is_invisible(events in arb_events(25, 8), chunk_size in 1_usize..50) {
        let rows = flatten(&events);
        let whole = segment(&rows, rows.len().max(1));
        let split = segment(&rows, chunk_size);
        prop_assert_eq!(whole.events, split.events);
    }

    #[test]
    fn hits_written_match_input(events in arb_events(30, 10)) {
        let rows = flatten(&events);
        let sink = segment(&rows, 17);
        let written: usize = sink.groups().map(HitGroup::len).sum();
        let expected: usize = events.iter().map(|e| e.hits.len()).sum();
        prop_assert_eq!(written, expected);
    }

    #[test]
    fn event_cap_truncates_prefix(events in arb_events(30, 4), cap in 1_u64..40) {
        let rows = flatten(&events);
        let mut source = MemorySource::chunked(&rows, 9);
        let (summary, sink) = Segmenter::new(AuthorStrategy::new(Some(cap)), MemorySink::new())
            .run(&mut source)
            .expect("valid stream");
        let expected = (events.len() as u64).min(cap);
        prop_assert_eq!(summary.events, expected);
        prop_assert_eq!(summary.stopped_by_cap, (events.len() as u64) > cap);
        let full = segment(&rows, 9);
        prop_assert_eq!(&sink.events[..], &full.events[..sink.events.len()]);
    }
}
