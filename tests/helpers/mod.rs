//! Test helpers and fixtures for keyroll integration tests

use keyroll::prelude::*;
use keyroll::meta;
use rand::rngs::StdRng;
use rand::Rng;

/// Ticks per quarter note used by the fixtures
pub const TEST_TPQ: u16 = 480;

/// Install a test-writer subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Three tracks: conductor, a piano arpeggio, and drums with one hit left open.
pub fn demo_song() -> Smf {
    let mut smf = Smf::new(Format::Parallel, Timing::Metrical(TEST_TPQ));
    smf.push_track(vec![
        Event::text(0, meta::TRACK_NAME, "Conductor"),
        Event::tempo(0, 500_000),
    ]);
    smf.push_track(vec![
        Event::text(0, meta::TRACK_NAME, "Piano"),
        Event::note_on(0, 0, 60, 100),
        Event::note_on(480, 0, 64, 90),
        Event::note_on(480, 0, 67, 80),
        Event::note_off(480, 0, 60, 0),
        Event::note_on(0, 0, 64, 0),
        Event::note_on(0, 0, 67, 0),
    ]);
    smf.push_track(vec![
        Event::text(0, meta::TRACK_NAME, "Drums"),
        Event::note_on(0, 9, 36, 120),
        Event::note_off(240, 9, 36, 0),
        Event::note_on(0, 9, 42, 70),
        Event::program_change(1680, 9, 0),
    ]);
    smf
}

/// A note as `(start tick, length, key)`.
pub type Span = (u64, u64, u8);

/// A random track of non-overlapping notes per key plus the notes it encodes.
pub fn random_track(rng: &mut StdRng, notes_per_key: usize, keys: &[u8]) -> (Vec<Event>, Vec<Span>) {
    let mut spans = Vec::new();
    // (tick, is_on, key, velocity)
    let mut timeline = Vec::new();

    for &key in keys {
        let mut tick = rng.gen_range(0..100u64);
        for _ in 0..notes_per_key {
            let length = rng.gen_range(1..500u64);
            let velocity = rng.gen_range(1..128u8);
            timeline.push((tick, true, key, velocity));
            timeline.push((tick + length, false, key, 0));
            spans.push((tick, length, key));
            tick += length + rng.gen_range(1..200u64);
        }
    }

    timeline.sort_by_key(|&(tick, is_on, key, _)| (tick, is_on, key));

    let mut events = Vec::with_capacity(timeline.len());
    let mut now = 0;
    for (tick, is_on, key, velocity) in timeline {
        let delta = (tick - now) as u32;
        now = tick;
        events.push(if is_on {
            Event::note_on(delta, 0, key, velocity)
        } else {
            Event::note_off(delta, 0, key, 0)
        });
    }

    spans.sort_unstable();
    (events, spans)
}

/// Sorted `(start, length, key)` spans of index notes, in ticks.
pub fn spans_of(notes: &[NoteData]) -> Vec<Span> {
    let mut spans: Vec<_> = notes
        .iter()
        .map(|n| (n.start_time as u64, n.duration as u64, n.pitch))
        .collect();
    spans.sort_unstable();
    spans
}
