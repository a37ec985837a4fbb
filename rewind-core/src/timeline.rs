//! Timeline builder: sorted, gap-compressed playback schedule.

use crate::config::PlaybackConfig;
use crate::protocol::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineOptions {
    pub skip_inactivity: bool,
    /// Gaps longer than this are compressed.
    pub inactivity_threshold_ms: u64,
    /// Length a compressed gap is shortened to.
    pub compressed_gap_ms: u64,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            skip_inactivity: true,
            inactivity_threshold_ms: 3000,
            compressed_gap_ms: 1000,
        }
    }
}

impl From<&PlaybackConfig> for TimelineOptions {
    fn from(c: &PlaybackConfig) -> Self {
        Self {
            skip_inactivity: c.skip_inactivity,
            inactivity_threshold_ms: c.inactivity_threshold_ms,
            compressed_gap_ms: c.compressed_gap_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEvent {
    pub event: Event,
    /// Milliseconds since the first event, uncompressed.
    pub raw_relative: u64,
    /// Milliseconds since the first event on the playback clock.
    pub compressed_relative: u64,
    /// Milliseconds cut from the gap right before this event.
    pub skipped: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
    pub total_duration: u64,
}

/// Sort `events` by absolute timestamp (stable) and compute raw and
/// compressed relative times.
///
/// Events are ordered by `ts`. A recording in which no event carries an
/// absolute timestamp is ordered by its relative `t` instead.
pub fn compute_timeline(mut events: Vec<Event>, opts: &TimelineOptions) -> Timeline {
    let use_absolute = events.iter().any(|e| e.ts > 0);
    let key = |e: &Event| if use_absolute { e.ts } else { e.t };
    events.sort_by_key(key);

    let base = events.first().map(key).unwrap_or(0);
    let mut timeline = Timeline {
        events: events
            .into_iter()
            .map(|event| {
                let raw_relative = key(&event).saturating_sub(base);
                TimelineEvent {
                    event,
                    raw_relative,
                    compressed_relative: raw_relative,
                    skipped: 0,
                }
            })
            .collect(),
        total_duration: 0,
    };
    timeline.recompute(opts);
    timeline
}

impl Timeline {
    /// Recompute compressed times from the raw ones, e.g. after the
    /// inactivity toggle changes. Order is untouched.
    pub fn recompute(&mut self, opts: &TimelineOptions) {
        let mut offset = 0u64;
        let mut prev = 0u64;
        for te in &mut self.events {
            let gap = te.raw_relative.saturating_sub(prev);
            te.skipped = 0;
            if opts.skip_inactivity
                && gap > opts.inactivity_threshold_ms
                && gap > opts.compressed_gap_ms
            {
                te.skipped = gap - opts.compressed_gap_ms;
                offset += te.skipped;
            }
            te.compressed_relative = te.raw_relative - offset;
            prev = te.raw_relative;
        }
        self.total_duration = self
            .events
            .last()
            .map(|e| e.compressed_relative)
            .unwrap_or(0);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events whose compressed time is at or before `t`.
    pub fn count_until(&self, t: u64) -> usize {
        self.events.partition_point(|e| e.compressed_relative <= t)
    }

    /// Compressed time corresponding to a raw relative time.
    pub fn compressed_at_raw(&self, raw: u64) -> u64 {
        let idx = self.events.partition_point(|e| e.raw_relative <= raw);
        match idx.checked_sub(1).and_then(|i| self.events.get(i)) {
            Some(e) => e.compressed_relative + (raw - e.raw_relative).min(self.gap_after(idx - 1)),
            None => 0,
        }
    }

    fn gap_after(&self, i: usize) -> u64 {
        match (self.events.get(i), self.events.get(i + 1)) {
            (Some(a), Some(b)) => b.compressed_relative - a.compressed_relative,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EventKind;
    use serde_json::json;

    fn ev(kind: EventKind, ts: u64) -> Event {
        Event::new(kind, 0, ts, json!({}))
    }

    #[test]
    fn test_compresses_long_gap_to_floor() {
        let events = vec![
            ev(EventKind::DomSnapshot, 10_000),
            ev(EventKind::MouseClick, 10_500),
            ev(EventKind::DomMutation, 10_520),
            ev(EventKind::MouseClick, 14_600),
        ];
        let tl = compute_timeline(events, &TimelineOptions::default());
        let compressed: Vec<u64> = tl.events.iter().map(|e| e.compressed_relative).collect();
        assert_eq!(compressed, vec![0, 500, 520, 1520]);
        assert_eq!(tl.events[3].raw_relative, 4600);
        assert_eq!(tl.events[3].skipped, 3080);
        assert_eq!(tl.total_duration, 1520);
        assert_eq!(tl.count_until(1000), 3);
    }

    #[test]
    fn test_sort_is_stable_and_by_timestamp() {
        let mut a = ev(EventKind::MouseMove, 200);
        a.d = json!({"n": 1});
        let mut b = ev(EventKind::MouseMove, 200);
        b.d = json!({"n": 2});
        let first = ev(EventKind::DomSnapshot, 100);
        let tl = compute_timeline(vec![a, b, first], &TimelineOptions::default());
        assert_eq!(tl.events[0].event.e, EventKind::DomSnapshot);
        assert_eq!(tl.events[1].event.d["n"], 1);
        assert_eq!(tl.events[2].event.d["n"], 2);
    }

    #[test]
    fn test_disabled_skip_keeps_raw_times() {
        let events = vec![ev(EventKind::DomSnapshot, 0), ev(EventKind::MouseClick, 60_000)];
        let mut tl = compute_timeline(events, &TimelineOptions::default());
        assert_eq!(tl.total_duration, 1000);

        tl.recompute(&TimelineOptions {
            skip_inactivity: false,
            ..Default::default()
        });
        assert_eq!(tl.total_duration, 60_000);
        assert_eq!(tl.events[1].skipped, 0);
    }

    #[test]
    fn test_compressed_never_exceeds_raw_and_is_monotonic() {
        let stamps = [5u64, 9_000, 9_001, 3, 40_000, 40_000, 41_500, 90_000, 12];
        let events = stamps.iter().map(|&ts| ev(EventKind::Scroll, ts)).collect();
        let tl = compute_timeline(events, &TimelineOptions::default());
        for pair in tl.events.windows(2) {
            assert!(pair[0].compressed_relative <= pair[1].compressed_relative);
            assert!(pair[0].raw_relative <= pair[1].raw_relative);
        }
        for e in &tl.events {
            assert!(e.compressed_relative <= e.raw_relative);
        }
    }

    #[test]
    fn test_relative_times_used_without_absolute() {
        let events = vec![
            Event::new(EventKind::MouseClick, 4600, 0, json!({})),
            Event::new(EventKind::DomSnapshot, 0, 0, json!({})),
        ];
        let tl = compute_timeline(events, &TimelineOptions::default());
        assert_eq!(tl.events[0].event.e, EventKind::DomSnapshot);
        assert_eq!(tl.total_duration, 1000);
    }

    #[test]
    fn test_empty_timeline() {
        let tl = compute_timeline(Vec::new(), &TimelineOptions::default());
        assert!(tl.is_empty());
        assert_eq!(tl.total_duration, 0);
        assert_eq!(tl.compressed_at_raw(500), 0);
    }

    #[test]
    fn test_compressed_at_raw_clamps_inside_skipped_gap() {
        let events = vec![ev(EventKind::DomSnapshot, 0), ev(EventKind::MouseClick, 10_000)];
        let tl = compute_timeline(events, &TimelineOptions::default());
        assert_eq!(tl.compressed_at_raw(400), 400);
        assert_eq!(tl.compressed_at_raw(8_000), 1000);
        assert_eq!(tl.compressed_at_raw(20_000), 1000);
    }
}
