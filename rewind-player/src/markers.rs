//! Timeline markers and the event-list filter.

use std::collections::BTreeSet;

use rewind_core::{EventKind, Payload, Timeline};

/// Kinds that get a marker on the timeline.
pub const MARKER_KINDS: [EventKind; 5] = [
    EventKind::MouseClick,
    EventKind::RageClick,
    EventKind::JsError,
    EventKind::Custom,
    EventKind::Navigation,
];

/// Kinds hidden from the default event list.
pub const NOISY_KINDS: [EventKind; 3] = [
    EventKind::MouseMove,
    EventKind::DomMutation,
    EventKind::Scroll,
];

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Position in the timeline's event list.
    pub index: usize,
    /// Compressed playback time.
    pub at: u64,
    pub kind: EventKind,
    pub label: String,
}

pub fn markers(timeline: &Timeline) -> Vec<Marker> {
    timeline
        .events
        .iter()
        .enumerate()
        .filter(|(_, te)| MARKER_KINDS.contains(&te.event.e))
        .map(|(index, te)| Marker {
            index,
            at: te.compressed_relative,
            kind: te.event.e,
            label: label(te.event.e, te.event.payload().ok()),
        })
        .collect()
}

fn label(kind: EventKind, payload: Option<Payload>) -> String {
    match payload {
        Some(Payload::Click(c)) if !c.selector.is_empty() => format!("Click on {}", c.selector),
        Some(Payload::RageClick(r)) if !r.selector.is_empty() => {
            format!("Rage click ({}x) on {}", r.clicks, r.selector)
        }
        Some(Payload::RageClick(r)) => format!("Rage click ({}x)", r.clicks),
        Some(Payload::Error(e)) => format!("Error: {}", e.message),
        Some(Payload::Custom(c)) => c.name,
        Some(Payload::Navigation(n)) => format!("Navigated to {}", n.to),
        _ => kind.name().to_string(),
    }
}

/// Which event kinds the event list shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    kinds: BTreeSet<EventKind>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            kinds: EventKind::ALL
                .into_iter()
                .filter(|k| !NOISY_KINDS.contains(k))
                .collect(),
        }
    }
}

impl EventFilter {
    pub fn all() -> Self {
        Self {
            kinds: EventKind::ALL.into_iter().collect(),
        }
    }

    pub fn only(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn allows(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Indices of the timeline events that pass.
    pub fn apply(&self, timeline: &Timeline) -> Vec<usize> {
        timeline
            .events
            .iter()
            .enumerate()
            .filter(|(_, te)| self.allows(te.event.e))
            .map(|(i, _)| i)
            .collect()
    }
}
