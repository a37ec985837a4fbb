use std::collections::BTreeSet;

use serde_json::json;

use super::Signal;

/// Running maximum scroll depth and the 10% zones reached.
#[derive(Debug, Clone, Default)]
pub struct ScrollDepthTracker {
    max_percent: f64,
    zones: BTreeSet<u8>,
    reported: bool,
}

impl ScrollDepthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current position. A page no taller than the viewport
    /// counts as fully seen.
    pub fn update(&mut self, scroll_top: f64, viewport_height: f64, document_height: f64) {
        let percent = if document_height <= 0.0 || document_height <= viewport_height {
            100.0
        } else {
            ((scroll_top.max(0.0) + viewport_height) / document_height * 100.0).clamp(0.0, 100.0)
        };
        if percent > self.max_percent {
            self.max_percent = percent;
        }
        for zone in (10..=100u8).step_by(10) {
            if percent >= zone as f64 {
                self.zones.insert(zone);
            }
        }
    }

    pub fn max_percent(&self) -> f64 {
        self.max_percent
    }

    pub fn zones(&self) -> impl Iterator<Item = u8> + '_ {
        self.zones.iter().copied()
    }

    /// The one-per-page report. Later calls yield nothing.
    pub fn report(&mut self, url: &str, time_on_page_ms: u64) -> Option<Signal> {
        if self.reported {
            return None;
        }
        self.reported = true;
        Some(Signal::new(
            "scroll_depth",
            json!({
                "url": url,
                "max_depth_percent": self.max_percent.round() as u64,
                "time_on_page_ms": time_on_page_ms,
                "zones_seen": self.zones.iter().collect::<Vec<_>>(),
            }),
        ))
    }
}
