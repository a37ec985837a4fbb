use serde_json::json;

use super::Signal;

/// Performance observations relevant to the web-vitals report. Times are
/// milliseconds relative to navigation start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PerfEntry {
    LargestContentfulPaint { start_time: f64 },
    LayoutShift { value: f64, had_recent_input: bool },
    FirstInput { start_time: f64, processing_start: f64 },
    /// An event-timing entry belonging to a user interaction.
    Interaction { duration: f64 },
    Navigation { response_start: f64, load_event_end: f64 },
}

#[derive(Debug, Clone, Default)]
pub struct VitalsCollector {
    lcp: Option<f64>,
    cls: f64,
    fid: Option<f64>,
    inp: Option<f64>,
    ttfb: Option<f64>,
    load: Option<f64>,
    reported: bool,
}

impl VitalsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: PerfEntry) {
        match entry {
            // the latest candidate wins
            PerfEntry::LargestContentfulPaint { start_time } => self.lcp = Some(start_time),
            PerfEntry::LayoutShift {
                value,
                had_recent_input,
            } => {
                if !had_recent_input {
                    self.cls += value;
                }
            }
            PerfEntry::FirstInput {
                start_time,
                processing_start,
            } => {
                if self.fid.is_none() {
                    self.fid = Some((processing_start - start_time).max(0.0));
                }
            }
            PerfEntry::Interaction { duration } => {
                self.inp = Some(self.inp.map_or(duration, |cur| cur.max(duration)));
            }
            PerfEntry::Navigation {
                response_start,
                load_event_end,
            } => {
                self.ttfb = Some(response_start);
                if load_event_end > 0.0 {
                    self.load = Some(load_event_end);
                }
            }
        }
    }

    pub fn is_reported(&self) -> bool {
        self.reported
    }

    /// The single report. Metrics never observed are `null`.
    pub fn report(&mut self, url: &str) -> Option<Signal> {
        if self.reported {
            return None;
        }
        self.reported = true;
        let ms = |v: Option<f64>| v.map(|v| v.round() as u64);
        Some(Signal::new(
            "web_vitals",
            json!({
                "url": url,
                "lcp": ms(self.lcp),
                "cls": (self.cls * 10_000.0).round() / 10_000.0,
                "fid": ms(self.fid),
                "inp": ms(self.inp),
                "ttfb": ms(self.ttfb),
                "page_load_time": ms(self.load),
            }),
        ))
    }
}
