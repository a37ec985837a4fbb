//! Cosmetic playback output and coordinate mapping.
//!
//! Nothing here holds replay state. The engine calls the overlay while it
//! applies events during forward playback and never during a silent seek.

/// Presentation callbacks. Every method defaults to doing nothing.
pub trait Overlay: Send {
    /// Cursor position in display pixels.
    fn cursor_moved(&mut self, _x: f64, _y: f64) {}

    fn click(&mut self, _x: f64, _y: f64) {}

    fn rage_click(&mut self, _x: f64, _y: f64, _clicks: usize) {}

    fn page_transition(&mut self, _url: &str) {}

    /// A compressed gap was just crossed.
    fn skipped(&mut self, _ms: u64) {}

    fn progress(&mut self, _elapsed_ms: u64, _total_ms: u64) {}

    fn viewport_scaled(&mut self, _scale: f64) {}

    fn identity(&mut self, _label: &str) {}

    fn input_echo(&mut self, _selector: &str, _value: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOverlay;

impl Overlay for NoopOverlay {}

/// Overlay that reports through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogOverlay {
    /// Last position; the trail is drawn from here.
    last_cursor: Option<(f64, f64)>,
}

impl LogOverlay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Overlay for LogOverlay {
    fn cursor_moved(&mut self, x: f64, y: f64) {
        match self.last_cursor.replace((x, y)) {
            Some((fx, fy)) => tracing::trace!(from_x = fx, from_y = fy, x, y, "cursor"),
            None => tracing::trace!(x, y, "cursor"),
        }
    }

    fn click(&mut self, x: f64, y: f64) {
        tracing::info!(x, y, "click");
    }

    fn rage_click(&mut self, x: f64, y: f64, clicks: usize) {
        tracing::warn!(x, y, clicks, "rage click");
    }

    fn page_transition(&mut self, url: &str) {
        tracing::info!(url, "navigated");
    }

    fn skipped(&mut self, ms: u64) {
        tracing::info!(skipped_ms = ms, "skipping inactivity");
    }

    fn progress(&mut self, elapsed_ms: u64, total_ms: u64) {
        tracing::trace!(elapsed_ms, total_ms, "progress");
    }

    fn viewport_scaled(&mut self, scale: f64) {
        tracing::debug!(scale, "viewport scaled");
    }

    fn identity(&mut self, label: &str) {
        tracing::info!(user = label, "identified");
    }

    fn input_echo(&mut self, selector: &str, value: &str) {
        tracing::info!(selector, value, "input");
    }
}

/// Recorded viewport versus the space available to display it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub recorded: (f64, f64),
    pub available: Option<(f64, f64)>,
    pub padding: f64,
}

impl Viewport {
    pub fn new(recorded: (f64, f64), padding: f64) -> Self {
        Self {
            recorded,
            available: None,
            padding,
        }
    }

    /// `min(available_w / recorded_w, available_h / recorded_h, 1)`, after
    /// padding. Never upscales.
    pub fn scale(&self) -> f64 {
        let (rw, rh) = self.recorded;
        let Some((aw, ah)) = self.available else {
            return 1.0;
        };
        if rw <= 0.0 || rh <= 0.0 {
            return 1.0;
        }
        let aw = (aw - 2.0 * self.padding).max(0.0);
        let ah = (ah - 2.0 * self.padding).max(0.0);
        (aw / rw).min(ah / rh).min(1.0)
    }

    /// Recorded pixels to display pixels.
    pub fn map(&self, x: f64, y: f64) -> (f64, f64) {
        let s = self.scale();
        (x * s, y * s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_never_upscales() {
        let mut v = Viewport::new((1920.0, 1080.0), 32.0);
        assert_eq!(v.scale(), 1.0);
        v.available = Some((4000.0, 4000.0));
        assert_eq!(v.scale(), 1.0);
        v.available = Some((1024.0, 1144.0));
        assert_eq!(v.scale(), 0.5);
        assert_eq!(v.map(100.0, 50.0), (50.0, 25.0));
    }

    #[test]
    fn test_height_bound_scale() {
        let mut v = Viewport::new((1000.0, 1000.0), 0.0);
        v.available = Some((800.0, 400.0));
        assert_eq!(v.scale(), 0.4);
    }
}
