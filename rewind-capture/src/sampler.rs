//! Rate limiting for high-frequency signals.

/// Pointer-move sampler: emits at most once per interval, remembers the
/// latest suppressed position so a periodic flush can emit it later.
#[derive(Debug, Clone)]
pub struct MoveSampler {
    interval: f64,
    last: Option<f64>,
    pending: Option<(f64, f64)>,
}

impl MoveSampler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: interval_ms as f64,
            last: None,
            pending: None,
        }
    }

    pub fn offer(&mut self, now: f64, x: f64, y: f64) -> Option<(f64, f64)> {
        match self.last {
            Some(last) if now - last < self.interval => {
                self.pending = Some((x, y));
                None
            }
            _ => {
                self.last = Some(now);
                self.pending = None;
                Some((x, y))
            }
        }
    }

    /// Take the trailing sample, if any.
    pub fn flush(&mut self, now: f64) -> Option<(f64, f64)> {
        let p = self.pending.take()?;
        self.last = Some(now);
        Some(p)
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.pending = None;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Throttled<T> {
    /// Emit immediately.
    Emit(T),
    /// Held back; arm a timer for the given time.
    Arm(f64),
    /// Held back; a timer is already armed.
    Coalesced,
}

/// Leading-edge throttle with a trailing emission of the latest value.
#[derive(Debug, Clone)]
pub struct Throttle<T> {
    wait: f64,
    last: Option<f64>,
    pending: Option<T>,
    armed: bool,
}

impl<T> Throttle<T> {
    pub fn new(wait_ms: u64) -> Self {
        Self {
            wait: wait_ms as f64,
            last: None,
            pending: None,
            armed: false,
        }
    }

    pub fn offer(&mut self, now: f64, value: T) -> Throttled<T> {
        match self.last {
            Some(last) if now - last < self.wait => {
                self.pending = Some(value);
                if self.armed {
                    Throttled::Coalesced
                } else {
                    self.armed = true;
                    Throttled::Arm(last + self.wait)
                }
            }
            _ => {
                self.last = Some(now);
                self.pending = None;
                self.armed = false;
                Throttled::Emit(value)
            }
        }
    }

    /// Called when an armed timer fires. A timer armed before the latest
    /// leading emit fires early and releases nothing.
    pub fn fire(&mut self, now: f64) -> Option<T> {
        if self.last.is_some_and(|last| now - last < self.wait) {
            return None;
        }
        self.armed = false;
        let v = self.pending.take()?;
        self.last = Some(now);
        Some(v)
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.pending = None;
        self.armed = false;
    }
}
