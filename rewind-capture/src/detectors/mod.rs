//! Heuristic detectors and funnel trackers.
//!
//! Each detector is plain state fed by the recorder; none of them touch the
//! host or the outbox directly.

pub mod cart;
pub mod dead;
pub mod forms;
pub mod rage;
pub mod scroll_depth;
pub mod vitals;

use serde_json::Value;

/// A named custom event produced by a funnel tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub name: &'static str,
    pub props: Value,
}

impl Signal {
    pub fn new(name: &'static str, props: Value) -> Self {
        Self { name, props }
    }
}
