use rewind_core::protocol::DeadClickData;

#[derive(Debug, Clone)]
struct PendingClick {
    id: u64,
    url: String,
    dom_changed: bool,
    data: DeadClickData,
}

/// Clicks waiting to see whether they caused a navigation or a DOM change.
#[derive(Debug, Clone, Default)]
pub struct DeadClickDetector {
    next_id: u64,
    pending: Vec<PendingClick>,
}

impl DeadClickDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a click made while at `url`. Returns the id to pass to [`fire`](Self::fire).
    pub fn arm(&mut self, url: String, data: DeadClickData) -> u64 {
        self.next_id += 1;
        self.pending.push(PendingClick {
            id: self.next_id,
            url,
            dom_changed: false,
            data,
        });
        self.next_id
    }

    /// Any DOM change counts for every click still waiting.
    pub fn on_mutation(&mut self) {
        for p in &mut self.pending {
            p.dom_changed = true;
        }
    }

    /// Resolve a click whose timeout elapsed. Yields the payload when
    /// nothing happened.
    pub fn fire(&mut self, id: u64, current_url: &str) -> Option<DeadClickData> {
        let pos = self.pending.iter().position(|p| p.id == id)?;
        let p = self.pending.remove(pos);
        if p.dom_changed || p.url != current_url {
            return None;
        }
        Some(p.data)
    }

    pub fn cancel_all(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
