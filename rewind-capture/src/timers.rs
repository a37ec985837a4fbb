//! Timer queue owned by the recorder and driven by the host's event loop.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Entry<K> {
    due: f64,
    id: TimerId,
    kind: K,
}

#[derive(Debug, Clone)]
pub struct TimerQueue<K> {
    next_id: u64,
    entries: Vec<Entry<K>>,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: Vec::new(),
        }
    }
}

impl<K> TimerQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: f64, kind: K) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { due, id, kind });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> Option<K> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.swap_remove(pos).kind)
    }

    pub fn cancel_where(&mut self, mut pred: impl FnMut(&K) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !pred(&e.kind));
        before - self.entries.len()
    }

    pub fn contains(&self, mut pred: impl FnMut(&K) -> bool) -> bool {
        self.entries.iter().any(|e| pred(&e.kind))
    }

    /// Remove and return the earliest timer due at `now`. Ties fire in
    /// scheduling order.
    pub fn pop_due(&mut self, now: f64) -> Option<(f64, K)> {
        let pos = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due <= now)
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)))
            .map(|(i, _)| i)?;
        let e = self.entries.swap_remove(pos);
        Some((e.due, e.kind))
    }

    pub fn next_due(&self) -> Option<f64> {
        self.entries.iter().map(|e| e.due).min_by(|a, b| a.total_cmp(b))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
