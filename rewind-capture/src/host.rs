//! Capabilities the embedding environment provides to the recorder.
//!
//! A browser binding implements [`Host`] over the real page; tests and
//! simulations use [`HeadlessHost`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rewind_core::NodeKey;

/// Observation channels the recorder subscribes to while recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hook {
    Mutations,
    Pointer,
    Click,
    Input,
    Focus,
    Scroll,
    Resize,
    Visibility,
    Unload,
    Errors,
    Navigation,
    Performance,
}

impl Hook {
    pub const ALL: [Hook; 12] = [
        Hook::Mutations,
        Hook::Pointer,
        Hook::Click,
        Hook::Input,
        Hook::Focus,
        Hook::Scroll,
        Hook::Resize,
        Hook::Visibility,
        Hook::Unload,
        Hook::Errors,
        Hook::Navigation,
        Hook::Performance,
    ];
}

/// A native change record, as delivered by a mutation observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    ChildList {
        target: NodeKey,
        added: Vec<NodeKey>,
        removed: Vec<NodeKey>,
        previous_sibling: Option<NodeKey>,
        next_sibling: Option<NodeKey>,
    },
    Attributes {
        target: NodeKey,
        name: String,
    },
    CharacterData {
        target: NodeKey,
    },
}

impl MutationRecord {
    pub fn target(&self) -> NodeKey {
        match self {
            MutationRecord::ChildList { target, .. }
            | MutationRecord::Attributes { target, .. }
            | MutationRecord::CharacterData { target } => *target,
        }
    }
}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

pub trait Host {
    /// Monotonic milliseconds since page start.
    fn now_ms(&self) -> f64;
    /// Wall clock, epoch milliseconds.
    fn epoch_ms(&self) -> u64;
    fn url(&self) -> String;
    fn referrer(&self) -> String;
    fn viewport(&self) -> (u32, u32);
    fn screen(&self) -> (u32, u32);
    fn scroll_position(&self) -> (f64, f64);
    fn document_height(&self) -> f64;
    fn user_agent(&self) -> String;
    fn language(&self) -> String;

    fn pixel_ratio(&self) -> f64 {
        1.0
    }

    fn do_not_track(&self) -> bool {
        false
    }

    /// Uniform sample in `[0, 1)`.
    fn random_unit(&self) -> f64 {
        uniform_sample()
    }

    /// Tab-scoped storage (survives same-tab navigations).
    fn session_store(&mut self) -> &mut dyn KeyValueStore;
    /// Origin-scoped storage (survives the tab).
    fn persistent_store(&mut self) -> &mut dyn KeyValueStore;

    fn attach(&mut self, hook: Hook);
    fn detach(&mut self, hook: Hook);

    fn utm_params(&self) -> BTreeMap<String, String> {
        parse_utm(&self.url())
    }
}

/// Uniform sample in `[0, 1)` drawn from a v4 uuid's random bits.
pub fn uniform_sample() -> f64 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[..8]);
    (u64::from_le_bytes(word) >> 11) as f64 / (1u64 << 53) as f64
}

pub fn parse_utm(url: &str) -> BTreeMap<String, String> {
    match reqwest::Url::parse(url) {
        Ok(u) => u
            .query_pairs()
            .filter(|(k, _)| k.starts_with("utm_"))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        Err(_) => BTreeMap::new(),
    }
}

/// In-memory host with a manually driven clock.
#[derive(Debug, Clone)]
pub struct HeadlessHost {
    now: f64,
    epoch_start: u64,
    url: String,
    referrer: String,
    viewport: (u32, u32),
    screen: (u32, u32),
    scroll: (f64, f64),
    document_height: f64,
    user_agent: String,
    language: String,
    dnt: bool,
    random: Option<f64>,
    session: MemoryStore,
    persistent: MemoryStore,
    attached: BTreeSet<Hook>,
}

impl HeadlessHost {
    pub fn new(url: &str) -> Self {
        Self {
            now: 0.0,
            epoch_start: 1_700_000_000_000,
            url: url.to_string(),
            referrer: String::new(),
            viewport: (1280, 720),
            screen: (1920, 1080),
            scroll: (0.0, 0.0),
            document_height: 720.0,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
            language: "en-US".to_string(),
            dnt: false,
            random: None,
            session: MemoryStore::default(),
            persistent: MemoryStore::default(),
            attached: BTreeSet::new(),
        }
    }

    pub fn advance_clock(&mut self, ms: f64) {
        self.now += ms.max(0.0);
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    pub fn set_referrer(&mut self, referrer: &str) {
        self.referrer = referrer.to_string();
    }

    pub fn set_viewport(&mut self, w: u32, h: u32) {
        self.viewport = (w, h);
    }

    pub fn set_scroll(&mut self, x: f64, y: f64) {
        self.scroll = (x, y);
    }

    pub fn set_document_height(&mut self, h: f64) {
        self.document_height = h;
    }

    pub fn set_user_agent(&mut self, ua: &str) {
        self.user_agent = ua.to_string();
    }

    pub fn set_do_not_track(&mut self, dnt: bool) {
        self.dnt = dnt;
    }

    /// Pin the sampling coin flip.
    pub fn set_random(&mut self, value: f64) {
        self.random = Some(value);
    }

    pub fn is_attached(&self, hook: Hook) -> bool {
        self.attached.contains(&hook)
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    /// Simulate a page reload in the same tab: session storage and
    /// persistent storage survive, the clock and hooks do not.
    pub fn reload(&self) -> Self {
        let mut next = Self::new(&self.url);
        next.epoch_start = self.epoch_ms();
        next.session = self.session.clone();
        next.persistent = self.persistent.clone();
        next.random = self.random;
        next.dnt = self.dnt;
        next
    }
}

impl Host for HeadlessHost {
    fn now_ms(&self) -> f64 {
        self.now
    }

    fn epoch_ms(&self) -> u64 {
        self.epoch_start + self.now.round() as u64
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn referrer(&self) -> String {
        self.referrer.clone()
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn screen(&self) -> (u32, u32) {
        self.screen
    }

    fn scroll_position(&self) -> (f64, f64) {
        self.scroll
    }

    fn document_height(&self) -> f64 {
        self.document_height
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    fn language(&self) -> String {
        self.language.clone()
    }

    fn do_not_track(&self) -> bool {
        self.dnt
    }

    fn random_unit(&self) -> f64 {
        self.random.unwrap_or_else(uniform_sample)
    }

    fn session_store(&mut self) -> &mut dyn KeyValueStore {
        &mut self.session
    }

    fn persistent_store(&mut self) -> &mut dyn KeyValueStore {
        &mut self.persistent
    }

    fn attach(&mut self, hook: Hook) {
        self.attached.insert(hook);
    }

    fn detach(&mut self, hook: Hook) {
        self.attached.remove(&hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utm_params_are_decoded() {
        let utm = parse_utm("https://shop.test/p?utm_source=news%20letter&x=1&utm_medium=email");
        assert_eq!(utm.len(), 2);
        assert_eq!(utm["utm_source"], "news letter");
        assert!(parse_utm("not a url").is_empty());
    }

    #[test]
    fn test_reload_keeps_storage_only() {
        let mut host = HeadlessHost::new("https://shop.test/");
        host.session_store().set("k", "v");
        host.attach(Hook::Click);
        host.advance_clock(500.0);

        let mut next = host.reload();
        assert_eq!(next.session_store().get("k").as_deref(), Some("v"));
        assert_eq!(next.attached_count(), 0);
        assert_eq!(next.now_ms(), 0.0);
    }

    #[test]
    fn test_default_random_unit_in_range() {
        let host = HeadlessHost::new("https://shop.test/");
        for _ in 0..32 {
            let r = host.random_unit();
            assert!((0.0..1.0).contains(&r));
        }
    }
}
