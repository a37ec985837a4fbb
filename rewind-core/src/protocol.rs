//! Wire protocol shared by capture and playback.
//!
//! Capture posts [`WireBatch`] bodies; playback receives a
//! [`SessionRecording`] whose stored events may use the long field names
//! (`type`, `timestamp`, `data`) and may carry `data` as embedded JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::mutation::MutationEntry;
use crate::models::session::SessionInfo;
use crate::models::vnode::VirtualNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EventKind {
    SessionStart,
    DomSnapshot,
    DomMutation,
    MouseMove,
    MouseClick,
    Scroll,
    Resize,
    Input,
    PageVisibility,
    RageClick,
    DeadClick,
    JsError,
    Custom,
    Identify,
    Navigation,
}

impl EventKind {
    pub const ALL: [EventKind; 15] = [
        EventKind::SessionStart,
        EventKind::DomSnapshot,
        EventKind::DomMutation,
        EventKind::MouseMove,
        EventKind::MouseClick,
        EventKind::Scroll,
        EventKind::Resize,
        EventKind::Input,
        EventKind::PageVisibility,
        EventKind::RageClick,
        EventKind::DeadClick,
        EventKind::JsError,
        EventKind::Custom,
        EventKind::Identify,
        EventKind::Navigation,
    ];

    pub fn code(self) -> u8 {
        self.into()
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::SessionStart => "Session Start",
            EventKind::DomSnapshot => "DOM Snapshot",
            EventKind::DomMutation => "DOM Mutation",
            EventKind::MouseMove => "Mouse Move",
            EventKind::MouseClick => "Click",
            EventKind::Scroll => "Scroll",
            EventKind::Resize => "Resize",
            EventKind::Input => "Input",
            EventKind::PageVisibility => "Visibility",
            EventKind::RageClick => "Rage Click",
            EventKind::DeadClick => "Dead Click",
            EventKind::JsError => "JS Error",
            EventKind::Custom => "Custom Event",
            EventKind::Identify => "Identify",
            EventKind::Navigation => "Navigation",
        }
    }
}

impl From<EventKind> for u8 {
    fn from(k: EventKind) -> u8 {
        k as u8
    }
}

impl TryFrom<u8> for EventKind {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        EventKind::ALL
            .get(v as usize)
            .copied()
            .ok_or_else(|| format!("unknown event type {}", v))
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Millisecond values arrive as integers, floats or numeric strings.
fn de_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    let ms = match &v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Null => Some(0.0),
        _ => None,
    };
    match ms {
        Some(ms) if ms.is_finite() && ms >= 0.0 => Ok(ms.round() as u64),
        Some(_) => Ok(0),
        None => Err(serde::de::Error::custom(format!("invalid millisecond value {}", v))),
    }
}

/// One captured signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(alias = "type")]
    pub e: EventKind,
    /// Milliseconds since the recorder started.
    #[serde(default, deserialize_with = "de_millis")]
    pub t: u64,
    /// Absolute epoch milliseconds.
    #[serde(default, alias = "timestamp", deserialize_with = "de_millis")]
    pub ts: u64,
    #[serde(default, alias = "data")]
    pub d: Value,
}

impl Event {
    pub fn new(kind: EventKind, t: u64, ts: u64, d: Value) -> Self {
        Self { e: kind, t, ts, d }
    }

    /// Parse an embedded JSON string payload in place. Unparsable strings
    /// stay as the raw value.
    pub fn normalize(&mut self) {
        if let Value::String(s) = &self.d {
            if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                self.d = parsed;
            }
        }
    }

    pub fn payload(&self) -> Result<Payload, serde_json::Error> {
        let d = self.d.clone();
        Ok(match self.e {
            EventKind::SessionStart => Payload::SessionStart(serde_json::from_value(d)?),
            EventKind::DomSnapshot => Payload::Snapshot(serde_json::from_value(d)?),
            EventKind::DomMutation => Payload::Mutation(MutationData::from_value(&self.d)),
            EventKind::MouseMove => Payload::MouseMove(serde_json::from_value(d)?),
            EventKind::MouseClick => Payload::Click(serde_json::from_value(d)?),
            EventKind::Scroll => Payload::Scroll(serde_json::from_value(d)?),
            EventKind::Resize => Payload::Resize(serde_json::from_value(d)?),
            EventKind::Input => Payload::Input(serde_json::from_value(d)?),
            EventKind::PageVisibility => Payload::Visibility(serde_json::from_value(d)?),
            EventKind::RageClick => Payload::RageClick(serde_json::from_value(d)?),
            EventKind::DeadClick => Payload::DeadClick(serde_json::from_value(d)?),
            EventKind::JsError => Payload::Error(serde_json::from_value(d)?),
            EventKind::Custom => Payload::Custom(serde_json::from_value(d)?),
            EventKind::Identify => Payload::Identify(serde_json::from_value(d)?),
            EventKind::Navigation => Payload::Navigation(serde_json::from_value(d)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    SessionStart(SessionStartData),
    Snapshot(SnapshotData),
    Mutation(MutationData),
    MouseMove(PointerData),
    Click(ClickData),
    Scroll(ScrollData),
    Resize(ResizeData),
    Input(InputData),
    Visibility(VisibilityData),
    RageClick(RageClickData),
    DeadClick(DeadClickData),
    Error(ErrorData),
    Custom(CustomData),
    Identify(IdentifyData),
    Navigation(NavigationData),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    #[serde(default)]
    pub w: f64,
    #[serde(default)]
    pub h: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionStartData {
    pub url: String,
    pub referrer: String,
    pub screen: Size,
    pub viewport: Size,
    pub browser: String,
    pub os: String,
    pub device: String,
    pub language: String,
    pub utm: BTreeMap<String, String>,
    pub pixel_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData {
    pub dom: Option<VirtualNode>,
}

/// Mutation payload. Stored batches are `{mutations: [...]}`, `{changes: [...]}`
/// or a bare array; entries that do not parse are counted and dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationData {
    pub mutations: Vec<MutationEntry>,
    #[serde(skip)]
    pub malformed: usize,
}

impl MutationData {
    pub fn new(mutations: Vec<MutationEntry>) -> Self {
        Self {
            mutations,
            malformed: 0,
        }
    }

    pub fn from_value(v: &Value) -> Self {
        let list: Vec<Value> = match v {
            Value::Array(items) => items.clone(),
            Value::Object(map) => match map.get("mutations").or_else(|| map.get("changes")) {
                Some(Value::Array(items)) => items.clone(),
                _ => vec![v.clone()],
            },
            _ => Vec::new(),
        };
        let mut out = Self::default();
        for item in list {
            match serde_json::from_value::<MutationEntry>(item) {
                Ok(m) => out.mutations.push(m),
                Err(_) => out.malformed += 1,
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerData {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickData {
    pub x: f64,
    pub y: f64,
    pub selector: String,
    pub text: String,
    pub tag: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollData {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResizeData {
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputData {
    pub selector: String,
    pub masked: bool,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityData {
    pub state: String,
}

impl VisibilityData {
    pub fn is_hidden(&self) -> bool {
        self.state == "hidden"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RageClickData {
    pub x: f64,
    pub y: f64,
    pub clicks: usize,
    pub selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadClickData {
    pub x: f64,
    pub y: f64,
    pub selector: String,
    pub tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorData {
    pub message: String,
    pub source: String,
    pub line: u32,
    pub col: u32,
    pub stack: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomData {
    pub name: String,
    pub props: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IdentifyData {
    pub user_id: Option<String>,
    pub traits: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationData {
    pub from: String,
    pub to: String,
}

/// Body of one delivery POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireBatch {
    pub sid: String,
    pub pid: String,
    pub uid: Option<String>,
    pub ts: u64,
    pub events: Vec<Event>,
}

/// A stored recording as served for playback.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionRecording {
    pub session: SessionInfo,
    pub events: Vec<Event>,
}

impl SessionRecording {
    /// Parse `{session, events}`, normalizing each event. Events that do not
    /// parse at all (unknown type code, missing type) are skipped.
    pub fn from_value(v: Value) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            session: Value,
            #[serde(default)]
            events: Vec<Value>,
        }

        let raw: Raw = serde_json::from_value(v)?;
        let session = match raw.session {
            Value::Null => SessionInfo::default(),
            other => serde_json::from_value(other)?,
        };
        let total = raw.events.len();
        let mut events = Vec::with_capacity(total);
        for item in raw.events {
            match serde_json::from_value::<Event>(item) {
                Ok(mut e) => {
                    e.normalize();
                    events.push(e);
                }
                Err(e) => tracing::debug!(error = %e, "skipping unreadable stored event"),
            }
        }
        if events.len() < total {
            tracing::warn!(
                session = %session.id,
                skipped = total - events.len(),
                "recording contained unreadable events"
            );
        }
        Ok(Self { session, events })
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_str(s)?)
    }
}
