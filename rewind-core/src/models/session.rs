use serde::{Deserialize, Serialize};

/// Session metadata as returned alongside a recording. Unknown columns are
/// kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInfo {
    pub id: String,
    pub project_id: Option<String>,
    pub visitor_id: Option<String>,
    pub user_id: Option<String>,
    pub started_at: Option<String>,
    pub duration: Option<i64>,
    pub url: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionInfo {
    /// Recorded viewport, when both dimensions are known and non-zero.
    pub fn viewport(&self) -> Option<(f64, f64)> {
        match (self.viewport_width, self.viewport_height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w as f64, h as f64)),
            _ => None,
        }
    }
}
