use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RewindConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub source: SourceConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Recorder behaviour: sampling, consent, masking and detector tuning.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    pub project_id: String,
    /// Probability in `[0, 1]` that a session is recorded. Decided once per session.
    pub sample_rate: f64,
    pub respect_dnt: bool,
    /// When set, recording waits for an explicit consent grant.
    pub require_consent: bool,
    pub mask_all_inputs: bool,
    pub mask_selectors: Vec<String>,
    pub move_throttle_ms: u64,
    pub move_flush_interval_ms: u64,
    pub scroll_throttle_ms: u64,
    pub resize_throttle_ms: u64,
    pub scroll_depth_throttle_ms: u64,
    pub rage_window_ms: u64,
    pub rage_radius_px: f64,
    pub rage_click_count: usize,
    pub dead_click_timeout_ms: u64,
    pub vitals_delay_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            sample_rate: 1.0,
            respect_dnt: false,
            require_consent: false,
            mask_all_inputs: true,
            mask_selectors: Vec::new(),
            move_throttle_ms: 50,
            move_flush_interval_ms: 100,
            scroll_throttle_ms: 100,
            resize_throttle_ms: 200,
            scroll_depth_throttle_ms: 500,
            rage_window_ms: 500,
            rage_radius_px: 30.0,
            rage_click_count: 3,
            dead_click_timeout_ms: 1000,
            vitals_delay_ms: 5000,
        }
    }
}

/// Event shipping: batching and bounded retry.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeliveryConfig {
    pub api_url: String,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000/api/events".to_string(),
            batch_size: 50,
            flush_interval_ms: 5000,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlaybackConfig {
    pub speed: f64,
    pub skip_inactivity: bool,
    pub inactivity_threshold_ms: u64,
    /// Length every skipped gap is compressed down to.
    pub compressed_gap_ms: u64,
    pub frame_interval_ms: u64,
    pub default_viewport_width: f64,
    pub default_viewport_height: f64,
    pub container_padding_px: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            skip_inactivity: true,
            inactivity_threshold_ms: 3000,
            compressed_gap_ms: 1000,
            frame_interval_ms: 16,
            default_viewport_width: 1920.0,
            default_viewport_height: 1080.0,
            container_padding_px: 32.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl RewindConfig {
    /// Load from a TOML file (optional) layered under `REWIND__SECTION__KEY` env vars.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("REWIND").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tracker_constants() {
        let c = RewindConfig::default();
        assert_eq!(c.delivery.batch_size, 50);
        assert_eq!(c.delivery.flush_interval_ms, 5000);
        assert_eq!(c.delivery.max_retries, 3);
        assert_eq!(c.capture.rage_click_count, 3);
        assert_eq!(c.capture.dead_click_timeout_ms, 1000);
        assert_eq!(c.playback.inactivity_threshold_ms, 3000);
        assert!(c.playback.skip_inactivity);
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let c = RewindConfig::load("does-not-exist-rewind.toml").expect("defaults");
        assert_eq!(c.capture.sample_rate, 1.0);
        assert_eq!(c.playback.compressed_gap_ms, 1000);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let dir = std::env::temp_dir().join(format!("rewind-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rewind.toml");
        std::fs::write(&path, "[delivery]\nbatch_size = 10\n\n[capture]\nproject_id = \"shop\"\n")
            .unwrap();

        let c = RewindConfig::load(path.to_str().unwrap()).expect("load");
        assert_eq!(c.delivery.batch_size, 10);
        assert_eq!(c.delivery.max_retries, 3);
        assert_eq!(c.capture.project_id, "shop");
        assert_eq!(c.capture.rage_window_ms, 500);

        std::fs::remove_dir_all(&dir).ok();
    }
}
