//! Session identity, sampling and consent persistence.

use serde::Serialize;

use crate::host::Host;

pub const SESSION_ID_KEY: &str = "rewind_sid";
pub const SESSION_START_KEY: &str = "rewind_start";
pub const SAMPLED_KEY: &str = "rewind_sampled";
pub const CONSENT_KEY: &str = "rewind_consent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    /// Epoch milliseconds of the first page load in this session.
    pub started_at: u64,
}

impl Session {
    /// Reuse the id and start time stored for this tab, or start a new session.
    pub fn resume_or_start<H: Host + ?Sized>(host: &mut H) -> Self {
        let now = host.epoch_ms();
        let store = host.session_store();
        let existing = store.get(SESSION_ID_KEY);
        let start = store
            .get(SESSION_START_KEY)
            .and_then(|s| s.parse::<u64>().ok());
        if let (Some(id), Some(started_at)) = (existing, start) {
            if !id.is_empty() {
                return Self { id, started_at };
            }
        }

        let session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
        };
        store.set(SESSION_ID_KEY, &session.id);
        store.set(SESSION_START_KEY, &session.started_at.to_string());
        tracing::debug!(session = %session.id, "started new session");
        session
    }

    pub fn forget<H: Host + ?Sized>(host: &mut H) {
        let store = host.session_store();
        store.remove(SESSION_ID_KEY);
        store.remove(SESSION_START_KEY);
    }
}

/// Decide once per session whether it is recorded. Rates of 1.0 or more
/// always record and store nothing.
pub fn sampling_decision<H: Host + ?Sized>(host: &mut H, rate: f64) -> bool {
    if rate >= 1.0 {
        return true;
    }
    if let Some(stored) = host.session_store().get(SAMPLED_KEY) {
        return stored == "1";
    }
    let sampled = host.random_unit() < rate;
    host.session_store()
        .set(SAMPLED_KEY, if sampled { "1" } else { "0" });
    sampled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    Unknown,
    Granted,
    Revoked,
}

impl Consent {
    pub fn load<H: Host + ?Sized>(host: &mut H) -> Self {
        match host.persistent_store().get(CONSENT_KEY).as_deref() {
            Some("granted") => Consent::Granted,
            Some("revoked") => Consent::Revoked,
            _ => Consent::Unknown,
        }
    }

    pub fn store<H: Host + ?Sized>(self, host: &mut H) {
        let store = host.persistent_store();
        match self {
            Consent::Granted => store.set(CONSENT_KEY, "granted"),
            Consent::Revoked => store.set(CONSENT_KEY, "revoked"),
            Consent::Unknown => store.remove(CONSENT_KEY),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAgentInfo {
    pub browser: &'static str,
    pub os: &'static str,
    pub device: &'static str,
}

pub fn parse_user_agent(ua: &str) -> UserAgentInfo {
    let browser = [
        ("Edg/", "Edge"),
        ("OPR/", "Opera"),
        ("Firefox/", "Firefox"),
        ("Trident", "IE"),
        ("Chrome/", "Chrome"),
        ("Safari/", "Safari"),
    ]
    .iter()
    .find(|(needle, _)| ua.contains(needle))
    .map(|(_, name)| *name)
    .unwrap_or("Unknown");

    let os = [
        ("Windows", "Windows"),
        ("Macintosh", "macOS"),
        ("Android", "Android"),
        ("iPhone", "iOS"),
        ("iPad", "iOS"),
        ("CrOS", "ChromeOS"),
        ("Linux", "Linux"),
    ]
    .iter()
    .find(|(needle, _)| ua.contains(needle))
    .map(|(_, name)| *name)
    .unwrap_or("Unknown");

    let lower = ua.to_ascii_lowercase();
    let device = if lower.contains("mobi") || lower.contains("iphone") || lower.contains("ipod") {
        "mobile"
    } else if lower.contains("ipad") || lower.contains("android") || lower.contains("tablet") {
        "tablet"
    } else {
        "desktop"
    };

    UserAgentInfo {
        browser,
        os,
        device,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HeadlessHost;

    #[test]
    fn test_session_survives_reload() {
        let mut host = HeadlessHost::new("https://shop.test/");
        let first = Session::resume_or_start(&mut host);
        let mut reloaded = host.reload();
        reloaded.advance_clock(10_000.0);
        let second = Session::resume_or_start(&mut reloaded);
        assert_eq!(first, second);
    }

    #[test]
    fn test_sampling_is_decided_once() {
        let mut host = HeadlessHost::new("https://shop.test/");
        host.set_random(0.9);
        assert!(!sampling_decision(&mut host, 0.5));
        host.set_random(0.1);
        assert!(!sampling_decision(&mut host, 0.5));
        assert!(sampling_decision(&mut host, 1.0));
    }

    #[test]
    fn test_consent_round_trip() {
        let mut host = HeadlessHost::new("https://shop.test/");
        assert_eq!(Consent::load(&mut host), Consent::Unknown);
        Consent::Granted.store(&mut host);
        assert_eq!(Consent::load(&mut host), Consent::Granted);
        Consent::Revoked.store(&mut host);
        assert_eq!(Consent::load(&mut host), Consent::Revoked);
    }

    #[test]
    fn test_user_agent_parsing() {
        let edge = parse_user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36 Edg/120.0",
        );
        assert_eq!(edge.browser, "Edge");
        assert_eq!(edge.os, "Windows");
        assert_eq!(edge.device, "desktop");

        let phone = parse_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148 Safari/604.1",
        );
        assert_eq!(phone.browser, "Safari");
        assert_eq!(phone.os, "iOS");
        assert_eq!(phone.device, "mobile");

        let tablet = parse_user_agent("Mozilla/5.0 (Linux; Android 13; SM-X700) Chrome/120.0 Safari/537.36");
        assert_eq!(tablet.os, "Android");
        assert_eq!(tablet.device, "tablet");
    }
}
