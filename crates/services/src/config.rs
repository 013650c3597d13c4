use std::env;

use chrono::Duration;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api/v1";
const DEFAULT_SCORM_ORIGIN: &str = "scorm.com";
const DEFAULT_PERSIST_DELAY_MS: i64 = 1_000;
const DEFAULT_CONFIRM_DELAY_MS: i64 = 5_000;

/// Backend location, trusted runtime host and debounce windows.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub access_token: Option<String>,
    /// Host (or parent domain) the embedded runtime posts from.
    pub scorm_origin: String,
    pub persist_delay: Duration,
    pub confirm_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            access_token: None,
            scorm_origin: DEFAULT_SCORM_ORIGIN.into(),
            persist_delay: Duration::milliseconds(DEFAULT_PERSIST_DELAY_MS),
            confirm_delay: Duration::milliseconds(DEFAULT_CONFIRM_DELAY_MS),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let api_base_url =
            env::var("PORTAL_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.into());
        let access_token = env::var("PORTAL_ACCESS_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        let scorm_origin =
            env::var("PORTAL_SCORM_ORIGIN").unwrap_or_else(|_| DEFAULT_SCORM_ORIGIN.into());
        let persist_delay = delay_from_env("PORTAL_PERSIST_DELAY_MS", DEFAULT_PERSIST_DELAY_MS);
        let confirm_delay = delay_from_env("PORTAL_CONFIRM_DELAY_MS", DEFAULT_CONFIRM_DELAY_MS);
        Self {
            api_base_url,
            access_token,
            scorm_origin,
            persist_delay,
            confirm_delay,
        }
    }
}

fn delay_from_env(key: &str, default_ms: i64) -> Duration {
    let ms = env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|ms| *ms >= 0)
        .unwrap_or(default_ms);
    Duration::milliseconds(ms)
}
