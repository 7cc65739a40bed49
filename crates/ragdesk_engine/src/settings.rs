use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1/";
pub const MIN_TOP_K: u8 = 1;
pub const MAX_TOP_K: u8 = 20;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{var} is not a valid url: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Connection and request settings for the backend client.
///
/// No overall request timeout is applied; a hung request only delays the
/// result it belongs to.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: Url,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub principals: Vec<String>,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub top_k: u8,
    pub state_dir: PathBuf,
}

impl ClientSettings {
    /// Default settings against `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            access_token: None,
            user_id: None,
            principals: Vec::new(),
            poll_interval: Duration::from_millis(3000),
            connect_timeout: Duration::from_secs(10),
            top_k: 5,
            state_dir: PathBuf::from("./.ragdesk"),
        }
    }

    /// Reads settings from `RAGDESK_*` environment variables, falling back to
    /// defaults for anything unset or blank.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientSettings::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let raw_url = get("RAGDESK_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&raw_url).map_err(|source| SettingsError::InvalidUrl {
            var: "RAGDESK_API_URL",
            source,
        })?;
        let mut settings = Self::new(base_url);

        settings.access_token = get("RAGDESK_ACCESS_TOKEN");
        settings.user_id = get("RAGDESK_USER_ID");
        if let Some(raw) = get("RAGDESK_PRINCIPALS") {
            settings.principals = raw
                .split(',')
                .map(str::trim)
                .filter(|principal| !principal.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }
        if let Some(raw) = get("RAGDESK_POLL_INTERVAL_MS") {
            let millis = parse_positive("RAGDESK_POLL_INTERVAL_MS", &raw)?;
            settings.poll_interval = Duration::from_millis(millis);
        }
        if let Some(raw) = get("RAGDESK_TOP_K") {
            let top_k = parse_positive("RAGDESK_TOP_K", &raw)?;
            settings.top_k = top_k.clamp(MIN_TOP_K as u64, MAX_TOP_K as u64) as u8;
        }
        if let Some(raw) = get("RAGDESK_STATE_DIR") {
            settings.state_dir = PathBuf::from(raw);
        }
        Ok(settings)
    }

    pub fn clamped_top_k(&self) -> u8 {
        self.top_k.clamp(MIN_TOP_K, MAX_TOP_K)
    }
}

/// Parses a base url, making sure relative joins keep its last segment.
pub fn parse_base_url(raw: &str) -> Result<Url, url::ParseError> {
    if raw.ends_with('/') {
        Url::parse(raw)
    } else {
        Url::parse(&format!("{raw}/"))
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u64, SettingsError> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(SettingsError::InvalidNumber {
            var,
            value: raw.to_string(),
        }),
    }
}
