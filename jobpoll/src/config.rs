use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Delay between two status queries of one job. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval(Duration);

impl PollInterval {
    pub fn from_millis(ms: u64) -> Result<Self, ConfigError> {
        if ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(Self(Duration::from_millis(ms)))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self(Duration::from_millis(DEFAULT_INTERVAL_MS))
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub api_url: Option<Url>,
    pub session_key: Option<String>,
    pub default_interval: PollInterval,
    pub request_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            session_key: None,
            default_interval: PollInterval::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl PollerConfig {
    /// Reads `JOBPOLL_*` variables, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("JOBPOLL_API_URL").filter(|v| !v.is_empty()) {
            config.api_url = Some(Url::parse(&url)?);
        }
        config.session_key = lookup("JOBPOLL_SESSION_KEY").filter(|v| !v.is_empty());

        if let Some(raw) = lookup("JOBPOLL_INTERVAL_MS") {
            let ms = parse_u64("JOBPOLL_INTERVAL_MS", &raw)?;
            config.default_interval = PollInterval::from_millis(ms)?;
        }
        if let Some(raw) = lookup("JOBPOLL_REQUEST_TIMEOUT_SECS") {
            let secs = parse_u64("JOBPOLL_REQUEST_TIMEOUT_SECS", &raw)?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    name: "JOBPOLL_REQUEST_TIMEOUT_SECS",
                    value: raw,
                });
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn require_api_url(&self) -> Result<&Url, ConfigError> {
        self.api_url.as_ref().ok_or(ConfigError::Missing {
            name: "JOBPOLL_API_URL",
        })
    }
}

fn parse_u64(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
    })
}
