use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_JOB_RETENTION_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("BIND_ADDR `{0}` is not a socket address")]
    BindAddr(String),

    #[error("JOB_RETENTION_SECS `{0}` is not a number of seconds")]
    Retention(String),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Allowed CORS origin. Any origin when unset.
    pub client_url: Option<String>,
    pub session_key: Option<String>,
    /// How long finished jobs stay queryable.
    pub job_retention: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|_| ServerConfigError::BindAddr(raw_addr.clone()))?;

        let job_retention = match lookup("JOB_RETENTION_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| ServerConfigError::Retention(raw.clone()))?,
            None => Duration::from_secs(DEFAULT_JOB_RETENTION_SECS),
        };

        Ok(Self {
            bind_addr,
            job_retention,
            client_url: lookup("CLIENT_URL").filter(|v| !v.is_empty()),
            session_key: lookup("API_SESSION_KEY").filter(|v| !v.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert!(config.client_url.is_none());
        assert!(config.session_key.is_none());
        assert_eq!(config.job_retention, Duration::from_secs(3600));

        let config = ServerConfig::from_lookup(|name| match name {
            "BIND_ADDR" => Some("0.0.0.0:8096".into()),
            "API_SESSION_KEY" => Some("s3cret".into()),
            "CLIENT_URL" => Some(String::new()),
            "JOB_RETENTION_SECS" => Some("120".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8096);
        assert_eq!(config.session_key.as_deref(), Some("s3cret"));
        assert!(config.client_url.is_none());
        assert_eq!(config.job_retention, Duration::from_secs(120));

        assert!(ServerConfig::from_lookup(|_| Some("nowhere".into())).is_err());
    }
}
