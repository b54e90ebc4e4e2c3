use thiserror::Error;

use crate::JobFailure;

/// A poll tick that did not produce a usable job status.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {text}")]
    Api {
        status: u16,
        code: Option<i64>,
        text: String,
    },

    #[error("unreadable response: {0}")]
    Decode(String),

    #[error("`{command}` response carried no job id")]
    MissingJobId { command: String },
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Decode(e.to_string())
    }
}

/// Why a watched job ended without a result. Handed to `on_error`.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{}", .0.text)]
    Backend(JobFailure),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl JobError {
    /// Message suitable for showing to a user.
    pub fn error_text(&self) -> String {
        match self {
            JobError::Backend(failure) => failure.text.clone(),
            JobError::Transport(e) => e.to_string(),
        }
    }

    pub fn is_backend_failure(&self) -> bool {
        matches!(self, JobError::Backend(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("poll interval must be a positive number of milliseconds")]
    ZeroInterval,

    #[error("{name} is not set")]
    Missing { name: &'static str },

    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },

    #[error("invalid API url: {0}")]
    Url(#[from] url::ParseError),

    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
