use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unable to verify user credentials")]
    Unauthorized,

    #[error("missing parameter {0}")]
    MissingParam(&'static str),

    #[error("invalid value `{value}` for parameter {name}")]
    InvalidParam { name: &'static str, value: String },

    #[error("job {0} does not exist")]
    UnknownJob(String),

    #[error("unknown command {0}")]
    UnknownCommand(String),
}

impl ApiError {
    /// Error code carried both as HTTP status and in the `errorcode` field.
    pub fn code(&self) -> u16 {
        match self {
            ApiError::Unauthorized => 401,
            ApiError::MissingParam(_) | ApiError::InvalidParam { .. } | ApiError::UnknownJob(_) => 431,
            ApiError::UnknownCommand(_) => 432,
        }
    }

    pub fn for_command(self, command: &str) -> CommandError {
        CommandError {
            command: command.to_string(),
            error: self,
        }
    }
}

/// An [`ApiError`] wrapped in the `<command>response` envelope clients expect.
#[derive(Debug)]
pub struct CommandError {
    pub command: String,
    pub error: ApiError,
}

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        let code = self.error.code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
        let envelope = if self.command.is_empty() {
            "errorresponse".to_string()
        } else {
            format!("{}response", self.command.to_lowercase())
        };
        let mut body = Map::new();
        body.insert(
            envelope,
            json!({
                "errorcode": code,
                "errortext": self.error.to_string(),
            }),
        );
        (status, Json(Value::Object(body))).into_response()
    }
}
