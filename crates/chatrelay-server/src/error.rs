use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a configuration path like `provider.api_key` to its environment variable
pub fn to_env_var(field_path: &str) -> String {
    format!(
        "CHATRELAY_{}",
        field_path.to_uppercase().replace('.', "__")
    )
}

/// Failures a chat route reports before any of the stream has been sent
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid request body: {0}")]
    BadRequest(String),
    #[error("{0}")]
    Upstream(String),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "chat request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
