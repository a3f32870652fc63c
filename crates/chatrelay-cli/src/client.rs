use anyhow::{anyhow, Result};
use chatrelay::models::ui::UiMessage;
use reqwest::Client;
use serde_json::{json, Value};

/// Which relay route to talk to
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// Tool-enabled chat, streamed as ui message-stream frames
    Tools,
    /// Plain chat, streamed as raw text
    Simple,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Tools => "/api/chat-with-tools",
            Endpoint::Simple => "/api/chat-simple",
        }
    }
}

pub struct RelayClient {
    client: Client,
    url: String,
}

impl RelayClient {
    pub fn new(base_url: &str, endpoint: Endpoint) -> Self {
        Self {
            client: Client::new(),
            url: format!("{}{}", base_url.trim_end_matches('/'), endpoint.path()),
        }
    }

    /// Post the whole conversation and hand back the streaming response.
    ///
    /// Non-success statuses become errors, using the relay's `error` field when
    /// the body has one.
    pub async fn send(&self, messages: &[UiMessage]) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "messages": messages }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));
        Err(anyhow!(message))
    }
}
