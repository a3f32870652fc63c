use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{CompletionChunk, CompletionStream, Provider, Usage};

/// A mock provider that streams pre-configured responses for testing
///
/// Each call consumes the next scripted response. Once the script runs out the
/// provider answers with an empty completion that finishes with `stop`.
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Vec<CompletionChunk>>>>,
    failure: Option<String>,
    offered_tools: Arc<Mutex<Vec<Vec<String>>>>,
    received: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of streamed responses
    pub fn new(responses: Vec<Vec<CompletionChunk>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            failure: None,
            offered_tools: Arc::new(Mutex::new(Vec::new())),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider whose every request is rejected with the given message
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(Vec::new())
        }
    }

    /// Shorthand for a response that streams the given text pieces and stops
    pub fn text_response(pieces: &[&str]) -> Vec<CompletionChunk> {
        let mut chunks: Vec<CompletionChunk> = pieces
            .iter()
            .map(|p| CompletionChunk::TextDelta(p.to_string()))
            .collect();
        chunks.push(CompletionChunk::Finish {
            reason: "stop".to_string(),
            usage: Usage::default(),
        });
        chunks
    }

    /// Names of the tools offered on each call so far, in call order
    pub fn offered_tools(&self) -> Vec<Vec<String>> {
        self.offered_tools
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// The message history sent on each call so far
    pub fn received_messages(&self) -> Vec<Vec<Message>> {
        self.received
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream(
        &self,
        _system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<CompletionStream> {
        if let Ok(mut calls) = self.offered_tools.lock() {
            calls.push(tools.iter().map(|t| t.name.clone()).collect());
        }
        if let Ok(mut calls) = self.received.lock() {
            calls.push(messages.to_vec());
        }

        if let Some(message) = &self.failure {
            return Err(anyhow!(message.clone()));
        }

        let next = {
            let mut responses = self
                .responses
                .lock()
                .map_err(|e| anyhow!("mock provider poisoned: {}", e))?;
            if responses.is_empty() {
                None
            } else {
                Some(responses.remove(0))
            }
        };

        let chunks = next.unwrap_or_else(|| Self::text_response(&[]));
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}
