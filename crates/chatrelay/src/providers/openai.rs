use anyhow::{anyhow, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use super::base::{CompletionChunk, CompletionStream, Provider, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, tool_request_from_openai,
    tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::sse::DONE_SENTINEL;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

// Tool calls arrive as fragments keyed by index, the id and name first and then
// the arguments string in pieces.
#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Option<Usage> {
        let usage = data.get("usage").filter(|u| !u.is_null())?;

        let input_tokens = usage
            .get("prompt_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let output_tokens = usage
            .get("completion_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let total_tokens = usage
            .get("total_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Some(Usage::new(input_tokens, output_tokens, total_tokens))
    }

    fn build_payload(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Result<Value> {
        let system_message = json!({
            "role": "system",
            "content": system
        });

        let mut messages_array = vec![system_message];
        messages_array.extend(messages_to_openai_spec(messages));

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_array,
            "stream": true,
            "stream_options": {"include_usage": true}
        });

        if let Some(obj) = payload.as_object_mut() {
            if !tools.is_empty() {
                obj.insert("tools".to_string(), json!(tools_to_openai_spec(tools)?));
                obj.insert("tool_choice".to_string(), json!("auto"));
            }
            if let Some(temp) = self.config.temperature {
                obj.insert("temperature".to_string(), json!(temp));
            }
            if let Some(tokens) = self.config.max_tokens {
                obj.insert("max_tokens".to_string(), json!(tokens));
            }
        }

        Ok(payload)
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                if let Some(error) = body.get("error") {
                    if let Some(err) = check_openai_context_length_error(error) {
                        return Err(err.into());
                    }
                    let message = error
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(String::from)
                        .unwrap_or_else(|| error.to_string());
                    return Err(anyhow!("OpenAI API error ({}): {}", status, message));
                }
                Err(anyhow!("Request failed: {}", status))
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<CompletionStream> {
        let payload = self.build_payload(system, messages, tools)?;
        let response = self.post(&payload).await?;
        let mut events = Box::pin(response.bytes_stream().eventsource());

        Ok(Box::pin(async_stream::try_stream! {
            let mut tool_calls: BTreeMap<u64, PartialToolCall> = BTreeMap::new();
            let mut finish_reason = String::from("stop");
            let mut usage = Usage::default();

            while let Some(event) = events.next().await {
                let event = event?;
                let payload = event.data.trim();
                if payload == DONE_SENTINEL {
                    break;
                }

                let chunk: Value = match serde_json::from_str(payload) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed completion chunk");
                        continue;
                    }
                };

                if let Some(error) = chunk.get("error") {
                    Err::<(), _>(anyhow!("OpenAI API error: {}", error))?;
                }
                if let Some(step_usage) = Self::get_usage(&chunk) {
                    usage = step_usage;
                }

                let Some(choice) = chunk.get("choices").and_then(|c| c.get(0)) else {
                    continue;
                };
                if let Some(reason) = choice.get("finish_reason").and_then(|r| r.as_str()) {
                    finish_reason = reason.to_string();
                }

                let delta = &choice["delta"];
                if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
                    if !text.is_empty() {
                        yield CompletionChunk::TextDelta(text.to_string());
                    }
                }

                if let Some(fragments) = delta.get("tool_calls").and_then(|t| t.as_array()) {
                    for fragment in fragments {
                        let index = fragment.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                        let entry = tool_calls.entry(index).or_default();
                        if let Some(id) = fragment.get("id").and_then(|v| v.as_str()) {
                            entry.id = id.to_string();
                        }
                        let function = &fragment["function"];
                        if let Some(name) = function.get("name").and_then(|v| v.as_str()) {
                            entry.name.push_str(name);
                        }
                        if let Some(arguments) = function.get("arguments").and_then(|v| v.as_str()) {
                            entry.arguments.push_str(arguments);
                        }
                    }
                }
            }

            for (_, call) in tool_calls {
                yield CompletionChunk::ToolRequest(tool_request_from_openai(
                    call.id,
                    &call.name,
                    &call.arguments,
                ));
            }

            yield CompletionChunk::Finish {
                reason: finish_reason,
                usage,
            };
        }))
    }
}
