use anyhow::Result;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::{AgentError, AgentResult};
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::{CompletionChunk, Provider, Usage};
use crate::toolkit::{validate_arguments, Toolkit};

pub const DEFAULT_MAX_STEPS: usize = 5;

/// Something that happened while the agent was replying
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    TextDelta(String),
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        id: String,
        result: AgentResult<Value>,
    },
    StepFinish {
        step: usize,
        finish_reason: String,
    },
    /// Always the last event of a reply that did not fail
    Finish {
        finish_reason: String,
        usage: Usage,
    },
}

/// Agent integrates a foundational LLM with the toolkits it can call
#[derive(Clone)]
pub struct Agent {
    provider: Arc<dyn Provider>,
    toolkits: Vec<Arc<dyn Toolkit>>,
    system_prompt: String,
    max_steps: usize,
}

impl Agent {
    /// Create a new Agent with the specified provider and system prompt
    pub fn new(provider: Arc<dyn Provider>, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            toolkits: Vec::new(),
            system_prompt: system_prompt.into(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Limit the number of model turns in one reply. Values below one count as one.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Add a toolkit to the agent
    pub fn add_toolkit(&mut self, toolkit: Arc<dyn Toolkit>) {
        self.toolkits.push(toolkit);
    }

    fn tools(&self) -> Vec<Tool> {
        self.toolkits
            .iter()
            .flat_map(|toolkit| toolkit.tools().iter().cloned())
            .collect()
    }

    fn find_tool(&self, name: &str) -> Option<(&Arc<dyn Toolkit>, &Tool)> {
        self.toolkits.iter().find_map(|toolkit| {
            toolkit
                .tools()
                .iter()
                .find(|tool| tool.name == name)
                .map(|tool| (toolkit, tool))
        })
    }

    /// Dispatch a single tool call to the toolkit that declares it
    async fn dispatch_tool_call(&self, tool_call: AgentResult<ToolCall>) -> AgentResult<Value> {
        let call = tool_call?;
        let (toolkit, tool) = self
            .find_tool(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        validate_arguments(tool, &call.arguments)?;
        info!(toolkit = toolkit.name(), tool = %call.name, "dispatching tool call");
        toolkit.call(call).await
    }

    /// Create a stream of events for the agent's reply to the conversation.
    ///
    /// Each step streams one completion. Tool requests of a step are executed in
    /// parallel and their results are fed into the next step. The last step of the
    /// budget is offered no tools, so the model has to answer in text.
    pub fn reply(&self, messages: Vec<Message>) -> BoxStream<'static, Result<AgentEvent>> {
        let agent = self.clone();

        Box::pin(async_stream::try_stream! {
            let mut messages = messages;
            let mut usage = Usage::default();
            let all_tools = agent.tools();
            let mut step = 1;

            loop {
                let tools: &[Tool] = if step < agent.max_steps { &all_tools } else { &[] };
                let mut completion = agent
                    .provider
                    .stream(&agent.system_prompt, &messages, tools)
                    .await?;

                let mut text = String::new();
                let mut requests: Vec<ToolRequest> = Vec::new();
                let mut finish_reason = String::from("stop");

                while let Some(chunk) = completion.try_next().await? {
                    match chunk {
                        CompletionChunk::TextDelta(delta) => {
                            text.push_str(&delta);
                            yield AgentEvent::TextDelta(delta);
                        }
                        CompletionChunk::ToolRequest(request) => requests.push(request),
                        CompletionChunk::Finish { reason, usage: step_usage } => {
                            finish_reason = reason;
                            usage.accumulate(&step_usage);
                        }
                    }
                }

                if tools.is_empty() && !requests.is_empty() {
                    warn!(step, count = requests.len(), "ignoring tool requests on a step without tools");
                    requests.clear();
                }

                // Malformed calls are announced too, their error follows as the result
                for request in &requests {
                    yield AgentEvent::ToolCall {
                        id: request.id.clone(),
                        name: request.name().to_string(),
                        arguments: request.arguments(),
                    };
                }

                // Process all the tool calls in parallel but wait until all are finished
                let outputs = futures::future::join_all(
                    requests
                        .iter()
                        .map(|request| agent.dispatch_tool_call(request.tool_call.clone())),
                )
                .await;

                let mut message_tool_request = Message::assistant();
                if !text.is_empty() {
                    message_tool_request = message_tool_request.with_text(text);
                }
                let mut message_tool_response = Message::user();
                for (request, output) in requests.iter().zip(outputs.into_iter()) {
                    yield AgentEvent::ToolResult {
                        id: request.id.clone(),
                        result: output.clone(),
                    };
                    message_tool_request = message_tool_request.with_tool_request(request.clone());
                    message_tool_response =
                        message_tool_response.with_tool_response(request.id.clone(), output);
                }

                debug!(step, finish_reason = %finish_reason, tool_calls = requests.len(), "step finished");
                yield AgentEvent::StepFinish {
                    step,
                    finish_reason: finish_reason.clone(),
                };

                if requests.is_empty() {
                    yield AgentEvent::Finish { finish_reason, usage };
                    break;
                }

                messages.push(message_tool_request);
                messages.push(message_tool_response);
                step += 1;
            }
        })
    }
}
