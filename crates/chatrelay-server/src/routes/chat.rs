use crate::error::RelayError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use bytes::Bytes;
use chatrelay::{
    agent::{Agent, AgentEvent},
    models::message::Message,
    models::ui::{new_message_id, to_messages, UiMessage},
    protocol::StreamPart,
    reconcile::StreamFormat,
    sse::DONE_FRAME,
    toolkit::PodcastToolkit,
};
use futures::{
    stream::{BoxStream, StreamExt},
    Stream,
};
use serde::Deserialize;
use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

type ReplyStream = BoxStream<'static, anyhow::Result<AgentEvent>>;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<UiMessage>,
}

// Streamed response body fed by the relay task
pub struct StreamingResponse {
    rx: ReceiverStream<String>,
    format: StreamFormat,
}

impl StreamingResponse {
    fn new(rx: ReceiverStream<String>, format: StreamFormat) -> Self {
        Self { rx, format }
    }
}

impl Stream for StreamingResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for StreamingResponse {
    fn into_response(self) -> Response {
        let headers = match self.format {
            StreamFormat::EventStream => vec![
                (header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
                (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
                (header::CONNECTION, HeaderValue::from_static("keep-alive")),
                (
                    header::HeaderName::from_static("x-vercel-ai-ui-message-stream"),
                    HeaderValue::from_static("v1"),
                ),
            ],
            StreamFormat::PlainText => vec![(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
        };

        let mut response = Body::from_stream(self).into_response();
        response.headers_mut().extend(headers);
        response
    }
}

/// Turns agent events into the chunks of a response body
trait EventEncoder: Send + 'static {
    fn encode(&mut self, event: &AgentEvent) -> Vec<String>;

    /// A failure after the stream has started
    fn fail(&mut self, error: &str) -> Vec<String>;

    /// The closing chunks, sent once the agent is done
    fn finish(&mut self) -> Vec<String>;
}

/// Encodes a reply as ui message-stream frames.
///
/// Frames are kept well nested: text blocks sit inside steps, steps inside the
/// message, and the `[DONE]` sentinel always comes last.
#[derive(Debug)]
struct UiStreamEncoder {
    message_id: String,
    started: bool,
    step_open: bool,
    open_text: Option<String>,
    text_blocks: usize,
    finished: bool,
}

impl UiStreamEncoder {
    fn new() -> Self {
        Self {
            message_id: new_message_id(),
            started: false,
            step_open: false,
            open_text: None,
            text_blocks: 0,
            finished: false,
        }
    }

    fn ensure_started(&mut self, parts: &mut Vec<StreamPart>) {
        if !self.started {
            self.started = true;
            parts.push(StreamPart::Start {
                message_id: self.message_id.clone(),
            });
        }
    }

    fn ensure_step(&mut self, parts: &mut Vec<StreamPart>) {
        self.ensure_started(parts);
        if !self.step_open {
            self.step_open = true;
            parts.push(StreamPart::StartStep);
        }
    }

    fn close_text(&mut self, parts: &mut Vec<StreamPart>) {
        if let Some(id) = self.open_text.take() {
            parts.push(StreamPart::TextEnd { id });
        }
    }

    fn close_step(&mut self, parts: &mut Vec<StreamPart>) {
        self.close_text(parts);
        if self.step_open {
            self.step_open = false;
            parts.push(StreamPart::FinishStep);
        }
    }

    fn text_id(&mut self, parts: &mut Vec<StreamPart>) -> String {
        self.ensure_step(parts);
        if let Some(id) = &self.open_text {
            return id.clone();
        }
        let id = format!("{}-text-{}", self.message_id, self.text_blocks);
        self.text_blocks += 1;
        parts.push(StreamPart::TextStart { id: id.clone() });
        self.open_text = Some(id.clone());
        id
    }

    fn frames(parts: Vec<StreamPart>) -> Vec<String> {
        parts.iter().map(StreamPart::to_frame).collect()
    }
}

impl EventEncoder for UiStreamEncoder {
    fn encode(&mut self, event: &AgentEvent) -> Vec<String> {
        let mut parts = Vec::new();
        match event {
            AgentEvent::TextDelta(delta) => {
                let id = self.text_id(&mut parts);
                parts.push(StreamPart::text_delta(id, delta.as_str()));
            }
            AgentEvent::ToolCall {
                id,
                name,
                arguments,
            } => {
                self.ensure_step(&mut parts);
                self.close_text(&mut parts);
                parts.push(StreamPart::ToolInputAvailable {
                    tool_call_id: id.clone(),
                    tool_name: name.clone(),
                    input: arguments.clone(),
                });
            }
            AgentEvent::ToolResult { id, result } => {
                self.ensure_step(&mut parts);
                parts.push(match result {
                    Ok(output) => StreamPart::ToolOutputAvailable {
                        tool_call_id: id.clone(),
                        output: output.clone(),
                    },
                    Err(e) => StreamPart::ToolOutputError {
                        tool_call_id: id.clone(),
                        error_text: e.to_string(),
                    },
                });
            }
            AgentEvent::StepFinish { .. } => {
                self.ensure_step(&mut parts);
                self.close_step(&mut parts);
            }
            AgentEvent::Finish { .. } => {
                self.ensure_started(&mut parts);
                self.close_step(&mut parts);
                self.finished = true;
                parts.push(StreamPart::Finish);
            }
        }
        Self::frames(parts)
    }

    fn fail(&mut self, error: &str) -> Vec<String> {
        let mut parts = Vec::new();
        self.ensure_started(&mut parts);
        self.close_step(&mut parts);
        parts.push(StreamPart::Error {
            error_text: error.to_string(),
        });
        Self::frames(parts)
    }

    fn finish(&mut self) -> Vec<String> {
        let mut parts = Vec::new();
        if !self.finished {
            self.ensure_started(&mut parts);
            self.close_step(&mut parts);
            self.finished = true;
            parts.push(StreamPart::Finish);
        }
        let mut frames = Self::frames(parts);
        frames.push(DONE_FRAME.to_string());
        frames
    }
}

/// Only the text of the reply, as it arrives
struct TextEncoder;

impl EventEncoder for TextEncoder {
    fn encode(&mut self, event: &AgentEvent) -> Vec<String> {
        match event {
            AgentEvent::TextDelta(delta) => vec![delta.clone()],
            _ => Vec::new(),
        }
    }

    fn fail(&mut self, _error: &str) -> Vec<String> {
        Vec::new()
    }

    fn finish(&mut self) -> Vec<String> {
        Vec::new()
    }
}

fn parse_request(body: &Bytes) -> Result<Vec<Message>, RelayError> {
    let request: ChatRequest =
        serde_json::from_slice(body).map_err(|e| RelayError::BadRequest(e.to_string()))?;
    Ok(to_messages(&request.messages))
}

// Wait for the first event so that failures to reach the model become a 500
async fn start_reply(
    agent: &Agent,
    messages: Vec<Message>,
) -> Result<(AgentEvent, ReplyStream), RelayError> {
    let mut stream = agent.reply(messages);
    match stream.next().await {
        Some(Ok(event)) => Ok((event, stream)),
        Some(Err(e)) => Err(RelayError::Upstream(e.to_string())),
        None => Err(RelayError::Upstream(
            "The model returned an empty reply".to_string(),
        )),
    }
}

async fn send_all(tx: &mpsc::Sender<String>, chunks: Vec<String>) -> bool {
    for chunk in chunks {
        if let Err(e) = tx.send(chunk).await {
            error!("Error sending message through channel: {}", e);
            return false;
        }
    }
    true
}

async fn forward_events<E: EventEncoder>(
    mut encoder: E,
    first: AgentEvent,
    mut stream: ReplyStream,
    tx: mpsc::Sender<String>,
) {
    if !send_all(&tx, encoder.encode(&first)).await {
        return;
    }

    loop {
        match timeout(Duration::from_millis(500), stream.next()).await {
            Ok(Some(Ok(event))) => {
                if !send_all(&tx, encoder.encode(&event)).await {
                    return;
                }
            }
            Ok(Some(Err(e))) => {
                error!("Error processing reply: {}", e);
                if !send_all(&tx, encoder.fail(&e.to_string())).await {
                    return;
                }
                break;
            }
            Ok(None) => break,
            Err(_) => {
                // Heartbeat, used to detect disconnected clients and then end running tools.
                if tx.is_closed() {
                    info!("client disconnected, dropping reply");
                    return;
                }
            }
        }
    }

    send_all(&tx, encoder.finish()).await;
}

async fn relay<E: EventEncoder>(
    agent: Agent,
    body: Bytes,
    encoder: E,
    format: StreamFormat,
) -> Result<StreamingResponse, RelayError> {
    let messages = parse_request(&body)?;
    let (first, stream) = start_reply(&agent, messages).await?;

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    tokio::spawn(forward_events(encoder, first, stream, tx));

    Ok(StreamingResponse::new(ReceiverStream::new(rx), format))
}

async fn chat_with_tools(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StreamingResponse, RelayError> {
    info!(bytes = body.len(), "chat-with-tools request");
    let mut agent = Agent::new(state.provider.clone(), state.chat.tools_system_prompt.clone())
        .with_max_steps(state.chat.max_steps);
    agent.add_toolkit(Arc::new(PodcastToolkit::new()));

    relay(agent, body, UiStreamEncoder::new(), StreamFormat::EventStream).await
}

async fn chat_simple(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StreamingResponse, RelayError> {
    info!(bytes = body.len(), "chat-simple request");
    let agent = Agent::new(state.provider.clone(), state.chat.simple_system_prompt.clone())
        .with_max_steps(1);

    relay(agent, body, TextEncoder, StreamFormat::PlainText).await
}

async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/chat-with-tools",
            post(chat_with_tools).fallback(method_not_allowed),
        )
        .route(
            "/api/chat-simple",
            post(chat_simple).fallback(method_not_allowed),
        )
        .with_state(state)
}
