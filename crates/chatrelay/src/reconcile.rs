//! The client read loop: folds a relay response body into a [`Conversation`].
use anyhow::Result;
use futures::{Stream, StreamExt};

use crate::conversation::Conversation;
use crate::models::ui::ToolOutcome;
use crate::protocol::StreamPart;
use crate::sse::{Frame, SseDecoder};

/// How the relay framed its response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// `data:` frames carrying ui message-stream parts
    EventStream,
    /// Raw text, every chunk is a delta
    PlainText,
}

impl StreamFormat {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.starts_with("text/plain") => StreamFormat::PlainText,
            _ => StreamFormat::EventStream,
        }
    }
}

/// What ended the stream. Both are normal terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Sentinel,
    ConnectionClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub termination: Termination,
    pub deltas: usize,
    pub skipped_frames: usize,
}

enum LoopState {
    Reading,
    Done(Termination),
}

/// Read `body` to its end, applying every text delta to `conversation`.
///
/// `on_update` runs after each applied delta and each piece of tool activity.
/// Malformed frames are logged and skipped. A transport error closes the open assistant message and is returned.
pub async fn reconcile<S, B, E, F>(
    mut body: S,
    conversation: &mut Conversation,
    format: StreamFormat,
    mut on_update: F,
) -> Result<ReconcileOutcome>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
    F: FnMut(&Conversation),
{
    let mut decoder = SseDecoder::new();
    let mut pending_text: Vec<u8> = Vec::new();
    let mut deltas = 0;
    let mut skipped_frames = 0;
    let mut state = LoopState::Reading;

    while let LoopState::Reading = state {
        let frames = match body.next().await {
            Some(Ok(chunk)) => match format {
                StreamFormat::EventStream => decoder.push(chunk.as_ref()),
                StreamFormat::PlainText => {
                    pending_text.extend_from_slice(chunk.as_ref());
                    let text = take_utf8(&mut pending_text);
                    if !text.is_empty() {
                        conversation.apply_delta(&text);
                        deltas += 1;
                        on_update(&*conversation);
                    }
                    continue;
                }
            },
            Some(Err(e)) => {
                conversation.close_assistant_message();
                return Err(e.into());
            }
            None => {
                state = LoopState::Done(Termination::ConnectionClosed);
                decoder.finish().into_iter().collect()
            }
        };

        for frame in frames {
            match frame {
                Frame::Done => {
                    state = LoopState::Done(Termination::Sentinel);
                    break;
                }
                Frame::Data(payload) => match serde_json::from_str::<StreamPart>(&payload) {
                    Ok(StreamPart::TextDelta { delta, .. }) => {
                        conversation.apply_delta(&delta);
                        deltas += 1;
                        on_update(&*conversation);
                    }
                    Ok(StreamPart::ToolInputAvailable {
                        tool_call_id,
                        tool_name,
                        input,
                    }) => {
                        conversation.record_tool_call(tool_call_id, tool_name, input);
                        on_update(&*conversation);
                    }
                    Ok(StreamPart::ToolOutputAvailable { tool_call_id, output }) => {
                        settle_tool(conversation, &tool_call_id, ToolOutcome::Output(output));
                        on_update(&*conversation);
                    }
                    Ok(StreamPart::ToolOutputError {
                        tool_call_id,
                        error_text,
                    }) => {
                        settle_tool(conversation, &tool_call_id, ToolOutcome::Error(error_text));
                        on_update(&*conversation);
                    }
                    Ok(StreamPart::Error { error_text }) => {
                        tracing::warn!(error = %error_text, "relay reported an error");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, payload = %payload, "skipping malformed frame");
                        skipped_frames += 1;
                    }
                },
            }
        }
    }

    conversation.close_assistant_message();

    let termination = match state {
        LoopState::Done(termination) => termination,
        LoopState::Reading => Termination::ConnectionClosed,
    };
    Ok(ReconcileOutcome {
        termination,
        deltas,
        skipped_frames,
    })
}

fn settle_tool(conversation: &mut Conversation, tool_call_id: &str, outcome: ToolOutcome) {
    if !conversation.record_tool_outcome(tool_call_id, outcome) {
        tracing::warn!(tool_call_id, "tool result for a call that was never announced");
    }
}

// Take the longest valid utf-8 prefix, leaving an incomplete trailing sequence buffered.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            return text;
        }
    };
    let rest = pending.split_off(valid);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = rest;
    text
}
