//! Parts of the ui message stream, carried one per `data:` frame.
//!
//! A reply is framed as `start`, then one or more steps (`start-step` .. `finish-step`)
//! holding text blocks and tool activity, then `finish` and the `[DONE]` sentinel.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sse::data_frame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamPart {
    #[serde(rename_all = "camelCase")]
    Start { message_id: String },
    StartStep,
    TextStart { id: String },
    TextDelta {
        #[serde(default)]
        id: String,
        delta: String,
    },
    TextEnd { id: String },
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable { tool_call_id: String, output: Value },
    #[serde(rename_all = "camelCase")]
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    FinishStep,
    Finish,
    #[serde(rename_all = "camelCase")]
    Error { error_text: String },
    /// Any part type this crate does not know about
    #[serde(other)]
    Unknown,
}

impl StreamPart {
    pub fn text_delta<I: Into<String>, D: Into<String>>(id: I, delta: D) -> Self {
        StreamPart::TextDelta {
            id: id.into(),
            delta: delta.into(),
        }
    }

    /// Encode this part as a `data:` frame
    pub fn to_frame(&self) -> String {
        let encoded = serde_json::to_string(self).unwrap_or_else(|_| String::new());
        data_frame(&encoded)
    }
}
