//! Messages as the chat client sees them: an id, a role and an ordered list of parts.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::message::Message;
use super::role::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiPart {
    Text {
        text: String,
    },
    /// Parts the relay does not interpret (step markers, tool parts, files)
    #[serde(other)]
    Other,
}

impl UiPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        UiPart::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            UiPart::Text { text } => Some(text),
            UiPart::Other => None,
        }
    }
}

/// Where a tool call the assistant made has got to
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Pending,
    Output(Value),
    Error(String),
}

/// A tool the assistant used while producing a message
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
    pub outcome: ToolOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "IncomingUiMessage")]
pub struct UiMessage {
    pub id: String,
    pub role: Role,
    pub parts: Vec<UiPart>,
    /// Shown next to the message only, never sent back to the relay
    #[serde(skip)]
    pub tools: Vec<ToolInvocation>,
}

// Older clients send `content` as a plain string and may leave out the id.
#[derive(Deserialize)]
struct IncomingUiMessage {
    #[serde(default)]
    id: Option<String>,
    role: Role,
    #[serde(default)]
    parts: Vec<UiPart>,
    #[serde(default)]
    content: Option<String>,
}

impl From<IncomingUiMessage> for UiMessage {
    fn from(incoming: IncomingUiMessage) -> Self {
        let mut parts = incoming.parts;
        if parts.is_empty() {
            if let Some(content) = incoming.content {
                parts.push(UiPart::text(content));
            }
        }
        UiMessage {
            id: incoming.id.unwrap_or_else(new_message_id),
            role: incoming.role,
            parts,
            tools: Vec::new(),
        }
    }
}

pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

impl UiMessage {
    pub fn new<S: Into<String>>(role: Role, text: S) -> Self {
        UiMessage {
            id: new_message_id(),
            role,
            parts: vec![UiPart::text(text)],
            tools: Vec::new(),
        }
    }

    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(UiPart::as_text).collect()
    }

    /// Replace every part with a single text part
    pub fn set_text<S: Into<String>>(&mut self, text: S) {
        self.parts = vec![UiPart::text(text)];
    }
}

impl From<&UiMessage> for Message {
    fn from(ui: &UiMessage) -> Self {
        let message = match ui.role {
            Role::User => Message::user(),
            Role::Assistant => Message::assistant(),
        };
        message.with_text(ui.text())
    }
}

/// Convert a client conversation into provider messages.
///
/// Messages without any text (for example an assistant turn that only carried
/// tool parts) are dropped, the client never replays tool results.
pub fn to_messages(history: &[UiMessage]) -> Vec<Message> {
    history
        .iter()
        .filter(|m| !m.text().is_empty())
        .map(Message::from)
        .collect()
}
