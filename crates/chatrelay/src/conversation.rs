use serde_json::Value;

use crate::models::ui::{ToolInvocation, ToolOutcome, UiMessage};

/// Whether an assistant message is currently being extended by incoming deltas
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AssistantState {
    #[default]
    NoOpenAssistantMessage,
    /// The last message in the conversation is the open one
    OpenAssistantMessage { accumulator: String },
}

/// The client-side copy of a chat, resent in full on every turn.
///
/// At most one assistant message is open at a time and it is always the last
/// message; appending anything else closes it first.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<UiMessage>,
    state: AssistantState,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[UiMessage] {
        &self.messages
    }

    pub fn state(&self) -> &AssistantState {
        &self.state
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, AssistantState::OpenAssistantMessage { .. })
    }

    pub fn last(&self) -> Option<&UiMessage> {
        self.messages.last()
    }

    pub fn push_user<S: Into<String>>(&mut self, text: S) -> &UiMessage {
        self.push(UiMessage::user(text))
    }

    /// Append a synthetic assistant message describing a failure
    pub fn push_error<S: AsRef<str>>(&mut self, error: S) -> &UiMessage {
        self.push(UiMessage::assistant(format!("Error: {}", error.as_ref())))
    }

    fn push(&mut self, message: UiMessage) -> &UiMessage {
        self.close_assistant_message();
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Fold a text delta into the open assistant message, opening one if needed.
    ///
    /// The open message is rebuilt from the running accumulator every time rather
    /// than patched, so its text is always exactly the concatenation of the deltas.
    pub fn apply_delta(&mut self, delta: &str) {
        match &mut self.state {
            AssistantState::NoOpenAssistantMessage => {
                let accumulator = delta.to_string();
                self.messages.push(UiMessage::assistant(accumulator.clone()));
                self.state = AssistantState::OpenAssistantMessage { accumulator };
            }
            AssistantState::OpenAssistantMessage { accumulator } => {
                accumulator.push_str(delta);
                if let Some(open) = self.messages.last_mut() {
                    open.set_text(accumulator.clone());
                }
            }
        }
    }

    /// Note a tool call on the open assistant message.
    ///
    /// Tool activity usually comes before any text, so this opens an empty
    /// assistant message when none is open. Later deltas fill in its text.
    pub fn record_tool_call<I, N>(&mut self, tool_call_id: I, tool_name: N, input: Value)
    where
        I: Into<String>,
        N: Into<String>,
    {
        if !self.is_streaming() {
            self.messages.push(UiMessage::assistant(""));
            self.state = AssistantState::OpenAssistantMessage {
                accumulator: String::new(),
            };
        }
        if let Some(open) = self.messages.last_mut() {
            open.tools.push(ToolInvocation {
                tool_call_id: tool_call_id.into(),
                tool_name: tool_name.into(),
                input,
                outcome: ToolOutcome::Pending,
            });
        }
    }

    /// Settle a tool call recorded on the open assistant message.
    /// Returns false when no such call is open.
    pub fn record_tool_outcome(&mut self, tool_call_id: &str, outcome: ToolOutcome) -> bool {
        if !self.is_streaming() {
            return false;
        }
        let invocation = self
            .messages
            .last_mut()
            .and_then(|open| open.tools.iter_mut().find(|t| t.tool_call_id == tool_call_id));
        match invocation {
            Some(invocation) => {
                invocation.outcome = outcome;
                true
            }
            None => false,
        }
    }

    /// Fix the open assistant message, if any
    pub fn close_assistant_message(&mut self) {
        self.state = AssistantState::NoOpenAssistantMessage;
    }
}
