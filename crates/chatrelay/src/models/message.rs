use super::role::Role;
use super::tool::ToolCall;
use crate::errors::{AgentError, AgentResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

/// A tool call exactly as the model wrote it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToolCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub tool_call: AgentResult<ToolCall>,
    /// Kept when `tool_call` could not be parsed, so the call can still be
    /// replayed to the model next to its error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawToolCall>,
}

impl ToolRequest {
    pub fn new<S: Into<String>>(id: S, tool_call: AgentResult<ToolCall>) -> Self {
        ToolRequest {
            id: id.into(),
            tool_call,
            raw: None,
        }
    }

    /// A request whose name or arguments were rejected before dispatch
    pub fn malformed<S, N, A>(id: S, name: N, arguments: A, error: AgentError) -> Self
    where
        S: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        ToolRequest {
            id: id.into(),
            tool_call: Err(error),
            raw: Some(RawToolCall {
                name: name.into(),
                arguments: arguments.into(),
            }),
        }
    }

    /// The tool name the model asked for, whether or not it parsed
    pub fn name(&self) -> &str {
        match (&self.tool_call, &self.raw) {
            (Ok(call), _) => &call.name,
            (Err(_), Some(raw)) => &raw.name,
            (Err(_), None) => "",
        }
    }

    /// The arguments the model sent. Unparsable text is passed on as a JSON string.
    pub fn arguments(&self) -> Value {
        match (&self.tool_call, &self.raw) {
            (Ok(call), _) => call.arguments.clone(),
            (Err(_), Some(raw)) => Value::String(raw.arguments.clone()),
            (Err(_), None) => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: String,
    pub tool_result: AgentResult<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Content passed inside a message, which can be both simple content and tool content
pub enum MessageContent {
    Text(TextContent),
    ToolRequest(ToolRequest),
    ToolResponse(ToolResponse),
}

impl MessageContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MessageContent::Text(TextContent { text: text.into() })
    }

    pub fn tool_response<S: Into<String>>(id: S, tool_result: AgentResult<Value>) -> Self {
        MessageContent::ToolResponse(ToolResponse {
            id: id.into(),
            tool_result,
        })
    }

    /// Get the text content if this is a TextContent variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(&text.text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    pub created: i64,
    pub content: Vec<MessageContent>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: Vec::new(),
        }
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Add any MessageContent to the message
    pub fn with_content(mut self, content: MessageContent) -> Self {
        self.content.push(content);
        self
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(MessageContent::text(text))
    }

    /// Add a tool request to the message
    pub fn with_tool_request(self, request: ToolRequest) -> Self {
        self.with_content(MessageContent::ToolRequest(request))
    }

    /// Add a tool response to the message
    pub fn with_tool_response<S: Into<String>>(self, id: S, result: AgentResult<Value>) -> Self {
        self.with_content(MessageContent::tool_response(id, result))
    }

    /// Concatenated text of all text content, in order
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_appends_in_order() {
        let message = Message::assistant()
            .with_text("Checking")
            .with_tool_request(ToolRequest::new(
                "1",
                Ok(ToolCall::new("getWeather", json!({"location": "Paris"}))),
            ))
            .with_text(" now");

        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content.len(), 3);
        assert_eq!(message.text(), "Checking now");
        assert!(matches!(message.content[1], MessageContent::ToolRequest(_)));
    }

    #[test]
    fn test_tool_response_keeps_errors() {
        let message = Message::user()
            .with_tool_response("1", Err(AgentError::ToolNotFound("nope".to_string())));

        match &message.content[0] {
            MessageContent::ToolResponse(response) => {
                assert_eq!(response.id, "1");
                assert!(matches!(
                    response.tool_result,
                    Err(AgentError::ToolNotFound(_))
                ));
            }
            other => panic!("Expected tool response, got {:?}", other),
        }
        assert!(message.text().is_empty());
    }

    #[test]
    fn test_malformed_request_keeps_what_was_sent() {
        let request = ToolRequest::malformed(
            "call_1",
            "getWeather",
            "{\"location\": ",
            AgentError::InvalidParameters("bad json".to_string()),
        );

        assert_eq!(request.name(), "getWeather");
        assert_eq!(request.arguments(), json!("{\"location\": "));

        let parsed = ToolRequest::new("call_2", Ok(ToolCall::new("echo", json!({"a": 1}))));
        assert_eq!(parsed.name(), "echo");
        assert_eq!(parsed.arguments(), json!({"a": 1}));
        assert_eq!(parsed.raw, None);
    }
}
