use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Value};

use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent, ToolRequest};
use crate::models::tool::{Tool, ToolCall};

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut converted = json!({
            "role": message.role
        });

        let mut output = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    if !text.text.is_empty() {
                        converted["content"] = json!(text.text);
                    }
                }
                MessageContent::ToolRequest(request) => {
                    // A call that failed to parse is replayed as the model wrote it,
                    // its error reaches the model through the matching tool response.
                    let (name, arguments) = match (&request.tool_call, &request.raw) {
                        (Ok(tool_call), _) => (tool_call.name.clone(), tool_call.arguments.to_string()),
                        (Err(_), Some(raw)) => (raw.name.clone(), raw.arguments.clone()),
                        (Err(_), None) => (String::from("unknown_tool"), String::from("{}")),
                    };
                    let tool_calls = converted
                        .as_object_mut()
                        .and_then(|obj| obj.entry("tool_calls").or_insert(json!([])).as_array_mut());

                    if let Some(tool_calls) = tool_calls {
                        tool_calls.push(json!({
                            "id": request.id,
                            "type": "function",
                            "function": {
                                "name": sanitize_function_name(&name),
                                "arguments": arguments,
                            }
                        }));
                    }
                }
                MessageContent::ToolResponse(response) => match &response.tool_result {
                    Ok(result) => {
                        output.push(json!({
                            "role": "tool",
                            "content": result.to_string(),
                            "tool_call_id": response.id
                        }));
                    }
                    Err(e) => {
                        // A tool result error is shown as output so the model can interpret the error message
                        output.push(json!({
                            "role": "tool",
                            "content": format!("The tool call returned the following error:\n{}", e),
                            "tool_call_id": response.id
                        }));
                    }
                },
            }
        }

        if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
            output.insert(0, converted);
        }
        messages_spec.extend(output);
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Build a tool request from the pieces of an OpenAI tool call.
///
/// Invalid names and undecodable arguments become errors on the request so that
/// the model gets to see them as the tool result.
pub fn tool_request_from_openai(id: String, function_name: &str, arguments: &str) -> ToolRequest {
    if !is_valid_function_name(function_name) {
        let error = AgentError::ToolNotFound(format!(
            "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
            function_name
        ));
        return ToolRequest::malformed(id, function_name, arguments, error);
    }

    // some models send an empty string for tools without parameters
    let text = if arguments.trim().is_empty() { "{}" } else { arguments };
    match serde_json::from_str::<Value>(text) {
        Ok(params) => ToolRequest::new(id, Ok(ToolCall::new(function_name, params))),
        Err(e) => {
            let error = AgentError::InvalidParameters(format!(
                "Could not interpret tool use parameters for id {}: {}",
                id, e
            ));
            ToolRequest::malformed(id, function_name, arguments, error)
        }
    }
}

fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    re.replace_all(name, "_").to_string()
}

fn is_valid_function_name(name: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
    re.is_match(name)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::RawToolCall;
    use serde_json::json;

    #[test]
    fn test_messages_to_openai_spec() -> Result<()> {
        let message = Message::user().with_text("Hello");
        let spec = messages_to_openai_spec(&[message]);

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["role"], "user");
        assert_eq!(spec[0]["content"], "Hello");
        Ok(())
    }

    #[test]
    fn test_tools_to_openai_spec() -> Result<()> {
        let tool = Tool::new(
            "getWeather",
            "Get the current weather for a location",
            json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "The city name"
                    }
                },
                "required": ["location"]
            }),
        );

        let spec = tools_to_openai_spec(&[tool])?;

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "getWeather");
        assert_eq!(
            spec[0]["function"]["parameters"]["required"],
            json!(["location"])
        );
        Ok(())
    }

    #[test]
    fn test_sanitize_function_name() {
        assert_eq!(sanitize_function_name("hello-world"), "hello-world");
        assert_eq!(sanitize_function_name("hello world"), "hello_world");
        assert_eq!(sanitize_function_name("hello@world"), "hello_world");
    }

    #[test]
    fn test_is_valid_function_name() {
        assert!(is_valid_function_name("getWeather"));
        assert!(is_valid_function_name("hello_world"));
        assert!(!is_valid_function_name("hello world"));
        assert!(!is_valid_function_name("hello@world"));
    }

    #[test]
    fn test_messages_to_openai_spec_with_tools() -> Result<()> {
        let messages = vec![
            Message::user().with_text("What's the weather in Paris?"),
            Message::assistant().with_tool_request(ToolRequest::new(
                "call_1",
                Ok(ToolCall::new("getWeather", json!({"location": "Paris"}))),
            )),
            Message::user().with_tool_response("call_1", Ok(json!({"temperature": 21}))),
            Message::user().with_tool_response(
                "call_2",
                Err(AgentError::ToolNotFound("getStocks".to_string())),
            ),
        ];

        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec.len(), 4);
        assert_eq!(spec[1]["role"], "assistant");
        assert_eq!(spec[1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            spec[1]["tool_calls"][0]["function"]["arguments"],
            "{\"location\":\"Paris\"}"
        );
        assert_eq!(spec[2]["role"], "tool");
        assert_eq!(spec[2]["content"], "{\"temperature\":21}");
        assert_eq!(spec[2]["tool_call_id"], "call_1");
        assert!(spec[3]["content"]
            .as_str()
            .unwrap()
            .contains("Tool not found: getStocks"));
        Ok(())
    }

    #[test]
    fn test_malformed_request_is_answered_once() {
        let request = tool_request_from_openai("call_1".to_string(), "get weather", "{}");
        let messages = vec![
            Message::user().with_text("hi"),
            Message::assistant().with_tool_request(request.clone()),
            Message::user().with_tool_response("call_1", Err(request.tool_call.unwrap_err())),
        ];

        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec.len(), 3);
        assert_eq!(spec[1]["role"], "assistant");
        assert_eq!(spec[1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(spec[1]["tool_calls"][0]["function"]["name"], "get_weather");
        assert_eq!(spec[2]["role"], "tool");
        assert_eq!(spec[2]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_tools_to_openai_spec_duplicate() {
        let tool = Tool::new("getWeather", "Weather", json!({"type": "object"}));
        let result = tools_to_openai_spec(&[tool.clone(), tool]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Duplicate tool name"));
    }

    #[test]
    fn test_tool_request_from_openai_valid() {
        let request =
            tool_request_from_openai("1".to_string(), "getWeather", "{\"location\": \"Paris\"}");
        let call = request.tool_call.unwrap();
        assert_eq!(call.name, "getWeather");
        assert_eq!(call.arguments, json!({"location": "Paris"}));
    }

    #[test]
    fn test_tool_request_from_openai_empty_arguments() {
        let request = tool_request_from_openai("1".to_string(), "ping", "");
        assert_eq!(request.tool_call.unwrap().arguments, json!({}));
    }

    #[test]
    fn test_tool_request_from_openai_invalid_name() {
        let request = tool_request_from_openai("1".to_string(), "invalid fn", "{}");
        match request.tool_call {
            Err(AgentError::ToolNotFound(msg)) => {
                assert!(msg.starts_with("The provided function name"));
            }
            _ => panic!("Expected ToolNotFound error"),
        }
    }

    #[test]
    fn test_tool_request_from_openai_json_decode_error() {
        let request = tool_request_from_openai("1".to_string(), "getWeather", "invalid json {");
        match &request.tool_call {
            Err(AgentError::InvalidParameters(msg)) => {
                assert!(msg.starts_with("Could not interpret tool use parameters"));
            }
            _ => panic!("Expected InvalidParameters error"),
        }
        assert_eq!(
            request.raw,
            Some(RawToolCall {
                name: "getWeather".to_string(),
                arguments: "invalid json {".to_string(),
            })
        );
    }

    #[test]
    fn test_check_openai_context_length_error() {
        let error = json!({
            "code": "context_length_exceeded",
            "message": "This message is too long"
        });

        let result = check_openai_context_length_error(&error);
        assert!(result.is_some());
        assert_eq!(
            result.unwrap().to_string(),
            "Context length exceeded. Message: This message is too long"
        );

        let error = json!({
            "code": "other_error",
            "message": "Some other error"
        });
        assert!(check_openai_context_length_error(&error).is_none());
    }
}
