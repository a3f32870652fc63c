mod podcast;

pub use podcast::PodcastToolkit;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

/// A named group of tools the agent can offer to the model
#[async_trait]
pub trait Toolkit: Send + Sync {
    /// Get the name of the toolkit
    fn name(&self) -> &str;

    /// Get available tools
    fn tools(&self) -> &[Tool];

    /// Execute a tool call whose arguments already passed `validate_arguments`
    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value>;
}

/// Check tool call arguments against the tool's declared JSON schema.
///
/// Covers the subset of JSON schema the toolkits declare: an object with
/// `required` keys and primitive `type`s on its properties.
pub fn validate_arguments(tool: &Tool, arguments: &Value) -> AgentResult<()> {
    let args = arguments.as_object().ok_or_else(|| {
        AgentError::InvalidParameters(format!(
            "Arguments for {} must be an object, got {}",
            tool.name, arguments
        ))
    })?;

    if let Some(required) = tool.input_schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if args.get(key).map_or(true, Value::is_null) {
                return Err(AgentError::InvalidParameters(format!(
                    "The parameter {} is required for {}",
                    key, tool.name
                )));
            }
        }
    }

    let Some(properties) = tool.input_schema.get("properties").and_then(|p| p.as_object()) else {
        return Ok(());
    };

    for (key, value) in args {
        let expected = properties
            .get(key)
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str());

        if let Some(expected) = expected {
            if !value.is_null() && !matches_type(expected, value) {
                return Err(AgentError::InvalidParameters(format!(
                    "The parameter {} for {} must be of type {}",
                    key, tool.name, expected
                )));
            }
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}
