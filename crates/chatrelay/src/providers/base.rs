use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::{Message, ToolRequest};
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Add the counts of another step, keeping unknown counts unknown only if both are
    pub fn accumulate(&mut self, other: &Usage) {
        fn add(a: Option<i32>, b: Option<i32>) -> Option<i32> {
            match (a, b) {
                (Some(a), Some(b)) => Some(a + b),
                (a, None) => a,
                (None, b) => b,
            }
        }
        self.input_tokens = add(self.input_tokens, other.input_tokens);
        self.output_tokens = add(self.output_tokens, other.output_tokens);
        self.total_tokens = add(self.total_tokens, other.total_tokens);
    }
}

/// One increment of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionChunk {
    TextDelta(String),
    /// A complete tool request, emitted once all of its fragments have arrived
    ToolRequest(ToolRequest),
    Finish { reason: String, usage: Usage },
}

pub type CompletionStream = BoxStream<'static, Result<CompletionChunk>>;

/// Base trait for AI providers (OpenAI, etc)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start a streamed completion.
    ///
    /// Resolves once the upstream has accepted the request, so connection and
    /// authentication failures surface here rather than inside the stream.
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<CompletionStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_creation() {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        assert_eq!(usage.input_tokens, Some(10));
        assert_eq!(usage.output_tokens, Some(20));
        assert_eq!(usage.total_tokens, Some(30));
    }

    #[test]
    fn test_usage_accumulate() {
        let mut usage = Usage::default();
        usage.accumulate(&Usage::new(Some(10), Some(5), None));
        usage.accumulate(&Usage::new(Some(3), Some(2), Some(5)));

        assert_eq!(usage, Usage::new(Some(13), Some(7), Some(5)));
    }

    #[test]
    fn test_usage_serialization() -> Result<()> {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        let serialized = serde_json::to_string(&usage)?;
        let json_value: serde_json::Value = serde_json::from_str(&serialized)?;
        assert_eq!(json_value["input_tokens"], json!(10));
        assert_eq!(json_value["output_tokens"], json!(20));
        assert_eq!(json_value["total_tokens"], json!(30));
        Ok(())
    }
}
