use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use tracing::info;

use super::Toolkit;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

const CONDITIONS: [&str; 3] = ["sunny", "cloudy", "rainy"];

/// Mock weather and podcast lookups for the podcast assistant
pub struct PodcastToolkit {
    tools: Vec<Tool>,
}

impl Default for PodcastToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl PodcastToolkit {
    pub fn new() -> Self {
        let weather_tool = Tool::new(
            "getWeather",
            "Get the current weather for a location",
            json!({
                "type": "object",
                "required": ["location"],
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "The city name, e.g., \"Paris\" or \"New York\""
                    }
                }
            }),
        );

        let podcast_tool = Tool::new(
            "getPodcastInfo",
            "Get information about a podcast or episode (mock data for testing)",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query for podcast or episode"
                    }
                }
            }),
        );

        Self {
            tools: vec![weather_tool, podcast_tool],
        }
    }

    fn weather(&self, arguments: &Value) -> AgentResult<Value> {
        let location = string_argument(arguments, "location")?;
        info!(location, "tool called: getWeather");

        // rand's thread rng is not Send, keep it out of the async call
        let mut rng = rand::thread_rng();
        let condition = CONDITIONS.choose(&mut rng).copied().unwrap_or("sunny");

        Ok(json!({
            "location": location,
            "temperature": rng.gen_range(10..30),
            "condition": condition,
            "humidity": rng.gen_range(40..80),
        }))
    }

    fn podcast_info(&self, arguments: &Value) -> AgentResult<Value> {
        let query = string_argument(arguments, "query")?;
        info!(query, "tool called: getPodcastInfo");

        Ok(json!({
            "title": "Sample Podcast Episode",
            "host": "John Doe",
            "topic": query,
            "duration": "45 minutes",
            "summary": format!("This episode discusses {} in depth with industry experts.", query),
        }))
    }
}

fn string_argument<'a>(arguments: &'a Value, key: &str) -> AgentResult<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::InvalidParameters(format!("Missing '{}' parameter", key)))
}

#[async_trait]
impl Toolkit for PodcastToolkit {
    fn name(&self) -> &str {
        "podcast"
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        match tool_call.name.as_str() {
            "getWeather" => self.weather(&tool_call.arguments),
            "getPodcastInfo" => self.podcast_info(&tool_call.arguments),
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::validate_arguments;
    use tokio_test::block_on;

    #[test]
    fn test_weather_ranges() {
        let toolkit = PodcastToolkit::new();
        for _ in 0..50 {
            let result = block_on(
                toolkit.call(ToolCall::new("getWeather", json!({"location": "Paris"}))),
            )
            .unwrap();

            assert_eq!(result["location"], "Paris");
            let temperature = result["temperature"].as_i64().unwrap();
            assert!((10..30).contains(&temperature));
            let humidity = result["humidity"].as_i64().unwrap();
            assert!((40..80).contains(&humidity));
            let condition = result["condition"].as_str().unwrap();
            assert!(CONDITIONS.contains(&condition));
        }
    }

    #[test]
    fn test_podcast_info() {
        let toolkit = PodcastToolkit::new();
        let result = block_on(toolkit.call(ToolCall::new(
            "getPodcastInfo",
            json!({"query": "rust"}),
        )))
        .unwrap();

        assert_eq!(
            result,
            json!({
                "title": "Sample Podcast Episode",
                "host": "John Doe",
                "topic": "rust",
                "duration": "45 minutes",
                "summary": "This episode discusses rust in depth with industry experts.",
            })
        );
    }

    #[test]
    fn test_unknown_tool() {
        let toolkit = PodcastToolkit::new();
        let err = block_on(toolkit.call(ToolCall::new("getStocks", json!({})))).unwrap_err();
        assert_eq!(err, AgentError::ToolNotFound("getStocks".to_string()));
    }

    #[test]
    fn test_declared_schemas_accept_their_examples() {
        let toolkit = PodcastToolkit::new();
        let weather = &toolkit.tools()[0];
        assert!(validate_arguments(weather, &json!({"location": "Paris"})).is_ok());
        assert!(validate_arguments(weather, &json!({"query": "Paris"})).is_err());

        let podcast = &toolkit.tools()[1];
        assert!(validate_arguments(podcast, &json!({"query": "rust"})).is_ok());
    }
}
