use anyhow::Result;
use chatrelay::{
    agent::{Agent, AgentEvent},
    models::message::Message,
    providers::{
        configs::{OpenAiProviderConfig, ProviderConfig},
        factory::get_provider,
    },
    toolkit::PodcastToolkit,
};
use futures::TryStreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(chunks: &[Value]) -> ResponseTemplate {
    let mut body: String = chunks.iter().map(|c| format!("data: {}\n\n", c)).collect();
    body.push_str("data: [DONE]\n\n");
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

async fn openai_agent(server: &MockServer) -> Result<Agent> {
    let provider = get_provider(ProviderConfig::OpenAi(OpenAiProviderConfig {
        host: server.uri(),
        api_key: "test_api_key".to_string(),
        model: "gpt-4o-mini".to_string(),
        temperature: None,
        max_tokens: None,
    }))?;

    let mut agent = Agent::new(provider, "You are a helpful assistant.");
    agent.add_toolkit(Arc::new(PodcastToolkit::new()));
    Ok(agent)
}

#[tokio::test]
async fn test_weather_round_trip_through_openai() -> Result<()> {
    let server = MockServer::start().await;

    // Once the tool result is in the history the model answers in text
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("tool_call_id"))
        .respond_with(sse(&[
            json!({"choices": [{"index": 0, "delta": {"content": "It is mild "}}]}),
            json!({"choices": [{"index": 0, "delta": {"content": "in Paris."}, "finish_reason": "stop"}]}),
        ]))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse(&[
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "type": "function", "function": {"name": "getWeather", "arguments": "{\"location\": \"Paris\"}"}}
            ]}, "finish_reason": "tool_calls"}]}),
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let agent = openai_agent(&server).await?;
    let events: Vec<AgentEvent> = agent
        .reply(vec![
            Message::user().with_text("What's the weather in Paris?"),
        ])
        .try_collect()
        .await?;

    let result = events
        .iter()
        .find_map(|event| match event {
            AgentEvent::ToolResult { id, result } if id == "call_1" => Some(result.clone()),
            _ => None,
        })
        .expect("tool result event");
    let output = result?;
    assert_eq!(output["location"], "Paris");

    let text: String = events
        .iter()
        .filter_map(|event| match event {
            AgentEvent::TextDelta(delta) => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "It is mild in Paris.");
    assert!(matches!(
        events.last(),
        Some(AgentEvent::Finish { finish_reason, .. }) if finish_reason == "stop"
    ));
    Ok(())
}

#[tokio::test]
async fn test_rejected_request_fails_before_any_event() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"message": "Incorrect API key provided"}})),
        )
        .mount(&server)
        .await;

    let agent = openai_agent(&server).await?;
    let mut stream = agent.reply(vec![Message::user().with_text("Hi")]);

    let first = stream.try_next().await;
    assert!(first.is_err());
    assert!(first
        .unwrap_err()
        .to_string()
        .contains("Incorrect API key provided"));
    Ok(())
}
