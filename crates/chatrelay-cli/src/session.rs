use chatrelay::conversation::Conversation;
use chatrelay::reconcile::{reconcile, ReconcileOutcome, StreamFormat};
use reqwest::header::CONTENT_TYPE;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::client::RelayClient;

/// What became of a submitted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Empty input, or a request was already in flight. Nothing was sent.
    Ignored,
    Completed(ReconcileOutcome),
    /// The request failed; the conversation holds an error message for it
    Failed(String),
}

/// The chat state behind the terminal page
pub struct ChatSession {
    client: RelayClient,
    conversation: Mutex<Conversation>,
    is_loading: AtomicBool,
}

// Clears the busy flag however the submission ends
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ChatSession {
    pub fn new(client: RelayClient) -> Self {
        Self {
            client,
            conversation: Mutex::new(Conversation::new()),
            is_loading: AtomicBool::new(false),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::SeqCst)
    }

    /// A copy of the conversation as it stands
    pub async fn conversation(&self) -> Conversation {
        self.conversation.lock().await.clone()
    }

    /// Send `text` as the next user message and stream the reply into the conversation.
    ///
    /// `on_update` sees the conversation after every change. While a submission is
    /// in flight further submissions are ignored.
    pub async fn submit<F>(&self, text: &str, mut on_update: F) -> Submission
    where
        F: FnMut(&Conversation),
    {
        let text = text.trim();
        if text.is_empty() {
            return Submission::Ignored;
        }
        if self.is_loading.swap(true, Ordering::SeqCst) {
            tracing::debug!("submission ignored while a reply is streaming");
            return Submission::Ignored;
        }
        let _loading = LoadingGuard(&self.is_loading);

        let mut conversation = self.conversation.lock().await;
        conversation.push_user(text);
        on_update(&*conversation);

        let response = match self.client.send(conversation.messages()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("chat request failed: {}", e);
                conversation.push_error(e.to_string());
                on_update(&*conversation);
                return Submission::Failed(e.to_string());
            }
        };

        let format = StreamFormat::from_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );

        match reconcile(
            Box::pin(response.bytes_stream()),
            &mut *conversation,
            format,
            &mut on_update,
        )
        .await
        {
            Ok(outcome) => Submission::Completed(outcome),
            Err(e) => {
                tracing::error!("reading the reply failed: {}", e);
                conversation.push_error(e.to_string());
                on_update(&*conversation);
                Submission::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Endpoint;
    use chatrelay::models::role::Role;
    use chatrelay::reconcile::Termination;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event_stream(frames: &[&str]) -> ResponseTemplate {
        let body: String = frames.iter().map(|f| format!("data: {}\n\n", f)).collect();
        ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
    }

    #[tokio::test]
    async fn test_submit_streams_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat-with-tools"))
            .respond_with(event_stream(&[
                r#"{"type":"start","messageId":"m1"}"#,
                r#"{"type":"text-delta","id":"t0","delta":"Hel"}"#,
                r#"{"type":"text-delta","id":"t0","delta":"lo"}"#,
                "[DONE]",
            ]))
            .mount(&server)
            .await;

        let session = ChatSession::new(RelayClient::new(&server.uri(), Endpoint::Tools));
        let mut updates = 0;
        let result = session.submit("Hi", |_| updates += 1).await;

        match result {
            Submission::Completed(outcome) => {
                assert_eq!(outcome.termination, Termination::Sentinel);
                assert_eq!(outcome.deltas, 2);
            }
            other => panic!("Expected completion, got {:?}", other),
        }
        // the user message, then one update per delta
        assert_eq!(updates, 3);

        let conversation = session.conversation().await;
        assert_eq!(conversation.messages().len(), 2);
        let last = conversation.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.text(), "Hello");
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_submit_plain_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat-simple"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain; charset=utf-8")
                    .set_body_string("Hello there"),
            )
            .mount(&server)
            .await;

        let session = ChatSession::new(RelayClient::new(&server.uri(), Endpoint::Simple));
        let result = session.submit("Hi", |_| {}).await;

        assert!(matches!(
            result,
            Submission::Completed(ReconcileOutcome {
                termination: Termination::ConnectionClosed,
                ..
            })
        ));
        let conversation = session.conversation().await;
        assert_eq!(conversation.last().unwrap().text(), "Hello there");
    }

    #[tokio::test]
    async fn test_failure_becomes_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "upstream down"})),
            )
            .mount(&server)
            .await;

        let session = ChatSession::new(RelayClient::new(&server.uri(), Endpoint::Tools));
        let result = session.submit("Hi", |_| {}).await;

        assert_eq!(result, Submission::Failed("upstream down".to_string()));
        let conversation = session.conversation().await;
        assert_eq!(conversation.last().unwrap().text(), "Error: upstream down");
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_submit_while_loading_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                event_stream(&[r#"{"type":"text-delta","delta":"slow"}"#, "[DONE]"])
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = Arc::new(ChatSession::new(RelayClient::new(
            &server.uri(),
            Endpoint::Tools,
        )));

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.submit("first", |_| {}).await })
        };
        while !session.is_loading() {
            tokio::task::yield_now().await;
        }

        let second = session.submit("second", |_| {}).await;
        assert_eq!(second, Submission::Ignored);

        let first = first.await.unwrap();
        assert!(matches!(first, Submission::Completed(_)));

        let conversation = session.conversation().await;
        let texts: Vec<String> = conversation.messages().iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["first", "slow"]);

        // verifies the single request
        server.verify().await;
    }

    #[tokio::test]
    async fn test_empty_input_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let session = ChatSession::new(RelayClient::new(&server.uri(), Endpoint::Tools));
        assert_eq!(session.submit("   ", |_| {}).await, Submission::Ignored);
    }
}
