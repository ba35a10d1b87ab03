use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::config::ServiceConfig;
use crate::error::GenerationError;
use crate::models::{ChatReply, PromptRequest};
use crate::telemetry;

/**
 * \brief Anything able to answer a prompt. The server holds one behind an `Arc`.
 */
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn generate(&self, request: &PromptRequest) -> Result<ChatReply, GenerationError>;

    /** \brief Model identifier reported by `/health`. */
    fn model(&self) -> &str;
}

/**
 * \brief OpenAI-compatible chat-completions client.
 */
#[derive(Debug, Clone)]
pub struct CompletionsClient {
    http: reqwest::Client,
    config: Arc<ServiceConfig>,
}

impl CompletionsClient {
    pub fn new(config: Arc<ServiceConfig>) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

#[async_trait]
impl ChatBackend for CompletionsClient {
    async fn generate(&self, request: &PromptRequest) -> Result<ChatReply, GenerationError> {
        chat_once(&self.http, &self.config, request).await
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/**
 * \brief Non-streaming call returning the first choice's content.
 */
pub async fn chat_once(
    http: &reqwest::Client,
    config: &ServiceConfig,
    request: &PromptRequest,
) -> Result<ChatReply, GenerationError> {
    let body = json!({
        "model": config.model,
        "messages": request.messages(),
        "temperature": request.params.temperature,
        "top_p": request.params.top_p,
    });

    tracing::debug!(
        model = %config.model,
        prompt_len = request.prompt.len(),
        "sending chat completion"
    );

    let resp = http
        .post(config.completions_url())
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json")
        .header(AUTHORIZATION, format!("Bearer {}", config.api_token()))
        .json(&body)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(GenerationError::Status { status, body });
    }
    let text = resp.text().await?;
    let v: Value = serde_json::from_str(&text)
        .map_err(|e| GenerationError::Decode(format!("invalid JSON ({}): {}", e, text)))?;
    extract_openai_content(&v).map(|text| ChatReply { text })
}

/**
 * \brief Runs a generation and logs the failure, leaving the rendering to the caller.
 */
pub async fn generate(
    backend: &dyn ChatBackend,
    request: &PromptRequest,
) -> Result<ChatReply, GenerationError> {
    let result = backend.generate(request).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Error in generate_response");
        telemetry::log_error("llm.generate", &e.to_string());
    }
    result
}

/** \brief In-band text used when a provider failure is reported as a normal answer. */
pub fn apology(err: &GenerationError) -> String {
    format!("I apologize, but I encountered an error: {}", err)
}

fn extract_openai_content(v: &Value) -> Result<String, GenerationError> {
    let first = v
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| GenerationError::Decode(format!("missing choices in {}", v)))?
        .first()
        .ok_or(GenerationError::EmptyChoices)?;
    first
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| GenerationError::Decode(format!("choice has no message content: {}", first)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenerationParams;
    use mockito::Matcher;

    fn client_for(url: &str) -> CompletionsClient {
        let config = ServiceConfig::new(url, "openai/gpt-4.1-turbo", "test-token");
        CompletionsClient::new(Arc::new(config)).unwrap()
    }

    fn hello() -> PromptRequest {
        PromptRequest::new("Hello", GenerationParams::default()).unwrap()
    }

    #[tokio::test]
    async fn sends_two_turns_and_returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::PartialJson(json!({
                "model": "openai/gpt-4.1-turbo",
                "temperature": 1.0,
                "top_p": 1.0,
                "messages": [
                    {"role": "system", "content": crate::models::DEFAULT_SYSTEM_MESSAGE},
                    {"role": "user", "content": "Hello"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"}},{"message":{"content":"ignored"}}]}"#)
            .expect(1)
            .create_async()
            .await;

        let reply = client_for(&server.url()).generate(&hello()).await.unwrap();
        assert_eq!(reply.text, "Hi there");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("bad credentials")
            .create_async()
            .await;

        let err = client_for(&server.url()).generate(&hello()).await.unwrap_err();
        match &err {
            GenerationError::Status { status, body } => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body, "bad credentials");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(apology(&err).contains("bad credentials"));
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let err = client_for(&server.url()).generate(&hello()).await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyChoices));
    }

    #[tokio::test]
    async fn non_json_body_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = client_for(&server.url()).generate(&hello()).await.unwrap_err();
        match &err {
            GenerationError::Decode(msg) => assert!(msg.contains("maintenance")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(apology(&err).contains("unexpected response payload"));
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_transport_error() {
        let err = client_for("http://127.0.0.1:1").generate(&hello()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
    }

    #[test]
    fn apology_embeds_the_error() {
        let text = apology(&GenerationError::Decode("boom".to_string()));
        assert!(text.starts_with("I apologize, but I encountered an error: "));
        assert!(text.contains("boom"));
    }

    #[test]
    fn content_without_message_is_decode_error() {
        let v = json!({"choices": [{"text": "legacy"}]});
        assert!(matches!(
            extract_openai_content(&v),
            Err(GenerationError::Decode(_))
        ));
    }
}
