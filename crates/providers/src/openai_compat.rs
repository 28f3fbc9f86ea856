//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, Fireworks AI,
//! and any endpoint exposing a streaming `/chat/completions` route.

use async_trait::async_trait;
use futures::StreamExt;
use roomcast_core::error::ProviderError;
use roomcast_core::message::Message;
use roomcast_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Name a provider after the host it talks to.
    pub fn for_base_url(base_url: &str, api_key: impl Into<String>) -> Self {
        let name = if base_url.contains("openrouter.ai") {
            "openrouter"
        } else if base_url.contains("api.openai.com") {
            "openai"
        } else {
            "openai_compat"
        };
        Self::new(name, base_url, api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }
}

/// What a single SSE line means for the stream.
#[derive(Debug, PartialEq)]
enum SseLine {
    /// Blank line, comment, or a field we don't care about
    Skip,
    /// `data: [DONE]`
    Done,
    /// `data: {...}`
    Data(String),
}

fn classify_line(line: &str) -> SseLine {
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    match line.strip_prefix("data:") {
        Some(data) => {
            let data = data.trim();
            if data == "[DONE]" {
                SseLine::Done
            } else {
                SseLine::Data(data.to_string())
            }
        }
        None => SseLine::Skip,
    }
}

/// Take the next complete line off the front of `buffer`.
///
/// Bytes stay buffered until their newline arrives, so a character split
/// across network chunks is decoded whole. The trailing `\r` is dropped.
fn next_line(buffer: &mut Vec<u8>) -> Option<Result<String, std::string::FromUtf8Error>> {
    let line_end = buffer.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=line_end).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(String::from_utf8(line))
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(provider = %self.name, model = %request.model, messages = request.messages.len(), "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Read the SSE byte stream and forward text deltas
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.extend_from_slice(&bytes);

                while let Some(line) = next_line(&mut buffer) {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            let _ = tx
                                .send(Err(ProviderError::StreamInterrupted(format!(
                                    "invalid UTF-8 in event stream: {e}"
                                ))))
                                .await;
                            return;
                        }
                    };

                    let data = match classify_line(&line) {
                        SseLine::Skip => continue,
                        SseLine::Done => {
                            let _ = tx.send(Ok(StreamChunk::done())).await;
                            return;
                        }
                        SseLine::Data(data) => data,
                    };

                    match serde_json::from_str::<StreamResponse>(&data) {
                        Ok(stream_resp) => {
                            if let Some(error) = stream_resp.error {
                                let _ = tx
                                    .send(Err(ProviderError::StreamInterrupted(error.message)))
                                    .await;
                                return;
                            }

                            let content = stream_resp
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|choice| choice.delta.content)
                                .filter(|c| !c.is_empty());

                            if let Some(content) = content {
                                if tx.send(Ok(StreamChunk::delta(content))).await.is_err() {
                                    return; // receiver dropped
                                }
                            }

                            if let Some(usage) = stream_resp.usage {
                                let _ = tx
                                    .send(Ok(StreamChunk {
                                        content: None,
                                        done: true,
                                        usage: Some(Usage {
                                            prompt_tokens: usage.prompt_tokens,
                                            completion_tokens: usage.completion_tokens,
                                            total_tokens: usage.total_tokens,
                                        }),
                                    }))
                                    .await;
                                return;
                            }
                        }
                        Err(e) => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(StreamChunk::done())).await;
        });

        Ok(rx)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    /// Some gateways report mid-stream failures in-band
    #[serde(default)]
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::{Body, Bytes};
    use axum::http::StatusCode;
    use axum::routing::post;
    use std::time::Duration;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn request(messages: Vec<Message>) -> ProviderRequest {
        ProviderRequest {
            model: "test-model".into(),
            messages,
            temperature: 0.7,
            max_tokens: None,
            stream: true,
        }
    }

    async fn collect(mut rx: ChunkReceiver) -> (String, bool) {
        let mut text = String::new();
        let mut done = false;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            if let Some(content) = chunk.content {
                text.push_str(&content);
            }
            if chunk.done {
                done = true;
                break;
            }
        }
        (text, done)
    }

    #[test]
    fn openrouter_constructor() {
        let provider = OpenAiCompatProvider::openrouter("sk-test");
        assert_eq!(provider.name(), "openrouter");
        assert!(provider.base_url.contains("openrouter.ai"));
    }

    #[test]
    fn provider_named_after_base_url() {
        assert_eq!(OpenAiCompatProvider::for_base_url("https://api.openai.com/v1/", "k").name(), "openai");
        let custom = OpenAiCompatProvider::for_base_url("http://localhost:8000/v1/", "k");
        assert_eq!(custom.name(), "openai_compat");
        assert_eq!(custom.base_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn request_body_enables_streaming() {
        let mut req = request(vec![Message::user("hi")]);
        req.max_tokens = Some(256);
        let body = OpenAiCompatProvider::request_body(&req);
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 256);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn classify_sse_lines() {
        assert_eq!(classify_line(""), SseLine::Skip);
        assert_eq!(classify_line(": keep-alive"), SseLine::Skip);
        assert_eq!(classify_line("event: message"), SseLine::Skip);
        assert_eq!(classify_line("data: [DONE]"), SseLine::Done);
        assert_eq!(classify_line("data:{\"a\":1}"), SseLine::Data("{\"a\":1}".into()));
    }

    #[test]
    fn lines_wait_for_their_newline() {
        let cafe = "café".as_bytes();
        let split = cafe.len() - 1;

        let mut buffer = b"data: caf".to_vec();
        buffer.extend_from_slice(&cafe[3..split]);
        assert!(next_line(&mut buffer).is_none());

        buffer.extend_from_slice(&cafe[split..]);
        buffer.extend_from_slice(b"\r\n\nrest");
        assert_eq!(next_line(&mut buffer).unwrap().unwrap(), "data: café");
        assert_eq!(next_line(&mut buffer).unwrap().unwrap(), "");
        assert!(next_line(&mut buffer).is_none());
        assert_eq!(buffer, b"rest");
    }

    #[test]
    fn invalid_utf8_line_is_an_error() {
        let mut buffer = vec![b'd', 0xff, b'\n'];
        assert!(next_line(&mut buffer).unwrap().is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn parse_stream_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hello"));
    }

    #[test]
    fn parse_stream_usage() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn parse_inband_error() {
        let data = r#"{"error":{"message":"upstream overloaded","code":502}}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.error.unwrap().message, "upstream overloaded");
    }

    #[tokio::test]
    async fn streams_deltas_from_sse_endpoint() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                concat!(
                    ": ping\n\n",
                    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"Bonjour\"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\" Paris\"}}]}\n\n",
                    "data: [DONE]\n\n",
                )
            }),
        );
        let base = serve(app).await;
        let provider = OpenAiCompatProvider::new("test", base, "sk-test");

        let rx = provider.stream(request(vec![Message::user("hi")])).await.unwrap();
        let (text, done) = collect(rx).await;
        assert_eq!(text, "Bonjour Paris");
        assert!(done);
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks_survives() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n\ndata: [DONE]\n\n";
        let split = event.find('é').unwrap() + 1;
        let parts = vec![
            Bytes::copy_from_slice(&event.as_bytes()[..split]),
            Bytes::copy_from_slice(&event.as_bytes()[split..]),
        ];
        assert!(std::str::from_utf8(&parts[0]).is_err());

        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let parts = parts.clone();
                async move {
                    let chunks = futures::stream::iter(parts).then(|part| async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, std::io::Error>(part)
                    });
                    Body::from_stream(chunks)
                }
            }),
        );
        let base = serve(app).await;
        let provider = OpenAiCompatProvider::new("test", base, "sk-test");

        let (text, done) = collect(provider.stream(request(vec![])).await.unwrap()).await;
        assert_eq!(text, "café");
        assert!(done);
    }

    #[tokio::test]
    async fn stream_without_done_marker_still_terminates() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n" }),
        );
        let base = serve(app).await;
        let provider = OpenAiCompatProvider::new("test", base, "sk-test");

        let (text, done) = collect(provider.stream(request(vec![])).await.unwrap()).await;
        assert_eq!(text, "partial");
        assert!(done);
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = serve(app).await;
        let provider = OpenAiCompatProvider::new("test", base, "sk-test");

        match provider.stream(request(vec![])).await {
            Err(ProviderError::ApiError { status_code, message }) => {
                assert_eq!(status_code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected ApiError, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn unauthorized_is_authentication_failure() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { StatusCode::UNAUTHORIZED }),
        );
        let base = serve(app).await;
        let provider = OpenAiCompatProvider::new("test", base, "bad");

        assert!(matches!(
            provider.stream(request(vec![])).await,
            Err(ProviderError::AuthenticationFailed(_))
        ));
    }
}
