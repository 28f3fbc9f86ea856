//! Web search client for Tavily-compatible search APIs.
//!
//! Every outcome is returned as a JSON string. Failures become an object
//! with an `error` key so the caller can hand the payload straight to the
//! model, which then answers without search context.

use async_trait::async_trait;
use roomcast_config::SearchConfig;
use roomcast_core::search::WebSearch;
use serde::Serialize;
use tracing::{debug, warn};

pub const UNAVAILABLE_MESSAGE: &str =
    "Web search is not available. No search API key is configured.";
pub const EXCEPTION_MESSAGE: &str = "An exception occurred during the search.";

pub struct TavilySearch {
    endpoint: String,
    api_key: Option<String>,
    search_depth: String,
    max_results: u32,
    include_answer: bool,
    include_raw_content: bool,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: u32,
    include_answer: bool,
    include_raw_content: bool,
}

impl TavilySearch {
    pub fn new(config: &SearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            search_depth: config.search_depth.clone(),
            max_results: config.max_results,
            include_answer: config.include_answer,
            include_raw_content: config.include_raw_content,
            client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn error_payload(error: impl Into<String>, extra: Option<(&str, serde_json::Value)>) -> String {
        let mut payload = serde_json::json!({ "error": error.into() });
        if let Some((key, value)) = extra {
            payload[key] = value;
        }
        payload.to_string()
    }

    /// Run one search. The error is the message of whatever went wrong
    /// before a well-formed response came back.
    async fn execute(&self, api_key: &str, query: &str) -> Result<String, String> {
        let body = SearchRequest {
            query,
            search_depth: &self.search_depth,
            max_results: self.max_results,
            include_answer: self.include_answer,
            include_raw_content: self.include_raw_content,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Search request failed");
            return Ok(Self::error_payload(
                format!("Search failed with status: {}", status.as_u16()),
                Some(("details", serde_json::Value::String(details))),
            ));
        }

        // Forward the body as sent once it is known to be JSON
        let body = response.text().await.map_err(|e| e.to_string())?;
        serde_json::from_str::<serde_json::Value>(&body).map_err(|e| e.to_string())?;
        Ok(body)
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str) -> String {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!("Search requested but no API key is configured");
            return Self::error_payload(UNAVAILABLE_MESSAGE, None);
        };

        debug!(query = %query, depth = %self.search_depth, "Running web search");

        match self.execute(api_key, query).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Search request raised an exception");
                Self::error_payload(
                    EXCEPTION_MESSAGE,
                    Some(("message", serde_json::Value::String(e))),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use std::sync::{Arc, Mutex};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/search")
    }

    fn config(endpoint: String, api_key: Option<&str>) -> SearchConfig {
        SearchConfig {
            api_key: api_key.map(String::from),
            endpoint,
            ..SearchConfig::default()
        }
    }

    fn parse(payload: &str) -> serde_json::Value {
        serde_json::from_str(payload).unwrap()
    }

    #[tokio::test]
    async fn missing_key_reports_unavailable() {
        let client = TavilySearch::new(&config("http://127.0.0.1:9/search".into(), None));
        assert!(!client.is_enabled());
        let payload = parse(&client.search("news").await);
        assert_eq!(payload["error"], UNAVAILABLE_MESSAGE);
    }

    #[tokio::test]
    async fn success_body_is_returned_verbatim() {
        let captured: Arc<Mutex<Option<(serde_json::Value, String)>>> = Arc::default();
        let sink = captured.clone();
        let app = Router::new().route(
            "/search",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    let auth = headers["authorization"].to_str().unwrap().to_string();
                    *sink.lock().unwrap() = Some((body, auth));
                    Json(serde_json::json!({
                        "answer": "Sunny, 21°C",
                        "results": [{"title": "Paris weather", "url": "https://example.com"}]
                    }))
                }
            }),
        );
        let endpoint = serve(app).await;
        let client = TavilySearch::new(&config(endpoint, Some("tvly-key")));

        let payload = parse(&client.search("weather in Paris").await);
        assert_eq!(payload["answer"], "Sunny, 21°C");
        assert_eq!(payload["results"][0]["title"], "Paris weather");

        let (body, auth) = captured.lock().unwrap().clone().unwrap();
        assert_eq!(auth, "Bearer tvly-key");
        assert_eq!(body["query"], "weather in Paris");
        assert_eq!(body["search_depth"], "advanced");
        assert_eq!(body["max_results"], 5);
        assert_eq!(body["include_answer"], true);
        assert_eq!(body["include_raw_content"], false);
    }

    #[tokio::test]
    async fn success_body_keeps_key_order_and_spacing() {
        const BODY: &str = r#"{"query": "x", "answer": "y", "results": []}"#;
        let app = Router::new().route(
            "/search",
            post(|| async { ([(axum::http::header::CONTENT_TYPE, "application/json")], BODY) }),
        );
        let endpoint = serve(app).await;
        let client = TavilySearch::new(&config(endpoint, Some("tvly-key")));

        assert_eq!(client.search("x").await, BODY);
    }

    #[tokio::test]
    async fn server_error_is_encoded_in_payload() {
        let app = Router::new().route(
            "/search",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream down") }),
        );
        let endpoint = serve(app).await;
        let client = TavilySearch::new(&config(endpoint, Some("tvly-key")));

        let payload = parse(&client.search("news").await);
        assert_eq!(payload["error"], "Search failed with status: 500");
        assert_eq!(payload["details"], "upstream down");
    }

    #[tokio::test]
    async fn unparseable_body_is_an_exception() {
        let app = Router::new().route("/search", post(|| async { "not json" }));
        let endpoint = serve(app).await;
        let client = TavilySearch::new(&config(endpoint, Some("tvly-key")));

        let payload = parse(&client.search("news").await);
        assert_eq!(payload["error"], EXCEPTION_MESSAGE);
        assert!(payload["message"].is_string());
    }

    #[tokio::test]
    async fn connection_failure_is_an_exception() {
        // Nothing listens on the discard port
        let client = TavilySearch::new(&config("http://127.0.0.1:9/search".into(), Some("k")));
        let payload = parse(&client.search("news").await);
        assert_eq!(payload["error"], EXCEPTION_MESSAGE);
    }
}
