//! `roomcast search`: run the search client once.

use roomcast_config::AppConfig;
use roomcast_core::search::WebSearch;
use roomcast_search::{TavilySearch, should_search};

pub async fn run(query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let client = TavilySearch::new(&config.search);

    if !should_search(query) {
        eprintln!("  note: the agent would not search for this message");
    }

    let payload = client.search(query).await;
    println!("{}", pretty(&payload));
    Ok(())
}

/// Pretty-print JSON payloads, pass anything else through.
fn pretty(payload: &str) -> String {
    serde_json::from_str::<serde_json::Value>(payload)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| payload.to_string())
}
