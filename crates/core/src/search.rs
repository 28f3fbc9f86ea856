//! Web search trait.
//!
//! Search never fails at this boundary: implementations encode errors
//! in-band as a JSON object with an `error` key, so a broken search
//! degrades the answer instead of aborting the turn.

use async_trait::async_trait;

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Name of the search backend (e.g., "tavily").
    fn name(&self) -> &str;

    /// Run a query and return the serialized result or error payload.
    async fn search(&self, query: &str) -> String;
}
