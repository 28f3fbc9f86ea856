//! Web search for Roomcast.
//!
//! - [`should_search`]: keyword/question heuristic run on every inbound message
//! - [`TavilySearch`]: client for Tavily-compatible search APIs

pub mod decision;
pub mod tavily;

pub use decision::{SEARCH_KEYWORDS, should_search};
pub use tavily::TavilySearch;
