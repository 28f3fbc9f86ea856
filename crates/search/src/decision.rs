//! Heuristic that decides whether a message needs live web data.

/// Phrases that suggest the answer depends on current information.
pub const SEARCH_KEYWORDS: &[&str] = &[
    "search",
    "find",
    "lookup",
    "current",
    "recent",
    "news",
    "latest",
    "today",
    "yesterday",
    "this week",
    "what's new",
    "trending",
    "happening",
    "update",
    "information about",
];

/// Returns true if the text contains a search keyword or a question mark.
///
/// Matching is a case-insensitive substring test, so "searching" matches
/// "search" and "updated" matches "update".
pub fn should_search(text: &str) -> bool {
    if text.contains('?') {
        return true;
    }
    let lowered = text.to_lowercase();
    SEARCH_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}
