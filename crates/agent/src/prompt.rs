//! Prompt templates.

use chrono::NaiveDate;
use roomcast_config::AgentSettings;

/// Build the system prompt for a session started on `today`.
///
/// A configured override is used verbatim except for `{date}`, which is
/// replaced with the formatted date.
pub fn system_prompt(settings: &AgentSettings, today: NaiveDate) -> String {
    let date = today.format("%A, %B %-d, %Y").to_string();

    if let Some(template) = &settings.system_prompt_override {
        return template.replace("{date}", &date);
    }

    format!(
        "You are {name}, a helpful AI assistant taking part in a group chat. \
         Today's date is {date}.\n\n\
         Answer clearly and concisely, and use Markdown only when it helps readability. \
         Some messages include web search results gathered for you. When they do, \
         base your answer on those results, prefer the most recent information, and \
         mention the sources you relied on. If the results contain an error or do \
         not cover the question, say so briefly and answer from your own knowledge.",
        name = settings.name,
    )
}

/// Wrap a user query with the serialized search payload.
pub fn augmented_prompt(query: &str, search_results: &str) -> String {
    format!(
        "User query: {query}\n\n\
         Web search results: {search_results}\n\n\
         Please provide a comprehensive answer based on the search results above."
    )
}
