//! LLM Provider implementations for Roomcast.
//!
//! All providers implement the `roomcast_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use roomcast_config::LlmConfig;
use std::sync::Arc;

/// Build the configured provider, or `None` when no credential is set.
pub fn build_from_config(config: &LlmConfig) -> Option<Arc<dyn roomcast_core::Provider>> {
    let api_key = config.api_key.as_ref()?;
    Some(Arc::new(OpenAiCompatProvider::for_base_url(
        &config.base_url,
        api_key.clone(),
    )))
}
