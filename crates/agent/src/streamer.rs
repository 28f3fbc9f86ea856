//! Completion streamer: pipes a streaming completion into an anchor message.

use roomcast_config::{AgentSettings, LlmConfig};
use roomcast_core::channel::{ChatTransport, MessageId};
use roomcast_core::error::GenerationError;
use roomcast_core::message::Message;
use roomcast_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Streams one completion and mirrors it into the room.
///
/// Partial updates of the anchor are throttled to one per
/// `partial_update_interval`; the first delta is shown immediately. A final
/// update with the full text is always sent once the stream ends.
pub struct CompletionStreamer {
    provider: Arc<dyn Provider>,
    transport: Arc<dyn ChatTransport>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    interval: Duration,
    timeout: Duration,
}

impl CompletionStreamer {
    pub fn new(
        provider: Arc<dyn Provider>,
        transport: Arc<dyn ChatTransport>,
        llm: &LlmConfig,
        settings: &AgentSettings,
    ) -> Self {
        Self {
            provider,
            transport,
            model: llm.model.clone(),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            interval: settings.partial_update_interval(),
            timeout: settings.generation_timeout(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a reply to `messages`, updating `anchor` as text arrives.
    ///
    /// Returns the accumulated text. Partial text already shown stays
    /// visible when the stream fails.
    pub async fn stream(
        &self,
        anchor: &MessageId,
        messages: Vec<Message>,
    ) -> Result<String, GenerationError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        };

        tokio::time::timeout(self.timeout, self.drive(anchor, request))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))?
    }

    async fn drive(
        &self,
        anchor: &MessageId,
        request: ProviderRequest,
    ) -> Result<String, GenerationError> {
        let mut chunks = self.provider.stream(request).await?;
        let mut full_response = String::new();
        let mut last_update: Option<Instant> = None;
        let mut partial_updates = 0usize;

        while let Some(chunk) = chunks.recv().await {
            let chunk = chunk?;

            if let Some(delta) = chunk.content.as_deref().filter(|d| !d.is_empty()) {
                full_response.push_str(delta);
                trace!(chars = full_response.len(), "Received delta");

                if last_update.is_none_or(|at| at.elapsed() >= self.interval) {
                    self.transport
                        .update_message_text(anchor, &full_response)
                        .await?;
                    last_update = Some(Instant::now());
                    partial_updates += 1;
                }
            }

            if chunk.done {
                break;
            }
        }

        self.transport
            .update_message_text(anchor, &full_response)
            .await?;

        debug!(
            message_id = %anchor,
            chars = full_response.len(),
            partial_updates,
            "Stream complete"
        );
        Ok(full_response)
    }
}
