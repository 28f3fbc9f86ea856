//! Turn controller: one inbound message in, one streamed reply out.
//!
//! ```text
//! IDLE -> DECIDING -> (SEARCHING) -> GENERATING -> IDLE
//!            \____________\_______________\-> ERROR -> IDLE
//! ```
//!
//! Acceptance is decided synchronously by [`TurnController::try_accept`],
//! which claims the session's generation flag before anything awaits. The
//! returned [`AcceptedTurn`] owns the claim, so the flag is released however
//! the turn ends.

use crate::prompt::augmented_prompt;
use crate::session::{AgentSession, GenerationGuard};
use crate::streamer::CompletionStreamer;
use chrono::Utc;
use roomcast_core::channel::{ChatTransport, InboundMessage, OutboundMessage, StatusKey, StatusSignal};
use roomcast_core::error::GenerationError;
use roomcast_core::event::{DomainEvent, EventBus};
use roomcast_core::message::Message;
use roomcast_core::search::WebSearch;
use roomcast_search::should_search;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

/// How a turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    Completed { response: String, searched: bool },
    Failed { error: GenerationError },
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// An inbound message that passed the entry checks.
///
/// Holds the session's generation claim until dropped.
#[derive(Debug)]
pub struct AcceptedTurn {
    message: InboundMessage,
    _guard: GenerationGuard,
    started: Instant,
}

impl AcceptedTurn {
    pub fn message(&self) -> &InboundMessage {
        &self.message
    }
}

/// Drives turns for one session.
pub struct TurnController {
    session: Arc<AgentSession>,
    transport: Arc<dyn ChatTransport>,
    search: Arc<dyn WebSearch>,
    streamer: CompletionStreamer,
    event_bus: Arc<EventBus>,
}

impl TurnController {
    pub fn new(
        session: Arc<AgentSession>,
        transport: Arc<dyn ChatTransport>,
        search: Arc<dyn WebSearch>,
        streamer: CompletionStreamer,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            session,
            transport,
            search,
            streamer,
            event_bus,
        }
    }

    fn conversation_id(&self) -> String {
        self.transport.conversation_id().to_string()
    }

    /// Entry check. Never awaits.
    ///
    /// Rejected events are dropped with a debug log: the session is not
    /// initialized, the text is empty, the sender is an AI, or a generation
    /// is already in flight.
    pub fn try_accept(&self, event: &InboundMessage) -> Option<AcceptedTurn> {
        if !self.session.is_initialized() {
            debug!(message_id = %event.id, "Ignoring message: agent not initialized");
            return None;
        }
        if event.ai_generated {
            debug!(message_id = %event.id, "Ignoring AI-generated message");
            return None;
        }
        if event.text.is_empty() {
            debug!(message_id = %event.id, "Ignoring message without text");
            return None;
        }

        self.session.touch();

        let Some(guard) = self.session.try_begin_generation() else {
            debug!(message_id = %event.id, "Ignoring message: generation in progress");
            return None;
        };

        Some(AcceptedTurn {
            message: event.clone(),
            _guard: guard,
            started: Instant::now(),
        })
    }

    /// Accept and run a turn on a spawned task.
    pub fn dispatch(self: &Arc<Self>, event: &InboundMessage) -> Option<JoinHandle<TurnOutcome>> {
        let turn = self.try_accept(event)?;
        let controller = Arc::clone(self);
        Some(tokio::spawn(async move { controller.run(turn).await }))
    }

    /// Accept and run a turn inline.
    pub async fn handle(&self, event: &InboundMessage) -> Option<TurnOutcome> {
        let turn = self.try_accept(event)?;
        Some(self.run(turn).await)
    }

    /// Run an accepted turn to completion.
    pub async fn run(&self, turn: AcceptedTurn) -> TurnOutcome {
        let conversation_id = self.conversation_id();
        let span = info_span!(
            "turn",
            conversation_id = %conversation_id,
            message_id = %turn.message.id,
        );

        async move {
            self.event_bus.publish(DomainEvent::TurnStarted {
                conversation_id: conversation_id.clone(),
                content_preview: turn.message.text.chars().take(80).collect(),
                timestamp: Utc::now(),
            });

            let mut anchor = None;
            match self.execute(&turn.message.text, &mut anchor).await {
                Ok((response, searched)) => {
                    let duration_ms = turn.started.elapsed().as_millis() as u64;
                    info!(chars = response.len(), searched, duration_ms, "Turn complete");
                    self.event_bus.publish(DomainEvent::TurnCompleted {
                        conversation_id,
                        model: self.streamer.model().to_string(),
                        response_chars: response.len(),
                        searched,
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                    TurnOutcome::Completed { response, searched }
                }
                Err(error) => {
                    self.fail(&error, anchor.as_ref()).await;
                    self.event_bus.publish(DomainEvent::TurnFailed {
                        conversation_id,
                        error_message: error.to_string(),
                        timestamp: Utc::now(),
                    });
                    TurnOutcome::Failed { error }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        text: &str,
        anchor: &mut Option<StatusKey>,
    ) -> Result<(String, bool), GenerationError> {
        // The model sees every earlier turn plus the (possibly augmented) query
        let mut messages = {
            let mut transcript = self.session.transcript();
            let evicted = transcript.push_user(text);
            if evicted > 0 {
                debug!(evicted, "Transcript window slid");
            }
            let mut messages = transcript.messages();
            messages.pop();
            messages
        };

        let message_id = self
            .transport
            .send_message(OutboundMessage::from_agent(""))
            .await?;
        let key = anchor
            .insert(StatusKey {
                conversation_id: self.transport.conversation_id().clone(),
                message_id,
            })
            .clone();

        debug!(phase = "deciding", anchor = %key.message_id);
        self.transport
            .send_status(&key, StatusSignal::Thinking)
            .await?;

        let searched = should_search(text);
        let input = if searched {
            debug!(phase = "searching");
            self.transport
                .send_status(&key, StatusSignal::Searching)
                .await?;
            let payload = self.search_web(text).await;
            augmented_prompt(text, &payload)
        } else {
            text.to_string()
        };

        debug!(phase = "generating");
        self.transport
            .send_status(&key, StatusSignal::Generating)
            .await?;

        messages.push(Message::user(input));
        let response = self.streamer.stream(&key.message_id, messages).await?;

        self.session.transcript().push_assistant(response.clone());
        self.transport.clear_status(&key).await?;

        Ok((response, searched))
    }

    async fn search_web(&self, query: &str) -> String {
        let started = Instant::now();
        let payload = self.search.search(query).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let degraded = serde_json::from_str::<serde_json::Value>(&payload)
            .ok()
            .is_some_and(|v| v.get("error").is_some());
        if degraded {
            warn!(backend = self.search.name(), duration_ms, "Search degraded, continuing without results");
        } else {
            debug!(backend = self.search.name(), duration_ms, bytes = payload.len(), "Search complete");
        }

        self.event_bus.publish(DomainEvent::SearchPerformed {
            conversation_id: self.conversation_id(),
            backend: self.search.name().to_string(),
            degraded,
            duration_ms,
            timestamp: Utc::now(),
        });
        payload
    }

    /// Tell the room the turn failed and drop the status indicator.
    async fn fail(&self, error: &GenerationError, anchor: Option<&StatusKey>) {
        warn!(error = %error, "Turn failed");

        let notice = OutboundMessage::from_agent(format!(
            "Sorry, I ran into a problem answering that: {error}"
        ));
        if let Err(e) = self.transport.send_message(notice).await {
            warn!(error = %e, "Failed to post error message");
        }

        if let Some(key) = anchor
            && let Err(e) = self.transport.clear_status(key).await
        {
            warn!(error = %e, "Failed to clear status");
        }
    }
}
