//! Agent lifecycle: wiring a transport, a model and search into one session.

use crate::prompt::system_prompt;
use crate::session::AgentSession;
use crate::streamer::CompletionStreamer;
use crate::transcript::TranscriptBuffer;
use crate::turn::{TurnController, TurnOutcome};
use chrono::{DateTime, Local, Utc};
use roomcast_config::AppConfig;
use roomcast_core::channel::{ChatTransport, InboundMessage, SubscriptionId};
use roomcast_core::error::{Error, Result};
use roomcast_core::event::EventBus;
use roomcast_core::message::Message;
use roomcast_core::provider::Provider;
use roomcast_core::search::WebSearch;
use roomcast_search::TavilySearch;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The running half of an initialized agent.
struct Active {
    subscription: SubscriptionId,
    listener: JoinHandle<()>,
    controller: Arc<TurnController>,
}

/// A chat agent attached to one conversation.
///
/// ```ignore
/// let agent = ChatAgent::new(config, transport);
/// agent.initialize().await?;
/// // ... the agent answers messages until:
/// agent.dispose().await;
/// ```
pub struct ChatAgent {
    config: AppConfig,
    transport: Arc<dyn ChatTransport>,
    provider: Option<Arc<dyn Provider>>,
    search: Arc<dyn WebSearch>,
    event_bus: Arc<EventBus>,
    session: Arc<AgentSession>,
    active: Mutex<Option<Active>>,
}

impl ChatAgent {
    /// Create an agent. Nothing is contacted until [`Self::initialize`].
    pub fn new(config: AppConfig, transport: Arc<dyn ChatTransport>) -> Self {
        let search: Arc<dyn WebSearch> = Arc::new(TavilySearch::new(&config.search));
        let prompt = system_prompt(&config.agent, Local::now().date_naive());
        let session = Arc::new(AgentSession::new(TranscriptBuffer::new(
            prompt,
            config.agent.max_turns,
        )));

        Self {
            config,
            transport,
            provider: None,
            search,
            event_bus: Arc::new(EventBus::default()),
            session,
            active: Mutex::new(None),
        }
    }

    /// Use this provider instead of building one from the LLM config.
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = search;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    fn active(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reset the transcript, subscribe to the room and start answering.
    ///
    /// Fails with [`Error::Config`] before subscribing when no LLM credential
    /// is configured. Calling it again replaces the previous subscription
    /// and starts a fresh transcript.
    pub async fn initialize(&self) -> Result<()> {
        let has_key = self
            .config
            .llm
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        if !has_key {
            return Err(Error::Config {
                message: "No LLM API key configured. Set ROOMCAST_API_KEY or llm.api_key in ~/.roomcast/config.toml".into(),
            });
        }

        let provider = match &self.provider {
            Some(provider) => provider.clone(),
            None => roomcast_providers::build_from_config(&self.config.llm).ok_or_else(|| {
                Error::Config {
                    message: "LLM provider could not be built from configuration".into(),
                }
            })?,
        };

        self.stop().await;

        let prompt = system_prompt(&self.config.agent, Local::now().date_naive());
        self.session.reset(prompt);

        let subscription = self.transport.subscribe().await?;

        let streamer = CompletionStreamer::new(
            provider,
            self.transport.clone(),
            &self.config.llm,
            &self.config.agent,
        );
        let controller = Arc::new(TurnController::new(
            self.session.clone(),
            self.transport.clone(),
            self.search.clone(),
            streamer,
            self.event_bus.clone(),
        ));

        self.session.set_initialized(true);

        let mut receiver = subscription.receiver;
        let listener_controller = controller.clone();
        let conversation_id = self.transport.conversation_id().clone();
        let listener = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                // Events that arrive mid-generation are rejected here
                listener_controller.dispatch(&event);
            }
            debug!(conversation_id = %conversation_id, "Message stream ended");
        });

        *self.active() = Some(Active {
            subscription: subscription.id,
            listener,
            controller,
        });

        info!(
            conversation_id = %self.transport.conversation_id(),
            transport = self.transport.name(),
            model = %self.config.llm.model,
            search = self.search.name(),
            "Agent initialized"
        );
        Ok(())
    }

    /// Stop listening and release the subscription, if any.
    async fn stop(&self) {
        let active = self.active().take();
        let Some(active) = active else {
            return;
        };
        active.listener.abort();
        if let Err(e) = self.transport.unsubscribe(&active.subscription).await {
            warn!(error = %e, subscription = %active.subscription, "Failed to unsubscribe");
        }
    }

    /// Stop answering and close the transport session.
    ///
    /// Safe to call at any point, including after a failed initialization.
    /// Teardown errors are logged and suppressed.
    pub async fn dispose(&self) {
        self.session.set_initialized(false);
        self.stop().await;
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Failed to close transport");
        }
        info!(conversation_id = %self.transport.conversation_id(), "Agent disposed");
    }

    /// Run a turn for `event` inline, bypassing the subscription.
    ///
    /// Returns `None` when the agent is not initialized or the event is
    /// rejected by the entry checks.
    pub async fn handle_message(&self, event: &InboundMessage) -> Option<TurnOutcome> {
        let controller = self.active().as_ref().map(|a| a.controller.clone())?;
        controller.handle(event).await
    }

    /// When a person last wrote to the room.
    pub fn last_interaction(&self) -> Option<DateTime<Utc>> {
        self.session.last_interaction()
    }

    /// Snapshot of the transcript, system turn first.
    pub fn transcript(&self) -> Vec<Message> {
        self.session.transcript().messages()
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_initialized()
    }

    pub fn is_generating(&self) -> bool {
        self.session.is_generating()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FixedSearch, Script, ScriptedProvider};
    use roomcast_channels::{LocalTransport, TransportCall};
    use roomcast_core::message::Role;
    use std::time::Duration;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("test-key".into());
        config
    }

    fn agent(
        config: AppConfig,
        scripts: Vec<Script>,
    ) -> (ChatAgent, Arc<LocalTransport>, Arc<ScriptedProvider>) {
        let transport = Arc::new(LocalTransport::new("room-1"));
        let provider = Arc::new(ScriptedProvider::new(scripts));
        let agent = ChatAgent::new(config, transport.clone())
            .with_provider(provider.clone())
            .with_search(Arc::new(FixedSearch::new(r#"{"results":[]}"#)));
        (agent, transport, provider)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 5s");
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_subscribing() {
        let (agent, transport, _) = agent(AppConfig::default(), vec![]);

        let err = agent.initialize().await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(transport.calls().is_empty());
        assert_eq!(transport.subscriber_count(), 0);
        assert!(!agent.is_initialized());
    }

    #[tokio::test]
    async fn blank_api_key_counts_as_missing() {
        let mut config = config();
        config.llm.api_key = Some("   ".into());
        let (agent, transport, _) = agent(config, vec![]);

        assert!(agent.initialize().await.is_err());
        assert_eq!(transport.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn initialize_starts_with_only_the_system_turn() {
        let (agent, transport, _) = agent(config(), vec![]);
        agent.initialize().await.unwrap();

        let transcript = agent.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, Role::System);
        assert!(transcript[0].content.contains("Roomcast"));
        assert_eq!(transport.subscriber_count(), 1);
        assert!(agent.is_initialized());
        assert!(agent.last_interaction().is_none());
    }

    #[tokio::test]
    async fn answers_messages_posted_to_the_room() {
        let (agent, transport, _) = agent(config(), vec![Script::text(&["Hi ", "Alice!"])]);
        agent.initialize().await.unwrap();

        transport.post("alice", "Hello agent").await;
        wait_until(|| agent.transcript().len() == 3).await;

        assert!(agent.last_interaction().is_some());
        let transcript = agent.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[2].content, "Hi Alice!");
        assert_eq!(transport.agent_messages()[0].text, "Hi Alice!");
        wait_until(|| !agent.is_generating()).await;
    }

    #[tokio::test]
    async fn reinitialize_resubscribes_and_resets() {
        let (agent, transport, _) = agent(config(), vec![Script::text(&["one"])]);
        agent.initialize().await.unwrap();
        agent
            .handle_message(&InboundMessage {
                id: roomcast_core::MessageId("m1".into()),
                sender_id: "alice".into(),
                text: "hello".into(),
                ai_generated: false,
            })
            .await
            .unwrap();
        assert_eq!(agent.transcript().len(), 3);

        agent.initialize().await.unwrap();
        assert_eq!(agent.transcript().len(), 1);
        assert_eq!(transport.subscriber_count(), 1);

        let calls = transport.calls();
        let subscribes = calls.iter().filter(|c| matches!(c, TransportCall::Subscribe(_))).count();
        let unsubscribes = calls.iter().filter(|c| matches!(c, TransportCall::Unsubscribe(_))).count();
        assert_eq!((subscribes, unsubscribes), (2, 1));
    }

    #[tokio::test]
    async fn dispose_unsubscribes_and_closes() {
        let (agent, transport, _) = agent(config(), vec![]);
        agent.initialize().await.unwrap();

        agent.dispose().await;
        assert!(!agent.is_initialized());
        assert_eq!(transport.subscriber_count(), 0);
        assert!(transport.is_closed());
        assert_eq!(transport.post("alice", "anyone?").await, 0);
    }

    #[tokio::test]
    async fn dispose_without_initialize_is_harmless() {
        let (agent, transport, _) = agent(AppConfig::default(), vec![]);
        assert!(agent.initialize().await.is_err());

        agent.dispose().await;
        assert!(transport.is_closed());
        assert!(
            !transport
                .calls()
                .iter()
                .any(|c| matches!(c, TransportCall::Unsubscribe(_)))
        );
    }

    #[tokio::test]
    async fn handle_message_requires_initialization() {
        let (agent, _, provider) = agent(config(), vec![]);
        let event = InboundMessage {
            id: roomcast_core::MessageId("m1".into()),
            sender_id: "alice".into(),
            text: "hello".into(),
            ai_generated: false,
        };
        assert!(agent.handle_message(&event).await.is_none());
        assert!(provider.requests().is_empty());
    }
}
