//! Local transport: an in-process chat room.
//!
//! Hosts embed it to drive the agent from their own event loop, and tests
//! use it as a recorder: every call the agent makes is kept in order so the
//! resulting room state can be asserted on. Embedded rooms skip the call
//! log, since a long-running room would otherwise keep every partial update.

use async_trait::async_trait;
use roomcast_core::channel::{
    ChatTransport, InboundMessage, MessageId, OutboundMessage, StatusKey, StatusSignal,
    Subscription, SubscriptionId,
};
use roomcast_core::error::ChannelError;
use roomcast_core::message::ConversationId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

/// One operation performed against the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Subscribe(SubscriptionId),
    Unsubscribe(SubscriptionId),
    Send { id: MessageId, text: String, ai_generated: bool },
    Update { id: MessageId, text: String },
    Status { key: StatusKey, status: StatusSignal },
    ClearStatus(StatusKey),
    Close,
}

/// A message as it currently appears in the room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomMessage {
    pub id: MessageId,
    pub sender_id: String,
    pub text: String,
    pub ai_generated: bool,
}

#[derive(Default)]
struct RoomState {
    subscribers: HashMap<SubscriptionId, mpsc::Sender<InboundMessage>>,
    messages: Vec<RoomMessage>,
    calls: Vec<TransportCall>,
    record_calls: bool,
    next_id: u64,
    closed: bool,
    fail_sends: bool,
}

impl RoomState {
    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn record(&mut self, call: TransportCall) {
        if self.record_calls {
            self.calls.push(call);
        }
    }
}

/// In-process transport for a single conversation.
pub struct LocalTransport {
    conversation_id: ConversationId,
    agent_id: String,
    state: Mutex<RoomState>,
}

impl LocalTransport {
    /// A room that records every call made against it.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self::with_call_log(conversation_id, true)
    }

    /// A room for hosts that keep it alive indefinitely: nothing is
    /// recorded, so [`Self::calls`], [`Self::statuses`] and
    /// [`Self::updates`] stay empty.
    pub fn embedded(conversation_id: impl Into<String>) -> Self {
        Self::with_call_log(conversation_id, false)
    }

    fn with_call_log(conversation_id: impl Into<String>, record_calls: bool) -> Self {
        Self {
            conversation_id: ConversationId(conversation_id.into()),
            agent_id: "roomcast".into(),
            state: Mutex::new(RoomState {
                record_calls,
                ..RoomState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RoomState> {
        // A poisoned lock only means a test thread panicked mid-call
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Post a message from a person and fan it out to subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    pub async fn post(&self, sender_id: &str, text: &str) -> usize {
        let (event, senders) = {
            let mut state = self.state();
            let id = MessageId(state.allocate_id("msg"));
            state.messages.push(RoomMessage {
                id: id.clone(),
                sender_id: sender_id.into(),
                text: text.into(),
                ai_generated: false,
            });
            let event = InboundMessage {
                id,
                sender_id: sender_id.into(),
                text: text.into(),
                ai_generated: false,
            };
            let senders: Vec<_> = state.subscribers.values().cloned().collect();
            (event, senders)
        };
        self.deliver_to(event, senders).await
    }

    /// Deliver a raw event without recording it in the room.
    pub async fn deliver(&self, event: InboundMessage) -> usize {
        let senders: Vec<_> = self.state().subscribers.values().cloned().collect();
        self.deliver_to(event, senders).await
    }

    async fn deliver_to(&self, event: InboundMessage, senders: Vec<mpsc::Sender<InboundMessage>>) -> usize {
        let mut delivered = 0;
        for tx in senders {
            if tx.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Make `send_message` fail until switched back.
    pub fn set_fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    /// Current room contents.
    pub fn messages(&self) -> Vec<RoomMessage> {
        self.state().messages.clone()
    }

    /// Current text of a message.
    pub fn message_text(&self, id: &MessageId) -> Option<String> {
        self.state()
            .messages
            .iter()
            .find(|m| &m.id == id)
            .map(|m| m.text.clone())
    }

    /// Messages authored by the agent.
    pub fn agent_messages(&self) -> Vec<RoomMessage> {
        self.messages().into_iter().filter(|m| m.ai_generated).collect()
    }

    /// Status signals in the order they were sent.
    pub fn statuses(&self) -> Vec<StatusSignal> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Status { status, .. } => Some(status),
                _ => None,
            })
            .collect()
    }

    /// Text of every partial or final update, in order.
    pub fn updates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Update { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

#[async_trait]
impl ChatTransport for LocalTransport {
    fn name(&self) -> &str {
        "local"
    }

    fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    async fn subscribe(&self) -> Result<Subscription, ChannelError> {
        let mut state = self.state();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        let (tx, rx) = mpsc::channel(32);
        let id = SubscriptionId(state.allocate_id("sub"));
        state.subscribers.insert(id.clone(), tx);
        state.record(TransportCall::Subscribe(id.clone()));
        debug!(conversation_id = %self.conversation_id, subscription = %id, "Subscribed");
        Ok(Subscription { id, receiver: rx })
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), ChannelError> {
        let mut state = self.state();
        state.record(TransportCall::Unsubscribe(id.clone()));
        state
            .subscribers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ChannelError::UnknownSubscription(id.to_string()))
    }

    async fn send_message(&self, message: OutboundMessage) -> Result<MessageId, ChannelError> {
        let mut state = self.state();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        if state.fail_sends {
            return Err(ChannelError::DeliveryFailed {
                channel: "local".into(),
                reason: "sends disabled".into(),
            });
        }
        let id = MessageId(state.allocate_id("msg"));
        state.messages.push(RoomMessage {
            id: id.clone(),
            sender_id: self.agent_id.clone(),
            text: message.text.clone(),
            ai_generated: message.ai_generated,
        });
        state.record(TransportCall::Send {
            id: id.clone(),
            text: message.text,
            ai_generated: message.ai_generated,
        });
        Ok(id)
    }

    async fn update_message_text(&self, id: &MessageId, text: &str) -> Result<(), ChannelError> {
        let mut state = self.state();
        let message = state
            .messages
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| ChannelError::UnknownMessage(id.to_string()))?;
        message.text = text.to_string();
        state.record(TransportCall::Update {
            id: id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_status(&self, key: &StatusKey, status: StatusSignal) -> Result<(), ChannelError> {
        self.state().record(TransportCall::Status {
            key: key.clone(),
            status,
        });
        Ok(())
    }

    async fn clear_status(&self, key: &StatusKey) -> Result<(), ChannelError> {
        self.state().record(TransportCall::ClearStatus(key.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let mut state = self.state();
        state.closed = true;
        state.subscribers.clear();
        state.record(TransportCall::Close);
        Ok(())
    }
}
