//! Chat transport trait: the abstraction over chat-room sessions.
//!
//! A transport connects Roomcast to one conversation on a messaging
//! platform. It delivers "new message" events to subscribers, lets the agent
//! post and edit messages, and carries the typing/status indicator that
//! tells people in the room what the agent is doing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ChannelError;
use crate::message::ConversationId;

/// Transport-assigned identity of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for an event subscription, used to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A "new message" event delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Identity of the message in the room
    pub id: MessageId,

    /// Sender identifier (platform-specific user ID)
    pub sender_id: String,

    /// The text content (may be empty for attachments-only messages)
    #[serde(default)]
    pub text: String,

    /// Whether an AI agent authored this message
    #[serde(default)]
    pub ai_generated: bool,
}

/// A message the agent posts to the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    pub ai_generated: bool,
}

impl OutboundMessage {
    /// An agent-authored message.
    pub fn from_agent(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ai_generated: true,
        }
    }
}

/// Status indicators are keyed by conversation and anchor message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusKey {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
}

/// The agent's processing phase, shown as a transient indicator in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusSignal {
    #[serde(rename = "AI_STATE_THINKING")]
    Thinking,
    #[serde(rename = "AI_STATE_EXTERNAL_SOURCES")]
    Searching,
    #[serde(rename = "AI_STATE_GENERATING")]
    Generating,
}

impl StatusSignal {
    /// Wire name of the indicator event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thinking => "AI_STATE_THINKING",
            Self::Searching => "AI_STATE_EXTERNAL_SOURCES",
            Self::Generating => "AI_STATE_GENERATING",
        }
    }
}

impl std::fmt::Display for StatusSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An active "new message" subscription.
pub struct Subscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::Receiver<InboundMessage>,
}

/// The core transport trait.
///
/// Implementations own connection, authentication and persistence. The
/// agent only relies on the operations below.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Human-readable transport name (e.g., "local", "cli").
    fn name(&self) -> &str;

    /// The conversation this transport session is bound to.
    fn conversation_id(&self) -> &ConversationId;

    /// Subscribe to "new message" events.
    async fn subscribe(&self) -> std::result::Result<Subscription, ChannelError>;

    /// Remove a subscription. The receiver stops yielding events.
    async fn unsubscribe(&self, id: &SubscriptionId) -> std::result::Result<(), ChannelError>;

    /// Post a new message and return its identity.
    async fn send_message(&self, message: OutboundMessage) -> std::result::Result<MessageId, ChannelError>;

    /// Replace the text of an existing message.
    async fn update_message_text(&self, id: &MessageId, text: &str) -> std::result::Result<(), ChannelError>;

    /// Show a status indicator.
    async fn send_status(&self, key: &StatusKey, status: StatusSignal) -> std::result::Result<(), ChannelError>;

    /// Remove the status indicator.
    async fn clear_status(&self, key: &StatusKey) -> std::result::Result<(), ChannelError>;

    /// Close the transport session.
    async fn close(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }
}
