//! # Roomcast Core
//!
//! Domain types, traits, and error definitions for the Roomcast chat agent.
//! This crate has **no HTTP or platform dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (chat transport, LLM provider, web search) is
//! defined as a trait here. Implementations live in their respective crates,
//! so the turn pipeline can be driven by real services or by test doubles.

pub mod channel;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod search;

// Re-export key types at crate root for ergonomics
pub use channel::{
    ChatTransport, InboundMessage, MessageId, OutboundMessage, StatusKey, StatusSignal,
    Subscription, SubscriptionId,
};
pub use error::{ChannelError, Error, GenerationError, ProviderError, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{ConversationId, Message, Role};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk, Usage};
pub use search::WebSearch;
