//! Bounded conversation transcript.
//!
//! The system turn is pinned; everything after it lives in a ring buffer
//! truncated from the front, so the window slides without reallocating the
//! whole history on every overflow.

use roomcast_core::message::{Message, Role};
use std::collections::VecDeque;

/// Ordered turns fed to the model: one system turn, then user/assistant turns.
///
/// `len()` never exceeds the capacity given at construction, and the first
/// turn is always the system prompt.
#[derive(Debug, Clone)]
pub struct TranscriptBuffer {
    system: Message,
    turns: VecDeque<Message>,
    max_turns: usize,
}

impl TranscriptBuffer {
    /// Create a transcript holding only the system prompt.
    ///
    /// `max_turns` counts the system turn and is raised to 2 if smaller.
    pub fn new(system_prompt: impl Into<String>, max_turns: usize) -> Self {
        let max_turns = max_turns.max(2);
        Self {
            system: Message::system(system_prompt),
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    /// Append a turn, evicting the oldest non-system turns on overflow.
    ///
    /// Returns how many turns were evicted. System turns are not accepted
    /// here; the pinned prompt is replaced with [`Self::reset`].
    pub fn push(&mut self, message: Message) -> usize {
        debug_assert!(message.role != Role::System, "system turn is pinned");
        self.turns.push_back(message);

        let limit = self.max_turns - 1;
        if self.turns.len() <= limit {
            return 0;
        }
        let excess = self.turns.len() - limit;
        self.turns.drain(..excess);
        excess
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> usize {
        self.push(Message::user(content))
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> usize {
        self.push(Message::assistant(content))
    }

    /// Drop all turns and start over with a new system prompt.
    pub fn reset(&mut self, system_prompt: impl Into<String>) {
        self.system = Message::system(system_prompt);
        self.turns.clear();
    }

    pub fn system(&self) -> &Message {
        &self.system
    }

    /// Total turns, system turn included.
    pub fn len(&self) -> usize {
        1 + self.turns.len()
    }

    /// True while only the system turn is present.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_turns
    }

    pub fn last(&self) -> Option<&Message> {
        self.turns.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        std::iter::once(&self.system).chain(self.turns.iter())
    }

    /// Owned copy of every turn, system first.
    pub fn messages(&self) -> Vec<Message> {
        self.iter().cloned().collect()
    }}
