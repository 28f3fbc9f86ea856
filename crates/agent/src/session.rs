//! Per-conversation agent state.

use crate::transcript::TranscriptBuffer;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// State owned by one agent for one conversation.
///
/// `generating` is the only concurrency guard: it is claimed with a
/// compare-and-set before the turn's first await and released by
/// [`GenerationGuard`] on every exit path.
#[derive(Debug)]
pub struct AgentSession {
    transcript: Mutex<TranscriptBuffer>,
    last_interaction: Mutex<Option<DateTime<Utc>>>,
    initialized: AtomicBool,
    generating: AtomicBool,
}

impl AgentSession {
    pub fn new(transcript: TranscriptBuffer) -> Self {
        Self {
            transcript: Mutex::new(transcript),
            last_interaction: Mutex::new(None),
            initialized: AtomicBool::new(false),
            generating: AtomicBool::new(false),
        }
    }

    /// Lock the transcript. Never held across an await.
    pub fn transcript(&self) -> MutexGuard<'_, TranscriptBuffer> {
        self.transcript.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn reset(&self, system_prompt: impl Into<String>) {
        self.transcript().reset(system_prompt);
    }

    pub fn touch(&self) {
        *self.last_interaction.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
    }

    pub fn last_interaction(&self) -> Option<DateTime<Utc>> {
        *self.last_interaction.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_initialized(&self, value: bool) {
        self.initialized.store(value, Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }

    /// Claim the session for one generation, or `None` if one is in flight.
    pub fn try_begin_generation(self: &Arc<Self>) -> Option<GenerationGuard> {
        self.generating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GenerationGuard {
                session: Arc::clone(self),
            })
    }
}

/// Releases the `generating` flag when dropped.
#[derive(Debug)]
pub struct GenerationGuard {
    session: Arc<AgentSession>,
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.session.generating.store(false, Ordering::Release);
    }
}
