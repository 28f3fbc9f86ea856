//! CLI transport: the terminal as a one-person chat room.
//!
//! Reads lines from stdin as inbound messages and renders agent messages on
//! stdout. Partial updates print only the text that is new since the last
//! update, so a streamed reply appears incrementally on one line.

use async_trait::async_trait;
use roomcast_core::channel::{
    ChatTransport, InboundMessage, MessageId, OutboundMessage, StatusKey, StatusSignal,
    Subscription, SubscriptionId,
};
use roomcast_core::error::ChannelError;
use roomcast_core::message::ConversationId;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

const PROMPT: &str = "  You > ";
const ASSISTANT_PREFIX: &str = "  Assistant > ";

/// Interactive terminal transport.
pub struct CliTransport {
    conversation_id: ConversationId,
    next_id: AtomicU64,
    /// Characters of each agent message already written to stdout
    rendered: Mutex<HashMap<MessageId, usize>>,
    reader: Mutex<Option<(SubscriptionId, JoinHandle<()>)>>,
    ended: Arc<Notify>,
}

impl CliTransport {
    pub fn new() -> Self {
        Self {
            conversation_id: ConversationId::from("cli_session"),
            next_id: AtomicU64::new(0),
            rendered: Mutex::new(HashMap::new()),
            reader: Mutex::new(None),
            ended: Arc::new(Notify::new()),
        }
    }

    fn allocate_id(&self) -> String {
        format!("cli-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Resolves once the user exits (EOF or an exit command).
    pub async fn wait_for_exit(&self) {
        self.ended.notified().await;
    }

    /// Print the input prompt.
    pub fn prompt(&self) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{PROMPT}");
        let _ = out.flush();
    }

    fn write_stdout(text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{text}");
        let _ = out.flush();
    }

    fn rendered(&self) -> std::sync::MutexGuard<'_, HashMap<MessageId, usize>> {
        self.rendered.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for CliTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// The part of `text` not yet printed, or the whole text if it was rewritten.
fn unseen_suffix(text: &str, already: usize) -> &str {
    text.get(already..).unwrap_or(text)
}

fn is_exit_command(line: &str) -> bool {
    matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q")
}

#[async_trait]
impl ChatTransport for CliTransport {
    fn name(&self) -> &str {
        "cli"
    }

    fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    async fn subscribe(&self) -> Result<Subscription, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let ended = self.ended.clone();
        let id = SubscriptionId(self.allocate_id());

        let handle = tokio::spawn(async move {
            let reader = BufReader::new(io::stdin());
            let mut lines = reader.lines();
            let mut counter = 0u64;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            Self::write_stdout(PROMPT);
                            continue;
                        }
                        if is_exit_command(&line) {
                            break;
                        }

                        counter += 1;
                        let msg = InboundMessage {
                            id: MessageId(format!("stdin-{counter}")),
                            sender_id: "local_user".into(),
                            text: line,
                            ai_generated: false,
                        };

                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
            ended.notify_one();
        });

        let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, previous)) = reader.replace((id.clone(), handle)) {
            previous.abort();
        }

        Ok(Subscription { id, receiver: rx })
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), ChannelError> {
        let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        match reader.take() {
            Some((current, handle)) if &current == id => {
                handle.abort();
                Ok(())
            }
            other => {
                *reader = other;
                Err(ChannelError::UnknownSubscription(id.to_string()))
            }
        }
    }

    async fn send_message(&self, message: OutboundMessage) -> Result<MessageId, ChannelError> {
        let id = MessageId(self.allocate_id());
        if message.ai_generated && message.text.is_empty() {
            // Placeholder for a streamed reply
            Self::write_stdout(&format!("\n{ASSISTANT_PREFIX}"));
            self.rendered().insert(id.clone(), 0);
        } else if message.ai_generated {
            Self::write_stdout(&format!("\n{ASSISTANT_PREFIX}{}\n\n{PROMPT}", message.text));
        } else {
            Self::write_stdout(&format!("{}\n", message.text));
        }
        Ok(id)
    }

    async fn update_message_text(&self, id: &MessageId, text: &str) -> Result<(), ChannelError> {
        let mut rendered = self.rendered();
        let already = rendered
            .get_mut(id)
            .ok_or_else(|| ChannelError::UnknownMessage(id.to_string()))?;
        let suffix = unseen_suffix(text, *already);
        if !suffix.is_empty() {
            Self::write_stdout(suffix);
        }
        *already = text.len();
        Ok(())
    }

    async fn send_status(&self, _key: &StatusKey, status: StatusSignal) -> Result<(), ChannelError> {
        let label = match status {
            StatusSignal::Thinking => "thinking",
            StatusSignal::Searching => "searching the web",
            StatusSignal::Generating => "writing",
        };
        eprint!("[{label}] ");
        Ok(())
    }

    async fn clear_status(&self, key: &StatusKey) -> Result<(), ChannelError> {
        self.rendered().remove(&key.message_id);
        Self::write_stdout(&format!("\n\n{PROMPT}"));
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        if let Some((_, handle)) = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        self.ended.notify_one();
        Ok(())
    }
}
