//! The Roomcast turn pipeline.
//!
//! A [`ChatAgent`] joins one conversation and answers each message people
//! post there:
//!
//! 1. **Accept** the message if no reply is being generated
//! 2. **Post** an empty placeholder reply and show a "thinking" status
//! 3. **Search** the web when the message looks like it needs fresh facts
//! 4. **Stream** the completion into the placeholder, throttling edits
//! 5. **Record** the exchange in a sliding-window transcript
//!
//! Messages that arrive while a reply is streaming are ignored.

pub mod agent;
pub mod prompt;
pub mod session;
pub mod streamer;
pub mod transcript;
pub mod turn;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::ChatAgent;
pub use prompt::{augmented_prompt, system_prompt};
pub use session::{AgentSession, GenerationGuard};
pub use streamer::CompletionStreamer;
pub use transcript::TranscriptBuffer;
pub use turn::{AcceptedTurn, TurnController, TurnOutcome};
