//! Chat transport implementations for Roomcast.
//!
//! Real chat platforms are integrated by hosts implementing
//! `roomcast_core::ChatTransport`. This crate ships two transports:
//! - **Local**: In-process room, for embedding and for tests
//! - **CLI**: Interactive terminal chat (stdin/stdout)

pub mod cli;
pub mod local;

pub use cli::CliTransport;
pub use local::{LocalTransport, RoomMessage, TransportCall};
