//! A terminal chat client for the DeepSeek API.
//!
//! The library holds everything the `chatting` binary is built from: the
//! streaming HTTP client, the incremental Markdown renderer, the transcript
//! store and the chat session with its commands.

// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod markdown;
pub mod render;
pub mod types;
pub mod utils;

mod observability;
mod sse;

// Re-exports
pub use client::{ChatBackend, DeepSeek, EventStream, ScriptedBackend};
pub use error::{Error, Result};
pub use markdown::{RenderBuffer, Span, SpanStyle};
pub use observability::register_biometrics;
pub use render::{RecordingRenderer, Renderer, TerminalRenderer};
pub use types::*;
