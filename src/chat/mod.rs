//! The interactive chat application.
//!
//! This module provides a streaming REPL chat interface built on top of the
//! DeepSeek client. It supports:
//!
//! - Streaming responses with Markdown styling that never re-renders text
//! - Slash commands for session control and `:` input modes
//! - Transcripts saved to and loaded from Markdown files
//! - Bounded history sent with each request
//!
//! # Architecture
//!
//! - [`config`]: environment and CLI configuration
//! - [`transcript`]: the ordered record of turns and its Markdown form
//! - [`context`]: which turns go into a request, and committing replies
//! - [`stream`]: the per-reply streaming state machine
//! - [`session`]: the session object threaded through the control loop
//! - [`commands`] and [`dispatch`]: parsing and running commands
//! - [`input`]: follow-up prompts, multiline blocks, files and the clipboard

pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod input;
pub mod session;
pub mod stream;
pub mod transcript;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, SessionConfig};
pub use context::{ContextManager, ContextPolicy, DEFAULT_SYSTEM_PROMPT, ModelChange};
pub use dispatch::{Dispatcher, Flow};
pub use input::{ClipboardSource, LineSource, ScriptedLines, StaticClipboard, SystemClipboard};
pub use session::{ChatSession, ResponseOutcome, SessionStats};
pub use stream::{INTERRUPTED_MARKER, StreamState, StreamingRenderer};
pub use transcript::Transcript;
