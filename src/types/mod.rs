//! Wire and domain types.

pub mod chat_chunk;
pub mod chat_request;
pub mod model;
pub mod role;
pub mod stream_event;
pub mod turn;

pub use chat_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_request::{ChatCompletionRequest, ChatMessage};
pub use model::{KnownModel, Model};
pub use role::Role;
pub use stream_event::StreamEvent;
pub use turn::{Turn, TurnState};
