use crate::types::ChatCompletionChunk;

/// An event decoded from a chat completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of answer text.
    Text(String),

    /// A fragment of reasoning text.
    Reasoning(String),

    /// The explicit end-of-stream marker.
    Done,
}

impl StreamEvent {
    /// Converts a decoded chunk into zero, one or two events.
    pub fn from_chunk(chunk: &ChatCompletionChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(reasoning) = chunk.reasoning() {
            events.push(StreamEvent::Reasoning(reasoning.to_string()));
        }
        if let Some(content) = chunk.content() {
            events.push(StreamEvent::Text(content.to_string()));
        }
        events
    }
}
