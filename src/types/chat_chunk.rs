use serde::{Deserialize, Serialize};

/// One `data:` payload of a streamed chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Completion identifier, repeated on every chunk.
    #[serde(default)]
    pub id: Option<String>,

    /// The model that produced the chunk.
    #[serde(default)]
    pub model: Option<String>,

    /// Incremental choices; the client only reads the first.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// A streamed choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index.
    #[serde(default)]
    pub index: u32,

    /// The new text for this choice.
    #[serde(default)]
    pub delta: ChunkDelta,

    /// Set on the last chunk of a choice (`stop`, `length`, ...).
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The incremental part of a streamed choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Answer text.
    #[serde(default)]
    pub content: Option<String>,

    /// Reasoning text emitted by reasoning models before the answer.
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

impl ChatCompletionChunk {
    /// The answer text carried by the first choice, if non-empty.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|text| !text.is_empty())
    }

    /// The reasoning text carried by the first choice, if non-empty.
    pub fn reasoning(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.reasoning_content.as_deref())
            .filter(|text| !text.is_empty())
    }
}
