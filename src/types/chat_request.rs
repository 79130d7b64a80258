use serde::{Deserialize, Serialize};

use crate::types::{Model, Role, Turn};

/// A message as sent to the chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message.
    pub role: Role,

    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Create a new `ChatMessage`.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self::new(turn.role, turn.content.clone())
    }
}

/// Body of a `POST /chat/completions` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// The model that will complete the conversation.
    pub model: Model,

    /// Context messages in conversational order.
    pub messages: Vec<ChatMessage>,

    /// Whether the response is streamed as server-sent events.
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Creates a streaming request.
    pub fn new(model: Model, messages: Vec<ChatMessage>) -> Self {
        Self {
            model,
            messages,
            stream: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnownModel;
    use serde_json::json;

    #[test]
    fn request_serialization() {
        let request = ChatCompletionRequest::new(
            Model::Known(KnownModel::DeepseekChat),
            vec![
                ChatMessage::system("Be brief."),
                ChatMessage::from(&Turn::user("Hello")),
            ],
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            json!({
                "model": "deepseek-chat",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hello"}
                ],
                "stream": true
            })
        );
    }
}
