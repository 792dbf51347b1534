//! Chat completion wire format.
//!
//! Requests are serialized as the OpenAI `POST /chat/completions` body.
//! Responses come back either as one `chat.completion` object or, when
//! streaming, as a series of `chat.completion.chunk` objects.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One message of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user" or "assistant".
    pub role: String,

    /// Message text. `null` on the wire reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of a chat completion call.
///
/// `params` holds generation options (`max_tokens`, `temperature`, `n`,
/// ...) and is written into the top level of the body as-is, so anything
/// the endpoint understands can be passed through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,

    /// Omitted from the body unless set.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,

    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// Body keys owned by [`ChatRequest`] itself.
pub const REQUEST_FIELDS: &[&str] = &["model", "messages", "stream"];

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            params: Map::new(),
        }
    }

    /// Replace the generation options. Entries named like a request field
    /// (`model`, `messages`, `stream`) are dropped so the body never
    /// carries a key twice; use [`streaming`](Self::streaming) to stream.
    pub fn with_params(mut self, mut params: Map<String, Value>) -> Self {
        for field in REQUEST_FIELDS {
            params.remove(*field);
        }
        self.params = params;
        self
    }

    /// Ask for an SSE response.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// A complete `chat.completion` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// One alternative reply within a [`ChatCompletion`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub index: usize,
    pub message: ChatMessage,

    /// "stop", "length", "content_filter", ... or absent.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token accounting reported by the endpoint. Counters the endpoint
/// leaves out read as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// One decoded SSE event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(CompletionChunk),
    /// `data: [DONE]`.
    Done,
}

/// A `chat.completion.chunk` object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,

    /// One entry per reply that advanced in this chunk. Empty on the
    /// usage-only chunk some endpoints send last.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,

    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// The part of a chunk that belongs to one reply.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub delta: Delta,

    /// Set on the last chunk of this reply.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental message content.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Delta {
    /// Only present on a reply's first chunk.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_without_params() {
        let request = ChatRequest::new(
            "gpt-3.5-turbo",
            vec![
                ChatMessage::system("You are terse."),
                ChatMessage::user("What's Natural Language Processing?"),
            ],
        );
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "You are terse."},
                    {"role": "user", "content": "What's Natural Language Processing?"}
                ]
            })
        );
    }

    #[test]
    fn params_land_at_top_level() {
        let params = json!({"max_tokens": 10, "temperature": 0.5, "stream": false})
            .as_object()
            .cloned()
            .unwrap();
        let request = ChatRequest::new("gpt-4", vec![ChatMessage::user("Hi")])
            .with_params(params)
            .streaming();

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["max_tokens"], 10);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["stream"], true);
        assert!(body.get("params").is_none());
    }

    #[test]
    fn completion_with_two_choices() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "id": "chatcmpl-abc123",
            "object": "chat.completion",
            "model": "gpt-3.5-turbo-0613",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "one"}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": null}, "finish_reason": "content_filter"}
            ],
            "usage": {"prompt_tokens": 57, "completion_tokens": 40, "total_tokens": 97}
        }))
        .unwrap();

        assert_eq!(completion.choices.len(), 2);
        assert_eq!(completion.choices[1].message.content, "");
        assert_eq!(
            completion.choices[1].finish_reason.as_deref(),
            Some("content_filter")
        );
        assert_eq!(
            completion.usage,
            Some(TokenUsage {
                prompt_tokens: 57,
                completion_tokens: 40,
                total_tokens: 97
            })
        );
    }

    #[test]
    fn completion_without_usage() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "model": "local-model",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}}]
        }))
        .unwrap();
        assert!(completion.usage.is_none());
        assert!(completion.id.is_empty());
        assert!(completion.choices[0].finish_reason.is_none());
    }

    #[test]
    fn chunk_with_missing_fields() {
        let chunk: CompletionChunk =
            serde_json::from_value(json!({"choices": [{"delta": {"content": "Hi"}}]})).unwrap();
        assert_eq!(chunk.choices[0].index, 0);
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi"));
        assert!(chunk.model.is_empty());
    }

    #[test]
    fn params_cannot_shadow_request_fields() {
        let params = json!({"model": "other", "messages": [], "top_p": 0.9})
            .as_object()
            .cloned()
            .unwrap();
        let request =
            ChatRequest::new("gpt-4", vec![ChatMessage::user("Hi")]).with_params(params);

        assert_eq!(request.params.len(), 1);
        let body = serde_json::to_string(&request).unwrap();
        assert_eq!(body.matches("\"model\"").count(), 1);
        assert_eq!(body.matches("\"messages\"").count(), 1);
        assert!(body.contains("\"model\":\"gpt-4\""));
    }

    #[test]
    fn completion_with_partial_usage() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "model": "gpt-3.5-turbo",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "total_tokens": 3}
        }))
        .unwrap();

        assert_eq!(completion.choices[0].message.content, "ok");
        assert_eq!(
            completion.usage,
            Some(TokenUsage {
                prompt_tokens: 3,
                completion_tokens: 0,
                total_tokens: 3
            })
        );
    }
}
