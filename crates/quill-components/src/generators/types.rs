//! Output shapes shared by generators.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use quill_llm::{ChatCompletion, TokenUsage};

/// Why the model stopped generating a reply.
///
/// Known vendor values get their own variant; anything else is kept
/// verbatim in [`FinishReason::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    /// Natural stop or a stop sequence.
    Stop,
    /// Hit the token limit.
    Length,
    /// Omitted by the content filter.
    ContentFilter,
    /// The model called a tool.
    ToolCalls,
    /// Any other vendor-reported value.
    Other(String),
}

impl FinishReason {
    /// The vendor string for this reason.
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::Other(s) => s,
        }
    }
}

impl From<String> for FinishReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            "tool_calls" => FinishReason::ToolCalls,
            _ => FinishReason::Other(s),
        }
    }
}

impl From<&str> for FinishReason {
    fn from(s: &str) -> Self {
        FinishReason::from(s.to_owned())
    }
}

impl From<FinishReason> for String {
    fn from(reason: FinishReason) -> Self {
        match reason {
            FinishReason::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to one reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyMetadata {
    /// Model that produced the reply.
    pub model: String,

    /// Position of the reply among the choices.
    pub index: usize,

    /// Why generation stopped, if reported.
    pub finish_reason: Option<FinishReason>,

    /// Token usage. Streaming responses do not report it; it then
    /// serializes as `{}`.
    #[serde(serialize_with = "usage_or_empty")]
    pub usage: Option<TokenUsage>,
}

fn usage_or_empty<S: Serializer>(
    usage: &Option<TokenUsage>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match usage {
        Some(u) => u.serialize(serializer),
        None => serde_json::Map::new().serialize(serializer),
    }
}

/// One fragment of a streamed reply, as handed to the streaming callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamingChunk {
    /// Partial text. Empty for role-only or final fragments.
    pub content: String,

    /// Reply this fragment belongs to.
    pub index: usize,

    /// Model generating the stream.
    pub model: String,

    /// Set on the last fragment of a reply.
    pub finish_reason: Option<FinishReason>,
}

/// Result of a generator run: replies and their metadata, index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneratorOutput {
    /// Generated texts.
    pub replies: Vec<String>,

    /// One entry per reply, same order.
    pub metadata: Vec<ReplyMetadata>,
}

impl From<ChatCompletion> for GeneratorOutput {
    fn from(response: ChatCompletion) -> Self {
        let mut choices = response.choices;
        choices.sort_by_key(|choice| choice.index);

        let mut output = GeneratorOutput {
            replies: Vec::with_capacity(choices.len()),
            metadata: Vec::with_capacity(choices.len()),
        };
        for choice in choices {
            output.replies.push(choice.message.content);
            output.metadata.push(ReplyMetadata {
                model: response.model.clone(),
                index: choice.index,
                finish_reason: choice.finish_reason.map(FinishReason::from),
                usage: response.usage,
            });
        }
        output
    }
}
