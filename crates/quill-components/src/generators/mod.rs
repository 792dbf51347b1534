//! Text generators backed by chat completion APIs.

mod openai;
mod types;

pub use openai::{DEFAULT_API_BASE_URL, DEFAULT_MODEL_NAME, GptGenerator, GptGeneratorBuilder};
pub use types::{FinishReason, GeneratorOutput, ReplyMetadata, StreamingChunk};
