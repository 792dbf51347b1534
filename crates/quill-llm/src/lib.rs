//! Chat completion client for quill.
//!
//! This crate is the transport under the quill generator components: it
//! serializes chat completion requests, sends them to an OpenAI-compatible
//! endpoint, turns HTTP failures into [`ApiError`]s, and decodes both plain
//! JSON completions and SSE streams. It never retries.
//!
//! - [`ChatBackend`]: the async seam generators call through
//! - [`OpenAiClient`]: the `reqwest` implementation
//! - [`Endpoint`]: base URL, key variable, headers, timeout
//! - [`ApiKey`]: a key that never shows up in logs
//! - [`SseDecoder`]: byte-level `text/event-stream` decoding
//!
//! ```rust,ignore
//! use quill_llm::{ChatBackend, ChatMessage, ChatRequest, Endpoint, OpenAiClient};
//!
//! let client = OpenAiClient::from_env(Endpoint::openai())?;
//! let request = ChatRequest::new("gpt-3.5-turbo", vec![ChatMessage::user("What is Rust?")]);
//! let completion = client.complete(&request).await?;
//! println!("{}", completion.choices[0].message.content);
//! ```

pub mod backend;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod secret;
pub mod sse;
pub mod wire;

pub use backend::ChatBackend;
pub use client::OpenAiClient;
pub use endpoint::{Endpoint, OPENAI_API_KEY_ENV, OPENAI_BASE_URL};
pub use error::{ApiError, Result};
pub use secret::ApiKey;
pub use sse::{SseDecoder, decode_line};
pub use wire::{
    ChatCompletion, ChatMessage, ChatRequest, ChunkChoice, CompletionChoice, CompletionChunk,
    Delta, StreamEvent, TokenUsage,
};
