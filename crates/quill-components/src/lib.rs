//! Pipeline components for quill.
//!
//! A component is a node a pipeline host can build from a persisted
//! [`ComponentDescriptor`], invoke with JSON inputs, and serialize back.
//! The crate currently ships one component family, the chat-completion
//! generators in [`generators`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use quill_components::generators::GptGenerator;
//!
//! let generator = GptGenerator::builder()
//!     .model_name("gpt-4")
//!     .generation_kwarg("max_tokens", 64)
//!     .build()?; // reads OPENAI_API_KEY
//!
//! let output = generator.run("What's Natural Language Processing?").await?;
//! println!("{}", output.replies[0]);
//! ```

pub mod callbacks;
pub mod component;
pub mod error;
pub mod generators;

pub use callbacks::{CallbackRegistry, StreamingCallback, default_streaming_callback};
pub use component::{Component, ComponentDescriptor};
pub use error::{ComponentError, Result};
pub use generators::{FinishReason, GeneratorOutput, GptGenerator, ReplyMetadata, StreamingChunk};
