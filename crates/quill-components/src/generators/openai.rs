//! [`GptGenerator`]: a text generator over the OpenAI chat completion API.
//!
//! The generator sends a single user prompt (optionally preceded by a system
//! prompt) and returns the model's replies plus per-reply metadata. With a
//! streaming callback configured, every streamed fragment is handed to the
//! callback before the full replies are assembled.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use quill_llm::{
    ApiKey, ChatBackend, ChatMessage, ChatRequest, CompletionChunk, Endpoint, OPENAI_API_KEY_ENV,
    OpenAiClient, StreamEvent,
};

use crate::callbacks::{CallbackRegistry, StreamingCallback};
use crate::component::{Component, ComponentDescriptor};
use crate::error::{ComponentError, Result};
use crate::generators::types::{FinishReason, GeneratorOutput, ReplyMetadata, StreamingChunk};

/// Model used when none is configured.
pub const DEFAULT_MODEL_NAME: &str = "gpt-3.5-turbo";

/// OpenAI endpoint used when none is configured.
pub const DEFAULT_API_BASE_URL: &str = quill_llm::OPENAI_BASE_URL;

/// Buffered stream events between the HTTP reader and the callback.
const STREAM_BUFFER: usize = 64;

/// Request fields the generator sets itself; they cannot be options.
const RESERVED_OPTIONS: &[&str] = &["model", "messages"];

/// Generates text with an OpenAI chat model.
///
/// ```rust,ignore
/// let generator = GptGenerator::builder()
///     .api_key("sk-...")
///     .model_name("gpt-4")
///     .generation_kwarg("max_tokens", 10)
///     .build()?;
/// let output = generator.run("What's Natural Language Processing?").await?;
/// ```
pub struct GptGenerator {
    model_name: String,
    api_base_url: String,
    system_prompt: Option<String>,
    streaming_callback: Option<StreamingCallback>,
    generation_kwargs: Map<String, Value>,
    backend: Arc<dyn ChatBackend>,
}

/// Persisted constructor parameters. Unknown keys are generation options.
#[derive(Debug, Deserialize)]
struct GptGeneratorParams {
    #[serde(default = "default_model_name")]
    model_name: String,
    #[serde(default)]
    streaming_callback: Option<String>,
    #[serde(default = "default_api_base_url")]
    api_base_url: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(flatten)]
    generation_kwargs: Map<String, Value>,
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_owned()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_owned()
}

impl GptGenerator {
    /// Start configuring a generator.
    pub fn builder() -> GptGeneratorBuilder {
        GptGeneratorBuilder::default()
    }

    /// Model identifier sent with every request.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Base URL of the chat completion API.
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// System prompt prepended to every request, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// The configured streaming callback, if any.
    pub fn streaming_callback(&self) -> Option<&StreamingCallback> {
        self.streaming_callback.as_ref()
    }

    /// Generation options merged into every request.
    pub fn generation_kwargs(&self) -> &Map<String, Value> {
        &self.generation_kwargs
    }

    /// Generate replies for `prompt` with the configured options.
    pub async fn run(&self, prompt: &str) -> Result<GeneratorOutput> {
        self.run_with(prompt, None).await
    }

    /// Generate replies for `prompt`, letting `overrides` replace configured
    /// generation options for this call only.
    ///
    /// # Errors
    ///
    /// [`ComponentError::InvalidInput`] if the merged options try to set
    /// `model` or `messages`. Remote failures are returned as
    /// [`ComponentError::Api`] without any retry. Truncated or filtered replies are not errors; they are
    /// logged and returned.
    pub async fn run_with(
        &self,
        prompt: &str,
        overrides: Option<&Map<String, Value>>,
    ) -> Result<GeneratorOutput> {
        let mut params = self.generation_kwargs.clone();
        if let Some(overrides) = overrides {
            params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(key) = RESERVED_OPTIONS.iter().find(|key| params.contains_key(**key)) {
            return Err(ComponentError::InvalidInput(format!(
                "'{key}' cannot be passed as a generation option"
            )));
        }
        // Streaming is decided by the callback, not by generation options.
        if params.remove("stream").is_some() {
            debug!("ignoring 'stream' generation option");
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = &self.system_prompt {
            messages.push(ChatMessage::system(system_prompt.as_str()));
        }
        messages.push(ChatMessage::user(prompt));

        let request = ChatRequest::new(&self.model_name, messages).with_params(params);

        let output = match &self.streaming_callback {
            Some(callback) => self.run_streaming(request.streaming(), callback).await?,
            None => GeneratorOutput::from(self.backend.complete(&request).await?),
        };

        debug!(
            model = %self.model_name,
            replies = output.replies.len(),
            streaming = self.streaming_callback.is_some(),
            "generation finished"
        );

        for metadata in &output.metadata {
            check_finish_reason(metadata);
        }

        Ok(output)
    }

    async fn run_streaming(
        &self,
        request: ChatRequest,
        callback: &StreamingCallback,
    ) -> Result<GeneratorOutput> {
        let (tx, mut rx) = mpsc::channel::<StreamEvent>(STREAM_BUFFER);

        let producer = self.backend.complete_stream(&request, tx);
        let consumer = async {
            let mut replies = ReplyAccumulator::default();
            while let Some(event) = rx.recv().await {
                let StreamEvent::Chunk(chunk) = event else {
                    continue;
                };
                for fragment in replies.fragments(chunk) {
                    callback.call(&fragment);
                    replies.push(fragment);
                }
            }
            replies
        };

        let (result, replies) = tokio::join!(producer, consumer);
        result?;
        Ok(replies.finish())
    }
}

/// Log a warning for replies that did not end naturally.
pub(crate) fn check_finish_reason(metadata: &ReplyMetadata) {
    match metadata.finish_reason {
        Some(FinishReason::Length) => warn!(
            index = metadata.index,
            model = %metadata.model,
            "completion truncated before reaching a natural stopping point; \
             increase max_tokens to allow longer completions"
        ),
        Some(FinishReason::ContentFilter) => warn!(
            index = metadata.index,
            model = %metadata.model,
            "completion truncated by the content filter"
        ),
        _ => {}
    }
}

/// Per-index assembly of streamed fragments.
#[derive(Default)]
struct ReplyAccumulator {
    model: String,
    replies: BTreeMap<usize, PartialReply>,
}

#[derive(Default)]
struct PartialReply {
    content: String,
    finish_reason: Option<FinishReason>,
}

impl ReplyAccumulator {
    /// One fragment per choice entry in `chunk`, in wire order.
    fn fragments(&mut self, chunk: CompletionChunk) -> Vec<StreamingChunk> {
        if !chunk.model.is_empty() {
            self.model.clone_from(&chunk.model);
        }
        chunk
            .choices
            .into_iter()
            .map(|choice| StreamingChunk {
                content: choice.delta.content.unwrap_or_default(),
                index: choice.index,
                model: chunk.model.clone(),
                finish_reason: choice.finish_reason.map(FinishReason::from),
            })
            .collect()
    }

    fn push(&mut self, fragment: StreamingChunk) {
        let reply = self.replies.entry(fragment.index).or_default();
        reply.content.push_str(&fragment.content);
        if fragment.finish_reason.is_some() {
            reply.finish_reason = fragment.finish_reason;
        }
    }

    fn finish(self) -> GeneratorOutput {
        let mut output = GeneratorOutput::default();
        for (index, reply) in self.replies {
            output.replies.push(reply.content);
            output.metadata.push(ReplyMetadata {
                model: self.model.clone(),
                index,
                finish_reason: reply.finish_reason,
                usage: None,
            });
        }
        output
    }
}

#[async_trait]
impl Component for GptGenerator {
    const TYPE_NAME: &'static str = "GptGenerator";

    /// Serialize everything except the API key.
    fn to_dict(&self) -> ComponentDescriptor {
        let mut init_parameters = self.generation_kwargs.clone();
        init_parameters.insert("model_name".into(), Value::from(self.model_name.as_str()));
        init_parameters.insert(
            "streaming_callback".into(),
            self.streaming_callback
                .as_ref()
                .map_or(Value::Null, |cb| Value::from(cb.reference())),
        );
        init_parameters.insert(
            "api_base_url".into(),
            Value::from(self.api_base_url.as_str()),
        );
        init_parameters.insert(
            "system_prompt".into(),
            self.system_prompt.as_deref().map_or(Value::Null, Value::from),
        );
        ComponentDescriptor::new(Self::TYPE_NAME, init_parameters)
    }

    /// Rebuild from a descriptor. The key comes from an `api_key` init
    /// parameter when present, otherwise from `OPENAI_API_KEY`.
    fn from_dict(descriptor: ComponentDescriptor, callbacks: &CallbackRegistry) -> Result<Self> {
        descriptor.expect_type(Self::TYPE_NAME)?;

        let mut params: GptGeneratorParams =
            serde_json::from_value(Value::Object(descriptor.init_parameters))
                .map_err(|e| ComponentError::Deserialization(e.to_string()))?;

        let api_key = match params.generation_kwargs.remove("api_key") {
            None | Some(Value::Null) => None,
            Some(Value::String(key)) => Some(key),
            Some(_) => {
                return Err(ComponentError::Deserialization(
                    "'api_key' must be a string".into(),
                ));
            }
        };

        let streaming_callback = params
            .streaming_callback
            .as_deref()
            .map(|name| callbacks.resolve(name))
            .transpose()?;

        let mut builder = GptGenerator::builder()
            .model_name(params.model_name)
            .api_base_url(params.api_base_url)
            .generation_kwargs(params.generation_kwargs);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        if let Some(system_prompt) = params.system_prompt {
            builder = builder.system_prompt(system_prompt);
        }
        if let Some(callback) = streaming_callback {
            builder = builder.streaming_callback(callback);
        }
        builder.build()
    }

    /// Inputs: `prompt` (string, required) and `generation_kwargs` (object,
    /// optional). Output: `{"replies": [...], "metadata": [...]}`.
    async fn invoke(&self, inputs: &Map<String, Value>) -> Result<Value> {
        let prompt = inputs
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| ComponentError::InvalidInput("'prompt' must be a string".into()))?;

        let overrides = match inputs.get("generation_kwargs") {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => {
                return Err(ComponentError::InvalidInput(
                    "'generation_kwargs' must be an object".into(),
                ));
            }
        };

        let output = self.run_with(prompt, overrides).await?;
        Ok(serde_json::to_value(output)?)
    }
}

impl std::fmt::Debug for GptGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GptGenerator")
            .field("model_name", &self.model_name)
            .field("api_base_url", &self.api_base_url)
            .field("system_prompt", &self.system_prompt)
            .field("streaming_callback", &self.streaming_callback)
            .field("generation_kwargs", &self.generation_kwargs)
            .field("backend", &self.backend.label())
            .finish()
    }
}

/// Builder for [`GptGenerator`].
#[derive(Default)]
pub struct GptGeneratorBuilder {
    api_key: Option<String>,
    model_name: Option<String>,
    api_base_url: Option<String>,
    system_prompt: Option<String>,
    streaming_callback: Option<StreamingCallback>,
    generation_kwargs: Map<String, Value>,
    backend: Option<Arc<dyn ChatBackend>>,
}

impl GptGeneratorBuilder {
    /// API key. Falls back to `OPENAI_API_KEY` when not set.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Model identifier (default `gpt-3.5-turbo`).
    pub fn model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    /// API base URL (default `https://api.openai.com/v1`).
    pub fn api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = Some(api_base_url.into());
        self
    }

    /// System prompt sent before the user prompt.
    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Enable streaming, delivering fragments to `callback`.
    pub fn streaming_callback(mut self, callback: StreamingCallback) -> Self {
        self.streaming_callback = Some(callback);
        self
    }

    /// Set one generation option.
    pub fn generation_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.generation_kwargs.insert(key.into(), value.into());
        self
    }

    /// Replace all generation options.
    pub fn generation_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.generation_kwargs = kwargs;
        self
    }

    /// Send requests through `backend` instead of an HTTP client built
    /// from the base URL. An API key is still required.
    pub fn backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Build the generator.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MissingApiKey`] if no key was given and
    /// `OPENAI_API_KEY` is unset or empty.
    pub fn build(self) -> Result<GptGenerator> {
        let api_key = self
            .api_key
            .and_then(ApiKey::new)
            .or_else(|| ApiKey::from_env(OPENAI_API_KEY_ENV))
            .ok_or(ComponentError::MissingApiKey {
                component: GptGenerator::TYPE_NAME,
                env_var: OPENAI_API_KEY_ENV,
            })?;

        let api_base_url = self.api_base_url.unwrap_or_else(default_api_base_url);
        let backend = self.backend.unwrap_or_else(|| {
            Arc::new(OpenAiClient::new(
                Endpoint::at(api_base_url.as_str()),
                api_key,
            ))
        });

        Ok(GptGenerator {
            model_name: self.model_name.unwrap_or_else(default_model_name),
            api_base_url,
            system_prompt: self.system_prompt,
            streaming_callback: self.streaming_callback,
            generation_kwargs: self.generation_kwargs,
            backend,
        })
    }
}
