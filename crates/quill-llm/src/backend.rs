//! The [`ChatBackend`] seam between generators and the HTTP client.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::wire::{ChatCompletion, ChatRequest, StreamEvent};

/// Something that can answer chat completion requests.
///
/// [`OpenAiClient`](crate::client::OpenAiClient) is the production
/// implementation. Generators hold an `Arc<dyn ChatBackend>`, so tests and
/// other transports plug in here.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short label used in logs.
    fn label(&self) -> &str;

    /// Send `request` and wait for the whole completion.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion>;

    /// Send `request` as a streaming call and forward every decoded event to
    /// `events` in arrival order.
    ///
    /// Returns after `[DONE]`, at the end of the body, or as soon as the
    /// receiver is dropped. Errors before the first event (bad status,
    /// connection failure) are returned instead of being sent.
    async fn complete_stream(
        &self,
        request: &ChatRequest,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<()>;
}
