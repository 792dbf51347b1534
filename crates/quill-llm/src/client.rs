//! [`OpenAiClient`]: `reqwest`-based [`ChatBackend`] for OpenAI-compatible
//! endpoints (OpenAI itself, gateways, local servers).

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::backend::ChatBackend;
use crate::endpoint::Endpoint;
use crate::error::{ApiError, Result};
use crate::secret::ApiKey;
use crate::sse::SseDecoder;
use crate::wire::{ChatCompletion, ChatRequest, StreamEvent};

/// Wait suggested for a 429 that names no retry delay.
const DEFAULT_RETRY_AFTER_MS: u64 = 1000;

/// Chat completion client for one endpoint.
///
/// ```rust,ignore
/// use quill_llm::{ApiKey, ChatMessage, ChatRequest, Endpoint, OpenAiClient};
///
/// let client = OpenAiClient::new(Endpoint::openai(), ApiKey::new("sk-...").unwrap());
/// let request = ChatRequest::new("gpt-3.5-turbo", vec![ChatMessage::user("Hi")]);
/// let completion = client.complete(&request).await?;
/// ```
#[derive(Debug)]
pub struct OpenAiClient {
    endpoint: Endpoint,
    api_key: ApiKey,
    http: reqwest::Client,
}

impl OpenAiClient {
    /// Client for `endpoint` authenticating with `api_key`.
    pub fn new(endpoint: Endpoint, api_key: ApiKey) -> Self {
        Self {
            http: build_http(&endpoint),
            endpoint,
            api_key,
        }
    }

    /// Client whose key comes from `endpoint.api_key_env`.
    ///
    /// # Errors
    ///
    /// [`ApiError::MissingApiKey`] if the variable is unset or empty.
    pub fn from_env(endpoint: Endpoint) -> Result<Self> {
        let api_key = endpoint.api_key_from_env()?;
        Ok(Self::new(endpoint, api_key))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let mut builder = self
            .http
            .post(self.endpoint.completions_url())
            .bearer_auth(self.api_key.expose())
            .json(request);
        if request.stream {
            builder = builder.header("Accept", "text/event-stream");
        }
        for (name, value) in &self.endpoint.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(
            url = %self.endpoint.completions_url(),
            model = %request.model,
            messages = request.messages.len(),
            params = request.params.len(),
            stream = request.stream,
            "sending chat completion request"
        );

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = retry_after_from_headers(response.headers());
        let body = response.text().await.unwrap_or_default();
        let err = classify_failure(status, retry_after, &body, &request.model);
        warn!(status = status.as_u16(), error = %err, "chat completion failed");
        Err(err)
    }
}

#[async_trait]
impl ChatBackend for OpenAiClient {
    fn label(&self) -> &str {
        &self.endpoint.base_url
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let response = self.send(request).await?;
        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| ApiError::MalformedResponse(format!("not a chat completion: {e}")))?;

        debug!(
            model = %completion.model,
            choices = completion.choices.len(),
            total_tokens = completion.usage.map(|u| u.total_tokens),
            "chat completion received"
        );
        Ok(completion)
    }

    async fn complete_stream(
        &self,
        request: &ChatRequest,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        let streaming;
        let request = if request.stream {
            request
        } else {
            streaming = request.clone().streaming();
            &streaming
        };

        let mut body = self.send(request).await?.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut forwarded = 0usize;

        while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(|e| ApiError::StreamInterrupted(e.to_string()))?;
            for decoded in decoder.feed(&bytes) {
                let event = match decoded {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "skipping undecodable stream line");
                        continue;
                    }
                };
                trace!(event = ?event, "stream event");

                let done = event == StreamEvent::Done;
                if events.send(event).await.is_err() {
                    debug!(forwarded, "stream receiver dropped");
                    return Ok(());
                }
                if done {
                    debug!(forwarded, "stream finished");
                    return Ok(());
                }
                forwarded += 1;
            }
        }

        if let Some(event) = final_event(decoder) {
            let _ = events.send(event).await;
        }
        debug!(forwarded, "stream body ended without [DONE]");
        Ok(())
    }
}

/// Decode the unterminated last line of a stream body.
fn final_event(decoder: SseDecoder) -> Option<StreamEvent> {
    match decoder.finish()? {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "skipping undecodable stream line");
            None
        }
    }
}

fn build_http(endpoint: &Endpoint) -> reqwest::Client {
    let Some(timeout) = endpoint.timeout() else {
        return reqwest::Client::new();
    };
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "could not apply request timeout, using client defaults");
            reqwest::Client::new()
        })
}

/// Map a non-success response to an [`ApiError`].
fn classify_failure(
    status: StatusCode,
    retry_after_ms: Option<u64>,
    body: &str,
    model: &str,
) -> ApiError {
    let message = error_message(body);
    match status.as_u16() {
        401 | 403 => ApiError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        404 => ApiError::ModelNotFound {
            model: model.to_owned(),
            message,
        },
        429 if is_quota_exhausted(body) => ApiError::QuotaExhausted(message),
        429 => ApiError::RateLimited {
            retry_after_ms: retry_after_ms
                .or_else(|| retry_after_from_body(body))
                .unwrap_or(DEFAULT_RETRY_AFTER_MS),
        },
        code => ApiError::Status {
            status: code,
            message,
        },
    }
}

/// `error.message` (or a bare `error` string) from a JSON body, else the
/// body itself.
fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        let error = v.get("error")?;
        error
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| error.as_str())
            .map(str::to_owned)
    });
    message.unwrap_or_else(|| body.trim().to_owned())
}

/// Some endpoints answer 429 for exhausted credits, which never clears.
fn is_quota_exhausted(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    ["insufficient_quota", "quota exceeded", "spending limit", "billing", "exhausted"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// `Retry-After` in its delta-seconds form.
fn retry_after_from_headers(headers: &HeaderMap) -> Option<u64> {
    let secs: f64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some((secs.max(0.0) * 1000.0) as u64)
}

/// `retry_after_ms` or `retry_after` (seconds) from a JSON body.
fn retry_after_from_body(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    if let Some(ms) = value.get("retry_after_ms").and_then(|v| v.as_u64()) {
        return Some(ms);
    }
    let secs = value.get("retry_after")?.as_f64()?;
    Some((secs.max(0.0) * 1000.0) as u64)
}
