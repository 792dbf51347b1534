//! Where and how to reach a chat completion endpoint.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::secret::ApiKey;

/// OpenAI's public API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Variable consulted when no key is passed explicitly.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Connection settings for one OpenAI-compatible endpoint.
///
/// Every field has a default, so a config file may name only what differs
/// from OpenAI:
///
/// ```toml
/// base_url = "http://localhost:8080/v1"
/// timeout_secs = 30
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    /// API root; `/chat/completions` is appended to it.
    pub base_url: String,

    /// Variable holding the key when none is given explicitly.
    pub api_key_env: String,

    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,

    /// Whole-request timeout. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::at(OPENAI_BASE_URL)
    }
}

impl Endpoint {
    /// OpenAI's public API.
    pub fn openai() -> Self {
        Self::default()
    }

    /// An endpoint at `base_url` with OpenAI defaults for everything else.
    pub fn at(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key_env: OPENAI_API_KEY_ENV.into(),
            headers: BTreeMap::new(),
            timeout_secs: None,
        }
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the request timeout, rounded up to whole seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let partial = u64::from(timeout.subsec_nanos() > 0);
        self.timeout_secs = Some(timeout.as_secs().saturating_add(partial));
        self
    }

    /// Full URL of the chat completion route.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Read the key from [`api_key_env`](Self::api_key_env).
    ///
    /// # Errors
    ///
    /// [`ApiError::MissingApiKey`] if the variable is unset or empty.
    pub fn api_key_from_env(&self) -> Result<ApiKey> {
        ApiKey::from_env(&self.api_key_env).ok_or_else(|| ApiError::MissingApiKey {
            env_var: self.api_key_env.clone(),
        })
    }
}
