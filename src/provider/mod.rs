//! The seam between the study pipeline and a hosted generative model.
//!
//! [`GenerativeProvider`] is the only trait the pipeline calls for network
//! I/O. [`gemini::GeminiProvider`] talks to the Gemini REST API;
//! [`mock::MockProvider`] replays scripted listings and responses so the
//! resolver, retry and decode paths can be exercised without a network.

pub mod gemini;
pub mod mock;

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved, callable model identifier such as `gemini-1.5-flash`.
///
/// Always stored without the `models/` resource prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelHandle(String);

impl ModelHandle {
    pub fn new(id: impl AsRef<str>) -> Self {
        let id = id.as_ref().trim();
        Self(id.strip_prefix("models/").unwrap_or(id).to_string())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unprocessed text returned by one successful model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawModelResponse {
    pub text: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

impl RawModelResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt_tokens: None,
            completion_tokens: None,
        }
    }
}

/// A hosted model service.
///
/// Implementations must be cheap to share (`Arc<dyn GenerativeProvider>`)
/// and safe to call concurrently.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Identifiers of every model that supports text generation, without the
    /// `models/` prefix, in the order the provider lists them.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;

    /// Run a single generation call. No retrying happens here.
    async fn generate(
        &self,
        model: &ModelHandle,
        prompt: &str,
    ) -> Result<RawModelResponse, ProviderError>;
}
