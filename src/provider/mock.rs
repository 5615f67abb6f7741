//! Scripted provider for tests and offline runs.
//!
//! Responses are consumed in order; once the script runs dry every further
//! call returns the fallback text (if one was set) or an `InvalidResponse`
//! error. Call counters let tests assert exactly how many attempts the
//! retry loop made.

use super::{GenerativeProvider, ModelHandle, RawModelResponse};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug)]
pub struct MockProvider {
    models: Result<Vec<String>, ProviderError>,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<(String, String)>>,
    list_calls: AtomicUsize,
    generate_calls: AtomicUsize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// A provider listing a single flash model with an empty script.
    pub fn new() -> Self {
        Self {
            models: Ok(vec!["gemini-1.5-flash".to_string()]),
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
        }
    }

    /// Models returned by `list_models`.
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = Ok(models.into_iter().map(Into::into).collect());
        self
    }

    /// Make `list_models` fail.
    pub fn with_listing_error(mut self, err: ProviderError) -> Self {
        self.models = Err(err);
        self
    }

    /// Queue a successful generation.
    pub fn respond(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    /// Queue a failed generation.
    pub fn fail(self, err: ProviderError) -> Self {
        self.push(Err(err));
        self
    }

    /// Queue `n` rate-limit failures.
    pub fn rate_limited(self, n: usize) -> Self {
        for _ in 0..n {
            self.push(Err(ProviderError::RateLimited {
                message: "mock quota exceeded".to_string(),
                retry_after_secs: None,
            }));
        }
        self
    }

    /// Text returned once the script is exhausted.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    /// Every `(model, prompt)` pair seen by `generate`, oldest first.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn push(&self, item: Result<String, ProviderError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
    }
}

#[async_trait]
impl GenerativeProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.models.clone()
    }

    async fn generate(
        &self,
        model: &ModelHandle,
        prompt: &str,
    ) -> Result<RawModelResponse, ProviderError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((model.id().to_string(), prompt.to_string()));
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Ok(text)) => Ok(RawModelResponse::new(text)),
            Some(Err(e)) => Err(e),
            None => match &self.fallback {
                Some(text) => Ok(RawModelResponse::new(text.clone())),
                None => Err(ProviderError::InvalidResponse(
                    "mock script exhausted".to_string(),
                )),
            },
        }
    }
}
