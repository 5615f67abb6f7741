//! Configuration for the study-aid service.
//!
//! All behaviour is controlled through [`StudyConfig`], built via its
//! [`StudyConfigBuilder`] or read from the environment with
//! [`StudyConfig::from_env`]. The only required value is the API key; every
//! other knob has a documented default.
//!
//! The API key is read once, when the config is built. A missing key is a
//! [`StudyAidError::MissingCredential`] at that point rather than a surprise
//! on the first provider call.

use crate::error::StudyAidError;
use crate::pipeline::resolve::ModelPreferences;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variables searched (in order) for the Gemini API key.
pub const API_KEY_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// Default Gemini REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A provider credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Maximum characters of context embedded per task.
///
/// Gemini's flash tier accepts far more tokens than this, but the free tier
/// counts input tokens against a per-minute quota, so oversized uploads are
/// truncated rather than sent whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLimits {
    pub summary: usize,
    pub mcq: usize,
    pub flashcards: usize,
    pub chat: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            summary: 100_000,
            mcq: 50_000,
            flashcards: 50_000,
            chat: 30_000,
        }
    }
}

/// Configuration for a [`crate::StudyAssistant`].
///
/// # Example
/// ```rust
/// use edgequake_studyaid::StudyConfig;
///
/// let config = StudyConfig::builder("test-key")
///     .max_attempts(5)
///     .question_count(15)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Clone)]
pub struct StudyConfig {
    pub api_key: ApiKey,

    /// Gemini REST base URL (no trailing slash). Overridable for proxies and tests.
    pub base_url: String,

    /// Fixed model identifier. When set, model discovery is skipped entirely.
    pub model: Option<String>,

    /// Ranking used by model discovery when `model` is `None`.
    pub preferences: ModelPreferences,

    /// Total attempts per provider call, including the first. Default: 3.
    pub max_attempts: u32,

    /// Linear backoff step in milliseconds: the n-th retry waits `n × step`. Default: 2000.
    pub retry_base_delay_ms: u64,

    /// Upper bound of the random jitter added to each backoff. Default: 1000.
    pub retry_jitter_ms: u64,

    /// Sampling temperature. `None` leaves the provider default.
    pub temperature: Option<f32>,

    /// Output token cap. `None` leaves the provider default.
    pub max_output_tokens: Option<u32>,

    /// Per-HTTP-request timeout in seconds. Default: 60.
    pub request_timeout_secs: u64,

    pub limits: ContextLimits,

    /// Most recent chat turns embedded in a chat prompt. Default: 10.
    pub history_turns: usize,

    /// Questions requested per MCQ task. Default: 10.
    pub question_count: usize,

    /// Cards requested per flashcard task. Default: 10.
    pub flashcard_count: usize,
}

impl fmt::Debug for StudyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudyConfig")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("preferences", &self.preferences)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_jitter_ms", &self.retry_jitter_ms)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("limits", &self.limits)
            .field("history_turns", &self.history_turns)
            .field("question_count", &self.question_count)
            .field("flashcard_count", &self.flashcard_count)
            .finish()
    }
}

impl StudyConfig {
    /// Create a builder around the given API key.
    pub fn builder(api_key: impl Into<String>) -> StudyConfigBuilder {
        StudyConfigBuilder {
            config: StudyConfig {
                api_key: ApiKey::new(api_key),
                base_url: DEFAULT_BASE_URL.to_string(),
                model: None,
                preferences: ModelPreferences::default(),
                max_attempts: 3,
                retry_base_delay_ms: 2000,
                retry_jitter_ms: 1000,
                temperature: None,
                max_output_tokens: None,
                request_timeout_secs: 60,
                limits: ContextLimits::default(),
                history_turns: 10,
                question_count: 10,
                flashcard_count: 10,
            },
        }
    }

    /// Read the API key (and optional overrides) from the process environment.
    ///
    /// Recognised variables:
    /// * `GOOGLE_API_KEY`, then `GEMINI_API_KEY`: required
    /// * `STUDYAID_MODEL`: fixed model, skips discovery
    /// * `STUDYAID_BASE_URL`: alternative endpoint
    pub fn from_env() -> Result<StudyConfigBuilder, StudyAidError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`Self::from_env`] with an injectable variable lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<StudyConfigBuilder, StudyAidError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let key = API_KEY_VARS
            .iter()
            .find_map(|name| non_empty(name))
            .ok_or_else(|| StudyAidError::MissingCredential {
                vars: API_KEY_VARS.join(" or "),
            })?;

        let mut builder = Self::builder(key.trim());
        if let Some(model) = non_empty("STUDYAID_MODEL") {
            builder = builder.model(model.trim());
        }
        if let Some(url) = non_empty("STUDYAID_BASE_URL") {
            builder = builder.base_url(url.trim());
        }
        Ok(builder)
    }
}

/// Builder for [`StudyConfig`].
#[derive(Debug)]
pub struct StudyConfigBuilder {
    config: StudyConfig,
}

impl StudyConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn preferences(mut self, preferences: ModelPreferences) -> Self {
        self.config.preferences = preferences;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn retry_jitter_ms(mut self, ms: u64) -> Self {
        self.config.retry_jitter_ms = ms;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = Some(n);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn limits(mut self, limits: ContextLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn history_turns(mut self, n: usize) -> Self {
        self.config.history_turns = n;
        self
    }

    pub fn question_count(mut self, n: usize) -> Self {
        self.config.question_count = n.max(1);
        self
    }

    pub fn flashcard_count(mut self, n: usize) -> Self {
        self.config.flashcard_count = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StudyConfig, StudyAidError> {
        let c = &self.config;
        if c.api_key.expose().trim().is_empty() {
            return Err(StudyAidError::MissingCredential {
                vars: API_KEY_VARS.join(" or "),
            });
        }
        if c.max_attempts == 0 {
            return Err(StudyAidError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if !c.base_url.starts_with("http://") && !c.base_url.starts_with("https://") {
            return Err(StudyAidError::InvalidConfig(format!(
                "base_url must be an HTTP(S) URL, got '{}'",
                c.base_url
            )));
        }
        let l = &c.limits;
        if l.summary == 0 || l.mcq == 0 || l.flashcards == 0 || l.chat == 0 {
            return Err(StudyAidError::InvalidConfig(
                "context limits must be > 0".into(),
            ));
        }
        if matches!(c.model.as_deref(), Some(m) if m.trim().is_empty()) {
            return Err(StudyAidError::InvalidConfig(
                "model override must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
