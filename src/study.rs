//! Study operations: summary, quiz, flashcards and document chat.
//!
//! [`StudyAssistant`] is the entry point an HTTP handler or the CLI holds.
//! Every operation is one sequential chain:
//!
//! ```text
//! text ──▶ prompt (bounded) ──▶ resolve model ──▶ invoke (retry) ──▶ coerce
//! ```
//!
//! The assistant is `Send + Sync`; share one behind an `Arc` so the model
//! resolver's cache is shared too. It keeps no per-user state: chat history
//! is supplied by the caller on every request.
//!
//! ## Failure policy
//!
//! Each operation either returns its full result or a [`StudyAidError`].
//! Structured tasks never degrade to raw model text, and an empty document
//! is refused before any provider call. A 404 from the provider means the
//! cached model disappeared; the resolver cache is cleared so the next
//! request rediscovers, and the current request fails.

use crate::config::StudyConfig;
use crate::error::StudyAidError;
use crate::output::{ChatAnswer, ChatTurn, FlashcardDeck, McqSet, Summary};
use crate::pipeline::invoke::{invoke, Invocation, RetryPolicy};
use crate::pipeline::resolve::{CachingModelResolver, FixedModelResolver, ModelResolver};
use crate::pipeline::{coerce, extract};
use crate::prompts::{self, TaskKind, TaskRequest};
use crate::provider::gemini::GeminiProvider;
use crate::provider::{GenerativeProvider, ModelHandle};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The study-aid service.
///
/// # Example
/// ```rust,no_run
/// use edgequake_studyaid::StudyAssistant;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let assistant = StudyAssistant::from_env()?;
/// let quiz = assistant.generate_mcqs_file("lecture.pdf").await?;
/// print!("{}", quiz.to_plain_text());
/// # Ok(())
/// # }
/// ```
pub struct StudyAssistant {
    provider: Arc<dyn GenerativeProvider>,
    resolver: Arc<dyn ModelResolver>,
    config: StudyConfig,
    policy: RetryPolicy,
}

impl std::fmt::Debug for StudyAssistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudyAssistant")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

impl StudyAssistant {
    /// Build an assistant talking to Gemini.
    pub fn new(config: StudyConfig) -> Result<Self, StudyAidError> {
        let provider: Arc<dyn GenerativeProvider> = Arc::new(GeminiProvider::new(&config)?);
        Ok(Self::with_provider(config, provider))
    }

    /// [`StudyConfig::from_env`] followed by [`Self::new`].
    pub fn from_env() -> Result<Self, StudyAidError> {
        Self::new(StudyConfig::from_env()?.build()?)
    }

    /// Use `provider` with the resolver the config calls for: fixed when
    /// `config.model` is set, discovery otherwise.
    pub fn with_provider(config: StudyConfig, provider: Arc<dyn GenerativeProvider>) -> Self {
        let resolver: Arc<dyn ModelResolver> = match &config.model {
            Some(id) => Arc::new(FixedModelResolver::new(id)),
            None => Arc::new(CachingModelResolver::new(
                Arc::clone(&provider),
                config.preferences.clone(),
            )),
        };
        Self::with_parts(config, provider, resolver)
    }

    /// Assemble from explicit parts.
    pub fn with_parts(
        config: StudyConfig,
        provider: Arc<dyn GenerativeProvider>,
        resolver: Arc<dyn ModelResolver>,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            provider,
            resolver,
            config,
            policy,
        }
    }

    /// Replace the retry policy derived from the config.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// The model generation calls will use.
    pub async fn model(&self) -> Result<ModelHandle, StudyAidError> {
        self.resolver.resolve().await
    }

    /// Generation-capable models visible to the configured key.
    pub async fn list_models(&self) -> Result<Vec<String>, StudyAidError> {
        self.provider
            .list_models()
            .await
            .map_err(|source| StudyAidError::Provider {
                attempts: 1,
                source,
            })
    }

    // ── Text operations ──────────────────────────────────────────────────

    /// Summarise `text` as headed plain-text sections.
    pub async fn summarize(&self, text: &str) -> Result<Summary, StudyAidError> {
        require_text(text)?;
        let request = prompts::summary_request(text, TaskKind::Summary.context_limit(&self.config));
        let (model, call) = self.run(&request).await?;
        Ok(Summary {
            summary: coerce::as_text(&call.response),
            model: model.to_string(),
        })
    }

    /// Generate `config.question_count` validated multiple-choice questions.
    pub async fn generate_mcqs(&self, text: &str) -> Result<McqSet, StudyAidError> {
        require_text(text)?;
        let request = prompts::mcq_request(
            text,
            TaskKind::Mcq.context_limit(&self.config),
            self.config.question_count,
        );
        let (model, call) = self.run(&request).await?;
        let mcqs = coerce::decode_mcqs(&call.response).map_err(|source| {
            warn!("{}: MCQ output did not decode: {}", model, source);
            StudyAidError::Decode {
                task: TaskKind::Mcq,
                source,
            }
        })?;
        debug!("{} questions decoded", mcqs.len());
        Ok(McqSet {
            mcqs,
            model: model.to_string(),
        })
    }

    /// Generate `config.flashcard_count` flashcards.
    pub async fn generate_flashcards(&self, text: &str) -> Result<FlashcardDeck, StudyAidError> {
        require_text(text)?;
        let request = prompts::flashcard_request(
            text,
            TaskKind::Flashcards.context_limit(&self.config),
            self.config.flashcard_count,
        );
        let (model, call) = self.run(&request).await?;
        let flashcards = coerce::decode_flashcards(&call.response).map_err(|source| {
            warn!("{}: flashcard output did not decode: {}", model, source);
            StudyAidError::Decode {
                task: TaskKind::Flashcards,
                source,
            }
        })?;
        debug!("{} flashcards decoded", flashcards.len());
        Ok(FlashcardDeck {
            flashcards,
            model: model.to_string(),
        })
    }

    /// Answer `query` from `document` only, given the conversation so far
    /// (oldest turn first).
    pub async fn chat(
        &self,
        document: &str,
        query: &str,
        history: &[ChatTurn],
    ) -> Result<ChatAnswer, StudyAidError> {
        require_text(document)?;
        if query.trim().is_empty() {
            return Err(StudyAidError::InvalidRequest(
                "chat question must not be empty".into(),
            ));
        }
        let request = prompts::chat_request(
            document,
            query.trim(),
            history,
            TaskKind::Chat.context_limit(&self.config),
            self.config.history_turns,
        );
        let (model, call) = self.run(&request).await?;
        Ok(ChatAnswer {
            answer: coerce::as_text(&call.response),
            model: model.to_string(),
        })
    }

    // ── File operations ──────────────────────────────────────────────────

    pub async fn summarize_file(&self, path: impl AsRef<Path>) -> Result<Summary, StudyAidError> {
        let text = extract::extract_text(path).await?;
        self.summarize(&text).await
    }

    pub async fn generate_mcqs_file(&self, path: impl AsRef<Path>) -> Result<McqSet, StudyAidError> {
        let text = extract::extract_text(path).await?;
        self.generate_mcqs(&text).await
    }

    pub async fn generate_flashcards_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<FlashcardDeck, StudyAidError> {
        let text = extract::extract_text(path).await?;
        self.generate_flashcards(&text).await
    }

    pub async fn chat_file(
        &self,
        path: impl AsRef<Path>,
        query: &str,
        history: &[ChatTurn],
    ) -> Result<ChatAnswer, StudyAidError> {
        let text = extract::extract_text(path).await?;
        self.chat(&text, query, history).await
    }

    // ── Shared path ──────────────────────────────────────────────────────

    async fn run(&self, request: &TaskRequest) -> Result<(ModelHandle, Invocation), StudyAidError> {
        let model = self.resolver.resolve().await?;
        if request.truncated {
            debug!("{}: context truncated to its bound", request.kind);
        }
        let prompt = request.render();

        match invoke(self.provider.as_ref(), &model, &prompt, &self.policy).await {
            Ok(call) => {
                info!(
                    "{} via {} ({} attempt(s), {}ms)",
                    request.kind, model, call.attempts, call.duration_ms
                );
                Ok((model, call))
            }
            Err(e) => {
                if let StudyAidError::Provider { source, .. } = &e {
                    if source.is_model_not_found() {
                        warn!("{}: model not found; clearing cached model", model);
                        self.resolver.invalidate();
                    }
                }
                Err(e)
            }
        }
    }
}

fn require_text(text: &str) -> Result<(), StudyAidError> {
    if text.trim().is_empty() {
        Err(StudyAidError::EmptyDocument)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::mock::MockProvider;

    fn config() -> StudyConfig {
        StudyConfig::builder("test-key")
            .retry_base_delay_ms(0)
            .retry_jitter_ms(0)
            .build()
            .unwrap()
    }

    fn assistant(mock: &Arc<MockProvider>) -> StudyAssistant {
        StudyAssistant::with_provider(config(), mock.clone())
    }

    #[tokio::test]
    async fn empty_text_never_reaches_provider() {
        let mock = Arc::new(MockProvider::new().respond("unused"));
        let a = assistant(&mock);
        assert!(matches!(a.summarize("  \n").await, Err(StudyAidError::EmptyDocument)));
        assert!(matches!(a.generate_mcqs("").await, Err(StudyAidError::EmptyDocument)));
        assert_eq!(mock.generate_calls(), 0);
        assert_eq!(mock.list_calls(), 0);
    }

    #[tokio::test]
    async fn summary_is_trimmed_text() {
        let mock = Arc::new(MockProvider::new().respond("\n  Cells\nCells are units of life.  \n"));
        let out = assistant(&mock).summarize("Cells are the units of life.").await.unwrap();
        assert_eq!(out.summary, "Cells\nCells are units of life.");
        assert_eq!(out.model, "gemini-1.5-flash");
    }

    #[tokio::test]
    async fn undecodable_flashcards_are_decode_error() {
        let mock = Arc::new(MockProvider::new().respond("Here are your flashcards!"));
        let err = assistant(&mock).generate_flashcards("text").await.unwrap_err();
        assert!(matches!(
            err,
            StudyAidError::Decode {
                task: TaskKind::Flashcards,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn fixed_model_skips_discovery() {
        let mock = Arc::new(MockProvider::new().respond("answer"));
        let c = StudyConfig::builder("k").model("gemini-1.5-pro").build().unwrap();
        let a = StudyAssistant::with_provider(c, mock.clone());
        let out = a.chat("doc", "question?", &[]).await.unwrap();
        assert_eq!(out.model, "gemini-1.5-pro");
        assert_eq!(mock.list_calls(), 0);
    }

    #[tokio::test]
    async fn blank_chat_question_rejected() {
        let mock = Arc::new(MockProvider::new());
        let err = assistant(&mock).chat("doc", "   ", &[]).await.unwrap_err();
        assert_eq!(err.category(), "request");
        assert_eq!(mock.generate_calls(), 0);
    }

    #[tokio::test]
    async fn model_not_found_clears_cache() {
        let mock = Arc::new(
            MockProvider::new()
                .fail(ProviderError::Api {
                    status: 404,
                    message: "models/gemini-1.5-flash is not found".into(),
                })
                .respond("second try"),
        );
        let a = assistant(&mock);
        let err = a.summarize("text").await.unwrap_err();
        assert_eq!(err.category(), "provider");
        assert_eq!(mock.list_calls(), 1);

        a.summarize("text").await.unwrap();
        assert_eq!(mock.list_calls(), 2);
    }

    #[tokio::test]
    async fn model_is_resolved_once_across_operations() {
        let mock = Arc::new(MockProvider::new().with_fallback("plain answer"));
        let a = assistant(&mock);
        a.summarize("one").await.unwrap();
        a.chat("two", "q", &[]).await.unwrap();
        assert_eq!(mock.list_calls(), 1);
        assert_eq!(mock.generate_calls(), 2);
    }
}
