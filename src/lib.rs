//! # edgequake-studyaid
//!
//! Turn study material into summaries, multiple-choice quizzes, flashcards
//! and grounded chat answers using Google's Gemini models.
//!
//! ## Why this crate?
//!
//! Asking a hosted model for a quiz is one HTTP call. Getting a quiz back
//! *reliably* is not: the callable model names change with the key and the
//! month, free-tier quotas answer with 429 at the worst moment, and the
//! model wraps its "raw JSON" in Markdown fences often enough to break a
//! naive parser. This crate handles those three problems and nothing else.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Extract  PDF (pdfium) / DOCX (zip) / TXT / MD → text
//!  ├─ 2. Prompt   bounded context + task instruction + output contract
//!  ├─ 3. Resolve  list models once, rank by preference, cache the choice
//!  ├─ 4. Invoke   generateContent with linear backoff on rate limits
//!  └─ 5. Coerce   trim text, or strip fences and decode validated JSON
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_studyaid::{StudyAssistant, StudyConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Key read from GOOGLE_API_KEY / GEMINI_API_KEY
//!     let config = StudyConfig::from_env()?.question_count(5).build()?;
//!     let assistant = StudyAssistant::new(config)?;
//!
//!     let deck = assistant.generate_flashcards_file("biology.docx").await?;
//!     for card in &deck.flashcards {
//!         println!("{} → {}", card.front, card.back);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `studyaid` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-studyaid = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod study;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ApiKey, ContextLimits, StudyConfig, StudyConfigBuilder};
pub use error::{DecodeError, ProviderError, StudyAidError};
pub use output::{
    parse_quiz_text, ChatAnswer, ChatRole, ChatTurn, Flashcard, FlashcardDeck, Mcq, McqSet,
    Summary,
};
pub use pipeline::export::{export_questions_to_file, render_questions_pdf};
pub use pipeline::extract::{extract_from_bytes, extract_text, DocumentFormat};
pub use pipeline::invoke::RetryPolicy;
pub use pipeline::resolve::{ModelPreferences, ModelResolver};
pub use prompts::TaskKind;
pub use provider::{GenerativeProvider, ModelHandle};
pub use study::StudyAssistant;
