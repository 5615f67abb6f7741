//! Error types for the edgequake-studyaid library.
//!
//! Three error types reflect three layers of failure:
//!
//! * [`StudyAidError`]: **Fatal for the operation**: the summary, quiz,
//!   flashcard deck or chat answer cannot be produced (missing API key,
//!   unreadable document, provider failure after retries, undecodable
//!   output). Every public operation returns `Result<_, StudyAidError>`.
//!
//! * [`ProviderError`]: a single provider call failed. The retrying invoker
//!   inspects it ([`ProviderError::is_transient`]) to decide whether to back
//!   off and try again; once the budget is spent it is wrapped, unchanged in
//!   kind, in [`StudyAidError::Provider`].
//!
//! * [`DecodeError`]: the model answered but its output is not the JSON
//!   shape the task asked for. Never degraded into partial results.

use crate::prompts::TaskKind;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-studyaid library.
#[derive(Debug, Error)]
pub enum StudyAidError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// No API key was found in the environment.
    #[error("No Gemini API key configured.\nSet {vars} before running any generation task.")]
    MissingCredential { vars: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The request itself is unusable, e.g. a blank chat question.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Extraction errors ─────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file extension is not one of `.pdf`, `.docx`, `.txt`, `.md`.
    #[error("Unsupported document format '{extension}' for '{path}'\nSupported: .pdf, .docx, .txt, .md")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// The file has a supported extension but its text could not be read.
    #[error("Failed to extract text from '{path}': {detail}")]
    ExtractionFailed { path: PathBuf, detail: String },

    /// Extraction succeeded but produced no usable text.
    #[error("No text available: the document is empty or has no text layer")]
    EmptyDocument,

    // ── LLM errors ────────────────────────────────────────────────────────
    /// Model discovery failed and no fallback identifier is configured.
    #[error("Could not resolve a Gemini model: {detail}")]
    Resolution { detail: String },

    /// The provider call failed, either immediately or after all retries.
    #[error("LLM provider error after {attempts} attempt(s): {source}")]
    Provider {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// The model output for a structured task did not decode.
    #[error("Failed to decode {task} output: {source}")]
    Decode {
        task: TaskKind,
        #[source]
        source: DecodeError,
    },

    // ── Export errors ─────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy,\n\
or install pdfium so the system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    /// pdfium failed while building the question document.
    #[error("PDF export failed: {0}")]
    ExportFailed(String),

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StudyAidError {
    /// `true` when the failure was the provider's rate limit, surviving all retries.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            StudyAidError::Provider {
                source: ProviderError::RateLimited { .. },
                ..
            }
        )
    }

    /// Stable snake_case category for mapping onto an outer response layer.
    pub fn category(&self) -> &'static str {
        match self {
            StudyAidError::MissingCredential { .. } | StudyAidError::InvalidConfig(_) => {
                "configuration"
            }
            StudyAidError::InvalidRequest(_) => "request",
            StudyAidError::FileNotFound { .. }
            | StudyAidError::PermissionDenied { .. }
            | StudyAidError::UnsupportedFormat { .. }
            | StudyAidError::ExtractionFailed { .. }
            | StudyAidError::EmptyDocument => "extraction",
            StudyAidError::Resolution { .. } => "resolution",
            StudyAidError::Provider { .. } => "provider",
            StudyAidError::Decode { .. } => "decode",
            StudyAidError::PdfiumBindingFailed(_)
            | StudyAidError::ExportFailed(_)
            | StudyAidError::OutputWriteFailed { .. } => "export",
            StudyAidError::Internal(_) => "internal",
        }
    }
}

/// A single failed call to the generative provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// HTTP 429 / `RESOURCE_EXHAUSTED`. The only transient kind.
    #[error("rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Any other non-success status from the API.
    #[error("API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Connection, TLS or timeout failure before a response arrived.
    #[error("request failed: {0}")]
    Transport(String),

    /// The prompt or every candidate was blocked by a safety filter.
    #[error("response blocked by provider: {reason}")]
    Blocked { reason: String },

    /// The provider answered with a body we could not interpret.
    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether a retry of the identical request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    /// Server-requested wait before retrying, from `Retry-After`.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            ProviderError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => Some(std::time::Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// The model named in the request does not exist (any more).
    pub fn is_model_not_found(&self) -> bool {
        matches!(self, ProviderError::Api { status: 404, .. })
    }
}

/// Structured output that could not be turned into the requested shape.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Nothing left after stripping fences and whitespace.
    #[error("model returned an empty payload")]
    Empty,

    /// Not JSON, or JSON of the wrong shape.
    #[error("invalid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    /// Well-formed JSON whose item breaks a structural rule.
    #[error("item {index} is invalid: {reason}")]
    InvalidItem { index: usize, reason: String },
}
