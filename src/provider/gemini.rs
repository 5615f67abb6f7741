//! Gemini REST client (`generativelanguage.googleapis.com/v1beta`).
//!
//! Only the two endpoints the pipeline needs are implemented:
//!
//! * `GET  /models`: paginated catalogue, filtered to models whose
//!   `supportedGenerationMethods` contains `generateContent`
//! * `POST /models/{id}:generateContent`: single-turn text generation
//!
//! The key travels in the `x-goog-api-key` header, never in the URL, so it
//! cannot leak into request logs.
//!
//! ## Error mapping
//!
//! | Response | [`ProviderError`] |
//! |----------|-------------------|
//! | 429, or body status `RESOURCE_EXHAUSTED` | `RateLimited` (transient) |
//! | other non-2xx | `Api { status, message }` |
//! | connect / TLS / timeout | `Transport` |
//! | `promptFeedback.blockReason`, or no text candidate | `Blocked` |
//! | 2xx body that does not parse | `InvalidResponse` |

use super::{GenerativeProvider, ModelHandle, RawModelResponse};
use crate::config::StudyConfig;
use crate::error::{ProviderError, StudyAidError};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, trace, warn};

const LIST_PAGE_SIZE: u32 = 1000;
const GENERATE_METHOD: &str = "generateContent";
/// Hard stop for model listing; the real catalogue fits in one page.
const MAX_LIST_PAGES: usize = 20;

/// Gemini provider over plain HTTPS.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    http: Client,
    base_url: String,
    api_key: String,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
}

impl GeminiProvider {
    /// Build a client from the study configuration.
    pub fn new(config: &StudyConfig) -> Result<Self, StudyAidError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StudyAidError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.expose().to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    async fn list_page(&self, page_token: Option<&str>) -> Result<ListModelsResponse, ProviderError> {
        let mut request = self
            .http
            .get(format!("{}/models", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(transport_error)?;
        let response = check_status(response).await?;
        response
            .json::<ListModelsResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("model list: {e}")))
    }
}

#[async_trait]
impl GenerativeProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        for page_no in 1..=MAX_LIST_PAGES {
            let page = self.list_page(page_token.as_deref()).await?;
            ids.extend(
                page.models
                    .into_iter()
                    .filter(|m| m.supported_generation_methods.iter().any(|g| g == GENERATE_METHOD))
                    .map(|m| ModelHandle::new(&m.name).id().to_string()),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    if !seen_tokens.insert(token.clone()) {
                        warn!("Model listing repeated page token {:?}; stopping", token);
                        break;
                    }
                    if page_no == MAX_LIST_PAGES {
                        warn!("Model listing exceeded {} pages; stopping", MAX_LIST_PAGES);
                    }
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        debug!("Gemini lists {} generation-capable models", ids.len());
        Ok(ids)
    }

    async fn generate(
        &self,
        model: &ModelHandle,
        prompt: &str,
    ) -> Result<RawModelResponse, ProviderError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: if self.temperature.is_some() || self.max_output_tokens.is_some() {
                Some(GenerationConfig {
                    temperature: self.temperature,
                    max_output_tokens: self.max_output_tokens,
                })
            } else {
                None
            },
        };

        trace!("generateContent on {} ({} prompt chars)", model, prompt.chars().count());

        let response = self
            .http
            .post(format!("{}/models/{}:{}", self.base_url, model.id(), GENERATE_METHOD))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("generateContent: {e}")))?;

        into_raw_response(parsed)
    }
}

// ── Response handling ────────────────────────────────────────────────────

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Transport(format!("timed out: {e}"))
    } else {
        ProviderError::Transport(e.to_string())
    }
}

/// Pass 2xx responses through; classify everything else.
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_secs = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(classify_error(status, &body, retry_after_secs))
}

fn classify_error(status: StatusCode, body: &str, retry_after_secs: Option<u64>) -> ProviderError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let (message, api_status) = match envelope {
        Some(env) => (env.error.message, env.error.status),
        None if body.trim().is_empty() => (
            status.canonical_reason().unwrap_or("unknown error").to_string(),
            None,
        ),
        None => (body.trim().to_string(), None),
    };

    if status == StatusCode::TOO_MANY_REQUESTS || api_status.as_deref() == Some("RESOURCE_EXHAUSTED") {
        ProviderError::RateLimited {
            message,
            retry_after_secs,
        }
    } else {
        ProviderError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

fn into_raw_response(parsed: GenerateContentResponse) -> Result<RawModelResponse, ProviderError> {
    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::Blocked { reason });
    }

    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Blocked {
            reason: "no candidates returned".to_string(),
        })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::Blocked {
            reason: candidate
                .finish_reason
                .unwrap_or_else(|| "empty candidate".to_string()),
        });
    }

    let usage = parsed.usage_metadata.unwrap_or_default();
    Ok(RawModelResponse {
        text,
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
    })
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<GeminiModel>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    candidates_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}
