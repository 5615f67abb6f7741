//! Model resolution: find a model identifier this credential can call.
//!
//! Gemini's catalogue changes underneath callers: identifiers get
//! deprecated, new tiers appear, and which ones are callable (and at what
//! quota) depends on the key. Hard-coding one name breaks silently when it
//! disappears, so the resolver lists what is available and ranks it.
//!
//! ## Selection order
//!
//! 1. The first entry of [`ModelPreferences::preferred`] present in the
//!    listing. Ranking follows the preference list, never listing order.
//! 2. The first listed model matching the heuristic: its name contains
//!    `require` and none of the `exclude` markers.
//! 3. The first listed model.
//! 4. Listing failed or came back empty → [`ModelPreferences::fallback`].
//!
//! Only step 4 can fail, and only when no fallback is configured.
//!
//! ## Caching
//!
//! A discovered model is memoised for the life of the resolver. The lock is
//! held just long enough to read or write the slot, never across the
//! listing call; two tasks racing on a cold cache both resolve and the
//! second write wins with an equivalent value. Fallback answers are not
//! cached, so the next call retries discovery.

use crate::error::StudyAidError;
use crate::provider::{GenerativeProvider, ModelHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Ranking data for model discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPreferences {
    /// Exact identifiers, best first.
    pub preferred: Vec<String>,
    /// Substring a heuristic match must contain (case-insensitive).
    pub require: String,
    /// Substrings that disqualify a heuristic match (case-insensitive).
    pub exclude: Vec<String>,
    /// Identifier used when the listing is unavailable.
    pub fallback: Option<String>,
}

impl Default for ModelPreferences {
    /// Stable flash tier first, then its `-latest` alias, then the
    /// general-purpose tiers.
    fn default() -> Self {
        Self {
            preferred: vec![
                "gemini-1.5-flash".to_string(),
                "gemini-1.5-flash-latest".to_string(),
                "gemini-2.0-flash".to_string(),
                "gemini-1.5-pro".to_string(),
                "gemini-pro".to_string(),
            ],
            require: "flash".to_string(),
            exclude: vec![
                "exp".to_string(),
                "preview".to_string(),
                "thinking".to_string(),
            ],
            fallback: Some("gemini-1.5-flash".to_string()),
        }
    }
}

impl ModelPreferences {
    fn matches_heuristic(&self, id: &str) -> bool {
        let id = id.to_lowercase();
        id.contains(&self.require.to_lowercase())
            && !self
                .exclude
                .iter()
                .any(|marker| id.contains(&marker.to_lowercase()))
    }
}

/// Pick a model from `available` according to `prefs` (steps 1–3).
///
/// Returns `None` only for an empty listing.
pub fn select_model(available: &[String], prefs: &ModelPreferences) -> Option<String> {
    let normalised: Vec<String> = available
        .iter()
        .map(|id| ModelHandle::new(id).id().to_string())
        .collect();

    prefs
        .preferred
        .iter()
        .find(|want| normalised.iter().any(|have| have == *want))
        .cloned()
        .or_else(|| {
            normalised
                .iter()
                .find(|id| prefs.matches_heuristic(id))
                .cloned()
        })
        .or_else(|| normalised.first().cloned())
}

/// Supplies the model handle used for generation calls.
#[async_trait]
pub trait ModelResolver: Send + Sync {
    async fn resolve(&self) -> Result<ModelHandle, StudyAidError>;

    /// Forget any cached choice so the next `resolve` rediscovers.
    fn invalidate(&self) {}
}

/// Discovery-backed resolver with a process-lifetime cache.
pub struct CachingModelResolver {
    provider: Arc<dyn GenerativeProvider>,
    preferences: ModelPreferences,
    cached: RwLock<Option<ModelHandle>>,
}

impl CachingModelResolver {
    pub fn new(provider: Arc<dyn GenerativeProvider>, preferences: ModelPreferences) -> Self {
        Self {
            provider,
            preferences,
            cached: RwLock::new(None),
        }
    }

    /// The memoised handle, if discovery has succeeded.
    pub fn cached(&self) -> Option<ModelHandle> {
        self.cached.read().ok().and_then(|slot| slot.clone())
    }

    fn store(&self, handle: &ModelHandle) {
        if let Ok(mut slot) = self.cached.write() {
            *slot = Some(handle.clone());
        }
    }

    fn fallback(&self, reason: &str) -> Result<ModelHandle, StudyAidError> {
        match &self.preferences.fallback {
            Some(id) => {
                warn!("Model discovery unavailable ({reason}); using fallback '{id}'");
                Ok(ModelHandle::new(id))
            }
            None => Err(StudyAidError::Resolution {
                detail: format!("{reason}, and no fallback model is configured"),
            }),
        }
    }
}

#[async_trait]
impl ModelResolver for CachingModelResolver {
    async fn resolve(&self) -> Result<ModelHandle, StudyAidError> {
        if let Some(handle) = self.cached() {
            return Ok(handle);
        }

        let available = match self.provider.list_models().await {
            Ok(models) => models,
            Err(e) => return self.fallback(&format!("listing failed: {e}")),
        };
        debug!("{} models available from {}", available.len(), self.provider.name());

        match select_model(&available, &self.preferences) {
            Some(id) => {
                let handle = ModelHandle::new(id);
                info!("Using model: {}", handle);
                self.store(&handle);
                Ok(handle)
            }
            None => self.fallback("listing returned no generation models"),
        }
    }

    fn invalidate(&self) {
        if let Ok(mut slot) = self.cached.write() {
            if slot.take().is_some() {
                debug!("Model cache invalidated");
            }
        }
    }
}

/// Resolver that always answers with one configured model.
#[derive(Debug, Clone)]
pub struct FixedModelResolver(ModelHandle);

impl FixedModelResolver {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(ModelHandle::new(id))
    }
}

#[async_trait]
impl ModelResolver for FixedModelResolver {
    async fn resolve(&self) -> Result<ModelHandle, StudyAidError> {
        Ok(self.0.clone())
    }
}
