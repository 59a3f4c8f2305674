//! Translation through an ordered provider chain.
//!
//! Services differ in quota, latency and accuracy, so the order is
//! configuration (`TRANSLATION_SERVICES`), compiled once into a chain. A
//! provider must succeed on every chunk of a text or the next provider is
//! tried; when the whole chain fails, a small offline phrase table covers
//! common greetings and anything else passes through untranslated with
//! `success = false`.

mod chunk;
mod offline;
mod providers;

pub use chunk::split_into_chunks;
pub use offline::offline_translate;
pub use providers::{
    FreeGoogleProvider, GoogleCloudProvider, LibreTranslateProvider, MyMemoryProvider,
    PonsProvider,
};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Chunk byte budget when Google Cloud leads the chain (it accepts large
/// payloads); other services get the conservative budget.
pub const LARGE_CHUNK_BUDGET: usize = 10_000;
pub const SMALL_CHUNK_BUDGET: usize = 4_000;

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider {provider} returned status {status}")]
    BadStatus { provider: &'static str, status: u16 },
    #[error("provider {provider} returned an unusable payload")]
    BadPayload { provider: &'static str },
    #[error("text too long for provider {provider}")]
    TooLong { provider: &'static str },
    #[error("language pair {src_lang}->{target} unsupported by {provider}")]
    UnsupportedPair {
        provider: &'static str,
        src_lang: String,
        target: String,
    },
    #[error("unknown translation service: {0}")]
    UnknownService(String),
}

pub type Result<T> = std::result::Result<T, TranslateError>;

/// The configurable translation services, in no particular order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    GoogleCloud,
    FreeGoogle,
    MyMemory,
    LibreTranslate,
    Pons,
}

impl Service {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim() {
            "google_cloud" => Ok(Service::GoogleCloud),
            "free_google" => Ok(Service::FreeGoogle),
            "mymemory" => Ok(Service::MyMemory),
            "libretranslate" => Ok(Service::LibreTranslate),
            "pons" => Ok(Service::Pons),
            other => Err(TranslateError::UnknownService(other.to_string())),
        }
    }

    /// Parse the comma-separated `TRANSLATION_SERVICES` preference list.
    pub fn parse_preference_list(list: &str) -> Result<Vec<Service>> {
        list.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Service::parse)
            .collect()
    }
}

/// One translation backend in the chain.
#[async_trait::async_trait]
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Hard input-size ceiling, if the provider has one.
    fn max_input_len(&self) -> Option<usize> {
        None
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;
}

/// Result of one translation attempt, embedded into artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationOutcome {
    pub translated_text: String,
    pub source_language: String,
    pub target_language: String,
    pub service: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranslationOutcome {
    pub fn identity(text: &str, language: &str) -> Self {
        Self {
            translated_text: text.to_string(),
            source_language: language.to_string(),
            target_language: language.to_string(),
            service: "no_translation_needed".to_string(),
            success: true,
            error: None,
        }
    }
}

/// Translator over a compiled provider chain.
pub struct Translator {
    providers: Vec<Arc<dyn TranslationProvider>>,
    large_budget_leader: bool,
}

impl Translator {
    pub fn new(providers: Vec<Arc<dyn TranslationProvider>>) -> Self {
        let large_budget_leader = providers
            .iter()
            .take(2)
            .any(|p| p.name() == "google_cloud");
        Self {
            providers,
            large_budget_leader,
        }
    }

    /// Compile the configured preference order into a provider chain.
    pub fn from_services(services: &[Service], google_api_key: Option<&str>) -> Self {
        let mut providers: Vec<Arc<dyn TranslationProvider>> = Vec::new();
        for service in services {
            match service {
                Service::GoogleCloud => {
                    if let Some(key) = google_api_key {
                        providers.push(Arc::new(GoogleCloudProvider::new(key)));
                    } else {
                        tracing::warn!("google_cloud requested without credentials, skipping");
                    }
                }
                Service::FreeGoogle => providers.push(Arc::new(FreeGoogleProvider::new())),
                Service::MyMemory => providers.push(Arc::new(MyMemoryProvider::new())),
                Service::LibreTranslate => providers.push(Arc::new(LibreTranslateProvider::new())),
                Service::Pons => providers.push(Arc::new(PonsProvider::new())),
            }
        }
        Self::new(providers)
    }

    fn chunk_budget(&self) -> usize {
        if self.large_budget_leader {
            LARGE_CHUNK_BUDGET
        } else {
            SMALL_CHUNK_BUDGET
        }
    }

    /// Translate `text` from `source` to `target` through the chain.
    ///
    /// Never fails hard: total chain failure falls back to the offline phrase
    /// table, then to the source text with `success = false`.
    pub async fn translate(&self, text: &str, source: &str, target: &str) -> TranslationOutcome {
        if source == target || text.trim().is_empty() {
            return TranslationOutcome::identity(text, source);
        }

        let chunks = split_into_chunks(text, self.chunk_budget());
        tracing::info!(
            chunks = chunks.len(),
            source,
            target,
            "translating through provider chain"
        );

        for provider in &self.providers {
            if let Some(max) = provider.max_input_len() {
                if text.len() > max {
                    tracing::debug!(provider = provider.name(), "text over provider limit, skipping");
                    continue;
                }
            }
            match self.translate_all_chunks(provider.as_ref(), &chunks, source, target).await {
                Ok(translated) => {
                    tracing::info!(provider = provider.name(), "translation succeeded");
                    return TranslationOutcome {
                        translated_text: translated.join(" "),
                        source_language: source.to_string(),
                        target_language: target.to_string(),
                        service: provider.name().to_string(),
                        success: true,
                        error: None,
                    };
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "provider failed, trying next");
                }
            }
        }

        tracing::warn!(source, target, "all translation services failed, using offline fallback");
        match offline_translate(text, source, target) {
            Some(translated) => TranslationOutcome {
                translated_text: translated,
                source_language: source.to_string(),
                target_language: target.to_string(),
                service: "offline_phrase_table".to_string(),
                success: true,
                error: None,
            },
            None => TranslationOutcome {
                translated_text: text.to_string(),
                source_language: source.to_string(),
                target_language: target.to_string(),
                service: "none".to_string(),
                success: false,
                error: Some("translation services unavailable, used original text".to_string()),
            },
        }
    }

    // Every chunk must succeed for the provider to count as successful.
    async fn translate_all_chunks(
        &self,
        provider: &dyn TranslationProvider,
        chunks: &[String],
        source: &str,
        target: &str,
    ) -> Result<Vec<String>> {
        let mut translated = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if chunk.trim().is_empty() {
                translated.push(chunk.clone());
                continue;
            }
            translated.push(provider.translate(chunk, source, target).await?);
        }
        Ok(translated)
    }
}
