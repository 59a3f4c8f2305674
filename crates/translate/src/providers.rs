//! HTTP implementations of the translation services.

use crate::{Result, TranslateError, TranslationProvider};
use serde::Deserialize;

/// Google Cloud Translation v2. Paid, most reliable, takes large payloads.
pub struct GoogleCloudProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleCloudProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: "https://translation.googleapis.com/language/translate/v2".to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct GoogleCloudResponse {
    data: GoogleCloudData,
}

#[derive(Debug, Deserialize)]
struct GoogleCloudData {
    translations: Vec<GoogleCloudTranslation>,
}

#[derive(Debug, Deserialize)]
struct GoogleCloudTranslation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[async_trait::async_trait]
impl TranslationProvider for GoogleCloudProvider {
    fn name(&self) -> &'static str {
        "google_cloud"
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "q": text,
            "target": target,
            "format": "text",
        });
        // Omitting `source` asks the service to auto-detect.
        if source != "unknown" && !source.is_empty() {
            body["source"] = serde_json::json!(source);
        }
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::BadStatus {
                provider: self.name(),
                status: status.as_u16(),
            });
        }
        let parsed: GoogleCloudResponse = response.json().await?;
        parsed
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or(TranslateError::BadPayload { provider: "google_cloud" })
    }
}

/// The free Google translate endpoint used by browser clients. No quota
/// guarantees; good as a second line.
pub struct FreeGoogleProvider {
    http: reqwest::Client,
    endpoint: String,
}

impl FreeGoogleProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: "https://translate.googleapis.com/translate_a/single".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for FreeGoogleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TranslationProvider for FreeGoogleProvider {
    fn name(&self) -> &'static str {
        "free_google"
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let sl = if source.is_empty() || source == "unknown" {
            "auto"
        } else {
            source
        };
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", sl),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::BadStatus {
                provider: self.name(),
                status: status.as_u16(),
            });
        }
        // Reply shape: [[["translated", "original", ...], ...], ...]
        let value: serde_json::Value = response.json().await?;
        let segments = value
            .get(0)
            .and_then(|v| v.as_array())
            .ok_or(TranslateError::BadPayload { provider: "free_google" })?;
        let mut out = String::new();
        for segment in segments {
            if let Some(piece) = segment.get(0).and_then(|v| v.as_str()) {
                out.push_str(piece);
            }
        }
        if out.is_empty() {
            return Err(TranslateError::BadPayload { provider: "free_google" });
        }
        Ok(out)
    }
}

/// MyMemory translation memory. Free with generous limits.
pub struct MyMemoryProvider {
    http: reqwest::Client,
    endpoint: String,
}

impl MyMemoryProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: "https://api.mymemory.translated.net/get".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for MyMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct MyMemoryResponse {
    #[serde(rename = "responseData")]
    response_data: MyMemoryData,
}

#[derive(Debug, Deserialize)]
struct MyMemoryData {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[async_trait::async_trait]
impl TranslationProvider for MyMemoryProvider {
    fn name(&self) -> &'static str {
        "mymemory"
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let pair = format!("{source}|{target}");
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("q", text), ("langpair", pair.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::BadStatus {
                provider: self.name(),
                status: status.as_u16(),
            });
        }
        let parsed: MyMemoryResponse = response.json().await?;
        if parsed.response_data.translated_text.is_empty() {
            return Err(TranslateError::BadPayload { provider: "mymemory" });
        }
        Ok(parsed.response_data.translated_text)
    }
}

/// LibreTranslate public instance.
pub struct LibreTranslateProvider {
    http: reqwest::Client,
    endpoint: String,
}

const LIBRE_LANGUAGES: &[&str] = &[
    "hi", "bn", "es", "fr", "de", "it", "pt", "ru", "ja", "ko", "zh", "ar", "nl", "sv", "en",
];

impl LibreTranslateProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: "https://libretranslate.de/translate".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for LibreTranslateProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct LibreResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[async_trait::async_trait]
impl TranslationProvider for LibreTranslateProvider {
    fn name(&self) -> &'static str {
        "libretranslate"
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let source_code = if LIBRE_LANGUAGES.contains(&source) {
            source
        } else {
            "auto"
        };
        if !LIBRE_LANGUAGES.contains(&target) {
            return Err(TranslateError::UnsupportedPair {
                provider: "libretranslate",
                src_lang: source.to_string(),
                target: target.to_string(),
            });
        }
        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "q": text,
                "source": source_code,
                "target": target,
                "format": "text",
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::BadStatus {
                provider: self.name(),
                status: status.as_u16(),
            });
        }
        let parsed: LibreResponse = response.json().await?;
        Ok(parsed.translated_text)
    }
}

/// PONS dictionary lookup. Only useful for short European-language phrases.
pub struct PonsProvider {
    http: reqwest::Client,
    endpoint: String,
}

const PONS_LANGUAGES: &[&str] = &["es", "fr", "de", "it", "pt", "ru", "en"];

impl PonsProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: "https://api.pons.com/text-translation-web/v4/translate".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for PonsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct PonsResponse {
    text: String,
}

#[async_trait::async_trait]
impl TranslationProvider for PonsProvider {
    fn name(&self) -> &'static str {
        "pons"
    }

    fn max_input_len(&self) -> Option<usize> {
        Some(500)
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        if !PONS_LANGUAGES.contains(&source) || !PONS_LANGUAGES.contains(&target) {
            return Err(TranslateError::UnsupportedPair {
                provider: "pons",
                src_lang: source.to_string(),
                target: target.to_string(),
            });
        }
        if text.len() > 500 {
            return Err(TranslateError::TooLong { provider: "pons" });
        }
        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "text": text,
                "sourceLanguage": source,
                "targetLanguage": target,
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::BadStatus {
                provider: self.name(),
                status: status.as_u16(),
            });
        }
        let parsed: PonsResponse = response.json().await?;
        Ok(parsed.text)
    }
}
