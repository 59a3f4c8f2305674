//! Text-to-speech client and voice selection.

use base64::Engine;
use serde::Deserialize;

/// Provider limit is 5000 bytes; stay safely under it.
pub const TTS_BYTE_LIMIT: usize = 4500;

#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("tts request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("tts endpoint returned status {0}")]
    BadStatus(u16),
    #[error("tts reply carried no audio")]
    NoAudio,
    #[error("audio io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audio concatenation failed: {0}")]
    Concat(String),
}

/// A resolved voice for one synthesis call.
#[derive(Debug, Clone)]
pub struct TtsVoice {
    pub language_code: String,
    pub voice_name: String,
    pub gender: &'static str,
}

// (base language, language code, standard voice, premium voice)
const VOICE_TABLE: &[(&str, &str, &str, &str)] = &[
    ("en", "en-IN", "en-IN-Standard-A", "en-IN-Neural2-A"),
    ("hi", "hi-IN", "hi-IN-Standard-A", "hi-IN-Neural2-A"),
    ("bn", "bn-IN", "bn-IN-Standard-A", "bn-IN-Wavenet-A"),
    ("te", "te-IN", "te-IN-Standard-A", "te-IN-Standard-A"),
    ("mr", "mr-IN", "mr-IN-Standard-A", "mr-IN-Wavenet-A"),
    ("ta", "ta-IN", "ta-IN-Standard-A", "ta-IN-Wavenet-A"),
    ("gu", "gu-IN", "gu-IN-Standard-A", "gu-IN-Wavenet-A"),
    ("kn", "kn-IN", "kn-IN-Standard-A", "kn-IN-Wavenet-A"),
    ("ml", "ml-IN", "ml-IN-Standard-A", "ml-IN-Wavenet-A"),
    ("pa", "pa-IN", "pa-IN-Standard-A", "pa-IN-Wavenet-A"),
];

/// Pick a voice for the language, honouring the configured quality hint.
/// Unknown languages fall back to the Hindi voice, the channel's default.
pub fn voice_for(language: &str, quality: &str) -> TtsVoice {
    let premium = matches!(quality, "premium" | "neural" | "wavenet");
    let row = VOICE_TABLE
        .iter()
        .find(|(base, _, _, _)| *base == language)
        .unwrap_or(&VOICE_TABLE[1]);
    TtsVoice {
        language_code: row.1.to_string(),
        voice_name: if premium { row.3 } else { row.2 }.to_string(),
        gender: "FEMALE",
    }
}

/// Seam over the speech synthesiser.
#[async_trait::async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesise one chunk (already inside [`TTS_BYTE_LIMIT`]) to MP3 bytes.
    async fn synthesize(&self, text: &str, voice: &TtsVoice) -> Result<Vec<u8>, TtsError>;
}

/// REST client for a Google-style TTS endpoint.
pub struct GoogleTtsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleTtsClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    #[serde(rename = "audioContent")]
    audio_content: Option<String>,
}

#[async_trait::async_trait]
impl TextToSpeech for GoogleTtsClient {
    async fn synthesize(&self, text: &str, voice: &TtsVoice) -> Result<Vec<u8>, TtsError> {
        let url = format!("{}/v1/text:synthesize", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "input": {"text": text},
            "voice": {
                "languageCode": &voice.language_code,
                "name": &voice.voice_name,
                "ssmlGender": voice.gender,
            },
            "audioConfig": {
                "audioEncoding": "MP3",
                "speakingRate": 1.0,
                "pitch": 0.0,
            },
        });
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TtsError::BadStatus(status.as_u16()));
        }
        let parsed: SynthesizeResponse = response.json().await?;
        let encoded = parsed.audio_content.ok_or(TtsError::NoAudio)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|_| TtsError::NoAudio)
    }
}
