//! Chat-completion client for orchestration decisions.
//!
//! All reasoning steps (query extraction, classification, synthesis, the
//! specialists' parameter extraction) go through [`ChatModel`]. The HTTP
//! implementation talks to an OpenAI-compatible endpoint; tests swap in a
//! scripted model. A model reply is never trusted to be valid JSON;
//! [`extract_json`] digs the first balanced object out of surrounding prose.

mod json;

pub use json::extract_json;

use serde::Deserialize;
use std::time::Duration;

/// Default deadline for a single model call.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm call timed out after {0:?}")]
    Timeout(Duration),
    #[error("llm returned no choices")]
    EmptyResponse,
    #[error("llm endpoint returned status {0}")]
    BadStatus(u16),
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// Options for a single completion call.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

impl CompletionOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            max_tokens: None,
        }
    }
}

/// Seam for everything that asks the language model a question.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str, opts: CompletionOptions) -> Result<String>;
}

/// Configuration for the HTTP chat client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: DEFAULT_LLM_TIMEOUT,
        }
    }
}

/// Stateless chat client, safe to share across concurrent calls.
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait::async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, prompt: &str, opts: CompletionOptions) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let mut body = serde_json::json!({
            "model": &self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": opts.temperature,
        });
        if let Some(max_tokens) = opts.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        tracing::debug!(model = %self.config.model, prompt_len = prompt.len(), "llm call");

        let request = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.config.timeout, request)
            .await
            .map_err(|_| LlmError::Timeout(self.config.timeout))??;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::BadStatus(status.as_u16()));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)?;

        tracing::debug!(reply_len = content.len(), "llm reply");
        Ok(content)
    }
}

pub mod testing {
    //! Scripted model for orchestrator and specialist tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order; errors once the script runs out.
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String>>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<&str>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            }
        }

        /// A model whose every call fails, for degraded-path tests.
        pub fn failing() -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
            }
        }

        pub fn push(&self, reply: &str) {
            self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, _prompt: &str, _opts: CompletionOptions) -> Result<String> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;

    #[tokio::test]
    async fn test_scripted_model_replays_in_order() {
        let model = ScriptedModel::new(vec!["one", "two"]);
        assert_eq!(model.complete("a", CompletionOptions::default()).await.unwrap(), "one");
        assert_eq!(model.complete("b", CompletionOptions::default()).await.unwrap(), "two");
        assert!(model.complete("c", CompletionOptions::default()).await.is_err());
    }
}
