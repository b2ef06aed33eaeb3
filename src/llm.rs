use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::secrets::SecretStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.to_string()),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Something that turns a system instruction plus one user message into text.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String>;
}

pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: String,
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            api_key,
        }
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ChatMessage> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        debug!("Sending completion request: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion API error ({}): {}", status, error_body);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .context("No choices in completion response")
    }
}

#[async_trait]
impl ChatCompletion for LlmClient {
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        let message = self
            .chat(vec![ChatMessage::system(system_prompt), ChatMessage::user(user_text)])
            .await?;
        let content = message.content.context("Completion returned no content")?;
        Ok(content.trim().to_string())
    }
}

/// Builds the [`LlmClient`] on first use, fetching the API key from the
/// secret store. A failed fetch is not cached, so the next call retries.
pub struct LazyLlmClient {
    config: LlmConfig,
    secrets: Arc<dyn SecretStore>,
    api_key_param: String,
    client: OnceCell<LlmClient>,
}

impl LazyLlmClient {
    pub fn new(config: LlmConfig, secrets: Arc<dyn SecretStore>, api_key_param: String) -> Self {
        Self {
            config,
            secrets,
            api_key_param,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&LlmClient> {
        self.client
            .get_or_try_init(|| async {
                let api_key = self
                    .secrets
                    .get_parameter(&self.api_key_param)
                    .await
                    .context("Failed to fetch completion API key")?;
                info!("Completion client ready: model={}", self.config.model);
                Ok::<_, anyhow::Error>(LlmClient::new(self.config.clone(), api_key))
            })
            .await
    }
}

#[async_trait]
impl ChatCompletion for LazyLlmClient {
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        self.client().await?.complete(system_prompt, user_text).await
    }
}
