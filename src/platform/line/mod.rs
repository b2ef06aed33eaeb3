pub mod webhook;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::platform::ChatPlatform;

/// LINE accepts at most five message objects per reply.
pub const MAX_MESSAGES_PER_REPLY: usize = 5;
/// Character limit of a single LINE text message.
pub const MAX_TEXT_CHARS: usize = 5000;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<TextSendMessage<'a>>,
}

#[derive(Serialize)]
struct TextSendMessage<'a> {
    #[serde(rename = "type")]
    message_type: &'static str,
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BotInfo {
    user_id: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Messaging API client authenticated with the channel access token.
pub struct LineClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl LineClient {
    pub fn new(base_url: &str, access_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }
}

#[async_trait]
impl ChatPlatform for LineClient {
    async fn bot_user_id(&self) -> Result<String> {
        let url = format!("{}/v2/bot/info", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Failed to request LINE bot info")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LINE bot info error ({}): {}", status, body);
        }

        let info: BotInfo = response
            .json()
            .await
            .context("Failed to parse LINE bot info")?;
        debug!(
            "Bot info: userId={} displayName={}",
            info.user_id,
            info.display_name.as_deref().unwrap_or("-")
        );
        Ok(info.user_id)
    }

    async fn reply(&self, reply_token: &str, texts: &[String]) -> Result<()> {
        if texts.len() > MAX_MESSAGES_PER_REPLY {
            warn!(
                "Reply has {} messages, sending the first {}",
                texts.len(),
                MAX_MESSAGES_PER_REPLY
            );
        }

        let request = ReplyRequest {
            reply_token,
            messages: texts
                .iter()
                .take(MAX_MESSAGES_PER_REPLY)
                .map(|text| TextSendMessage {
                    message_type: "text",
                    text: text.as_str(),
                })
                .collect(),
        };

        let url = format!("{}/v2/bot/message/reply", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .context("Failed to send LINE reply")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LINE reply error ({}): {}", status, body);
        }

        Ok(())
    }
}

/// Split long text into chunks of at most `max_chars` characters, preferring
/// to break after a newline or space.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let end = text[start..]
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| start + i)
            .unwrap_or(text.len());

        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}
