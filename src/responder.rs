use std::sync::Arc;

use anyhow::Result;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::ReplyConfig;
use crate::llm::ChatCompletion;
use crate::platform::line::webhook::WebhookEvent;
use crate::platform::line::{split_text, MAX_TEXT_CHARS};
use crate::platform::ChatPlatform;

/// Gate for a single text message.
///
/// Group and room messages (and one-on-one messages when
/// `require_mention_in_dm` is set) need either a mention of the bot or a
/// trigger word in the text. Everything else is answered.
pub fn should_reply(
    mentioned: bool,
    has_trigger: bool,
    in_group_or_room: bool,
    require_mention_in_dm: bool,
) -> bool {
    if in_group_or_room || require_mention_in_dm {
        mentioned || has_trigger
    } else {
        true
    }
}

/// True when the raw event's `message.mention.mentionees` contains `bot_id`.
/// An empty `bot_id` or any missing/odd structure means "not mentioned".
pub fn mentions_bot(raw_event: &serde_json::Value, bot_id: &str) -> bool {
    if bot_id.is_empty() {
        return false;
    }
    let Some(mentionees) = raw_event
        .pointer("/message/mention/mentionees")
        .and_then(serde_json::Value::as_array)
    else {
        return false;
    };

    mentionees.iter().any(|m| {
        m.get("userId")
            .or_else(|| m.get("user_id"))
            .and_then(serde_json::Value::as_str)
            == Some(bot_id)
    })
}

/// Tally of one webhook batch.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchOutcome {
    pub replied: usize,
    pub skipped: usize,
    pub failed_dispatches: usize,
}

/// Decides whether to answer each inbound message, asks the model, and sends
/// the answer back. Shared by every request for the life of the process.
pub struct Responder {
    reply: ReplyConfig,
    system_prompt: String,
    fallback_bot_user_id: Option<String>,
    platform: Arc<dyn ChatPlatform>,
    llm: Arc<dyn ChatCompletion>,
    bot_user_id: OnceCell<String>,
}

impl Responder {
    pub fn new(
        reply: ReplyConfig,
        system_prompt: String,
        fallback_bot_user_id: Option<String>,
        platform: Arc<dyn ChatPlatform>,
        llm: Arc<dyn ChatCompletion>,
    ) -> Self {
        Self {
            reply,
            system_prompt,
            fallback_bot_user_id,
            platform,
            llm,
            bot_user_id: OnceCell::new(),
        }
    }

    /// The bot's own user id, looked up once. A failed lookup falls back to
    /// the configured id (or empty) and that result is kept as well.
    pub async fn resolve_bot_identity(&self) -> &str {
        self.bot_user_id
            .get_or_init(|| async {
                match self.platform.bot_user_id().await {
                    Ok(id) => {
                        info!("Resolved bot user id: {}", id);
                        id
                    }
                    Err(e) => {
                        let fallback = self.fallback_bot_user_id.clone().unwrap_or_default();
                        if fallback.is_empty() {
                            warn!("Bot info lookup failed ({:#}); mention detection disabled", e);
                        } else {
                            warn!("Bot info lookup failed ({:#}); using configured bot user id", e);
                        }
                        fallback
                    }
                }
            })
            .await
    }

    pub fn strip_triggers(&self, text: &str) -> String {
        self.reply
            .trigger_words
            .strip(text, &self.reply.fallback_prompt)
    }

    pub async fn generate_reply(&self, prompt: &str) -> Result<String> {
        self.llm.complete(&self.system_prompt, prompt).await
    }

    pub async fn dispatch(&self, reply_token: &str, text: &str) -> Result<()> {
        let chunks = split_text(text, MAX_TEXT_CHARS);
        self.platform.reply(reply_token, &chunks).await
    }

    /// Decide for one text message. The bot identity is only resolved when
    /// the gate actually needs it.
    async fn decide(&self, text: &str, raw_event: Option<&serde_json::Value>, in_group: bool) -> bool {
        let gated = in_group || self.reply.require_mention_in_dm;
        if !gated {
            return should_reply(false, false, in_group, self.reply.require_mention_in_dm);
        }

        let mentioned = match raw_event {
            Some(raw) => mentions_bot(raw, self.resolve_bot_identity().await),
            None => false,
        };
        let has_trigger = self.reply.trigger_words.contains_any(text);
        should_reply(mentioned, has_trigger, in_group, self.reply.require_mention_in_dm)
    }

    /// Run one webhook batch. Typed and raw events are paired by position;
    /// the shorter list bounds the batch. A missing raw list (`raw_events`
    /// empty) still lets the trigger-word path work.
    pub async fn handle_events(
        &self,
        events: &[WebhookEvent],
        raw_events: &[serde_json::Value],
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        let pairs: Vec<(&WebhookEvent, Option<&serde_json::Value>)> = if raw_events.is_empty() {
            events.iter().map(|ev| (ev, None)).collect()
        } else {
            events.iter().zip(raw_events.iter().map(Some)).collect()
        };

        for (event, raw_event) in pairs {
            let Some((message, text)) = event.as_text_message() else {
                debug!("Skipping non-text event");
                outcome.skipped += 1;
                continue;
            };

            let in_group = message.source.is_group_or_room();
            if !self.decide(text, raw_event, in_group).await {
                debug!(
                    "Not addressed, ignoring message in {}",
                    message.source.conversation_id().unwrap_or("unknown")
                );
                outcome.skipped += 1;
                continue;
            }

            let Some(reply_token) = message.reply_token.as_deref() else {
                warn!("Addressed message has no reply token, ignoring");
                outcome.skipped += 1;
                continue;
            };

            info!(
                "Replying in {} (group={}, {} chars)",
                message.source.conversation_id().unwrap_or("unknown"),
                in_group,
                text.chars().count()
            );
            debug!("Message text: {}", text);

            let prompt = self.strip_triggers(text);
            let answer = match self.generate_reply(&prompt).await {
                Ok(answer) => answer,
                Err(e) => {
                    error!("Completion failed: {:#}", e);
                    self.reply.error_message.clone()
                }
            };

            match self.dispatch(reply_token, &answer).await {
                Ok(()) => outcome.replied += 1,
                Err(e) => {
                    error!("Reply dispatch failed: {:#}", e);
                    outcome.failed_dispatches += 1;
                }
            }
        }

        outcome
    }
}
