mod bot;
mod config;
mod llm;
mod platform;
mod responder;
mod secrets;
mod triggers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;
use crate::llm::LazyLlmClient;
use crate::platform::line::LineClient;
use crate::responder::Responder;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,spicybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Model: {}", config.llm.model);
    info!("  Secret backend: {}", config.secrets.backend);
    info!("  Trigger words: {:?}", config.reply.trigger_words.words());
    info!("  Require mention in DM: {}", config.reply.require_mention_in_dm);

    // LINE credentials are needed for every request, so fetch them up front.
    let secrets = secrets::from_config(&config.secrets);
    let access_token = secrets
        .get_parameter(&config.secrets.line_token_param)
        .await
        .context("Failed to fetch LINE channel access token")?;
    let channel_secret = secrets
        .get_parameter(&config.secrets.line_secret_param)
        .await
        .context("Failed to fetch LINE channel secret")?;

    let line = LineClient::new(&config.line.api_base_url, access_token);
    let llm = LazyLlmClient::new(
        config.llm.clone(),
        secrets.clone(),
        config.secrets.openai_param.clone(),
    );

    let responder = Responder::new(
        config.reply.clone(),
        config.llm.system_prompt.clone(),
        config.line.bot_user_id.clone(),
        Arc::new(line),
        Arc::new(llm),
    );

    // Create shared state
    let state = Arc::new(AppState::new(channel_secret, responder));

    info!("Bot is starting...");
    bot::run(state, &config.server.bind, &config.server.path).await?;

    Ok(())
}
