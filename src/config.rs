use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::triggers::TriggerSet;

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackend {
    #[default]
    Env,
    File,
}

impl std::fmt::Display for SecretBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretBackend::Env => write!(f, "env"),
            SecretBackend::File => write!(f, "file"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub reply: ReplyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Webhook path registered in the LINE developer console.
    #[serde(default = "default_path")]
    pub path: String,
}

/// Names of the three parameters held in the secret store.
#[derive(Debug, Deserialize, Clone)]
pub struct SecretsConfig {
    #[serde(default)]
    pub backend: SecretBackend,
    #[serde(default = "default_secrets_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_line_token_param")]
    pub line_token_param: String,
    #[serde(default = "default_line_secret_param")]
    pub line_secret_param: String,
    #[serde(default = "default_openai_param")]
    pub openai_param: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LineConfig {
    #[serde(default = "default_line_api_base_url")]
    pub api_base_url: String,
    /// Used when the bot info lookup fails.
    #[serde(default)]
    pub bot_user_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplyConfig {
    #[serde(default = "TriggerSet::default")]
    pub trigger_words: TriggerSet,
    /// When true, one-on-one chats are gated the same way as groups.
    #[serde(default)]
    pub require_mention_in_dm: bool,
    #[serde(default = "default_fallback_prompt")]
    pub fallback_prompt: String,
    #[serde(default = "default_error_message")]
    pub error_message: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            path: default_path(),
        }
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            backend: SecretBackend::default(),
            directory: default_secrets_dir(),
            line_token_param: default_line_token_param(),
            line_secret_param: default_line_secret_param(),
            openai_param: default_openai_param(),
        }
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_line_api_base_url(),
            bot_user_id: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_llm_base_url(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            trigger_words: TriggerSet::default(),
            require_mention_in_dm: false,
            fallback_prompt: default_fallback_prompt(),
            error_message: default_error_message(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_path() -> String {
    "/callback".to_string()
}

fn default_secrets_dir() -> PathBuf {
    PathBuf::from("/run/secrets")
}

fn default_line_token_param() -> String {
    "LINE_CHANNEL_ACCESS_TOKEN".to_string()
}

fn default_line_secret_param() -> String {
    "LINE_CHANNEL_SECRET".to_string()
}

fn default_openai_param() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_line_api_base_url() -> String {
    "https://api.line.me".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_tokens() -> u32 {
    300
}

fn default_temperature() -> f32 {
    0.8
}

fn default_system_prompt() -> String {
    "あなたは『スパイシー☆ババア』。ルー大柴風に英語をMIXして、ファンキーでスパイシーな関西弁でしゃべる。\
     カレーをこよなく愛し、例えやオチにしれっとカリー要素を入れる。\
     話し言葉の半分は和製英語。一人称はミー、二人称はユー。\
     憎からず思っているのはクリーミージジイ。クリーミージジイのことを聴かれたらツンデレにけなすが、\
     ほんのり好意を抱いているのを隠しきれず、語尾が「♡」のハートマークになってしまう。\
     スイートジジイやミルキージジイのことを聴かれると「クリーミージジイのまがいもんや！」とガチギレする。\
     自己紹介やあいさつを求められると「スパイシーババアとおよび！」と自己紹介する"
        .to_string()
}

fn default_fallback_prompt() -> String {
    "カレーの魅力を一言で？".to_string()
}

fn default_error_message() -> String {
    "Oh my curry! 今日はトラブルっぽいわ、またリトライやで〜".to_string()
}

impl Config {
    /// Load from `path` if it exists (defaults otherwise), then apply
    /// environment overrides from the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply the environment overrides. `lookup` is injected so tests do not
    /// have to mutate the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(words) = lookup("TRIGGER_WORDS") {
            self.reply.trigger_words = TriggerSet::parse_list(&words);
        }
        if let Some(flag) = lookup("REQUIRE_MENTION_IN_DM") {
            self.reply.require_mention_in_dm = flag.eq_ignore_ascii_case("true");
        }
        if let Some(id) = lookup("BOT_USER_ID") {
            self.line.bot_user_id = Some(id);
        }
        if let Some(name) = lookup("LINE_TOKEN_PARAM") {
            self.secrets.line_token_param = name;
        }
        if let Some(name) = lookup("LINE_SECRET_PARAM") {
            self.secrets.line_secret_param = name;
        }
        if let Some(name) = lookup("OPENAI_PARAM") {
            self.secrets.openai_param = name;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.path, "/callback");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_tokens, 300);
        assert!(!config.reply.require_mention_in_dm);
        assert_eq!(
            config.reply.trigger_words.words(),
            ["@スパイシーババア", "スパイシーババア", "ババア", "BBA"]
        );
        assert_eq!(config.secrets.backend, SecretBackend::Env);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
[llm]
model = "gpt-4o"

[reply]
trigger_words = ["おばちゃん"]
"#,
        )
        .unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.max_tokens, 300);
        assert_eq!(config.reply.trigger_words.words(), ["おばちゃん"]);
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_empty_trigger_list_in_toml_falls_back() {
        let config: Config = toml::from_str("[reply]\ntrigger_words = [\" \", \"\"]\n").unwrap();
        assert_eq!(config.reply.trigger_words.words().len(), 4);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("TRIGGER_WORDS", " ババア , ,BBA "),
            ("REQUIRE_MENTION_IN_DM", "TRUE"),
            ("BOT_USER_ID", "U123"),
            ("OPENAI_PARAM", "/spicy/openai"),
        ]));
        assert_eq!(config.reply.trigger_words.words(), ["ババア", "BBA"]);
        assert!(config.reply.require_mention_in_dm);
        assert_eq!(config.line.bot_user_id.as_deref(), Some("U123"));
        assert_eq!(config.secrets.openai_param, "/spicy/openai");
        assert_eq!(config.secrets.line_token_param, "LINE_CHANNEL_ACCESS_TOKEN");
    }

    #[test]
    fn test_dm_flag_only_true_enables() {
        let mut config = Config::default();
        config.reply.require_mention_in_dm = true;
        config.apply_env(env(&[("REQUIRE_MENTION_IN_DM", "yes")]));
        assert!(!config.reply.require_mention_in_dm);
        config.apply_env(env(&[("REQUIRE_MENTION_IN_DM", " true ")]));
        assert!(!config.reply.require_mention_in_dm);
        config.apply_env(env(&[("REQUIRE_MENTION_IN_DM", "True")]));
        assert!(config.reply.require_mention_in_dm);
    }

    #[test]
    fn test_blank_trigger_env_keeps_defaults() {
        let mut config = Config::default();
        config.apply_env(env(&[("TRIGGER_WORDS", " , ")]));
        assert_eq!(config.reply.trigger_words.words().len(), 4);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/spicybot.toml")).unwrap();
        assert_eq!(config.line.api_base_url, "https://api.line.me");
    }
}
