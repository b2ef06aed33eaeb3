pub mod line;

use anyhow::Result;
use async_trait::async_trait;

/// Outbound side of a chat platform, as used by the responder.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// The platform user id of the bot account itself.
    async fn bot_user_id(&self) -> Result<String>;

    /// Send `texts` as one reply addressed by a single-use `reply_token`.
    async fn reply(&self, reply_token: &str, texts: &[String]) -> Result<()>;
}
