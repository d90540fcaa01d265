//! Outgoing chat replies.
//!
//! The chat transport itself lives outside this crate; it is reached through
//! [`ChatSink`]. Every reply goes through a [`ChatReplier`], which applies
//! the reply rate limit and the replies-enabled switch.

pub mod rate_limit;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub use rate_limit::{ReplyLimitConfig, ReplyLimiter};

#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn say(&self, channel: &str, message: &str) -> anyhow::Result<()>;
}

/// Writes replies to the log only. Used for dry runs and the CLI.
#[derive(Debug, Default)]
pub struct LogChatSink;

#[async_trait]
impl ChatSink for LogChatSink {
    async fn say(&self, channel: &str, message: &str) -> anyhow::Result<()> {
        info!("💬 [#{}] {}", channel, message);
        Ok(())
    }
}

pub struct ChatReplier {
    sink: Arc<dyn ChatSink>,
    limiter: ReplyLimiter,
    replies_enabled: bool,
}

impl ChatReplier {
    pub fn new(sink: Arc<dyn ChatSink>, limiter: ReplyLimiter, replies_enabled: bool) -> Self {
        Self {
            sink,
            limiter,
            replies_enabled,
        }
    }

    /// Best-effort: a reply that is rate limited or fails to send is logged
    /// and dropped, never retried. Returns whether it went out.
    pub async fn say(&self, channel: &str, message: &str) -> bool {
        if !self.limiter.allow() {
            info!(channel, "[on cooldown] {}", message);
            return false;
        }
        info!(channel, "[->] {}", message);
        if !self.replies_enabled {
            return false;
        }
        match self.sink.say(channel, message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(channel, error = %e, "failed to send chat reply");
                false
            }
        }
    }
}
