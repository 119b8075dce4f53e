//! Platform adapters
//!
//! The moderated platform performs the actual restrictions. Every operation
//! must be idempotent: banning a banned subject, unbanning a subject with no
//! ban, and the mute equivalents all succeed without changing anything. The
//! scheduler depends on this when a cancellation races a due reversal.

mod discord;
mod memory;

pub use discord::DiscordPlatform;
pub use memory::{DirectMessage, MemoryPlatform};

use crate::error::PlatformResult;
use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Which surface a mute applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum MuteChannel {
    #[default]
    #[display("comment")]
    Comment,
    #[display("modmail")]
    Modmail,
    #[display("both")]
    Both,
}

/// Reason fields attached to a ban
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanReason {
    /// Shown to the subject
    pub reason: String,
    /// Moderator-only note
    pub note: Option<String>,
}

impl BanReason {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            note: None,
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}

/// Operations the moderation core needs from the platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Ban `subject`; `duration_days` of `None` is permanent
    async fn apply_ban(
        &self,
        community: &str,
        subject: &str,
        reason: &BanReason,
        duration_days: Option<u32>,
    ) -> PlatformResult<()>;

    /// Lift a ban. No-op if the subject is not banned.
    async fn remove_ban(&self, community: &str, subject: &str) -> PlatformResult<()>;

    async fn apply_mute(
        &self,
        community: &str,
        subject: &str,
        duration_days: u32,
        channel: MuteChannel,
    ) -> PlatformResult<()>;

    /// Lift a mute. No-op if the subject is not muted.
    async fn remove_mute(&self, community: &str, subject: &str) -> PlatformResult<()>;

    async fn send_direct_message(
        &self,
        recipient: &str,
        title: &str,
        body: &str,
    ) -> PlatformResult<()>;
}
