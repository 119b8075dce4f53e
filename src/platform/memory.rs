//! In-process platform used for dry runs and tests

use super::{BanReason, MuteChannel, PlatformAdapter};
use crate::error::{PlatformError, PlatformResult};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::{Arc, Mutex};
use tracing::info;

type Key = (String, String);

/// A message delivered through [`MemoryPlatform::send_direct_message`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectMessage {
    pub recipient: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BanState {
    reason: BanReason,
    duration_days: Option<u32>,
}

/// Simulated platform that tracks restrictions in memory
///
/// Subjects registered with [`MemoryPlatform::fail_for`] make every
/// operation targeting them fail, to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryPlatform {
    bans: Arc<DashMap<Key, BanState>>,
    mutes: Arc<DashMap<Key, (u32, MuteChannel)>>,
    messages: Arc<Mutex<Vec<DirectMessage>>>,
    failing: Arc<DashSet<String>>,
}

impl MemoryPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make operations on `subject` fail from now on
    pub fn fail_for(&self, subject: impl Into<String>) {
        self.failing.insert(subject.into());
    }

    /// Let operations on `subject` succeed again
    pub fn recover(&self, subject: &str) {
        self.failing.remove(subject);
    }

    #[must_use]
    pub fn is_banned(&self, community: &str, subject: &str) -> bool {
        self.bans.contains_key(&key(community, subject))
    }

    /// Ban length in days; `Some(None)` for a permanent ban
    #[must_use]
    pub fn ban_duration(&self, community: &str, subject: &str) -> Option<Option<u32>> {
        self.bans
            .get(&key(community, subject))
            .map(|ban| ban.duration_days)
    }

    #[must_use]
    pub fn is_muted(&self, community: &str, subject: &str) -> bool {
        self.mutes.contains_key(&key(community, subject))
    }

    #[must_use]
    pub fn mute(&self, community: &str, subject: &str) -> Option<(u32, MuteChannel)> {
        self.mutes.get(&key(community, subject)).map(|m| *m.value())
    }

    /// Messages sent so far, oldest first
    #[must_use]
    pub fn messages(&self) -> Vec<DirectMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    fn check(&self, subject: &str) -> PlatformResult<()> {
        if self.failing.contains(subject) {
            return Err(PlatformError::Api(format!("simulated failure for {subject}")));
        }
        Ok(())
    }
}

fn key(community: &str, subject: &str) -> Key {
    (community.to_string(), subject.to_string())
}

#[async_trait]
impl PlatformAdapter for MemoryPlatform {
    async fn apply_ban(
        &self,
        community: &str,
        subject: &str,
        reason: &BanReason,
        duration_days: Option<u32>,
    ) -> PlatformResult<()> {
        self.check(subject)?;
        info!(community, subject, ?duration_days, "Simulated ban");
        self.bans.insert(
            key(community, subject),
            BanState {
                reason: reason.clone(),
                duration_days,
            },
        );
        Ok(())
    }

    async fn remove_ban(&self, community: &str, subject: &str) -> PlatformResult<()> {
        self.check(subject)?;
        if self.bans.remove(&key(community, subject)).is_some() {
            info!(community, subject, "Simulated unban");
        }
        Ok(())
    }

    async fn apply_mute(
        &self,
        community: &str,
        subject: &str,
        duration_days: u32,
        channel: MuteChannel,
    ) -> PlatformResult<()> {
        self.check(subject)?;
        info!(community, subject, duration_days, %channel, "Simulated mute");
        self.mutes
            .insert(key(community, subject), (duration_days, channel));
        Ok(())
    }

    async fn remove_mute(&self, community: &str, subject: &str) -> PlatformResult<()> {
        self.check(subject)?;
        if self.mutes.remove(&key(community, subject)).is_some() {
            info!(community, subject, "Simulated unmute");
        }
        Ok(())
    }

    async fn send_direct_message(
        &self,
        recipient: &str,
        title: &str,
        body: &str,
    ) -> PlatformResult<()> {
        self.check(recipient)?;
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(DirectMessage {
                recipient: recipient.to_string(),
                title: title.to_string(),
                body: body.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remove_ban_is_idempotent() {
        let platform = MemoryPlatform::new();

        platform.remove_ban("rust", "ferris").await.unwrap();
        assert!(!platform.is_banned("rust", "ferris"));
        platform.remove_ban("rust", "ferris").await.unwrap();
        assert!(!platform.is_banned("rust", "ferris"));

        let reason = BanReason::new("spam");
        platform
            .apply_ban("rust", "ferris", &reason, Some(1))
            .await
            .unwrap();
        platform
            .apply_ban("rust", "ferris", &reason, Some(1))
            .await
            .unwrap();
        assert_eq!(platform.ban_duration("rust", "ferris"), Some(Some(1)));

        platform.remove_ban("rust", "ferris").await.unwrap();
        platform.remove_ban("rust", "ferris").await.unwrap();
        assert!(!platform.is_banned("rust", "ferris"));
    }

    #[tokio::test]
    async fn test_mute_roundtrip_and_idempotent_unmute() {
        let platform = MemoryPlatform::new();
        platform
            .apply_mute("rust", "ferris", 3, MuteChannel::Both)
            .await
            .unwrap();
        assert_eq!(platform.mute("rust", "ferris"), Some((3, MuteChannel::Both)));

        platform.remove_mute("rust", "ferris").await.unwrap();
        platform.remove_mute("rust", "ferris").await.unwrap();
        assert!(!platform.is_muted("rust", "ferris"));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let platform = MemoryPlatform::new();
        platform.fail_for("ferris");

        let result = platform.remove_ban("rust", "ferris").await;
        assert!(matches!(result, Err(PlatformError::Api(_))));

        platform.recover("ferris");
        platform.remove_ban("rust", "ferris").await.unwrap();
    }

    #[tokio::test]
    async fn test_messages_recorded() {
        let platform = MemoryPlatform::new();
        platform
            .send_direct_message("ferris", "Hello", "Body")
            .await
            .unwrap();

        let messages = platform.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].recipient, "ferris");
        assert_eq!(messages[0].title, "Hello");
    }
}
