//! Discord platform adapter
//!
//! Communities are guild ids and subjects are user ids, both in decimal
//! form. Discord bans have no expiry, so ban length is governed entirely by
//! the scheduled reversal. Mutes map to member communication timeouts.

use super::{BanReason, MuteChannel, PlatformAdapter};
use crate::error::{PlatformError, PlatformResult};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serenity::all::{CreateMessage, EditMember, GuildId, Http, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest communication timeout Discord accepts
pub const MAX_TIMEOUT_DAYS: u32 = 28;

/// Platform adapter backed by the Discord HTTP API
#[derive(Clone)]
pub struct DiscordPlatform {
    http: Arc<Http>,
}

impl DiscordPlatform {
    /// Create an adapter authenticated with a bot token
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self::from_http(Arc::new(Http::new(token)))
    }

    #[must_use]
    pub fn from_http(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn parse_snowflake(value: &str, what: &str) -> PlatformResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| PlatformError::InvalidIdentifier(format!("{what} '{value}'")))
}

fn guild_id(community: &str) -> PlatformResult<GuildId> {
    parse_snowflake(community, "community").map(GuildId::new)
}

fn user_id(subject: &str) -> PlatformResult<UserId> {
    parse_snowflake(subject, "subject").map(UserId::new)
}

fn map_error(error: &serenity::Error) -> PlatformError {
    if let serenity::Error::Http(http_error) = error {
        match http_error.status_code().map(|status| status.as_u16()) {
            Some(404) => return PlatformError::NotFound(error.to_string()),
            Some(429) => return PlatformError::RateLimited,
            _ => {}
        }
    }
    PlatformError::Api(error.to_string())
}

/// Treat "nothing to remove" as success so reversals stay idempotent
fn ignore_not_found(result: Result<(), serenity::Error>) -> PlatformResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) => match map_error(&e) {
            PlatformError::NotFound(message) => {
                debug!("Nothing to reverse: {message}");
                Ok(())
            }
            other => Err(other),
        },
    }
}

#[async_trait]
impl PlatformAdapter for DiscordPlatform {
    async fn apply_ban(
        &self,
        community: &str,
        subject: &str,
        reason: &BanReason,
        duration_days: Option<u32>,
    ) -> PlatformResult<()> {
        let guild = guild_id(community)?;
        let user = user_id(subject)?;

        info!("Banning user {user} in guild {guild} for {duration_days:?} days");

        guild
            .ban_with_reason(&self.http, user, 0, &reason.reason)
            .await
            .map_err(|e| map_error(&e))?;

        info!("Successfully banned user {user}");
        Ok(())
    }

    async fn remove_ban(&self, community: &str, subject: &str) -> PlatformResult<()> {
        let guild = guild_id(community)?;
        let user = user_id(subject)?;

        info!("Unbanning user {user} in guild {guild}");
        ignore_not_found(guild.unban(&self.http, user).await)
    }

    async fn apply_mute(
        &self,
        community: &str,
        subject: &str,
        duration_days: u32,
        channel: MuteChannel,
    ) -> PlatformResult<()> {
        let guild = guild_id(community)?;
        let user = user_id(subject)?;

        let days = if duration_days > MAX_TIMEOUT_DAYS {
            warn!(
                "Mute of {duration_days} days exceeds Discord's limit, timing out user {user} for {MAX_TIMEOUT_DAYS} days"
            );
            MAX_TIMEOUT_DAYS
        } else {
            duration_days
        };
        if channel != MuteChannel::Comment {
            debug!("Discord has no separate {channel} mute, applying a timeout");
        }

        let until = Utc::now() + Duration::days(i64::from(days));
        info!("Muting user {user} in guild {guild} until {until}");

        guild
            .edit_member(
                &*self.http,
                user,
                EditMember::new().disable_communication_until_datetime(until.into()),
            )
            .await
            .map_err(|e| map_error(&e))?;

        Ok(())
    }

    async fn remove_mute(&self, community: &str, subject: &str) -> PlatformResult<()> {
        let guild = guild_id(community)?;
        let user = user_id(subject)?;

        info!("Removing timeout for user {user} in guild {guild}");
        let result = guild
            .edit_member(&*self.http, user, EditMember::new().enable_communication())
            .await
            .map(|_| ());

        ignore_not_found(result)
    }

    async fn send_direct_message(
        &self,
        recipient: &str,
        title: &str,
        body: &str,
    ) -> PlatformResult<()> {
        let user = user_id(recipient)?;
        let content = format!("**{title}**\n{body}");

        user.direct_message(&*self.http, CreateMessage::new().content(content))
            .await
            .map_err(|e| map_error(&e))?;

        Ok(())
    }
}
