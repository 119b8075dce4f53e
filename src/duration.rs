//! Duration policy
//!
//! Platform bans and mutes are measured in whole days, timeouts in minutes.
//! The platform restriction is only a coarse backstop that may overshoot; the
//! scheduled reversal carries the exact expiry and decides when access is
//! actually restored.

use chrono::{DateTime, Duration, Utc};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Shortest restriction the platform accepts, in days
pub const PLATFORM_MIN_DAYS: u32 = 1;

/// Longest ban or mute accepted in configuration, about a century
pub const MAX_RESTRICTION_DAYS: u32 = 36_500;

/// Default delay before a kick's ban is lifted
pub const DEFAULT_KICK_REVERSAL_DELAY_SECS: u64 = 60;

/// Platform days needed to cover `minutes`: `max(1, ceil(minutes / 1440))`
#[must_use]
pub fn minutes_to_ban_days(minutes: u32) -> u32 {
    minutes.div_ceil(MINUTES_PER_DAY).max(PLATFORM_MIN_DAYS)
}

/// What to ask of the platform and when to schedule the reversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestrictionPlan {
    /// Length passed to the platform, in days
    pub platform_days: u32,
    /// Exact instant the compensating reversal fires
    pub execute_at: DateTime<Utc>,
}

/// Converts caller durations into platform durations and reversal times
#[derive(Debug, Clone, Copy)]
pub struct DurationPolicy {
    kick_reversal_delay: Duration,
}

impl Default for DurationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_KICK_REVERSAL_DELAY_SECS)
    }
}

impl DurationPolicy {
    #[must_use]
    pub fn new(kick_reversal_delay_secs: u64) -> Self {
        // A kick never outlasts the one-day ban backing it.
        let secs = kick_reversal_delay_secs.min(u64::from(MINUTES_PER_DAY) * 60);
        Self {
            kick_reversal_delay: Duration::seconds(secs as i64),
        }
    }

    /// Timeout emulated with a ban: rounded up on the platform, exact in the
    /// scheduler
    ///
    /// Returns `None` if the reversal time is past the representable range.
    #[must_use]
    pub fn timeout(&self, minutes: u32, now: DateTime<Utc>) -> Option<RestrictionPlan> {
        Some(RestrictionPlan {
            platform_days: minutes_to_ban_days(minutes),
            execute_at: now.checked_add_signed(Duration::minutes(i64::from(minutes)))?,
        })
    }

    /// Temporary ban or mute measured in days
    ///
    /// Returns `None` if the reversal time is past the representable range.
    #[must_use]
    pub fn days(&self, days: u32, now: DateTime<Utc>) -> Option<RestrictionPlan> {
        Some(RestrictionPlan {
            platform_days: days.max(PLATFORM_MIN_DAYS),
            execute_at: now.checked_add_signed(Duration::days(i64::from(days)))?,
        })
    }

    /// Kick emulated with the shortest ban, lifted after a short delay
    #[must_use]
    pub fn kick(&self, now: DateTime<Utc>) -> RestrictionPlan {
        RestrictionPlan {
            platform_days: PLATFORM_MIN_DAYS,
            execute_at: now + self.kick_reversal_delay,
        }
    }
}
