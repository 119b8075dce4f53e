//! Moderation commands
//!
//! `Moderator` is the surface a command handler calls. Each command validates
//! its input before touching anything, applies the restriction on the
//! platform, schedules or cancels the compensating reversal, and writes one
//! moderation log entry.

use crate::audit::{ModerationLog, ModerationLogEntry};
use crate::clock::Clock;
use crate::config::{AppConfig, CommandLimits};
use crate::duration::{DurationPolicy, RestrictionPlan};
use crate::error::{ModerationError, ModerationResult};
use crate::platform::{BanReason, MuteChannel, PlatformAdapter};
use crate::scheduler::{ActionKind, ActionScheduler, ScheduledAction};
use crate::warnings::{EscalationKind, EscalationPolicy, WarningLedger, WarningRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const DEFAULT_MUTE_DAYS: u32 = 3;
pub const DEFAULT_TIMEOUT_MINUTES: u32 = 60;
pub const DEFAULT_WARNING_LEVEL: u8 = 1;

/// Who a command targets and who issued it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationRequest {
    pub community: String,
    pub subject: String,
    pub moderator: String,
    pub reason: Option<String>,
    pub note: Option<String>,
}

impl ModerationRequest {
    pub fn new(
        community: impl Into<String>,
        subject: impl Into<String>,
        moderator: impl Into<String>,
    ) -> Self {
        Self {
            community: community.into(),
            subject: subject.into(),
            moderator: moderator.into(),
            reason: None,
            note: None,
        }
    }

    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// The reason if one was given and is not blank
    fn given_reason(&self) -> Option<&str> {
        self.reason.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }

    fn reason_or(&self, default: impl FnOnce() -> String) -> String {
        self.given_reason().map_or_else(default, ToString::to_string)
    }
}

/// Automatic action taken after a warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoAction {
    pub kind: EscalationKind,
    pub duration_days: u32,
    pub reason: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Log kind of the command, e.g. `ban` or `timeout_removed`
    pub action: String,
    pub community: String,
    pub subject: String,
    pub message: String,
    /// When the scheduled reversal lifts the restriction
    pub expires_at: Option<DateTime<Utc>>,
    pub duration: Option<String>,
    /// Id of the scheduled reversal
    pub action_id: Option<String>,
    pub warning_id: Option<String>,
    pub warning_number: Option<u32>,
    pub auto_action: Option<AutoAction>,
}

impl CommandOutcome {
    fn new(action: &str, request: &ModerationRequest, message: String) -> Self {
        Self {
            action: action.to_string(),
            community: request.community.clone(),
            subject: request.subject.clone(),
            message,
            expires_at: None,
            duration: None,
            action_id: None,
            warning_id: None,
            warning_number: None,
            auto_action: None,
        }
    }

    fn scheduled(mut self, reversal: &ScheduledAction, duration: String) -> Self {
        self.expires_at = Some(reversal.execute_at);
        self.action_id = Some(reversal.id.clone());
        self.duration = Some(duration);
        self
    }
}

fn days_label(days: u32) -> String {
    format!("{days} days")
}

fn minutes_label(minutes: u32) -> String {
    format!("{minutes} minutes")
}

fn severity_text(level: u8) -> &'static str {
    match level {
        1 => "Minor",
        2 => "Moderate",
        3 => "Serious",
        4 => "Severe",
        5 => "Final",
        _ => "Official",
    }
}

/// Title and body of the direct message sent with a warning
#[must_use]
pub fn warning_message(
    community: &str,
    subject: &str,
    reason: &str,
    warning_number: u32,
    level: u8,
) -> (String, String) {
    let title = format!("Official Warning from {community}");
    let closing = if warning_number >= 3 {
        "IMPORTANT: You have received multiple warnings. Further violations may result in a \
         temporary or permanent ban."
    } else {
        "Please review the community rules to avoid future violations."
    };
    let body = format!(
        "Hello {subject},\n\n\
         You have received a **{severity}** warning from the moderation team of {community}.\n\n\
         **Warning #{warning_number}**\n\
         **Reason:** {reason}\n\n\
         This is warning number {warning_number} on your account for this community in the past 30 days.\n\n\
         {closing}\n\n\
         If you believe this warning was issued in error, reply to this message to contact the moderation team.",
        severity = severity_text(level),
    );
    (title, body)
}

/// Moderation command service
pub struct Moderator {
    platform: Arc<dyn PlatformAdapter>,
    scheduler: ActionScheduler,
    ledger: Arc<WarningLedger>,
    log: Arc<dyn ModerationLog>,
    clock: Arc<dyn Clock>,
    config: Arc<AppConfig>,
    durations: DurationPolicy,
    escalation: EscalationPolicy,
}

impl Moderator {
    pub fn new(
        config: Arc<AppConfig>,
        platform: Arc<dyn PlatformAdapter>,
        scheduler: ActionScheduler,
        ledger: Arc<WarningLedger>,
        log: Arc<dyn ModerationLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            durations: DurationPolicy::new(config.scheduler.kick_reversal_delay_secs),
            escalation: EscalationPolicy,
            platform,
            scheduler,
            ledger,
            log,
            clock,
            config,
        }
    }

    fn limits(&self) -> &CommandLimits {
        &self.config.limits
    }

    fn system_identity(&self) -> &str {
        &self.config.scheduler.system_identity
    }

    fn validate_target(request: &ModerationRequest) -> ModerationResult<()> {
        if request.community.trim().is_empty() {
            return Err(ModerationError::validation("community is required"));
        }
        if request.subject.trim().is_empty() {
            return Err(ModerationError::validation("subject is required"));
        }
        if request.moderator.trim().is_empty() {
            return Err(ModerationError::validation("moderator is required"));
        }
        Ok(())
    }

    /// Append to the moderation log; failures are only warned about
    async fn record(&self, entry: ModerationLogEntry) {
        let kind = entry.kind.clone();
        if let Err(e) = self.log.append(entry).await {
            warn!(kind = %kind, error = %e, "Failed to write moderation log entry");
        }
    }

    /// Schedule a reversal, replacing any pending one for the same key
    async fn reschedule(
        &self,
        kind: ActionKind,
        community: &str,
        subject: &str,
        plan: RestrictionPlan,
        derived_from_timeout: bool,
    ) -> ModerationResult<ScheduledAction> {
        self.scheduler.cancel_pending(kind, community, subject).await?;
        let action = self
            .scheduler
            .enqueue(kind, community, subject, plan.execute_at, derived_from_timeout)
            .await
            .inspect_err(|e| {
                error!(
                    community = %community,
                    subject = %subject,
                    kind = %kind,
                    error = %e,
                    "Restriction applied but its reversal could not be scheduled"
                );
            })?;
        Ok(action)
    }

    /// Ban a subject, permanently when `duration_days` is `None` or zero
    ///
    /// # Errors
    /// Validation, platform and scheduling failures
    pub async fn ban(
        &self,
        request: &ModerationRequest,
        duration_days: Option<u32>,
    ) -> ModerationResult<CommandOutcome> {
        Self::validate_target(request)?;
        let limits = self.limits();
        if limits.ban_requires_reason && request.given_reason().is_none() {
            return Err(ModerationError::validation("a reason is required for bans"));
        }
        let duration_days = duration_days.filter(|d| *d > 0);
        if let Some(days) = duration_days {
            if days > limits.max_ban_days {
                return Err(ModerationError::validation(format!(
                    "ban duration must be at most {} days",
                    limits.max_ban_days
                )));
            }
        }

        let reason = request.reason_or(|| format!("Banned by {}", self.system_identity()));
        self.apply_ban(request, &reason, duration_days).await
    }

    async fn apply_ban(
        &self,
        request: &ModerationRequest,
        reason: &str,
        duration_days: Option<u32>,
    ) -> ModerationResult<CommandOutcome> {
        let (community, subject) = (request.community.as_str(), request.subject.as_str());
        let now = self.clock.now();
        let ban_reason = BanReason::new(reason).with_note(request.note.clone());

        let mut entry =
            ModerationLogEntry::new("ban", community, subject, &request.moderator, reason, now)
                .with_note(request.note.clone());

        let outcome = if let Some(days) = duration_days {
            let plan = self
                .durations
                .days(days, now)
                .ok_or_else(|| ModerationError::validation("ban duration is out of range"))?;
            self.platform
                .apply_ban(community, subject, &ban_reason, Some(plan.platform_days))
                .await?;
            let reversal = self
                .reschedule(ActionKind::Unban, community, subject, plan, false)
                .await?;

            entry = entry
                .with_duration(days_label(days))
                .with_expires_at(reversal.execute_at)
                .with_action_id(&reversal.id);
            CommandOutcome::new(
                "ban",
                request,
                format!("{subject} has been banned from {community} for {days} days"),
            )
            .scheduled(&reversal, days_label(days))
        } else {
            self.platform
                .apply_ban(community, subject, &ban_reason, None)
                .await?;
            // Reversals pending from earlier restrictions must not lift this ban.
            self.scheduler
                .cancel_pending(ActionKind::Unban, community, subject)
                .await?;

            entry = entry.with_duration("permanent");
            let mut outcome = CommandOutcome::new(
                "ban",
                request,
                format!("{subject} has been banned from {community}"),
            );
            outcome.duration = Some("permanent".to_string());
            outcome
        };

        info!(
            community = %community,
            subject = %subject,
            moderator = %request.moderator,
            duration = ?outcome.duration,
            "Ban applied"
        );
        self.record(entry).await;
        Ok(outcome)
    }

    /// Lift a ban and cancel its scheduled reversal
    ///
    /// # Errors
    /// Validation, platform and store failures
    pub async fn unban(&self, request: &ModerationRequest) -> ModerationResult<CommandOutcome> {
        Self::validate_target(request)?;
        let reason = request.reason_or(|| format!("Unbanned by {}", self.system_identity()));
        self.lift_ban(request, "unban", &reason).await?;
        Ok(CommandOutcome::new(
            "unban",
            request,
            format!(
                "{} has been unbanned from {}",
                request.subject, request.community
            ),
        ))
    }

    async fn lift_ban(
        &self,
        request: &ModerationRequest,
        kind: &str,
        reason: &str,
    ) -> ModerationResult<()> {
        let (community, subject) = (request.community.as_str(), request.subject.as_str());

        self.platform.remove_ban(community, subject).await?;
        let cancelled = self
            .scheduler
            .cancel_pending(ActionKind::Unban, community, subject)
            .await?;

        info!(
            community = %community,
            subject = %subject,
            moderator = %request.moderator,
            cancelled,
            "Ban lifted"
        );
        self.record(
            ModerationLogEntry::new(
                kind,
                community,
                subject,
                &request.moderator,
                reason,
                self.clock.now(),
            )
            .with_note(request.note.clone()),
        )
        .await;
        Ok(())
    }

    /// Mute a subject for `duration_days` (default 3)
    ///
    /// # Errors
    /// Validation, platform and scheduling failures
    pub async fn mute(
        &self,
        request: &ModerationRequest,
        duration_days: Option<u32>,
        channel: MuteChannel,
    ) -> ModerationResult<CommandOutcome> {
        Self::validate_target(request)?;
        let days = duration_days.unwrap_or(DEFAULT_MUTE_DAYS);
        let max = self.limits().max_mute_days;
        if days == 0 || days > max {
            return Err(ModerationError::validation(format!(
                "mute duration must be between 1 and {max} days"
            )));
        }

        let reason = request.reason_or(|| format!("Muted by {}", self.system_identity()));
        self.apply_mute(request, &reason, days, channel).await
    }

    async fn apply_mute(
        &self,
        request: &ModerationRequest,
        reason: &str,
        days: u32,
        channel: MuteChannel,
    ) -> ModerationResult<CommandOutcome> {
        let (community, subject) = (request.community.as_str(), request.subject.as_str());
        let plan = self
            .durations
            .days(days, self.clock.now())
            .ok_or_else(|| ModerationError::validation("mute duration is out of range"))?;

        self.platform
            .apply_mute(community, subject, plan.platform_days, channel)
            .await?;
        let reversal = self
            .reschedule(ActionKind::Unmute, community, subject, plan, false)
            .await?;

        info!(
            community = %community,
            subject = %subject,
            moderator = %request.moderator,
            days,
            %channel,
            "Mute applied"
        );
        self.record(
            ModerationLogEntry::new(
                "mute",
                community,
                subject,
                &request.moderator,
                reason,
                self.clock.now(),
            )
            .with_duration(days_label(days))
            .with_expires_at(reversal.execute_at)
            .with_note(request.note.clone())
            .with_action_id(&reversal.id),
        )
        .await;

        Ok(CommandOutcome::new(
            "mute",
            request,
            format!("{subject} has been muted in {community} for {days} days"),
        )
        .scheduled(&reversal, days_label(days)))
    }

    /// Lift a mute and cancel its scheduled reversal
    ///
    /// # Errors
    /// Validation, platform and store failures
    pub async fn unmute(&self, request: &ModerationRequest) -> ModerationResult<CommandOutcome> {
        Self::validate_target(request)?;
        let (community, subject) = (request.community.as_str(), request.subject.as_str());
        let reason = request.reason_or(|| format!("Unmuted by {}", self.system_identity()));

        self.platform.remove_mute(community, subject).await?;
        self.scheduler
            .cancel_pending(ActionKind::Unmute, community, subject)
            .await?;

        info!(community = %community, subject = %subject, "Mute lifted");
        self.record(ModerationLogEntry::new(
            "unmute",
            community,
            subject,
            &request.moderator,
            reason,
            self.clock.now(),
        ))
        .await;

        Ok(CommandOutcome::new(
            "unmute",
            request,
            format!("{subject} has been unmuted in {community}"),
        ))
    }

    /// Time a subject out for `minutes` (default 60)
    ///
    /// The platform ban is rounded up to whole days; the unban is scheduled
    /// for the exact expiry.
    ///
    /// # Errors
    /// Validation, platform and scheduling failures
    pub async fn timeout(
        &self,
        request: &ModerationRequest,
        minutes: Option<u32>,
    ) -> ModerationResult<CommandOutcome> {
        Self::validate_target(request)?;
        let minutes = minutes.unwrap_or(DEFAULT_TIMEOUT_MINUTES);
        let max = self.limits().max_timeout_minutes;
        if minutes == 0 || minutes > max {
            return Err(ModerationError::validation(format!(
                "timeout must be between 1 and {max} minutes"
            )));
        }

        let (community, subject) = (request.community.as_str(), request.subject.as_str());
        let now = self.clock.now();
        let plan = self
            .durations
            .timeout(minutes, now)
            .ok_or_else(|| ModerationError::validation("timeout is out of range"))?;
        let ban_reason = BanReason::new(request.reason_or(|| format!("Timeout: {minutes} minutes")))
            .with_note(Some(request.note.clone().unwrap_or_else(|| {
                "Automated timeout - will be unbanned automatically".to_string()
            })));

        self.platform
            .apply_ban(community, subject, &ban_reason, Some(plan.platform_days))
            .await?;
        let reversal = self
            .reschedule(ActionKind::Unban, community, subject, plan, true)
            .await?;

        info!(
            community = %community,
            subject = %subject,
            moderator = %request.moderator,
            minutes,
            platform_days = plan.platform_days,
            "Timeout applied"
        );
        let reason = request.reason_or(|| format!("Timed out by {}", self.system_identity()));
        self.record(
            ModerationLogEntry::new("timeout", community, subject, &request.moderator, reason, now)
                .with_duration(minutes_label(minutes))
                .with_expires_at(reversal.execute_at)
                .with_note(request.note.clone())
                .with_action_id(&reversal.id),
        )
        .await;

        Ok(CommandOutcome::new(
            "timeout",
            request,
            format!("{subject} has been timed out in {community} for {minutes} minutes"),
        )
        .scheduled(&reversal, minutes_label(minutes)))
    }

    /// End a timeout early
    ///
    /// # Errors
    /// Validation, platform and store failures
    pub async fn remove_timeout(
        &self,
        request: &ModerationRequest,
    ) -> ModerationResult<CommandOutcome> {
        Self::validate_target(request)?;
        let reason =
            request.reason_or(|| format!("Timeout removed by {}", self.system_identity()));
        self.lift_ban(request, "timeout_removed", &reason).await?;
        Ok(CommandOutcome::new(
            "timeout_removed",
            request,
            format!(
                "Timeout removed for {} in {}",
                request.subject, request.community
            ),
        ))
    }

    /// Eject a subject: shortest ban, lifted by a scheduled unban shortly
    /// after
    ///
    /// # Errors
    /// Validation, platform and scheduling failures
    pub async fn kick(&self, request: &ModerationRequest) -> ModerationResult<CommandOutcome> {
        Self::validate_target(request)?;
        let (community, subject) = (request.community.as_str(), request.subject.as_str());
        let now = self.clock.now();
        let plan = self.durations.kick(now);
        let reason = request.reason_or(|| format!("Kicked by {}", self.system_identity()));
        let ban_reason = BanReason::new(reason.clone()).with_note(Some(
            request
                .note
                .clone()
                .unwrap_or_else(|| "Temporary kick - will be unbanned shortly".to_string()),
        ));

        self.platform
            .apply_ban(community, subject, &ban_reason, Some(plan.platform_days))
            .await?;
        let reversal = self
            .scheduler
            .enqueue(ActionKind::Unban, community, subject, plan.execute_at, false)
            .await?;

        info!(
            community = %community,
            subject = %subject,
            moderator = %request.moderator,
            unban_at = %plan.execute_at,
            "Kick applied"
        );
        self.record(
            ModerationLogEntry::new("kick", community, subject, &request.moderator, reason, now)
                .with_expires_at(reversal.execute_at)
                .with_note(request.note.clone())
                .with_action_id(&reversal.id),
        )
        .await;

        let mut outcome = CommandOutcome::new(
            "kick",
            request,
            format!("{subject} has been kicked from {community}"),
        );
        outcome.expires_at = Some(reversal.execute_at);
        outcome.action_id = Some(reversal.id);
        Ok(outcome)
    }

    /// Issue a warning and apply any automatic escalation it triggers
    ///
    /// Succeeds once the warning is stored. Message delivery and escalation
    /// failures are logged and reported as absent.
    ///
    /// # Errors
    /// Validation and warning store failures
    pub async fn warn(
        &self,
        request: &ModerationRequest,
        level: Option<u8>,
        send_message: bool,
    ) -> ModerationResult<CommandOutcome> {
        Self::validate_target(request)?;
        let level = level.unwrap_or(DEFAULT_WARNING_LEVEL);
        let max = self.limits().max_warning_level;
        if level == 0 || level > max {
            return Err(ModerationError::validation(format!(
                "warning level must be between 1 and {max}"
            )));
        }

        let (community, subject) = (request.community.as_str(), request.subject.as_str());
        let reason = request.reason_or(|| format!("Warning issued by {}", self.system_identity()));

        let warning = self
            .ledger
            .record_warning(
                community,
                subject,
                &request.moderator,
                &reason,
                level,
                request.note.clone(),
            )
            .await?;

        self.record(
            ModerationLogEntry::new(
                "warning",
                community,
                subject,
                &request.moderator,
                &reason,
                warning.timestamp,
            )
            .with_warning(&warning.id, Some(warning.warning_number))
            .with_level(level)
            .with_note(request.note.clone()),
        )
        .await;

        if send_message {
            let (title, body) =
                warning_message(community, subject, &reason, warning.warning_number, level);
            if let Err(e) = self.platform.send_direct_message(subject, &title, &body).await {
                warn!(
                    warning_id = %warning.id,
                    subject = %subject,
                    error = %e,
                    "Failed to send warning message"
                );
            }
        }

        let auto_action = self.escalate(community, subject, warning.warning_number).await;

        let mut outcome = CommandOutcome::new(
            "warning",
            request,
            format!("Warning issued to {subject} in {community}"),
        );
        outcome.warning_id = Some(warning.id);
        outcome.warning_number = Some(warning.warning_number);
        outcome.auto_action = auto_action;
        Ok(outcome)
    }

    async fn escalate(
        &self,
        community: &str,
        subject: &str,
        warning_number: u32,
    ) -> Option<AutoAction> {
        let config = self.config.auto_moderation(community);
        let action = self.escalation.decide(warning_number, &config)?;

        let request = ModerationRequest::new(community, subject, self.system_identity());
        let result = match action.kind {
            EscalationKind::Ban => {
                self.apply_ban(&request, &action.reason, Some(action.duration_days))
                    .await
            }
            EscalationKind::Mute => {
                self.apply_mute(
                    &request,
                    &action.reason,
                    action.duration_days,
                    MuteChannel::default(),
                )
                .await
            }
        };

        match result {
            Ok(outcome) => {
                info!(
                    community = %community,
                    subject = %subject,
                    warning_number,
                    kind = %action.kind,
                    "Automatic escalation applied"
                );
                outcome.expires_at.map(|expires_at| AutoAction {
                    kind: action.kind,
                    duration_days: action.duration_days,
                    reason: action.reason,
                    expires_at,
                })
            }
            Err(e) => {
                error!(
                    community = %community,
                    subject = %subject,
                    warning_number,
                    kind = %action.kind,
                    error = %e,
                    "Automatic escalation failed, no automatic action taken"
                );
                None
            }
        }
    }

    /// Soft-delete a warning
    ///
    /// # Errors
    /// Validation failures and `StoreError::NotFound` for an unknown id
    pub async fn remove_warning(
        &self,
        warning_id: &str,
        remover: &str,
        reason: Option<&str>,
    ) -> ModerationResult<CommandOutcome> {
        if warning_id.trim().is_empty() {
            return Err(ModerationError::validation("warning id is required"));
        }
        if remover.trim().is_empty() {
            return Err(ModerationError::validation("moderator is required"));
        }

        let record = self
            .ledger
            .remove_warning(warning_id, remover, reason.unwrap_or_default())
            .await?;

        let request = ModerationRequest::new(&record.community, &record.subject, remover);
        let mut outcome = CommandOutcome::new(
            "warning_removed",
            &request,
            format!(
                "Warning removed for {} in {}",
                record.subject, record.community
            ),
        );
        outcome.warning_id = Some(record.id);
        Ok(outcome)
    }

    /// All non-removed warnings for a subject, newest first
    ///
    /// # Errors
    /// Returns an error if the warning store cannot be read
    pub async fn user_warnings(
        &self,
        community: &str,
        subject: &str,
    ) -> ModerationResult<Vec<WarningRecord>> {
        Ok(self.ledger.all_warnings(community, subject).await?)
    }

    /// Pending scheduled reversals in a community, soonest first
    ///
    /// # Errors
    /// Returns an error if the action store cannot be read
    pub async fn pending_actions(&self, community: &str) -> ModerationResult<Vec<ScheduledAction>> {
        Ok(self.scheduler.store().pending_for_community(community).await?)
    }
}
