//! Escalation policy
//!
//! Turns a warning count into at most one automatic secondary action. The
//! decision is pure; `Moderator` carries it out through the same path as a
//! manual command and never issues a warning for it.

use crate::config::AutoModerationConfig;
use derive_more::Display;
use serde::{Deserialize, Serialize};

pub const AUTO_BAN_DAYS: u32 = 7;
pub const AUTO_MUTE_DAYS: u32 = 3;
pub const AUTO_BAN_REASON: &str = "Automatic ban: Too many warnings";
pub const AUTO_MUTE_REASON: &str = "Automatic mute: Multiple warnings";

/// Kind of automatic action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum EscalationKind {
    #[display("ban")]
    Ban,
    #[display("mute")]
    Mute,
}

/// An automatic temporary restriction to apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationAction {
    pub kind: EscalationKind,
    pub duration_days: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EscalationPolicy;

impl EscalationPolicy {
    /// Action owed for the warning that brought the count to `warning_number`
    ///
    /// The ban threshold is checked first, so it wins when both match.
    #[must_use]
    pub fn decide(
        self,
        warning_number: u32,
        config: &AutoModerationConfig,
    ) -> Option<EscalationAction> {
        if !config.enabled {
            return None;
        }

        if warning_number >= config.ban_threshold {
            Some(EscalationAction {
                kind: EscalationKind::Ban,
                duration_days: AUTO_BAN_DAYS,
                reason: AUTO_BAN_REASON.to_string(),
            })
        } else if warning_number >= config.mute_threshold {
            Some(EscalationAction {
                kind: EscalationKind::Mute,
                duration_days: AUTO_MUTE_DAYS,
                reason: AUTO_MUTE_REASON.to_string(),
            })
        } else {
            None
        }
    }
}
