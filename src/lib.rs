pub mod audit;
pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod logging;
pub mod moderation;
pub mod platform;
pub mod scheduler;
pub mod snapshot;
pub mod warnings;

pub const BOT_NAME: &str = "modsched";
pub const AUDIT_TARGET: &str = "modsched::audit";
pub const CONSOLE_TARGET: &str = "modsched";

pub use audit::{MemoryModerationLog, ModerationLog, ModerationLogEntry, TracingModerationLog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use duration::{DurationPolicy, minutes_to_ban_days};
pub use error::{ModerationError, ModerationResult};
pub use moderation::{CommandOutcome, ModerationRequest, Moderator};
pub use scheduler::{ActionScheduler, ScheduledAction, SchedulerHandle};
pub use warnings::{EscalationPolicy, WarningLedger, WarningRecord};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
