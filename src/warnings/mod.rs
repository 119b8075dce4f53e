//! Warnings and automatic escalation

mod escalation;
mod ledger;
mod record;
mod store;

pub use escalation::{
    AUTO_BAN_DAYS, AUTO_BAN_REASON, AUTO_MUTE_DAYS, AUTO_MUTE_REASON, EscalationAction,
    EscalationKind, EscalationPolicy,
};
pub use ledger::{WARNING_WINDOW_DAYS, WarningLedger};
pub use record::WarningRecord;
pub use store::{MemoryWarningStore, WARNINGS_FILE, WarningStore};
