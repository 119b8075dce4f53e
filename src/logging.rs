use crate::{AUDIT_TARGET, CONSOLE_TARGET, Error};
use std::path::Path;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Application log file name
pub const APP_LOG_FILE: &str = "modsched";
/// Moderation audit log file name
pub const AUDIT_LOG_FILE: &str = "audit";

/// Initialize the logging system with console and file outputs
///
/// Audit events go only to their own file; everything else goes to the
/// console and the application file.
pub fn init(log_dir: impl AsRef<Path>) -> Result<(), Error> {
    let log_dir = log_dir.as_ref();
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)?;
    }

    // Set up file appenders with daily rotation
    let app_file = RollingFileAppender::new(Rotation::DAILY, log_dir, APP_LOG_FILE);
    let audit_file = RollingFileAppender::new(Rotation::DAILY, log_dir, AUDIT_LOG_FILE);

    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true)
        .with_filter(filter_fn(|meta| meta.target() != AUDIT_TARGET));

    let app_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(app_file)
        .with_filter(filter_fn(|meta| meta.target() != AUDIT_TARGET));

    let audit_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .json()
        .flatten_event(true)
        .with_writer(audit_file)
        .with_filter(filter_fn(|meta| meta.target() == AUDIT_TARGET));

    // Default to INFO, but keep serenity's HTTP chatter out
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info")
            .add_directive("serenity=error".parse()?)
            .add_directive(format!("{AUDIT_TARGET}=info").parse()?),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(app_layer)
        .with(audit_layer)
        .try_init()?;

    info!(target: CONSOLE_TARGET, log_dir = %log_dir.display(), "Logging system initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        // Another test may already own the global subscriber
        let _ = init(&log_dir);
        assert!(log_dir.is_dir());
    }
}
