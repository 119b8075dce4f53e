use modsched::audit::{ModerationLog, TracingModerationLog};
use modsched::clock::{Clock, SystemClock};
use modsched::config::AppConfig;
use modsched::logging::{self, LOG_DIR};
use modsched::platform::{DiscordPlatform, MemoryPlatform, PlatformAdapter};
use modsched::scheduler::{ActionScheduler, ActionStatus, MemoryActionStore};
use modsched::{BOT_NAME, Error};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Run the scheduler until Ctrl-C
async fn async_main() -> Result<(), Error> {
    logging::init(LOG_DIR)?;

    let config = AppConfig::load_default().await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let actions = MemoryActionStore::open(&config.data_dir).await?;
    info!(
        data_dir = %config.data_dir.display(),
        pending = actions.get_by_status(ActionStatus::Pending).len(),
        "Opened action store"
    );

    let platform: Arc<dyn PlatformAdapter> = if config.dry_run {
        warn!("Dry run enabled, restrictions are only simulated");
        Arc::new(MemoryPlatform::new())
    } else {
        let token = env::var("DISCORD_TOKEN")
            .map_err(|_| "DISCORD_TOKEN must be set unless dry_run is enabled")?;
        Arc::new(DiscordPlatform::new(&token))
    };
    let log: Arc<dyn ModerationLog> = Arc::new(TracingModerationLog);

    let scheduler = ActionScheduler::new(
        Arc::new(actions),
        platform,
        log,
        clock,
        config.scheduler.system_identity.clone(),
    );
    let handle = scheduler.start(Duration::from_secs(config.scheduler.poll_interval_secs))?;

    info!("{BOT_NAME} running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    handle.stop().await;
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
