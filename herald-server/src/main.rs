//! Herald Server
//!
//! Posts calendar-driven announcements and one-shot reminders to Discord.

mod config;
mod discord;
mod shutdown;
mod state;

use clap::Parser;
use config::Settings;
use discord::{Handler, SerenitySink};
use herald_core::processors::{ReminderTick, RepeatingTask};
use kanau::processor::Processor;
use serenity::Client;
use shutdown::shutdown_signal;
use state::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Herald - calendar announcements for Discord
#[derive(Parser, Debug)]
#[command(name = "herald-server")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Discord bot token
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub discord_token: String,

    /// iCalendar feed to poll
    #[arg(long, env = "CALENDAR_URL")]
    pub calendar_url: Url,

    /// IANA zone for feed times that carry no zone of their own
    #[arg(long, env = "CALENDAR_TIMEZONE", default_value = "UTC")]
    pub calendar_timezone: String,

    /// Path to the persisted state document
    #[arg(long, env = "HERALD_STATE_PATH", default_value = "./herald-state.json")]
    pub state_path: PathBuf,

    /// TOML rule table; the built-in table is used when absent
    #[arg(long, env = "HERALD_RULES")]
    pub rules: Option<PathBuf>,

    /// Seconds between announcement polls
    #[arg(long, env = "ANNOUNCE_INTERVAL_SECS", default_value_t = 600)]
    pub announce_interval_secs: u64,

    /// Seconds between reminder passes
    #[arg(long, env = "REMINDER_INTERVAL_SECS", default_value_t = 30)]
    pub reminder_interval_secs: u64,

    /// Default announcement channel id
    #[arg(long, env = "DEFAULT_CHANNEL_ID")]
    pub default_channel: Option<u64>,

    /// Mention text used when no role is configured (e.g. @here)
    #[arg(long, env = "MENTION_TEXT", default_value = "")]
    pub mention: String,

    /// Prefix for text commands
    #[arg(long, env = "COMMAND_PREFIX", default_value = "!")]
    pub prefix: String,

    /// Default access role id
    #[arg(long, env = "ACCESS_ROLE_ID")]
    pub access_role: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting herald-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load(args).map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!(
        calendar = %settings.calendar_url,
        state = ?settings.state_path,
        rule_types = settings.rules.len(),
        "Configuration loaded"
    );

    let sink = Arc::new(SerenitySink::new(&settings.discord_token));
    let state = AppState::new(&settings, sink);

    // Startup passes run before the periodic tasks exist
    let now = OffsetDateTime::now_utc();
    let overdue = state
        .reminders
        .process(ReminderTick {
            now,
            mode: herald_core::delivery::DeliveryMode::Suppress,
        })
        .await?;
    if overdue.suppressed > 0 {
        tracing::info!(count = overdue.suppressed, "Dropped reminders that came due while offline");
    }
    if let Err(e) = state.announcer.boot(now).await {
        tracing::warn!(error = %e, "Startup announcement poll failed, retrying on next tick");
    }

    // Spawn the repeating tasks
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let announcer = state.announcer.clone();
    let announce_task = tokio::spawn(
        RepeatingTask::new("announcer", settings.announce_interval).run(shutdown_rx.clone(), move || {
            let announcer = announcer.clone();
            async move { announcer.run_pass().await }
        }),
    );
    let reminders = state.reminders.clone();
    let reminder_task = tokio::spawn(
        RepeatingTask::new("reminders", settings.reminder_interval).run(shutdown_rx, move || {
            let reminders = reminders.clone();
            async move { reminders.run_pass().await }
        }),
    );

    // Connect to the gateway
    let mut client = Client::builder(&settings.discord_token, discord::intents())
        .event_handler(Handler::new(state.commands.clone()))
        .await
        .map_err(|e| {
            tracing::error!("Failed to build Discord client: {}", e);
            e
        })?;
    let shard_manager = client.shard_manager.clone();

    let result = tokio::select! {
        result = client.start() => result,
        _ = shutdown_signal() => Ok(()),
    };

    // Stop the gateway and the tasks
    shard_manager.shutdown_all().await;
    let _ = shutdown_tx.send(true);
    for task in [announce_task, reminder_task] {
        if let Err(e) = task.await {
            tracing::error!("Repeating task panicked: {}", e);
        }
    }

    tracing::info!(keys = state.store.lock().await.key_count(), "Shutdown complete");
    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,serenity=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
