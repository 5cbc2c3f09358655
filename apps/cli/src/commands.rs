//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tracing::{info, warn};

use newsdigest_core::adapters::{ConfigDirectory, build_pipeline};
use newsdigest_core::registry::{ChannelRegistry, read_channel_list};
use newsdigest_core::{CycleReport, ProgressReporter, Scheduler};
use newsdigest_shared::{
    AppConfig, DeliveryOutcome, IngestionWindow, init_config, load_config, load_config_from,
    validate_secrets,
};
use newsdigest_storage::Storage;
use newsdigest_telegram::PreviewClient;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// newsdigest: a daily digest of Telegram channels, delivered by bot.
#[derive(Parser)]
#[command(
    name = "newsdigest",
    version,
    about = "Summarize yesterday's Telegram channel posts and deliver the digest by bot.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.newsdigest/newsdigest.toml).
    #[arg(long, global = true, env = "NEWSDIGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the daily scheduler until interrupted.
    Run,

    /// Run one digest cycle now and exit.
    Once,

    /// Show the materialized channel list.
    Channels {
        /// Re-resolve the configured group before printing.
        #[arg(long)]
        refresh: bool,
    },

    /// Manage digest subscribers.
    Subscribers {
        #[command(subcommand)]
        action: SubscribersAction,
    },

    /// Show the archived digest and delivery records for a day.
    History {
        /// Digest date (YYYY-MM-DD). Defaults to yesterday (UTC).
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Subscriber subcommands.
#[derive(Subcommand)]
pub(crate) enum SubscribersAction {
    /// List all subscribers.
    List,
    /// Register (or reactivate) a subscriber.
    Add {
        /// Telegram user ID.
        user_id: i64,
        /// Telegram username, for display only.
        #[arg(long)]
        username: Option<String>,
    },
    /// Deactivate a subscriber. The record is kept.
    Remove {
        /// Telegram user ID.
        user_id: i64,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "newsdigest=info",
        1 => "newsdigest=debug",
        _ => "newsdigest=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run => cmd_run(config_path).await,
        Command::Once => cmd_once(config_path).await,
        Command::Channels { refresh } => cmd_channels(config_path, refresh).await,
        Command::Subscribers { action } => match action {
            SubscribersAction::List => cmd_subscribers_list(config_path).await,
            SubscribersAction::Add { user_id, username } => {
                cmd_subscribers_add(config_path, user_id, username.as_deref()).await
            }
            SubscribersAction::Remove { user_id } => {
                cmd_subscribers_remove(config_path, user_id).await
            }
        },
        Command::History { date } => cmd_history(config_path, date).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    Ok(Storage::open(&config.storage.db_path()?).await?)
}

/// Read-only handle for inspection commands; errors if nothing has run yet.
async fn open_storage_readonly(config: &AppConfig) -> Result<Storage> {
    let path = config.storage.db_path()?;
    if !path.exists() {
        return Err(eyre!(
            "no database at {} yet (run `newsdigest once` or `newsdigest subscribers add` first)",
            path.display()
        ));
    }
    Ok(Storage::open_readonly(&path).await?)
}

// ---------------------------------------------------------------------------
// Digest cycle commands
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    validate_secrets(&config)?;

    let storage = Arc::new(open_storage(&config).await?);
    let pipeline = build_pipeline(&config, storage)?;
    let scheduler = Scheduler::new(
        config.schedule.send_at_time()?,
        config.schedule.error_backoff(),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(forward_interrupt(tokio::signal::ctrl_c(), stop_tx));

    info!(
        group = %config.ingest.group,
        send_at = %config.schedule.send_at,
        "newsdigest service started"
    );
    scheduler.run(&pipeline, stop_rx).await;
    Ok(())
}

/// Flip `stop` once `signal` fires. If the listener cannot be installed the
/// sender is held forever, so the scheduler keeps running.
async fn forward_interrupt<F>(signal: F, stop: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("interrupt received, stopping after the current step");
            let _ = stop.send(true);
        }
        Err(e) => {
            warn!(error = %e, "failed to listen for interrupt, Ctrl-C will not stop the loop");
            std::future::pending::<()>().await;
        }
    }
}

async fn cmd_once(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    validate_secrets(&config)?;

    let storage = Arc::new(open_storage(&config).await?);
    let pipeline = build_pipeline(&config, storage)?;

    let reporter = CliProgress::new()?;
    let result = pipeline.run_cycle(Utc::now(), &reporter).await;
    reporter.spinner.finish_and_clear();
    let report = result?;

    println!();
    println!("  Window:    {}", report.window);
    println!(
        "  Channels:  {} scanned, {} failed",
        report.channels_scanned, report.channels_failed
    );
    println!("  Items:     {}", report.item_count);
    match &report.digest {
        Some(digest) => {
            println!(
                "  Digest:    {} chars in {} part(s)",
                digest.content.chars().count(),
                report.chunk_count
            );
            println!(
                "  Delivered: {} ok, {} transient, {} permanent",
                report.count(DeliveryOutcome::Success),
                report.count(DeliveryOutcome::TransientFailure),
                report.count(DeliveryOutcome::PermanentFailure)
            );
        }
        None => println!("  Digest:    none (no news in window)"),
    }
    println!("  Elapsed:   {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .map_err(|e| eyre!("invalid progress template: {e}"))?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { spinner })
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn channel_scanned(&self, handle: &str, items: usize, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "Collecting [{current}/{total}] @{handle}: {items} item(s)"
        ));
    }

    fn delivered(&self, user_id: i64, outcome: DeliveryOutcome, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "Delivering [{current}/{total}] {user_id}: {}",
            outcome.as_str()
        ));
    }

    fn done(&self, _report: &CycleReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Inspection and admin commands
// ---------------------------------------------------------------------------

async fn cmd_channels(config_path: Option<&Path>, refresh: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let path = config.storage.channels_file()?;

    if refresh {
        let storage = Arc::new(open_storage(&config).await?);
        let preview = PreviewClient::new(
            &config.telegram.web_base,
            std::time::Duration::from_secs(config.telegram.request_timeout_secs),
        )?;
        let registry = ChannelRegistry::new(
            Arc::new(ConfigDirectory::new(config.groups.clone(), Some(preview))),
            storage,
            Some(path.clone()),
        );
        registry.refresh(&config.ingest.group).await?;
    }

    if !path.exists() {
        println!("No channel list yet. Run `newsdigest channels --refresh`.");
        return Ok(());
    }

    let list = read_channel_list(&path)?;
    println!("Channels ({}):", list.channels.len());
    for entry in &list.channels {
        println!("  {:>4}  @{:<32} {}", entry.id, entry.username, entry.title);
    }
    Ok(())
}

async fn cmd_subscribers_list(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage_readonly(&config).await?;

    let (active, total) = storage.subscriber_counts().await?;
    println!("Subscribers: {active} active of {total}");
    for sub in storage.list_subscribers().await? {
        println!(
            "  {:>12}  {:<8}  @{:<24} last seen {}",
            sub.user_id,
            sub.status.as_str(),
            sub.username.as_deref().unwrap_or("-"),
            sub.last_interaction_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".into())
        );
    }
    Ok(())
}

async fn cmd_subscribers_add(
    config_path: Option<&Path>,
    user_id: i64,
    username: Option<&str>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    if storage.add_subscriber(user_id, username).await? {
        println!("Subscribed {user_id}.");
    } else {
        println!("{user_id} is already subscribed.");
    }
    Ok(())
}

async fn cmd_subscribers_remove(config_path: Option<&Path>, user_id: i64) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    if storage.get_subscriber(user_id).await?.is_none() {
        return Err(eyre!("no subscriber with id {user_id}"));
    }
    storage.deactivate(user_id).await?;
    println!("Deactivated {user_id}.");
    Ok(())
}

async fn cmd_history(config_path: Option<&Path>, date: Option<NaiveDate>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage_readonly(&config).await?;
    let date =
        date.unwrap_or_else(|| IngestionWindow::previous_utc_day(Utc::now()).digest_date());

    let Some(digest) = storage.get_digest(date).await? else {
        println!("No digest archived for {date}.");
        return Ok(());
    };

    println!(
        "Digest for {date} ({} items, created {}):",
        digest.item_count,
        digest.created_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!();
    println!("{}", digest.content);
    println!();

    let records = storage.list_delivery_records(date).await?;
    println!("Deliveries ({}):", records.len());
    for record in &records {
        println!(
            "  {:>12}  {:<18} {} part(s){}",
            record.user_id,
            record.outcome.as_str(),
            record.chunks_sent,
            record
                .error
                .as_deref()
                .map(|e| format!("  {e}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_interrupt_sets_stop() {
        let (tx, rx) = watch::channel(false);
        forward_interrupt(async { Ok(()) }, tx).await;
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_listener_failure_keeps_loop_running() {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(forward_interrupt(
            async { Err(std::io::Error::other("signal handler unavailable")) },
            tx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!*rx.borrow());
        // Sender still alive: a dropped sender would also end the scheduler.
        assert_eq!(rx.has_changed().ok(), Some(false));
        assert!(!task.is_finished());
        task.abort();
    }
}
