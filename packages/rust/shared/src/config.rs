//! Application configuration for newsdigest.
//!
//! User config lives at `~/.newsdigest/newsdigest.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: only the names of the env vars holding them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{NewsDigestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "newsdigest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".newsdigest";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "newsdigest.db";

/// Default channel list file name inside the config directory.
const CHANNELS_FILE_NAME: &str = "channels.json";

/// Default summarization instructions.
const DEFAULT_SYSTEM_PROMPT: &str = concat!(
    "Write a short digest of the past day's news from these excerpts. ",
    "Always cite the sources. If several items cover the same story, merge them into one point. ",
    "Cover anything about AI in more detail."
);

// ---------------------------------------------------------------------------
// Config structs (matching newsdigest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// When the daily cycle fires.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Which channel group to ingest and how deep to scan.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Telegram endpoints and credentials.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Summarization service settings.
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Fan-out settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Database and channel list locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Named channel groups (the channel directory).
    #[serde(default = "default_groups")]
    pub groups: Vec<ChannelGroup>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            ingest: IngestConfig::default(),
            telegram: TelegramConfig::default(),
            summarizer: SummarizerConfig::default(),
            delivery: DeliveryConfig::default(),
            storage: StorageConfig::default(),
            groups: default_groups(),
        }
    }
}

fn default_groups() -> Vec<ChannelGroup> {
    vec![ChannelGroup {
        name: default_group(),
        channels: Vec::new(),
    }]
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// UTC time of day the cycle runs, `HH:MM`.
    #[serde(default = "default_send_at")]
    pub send_at: String,

    /// Seconds to wait after a failed cycle before rescheduling.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            send_at: default_send_at(),
            error_backoff_secs: default_error_backoff(),
        }
    }
}

impl ScheduleConfig {
    /// Parse `send_at` into a time of day.
    pub fn send_at_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.send_at, "%H:%M").map_err(|e| {
            NewsDigestError::config(format!(
                "schedule.send_at must be HH:MM, got '{}': {e}",
                self.send_at
            ))
        })
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

fn default_send_at() -> String {
    "09:00".into()
}
fn default_error_backoff() -> u64 {
    300
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Name of the channel group to aggregate.
    #[serde(default = "default_group")]
    pub group: String,

    /// Upper bound on messages scanned per channel per cycle.
    #[serde(default = "default_max_scan")]
    pub max_scan_messages: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            group: default_group(),
            max_scan_messages: default_max_scan(),
        }
    }
}

fn default_group() -> String {
    "AI".into()
}
fn default_max_scan() -> usize {
    2000
}

/// `[[groups]]` entry: a named set of channel handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelGroup {
    pub name: String,
    /// Handles, `@handles`, or `https://t.me/...` links.
    #[serde(default)]
    pub channels: Vec<String>,
}

/// `[telegram]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Name of the env var holding the bot token.
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    /// Bot API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Public web base used for channel previews and permalinks.
    #[serde(default = "default_web_base")]
    pub web_base: String,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: default_bot_token_env(),
            api_base: default_api_base(),
            web_base: default_web_base(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_bot_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".into()
}
fn default_api_base() -> String {
    "https://api.telegram.org".into()
}
fn default_web_base() -> String {
    "https://t.me".into()
}
fn default_request_timeout() -> u64 {
    30
}

/// `[summarizer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Upper bound on completion tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Instructions sent as the system message.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Request timeout; summarization of a full day can take a while.
    #[serde(default = "default_summarizer_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
            request_timeout_secs: default_summarizer_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_max_tokens() -> u32 {
    3000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}
fn default_summarizer_timeout() -> u64 {
    120
}

/// `[delivery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Transport message size limit in characters.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Pause between consecutive chunks to one recipient.
    #[serde(default = "default_inter_chunk_delay")]
    pub inter_chunk_delay_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            inter_chunk_delay_ms: default_inter_chunk_delay(),
        }
    }
}

fn default_max_chunk_size() -> usize {
    4096
}
fn default_inter_chunk_delay() -> u64 {
    1000
}

/// `[storage]` section. Unset paths resolve inside the config directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels_file: Option<String>,
}

impl StorageConfig {
    /// Resolved database path.
    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(p) => expand_home(p),
            None => Ok(config_dir()?.join(DB_FILE_NAME)),
        }
    }

    /// Resolved `channels.json` path.
    pub fn channels_file(&self) -> Result<PathBuf> {
        match &self.channels_file {
            Some(p) => expand_home(p),
            None => Ok(config_dir()?.join(CHANNELS_FILE_NAME)),
        }
    }
}

impl AppConfig {
    /// Look up a channel group by name (case-sensitive).
    pub fn group(&self, name: &str) -> Option<&ChannelGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}

// ---------------------------------------------------------------------------
// Cycle config (runtime, derived from the config file)
// ---------------------------------------------------------------------------

/// Runtime settings for one digest cycle.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Channel group to aggregate.
    pub group: String,
    /// Scan depth bound per channel.
    pub max_scan_messages: usize,
    /// Web base used for source permalinks.
    pub web_base: String,
    /// Transport size limit per chunk.
    pub max_chunk_size: usize,
    /// Pause between chunks to one recipient.
    pub inter_chunk_delay: Duration,
}

impl From<&AppConfig> for CycleConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            group: config.ingest.group.clone(),
            max_scan_messages: config.ingest.max_scan_messages,
            web_base: config.telegram.web_base.clone(),
            max_chunk_size: config.delivery.max_chunk_size,
            inter_chunk_delay: Duration::from_millis(config.delivery.inter_chunk_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.newsdigest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NewsDigestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.newsdigest/newsdigest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| NewsDigestError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NewsDigestError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        NewsDigestError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NewsDigestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NewsDigestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NewsDigestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Static checks that do not touch the environment.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    config.schedule.send_at_time()?;

    if config.delivery.max_chunk_size < 64 {
        return Err(NewsDigestError::config(format!(
            "delivery.max_chunk_size must be at least 64, got {}",
            config.delivery.max_chunk_size
        )));
    }
    if config.ingest.max_scan_messages == 0 {
        return Err(NewsDigestError::config(
            "ingest.max_scan_messages must be greater than 0",
        ));
    }
    Ok(())
}

/// Read a required secret from the env var named in config.
pub fn read_secret(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(NewsDigestError::config(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that both the bot token and the summarizer key are available.
pub fn validate_secrets(config: &AppConfig) -> Result<()> {
    read_secret(&config.telegram.bot_token_env, "Telegram bot token")?;
    read_secret(&config.summarizer.api_key_env, "Summarizer API key")?;
    Ok(())
}
