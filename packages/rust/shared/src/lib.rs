//! Shared types, error model, and configuration for newsdigest.
//!
//! This crate is the foundation depended on by all other newsdigest crates.
//! It provides:
//! - [`NewsDigestError`], the unified error type
//! - Domain types ([`Channel`], [`IngestionWindow`], [`NewsItem`], [`Digest`],
//!   [`Chunk`], [`Subscriber`], [`DeliveryRecord`])
//! - Configuration ([`AppConfig`], [`CycleConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ChannelGroup, CycleConfig, DeliveryConfig, IngestConfig, ScheduleConfig,
    StorageConfig, SummarizerConfig, TelegramConfig, config_dir, config_file_path, expand_home,
    init_config, load_config, load_config_from, read_secret, validate_config, validate_secrets,
};
pub use error::{NewsDigestError, Result};
pub use types::{
    Channel, ChannelList, ChannelListEntry, Chunk, DeliveryOutcome, DeliveryRecord, Digest,
    FailureKind, IngestionWindow, NewsItem, RawMessage, SendFailure, Subscriber,
    SubscriberStatus,
};

/// User-Agent string for outbound HTTP requests.
pub const USER_AGENT: &str = concat!("newsdigest/", env!("CARGO_PKG_VERSION"));
