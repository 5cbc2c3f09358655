//! newsdigest CLI: daily Telegram channel digest service.
//!
//! Collects the previous day's posts from a group of public channels,
//! summarizes them, and delivers the digest to bot subscribers.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
