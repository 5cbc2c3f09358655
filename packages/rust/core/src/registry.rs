//! Channel registry: resolves the configured group into stored channels and
//! materializes the `channels.json` list.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use newsdigest_shared::{Channel, ChannelList, NewsDigestError, Result};

use crate::traits::{ChannelDirectory, ChannelStore};

pub struct ChannelRegistry {
    directory: Arc<dyn ChannelDirectory>,
    store: Arc<dyn ChannelStore>,
    channels_file: Option<PathBuf>,
}

impl ChannelRegistry {
    pub fn new(
        directory: Arc<dyn ChannelDirectory>,
        store: Arc<dyn ChannelStore>,
        channels_file: Option<PathBuf>,
    ) -> Self {
        Self {
            directory,
            store,
            channels_file,
        }
    }

    /// Refresh the channels of `group`.
    ///
    /// Directory failures abort with a registry error. Duplicate handles are
    /// collapsed, keeping the first occurrence.
    #[instrument(skip_all, fields(group = %group))]
    pub async fn refresh(&self, group: &str) -> Result<Vec<Channel>> {
        let entries = self.directory.list_channels(group).await.map_err(|e| match e {
            NewsDigestError::Registry(_) => e,
            other => NewsDigestError::Registry(format!("group {group:?}: {other}")),
        })?;

        let mut seen = HashSet::new();
        let mut channels = Vec::with_capacity(entries.len());
        for entry in entries {
            if !seen.insert(entry.handle.to_lowercase()) {
                warn!(handle = %entry.handle, "duplicate channel in group, skipping");
                continue;
            }
            channels.push(self.store.upsert_channel(&entry.handle, &entry.title).await?);
        }

        if channels.is_empty() {
            return Err(NewsDigestError::Registry(format!(
                "group {group:?} has no channels"
            )));
        }

        if let Some(path) = &self.channels_file {
            write_channel_list(path, &channels)?;
        }

        info!(channels = channels.len(), "channel registry refreshed");
        Ok(channels)
    }
}

/// Write the materialized channel list as pretty JSON.
pub fn write_channel_list(path: &std::path::Path, channels: &[Channel]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| NewsDigestError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(&ChannelList::from_channels(channels))
        .map_err(|e| NewsDigestError::parse(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| NewsDigestError::io(path, e))
}

/// Read a previously materialized channel list.
pub fn read_channel_list(path: &std::path::Path) -> Result<ChannelList> {
    let content = std::fs::read_to_string(path).map_err(|e| NewsDigestError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| NewsDigestError::parse(format!("{}: {e}", path.display())))
}
