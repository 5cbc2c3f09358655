//! One digest cycle: registry → ingest → summarize → chunk → deliver.
//!
//! Phases run strictly in sequence. A failing channel only loses its own
//! items; a failing summarizer ends the cycle before anything is sent.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use newsdigest_shared::{
    CycleConfig, DeliveryOutcome, DeliveryRecord, Digest, IngestionWindow, NewsDigestError,
    NewsItem, Result,
};

use crate::chunker;
use crate::delivery::DeliveryEngine;
use crate::registry::ChannelRegistry;
use crate::traits::{
    ChannelDirectory, ChannelStore, DigestArchive, MessageSource, SubscriberStore, Summarizer,
    Transport,
};
use crate::window;

/// Collaborators the pipeline is built from.
pub struct PipelineDeps {
    pub directory: Arc<dyn ChannelDirectory>,
    pub channel_store: Arc<dyn ChannelStore>,
    pub source: Arc<dyn MessageSource>,
    pub summarizer: Arc<dyn Summarizer>,
    pub transport: Arc<dyn Transport>,
    pub subscribers: Arc<dyn SubscriberStore>,
    pub archive: Arc<dyn DigestArchive>,
    /// Where to materialize `channels.json`, if anywhere.
    pub channels_file: Option<PathBuf>,
}

/// What one cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub window: IngestionWindow,
    pub channels_scanned: usize,
    pub channels_failed: usize,
    pub item_count: usize,
    /// `None` when the window held no items.
    pub digest: Option<Digest>,
    pub chunk_count: usize,
    pub records: Vec<DeliveryRecord>,
    pub elapsed: Duration,
}

impl CycleReport {
    /// Number of records with the given outcome.
    pub fn count(&self, outcome: DeliveryOutcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }
}

/// Progress callback for reporting cycle status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each channel scan.
    fn channel_scanned(&self, handle: &str, items: usize, current: usize, total: usize);
    /// Called after each subscriber's delivery concludes.
    fn delivered(&self, user_id: i64, outcome: DeliveryOutcome, current: usize, total: usize);
    /// Called when the cycle completes.
    fn done(&self, report: &CycleReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn channel_scanned(&self, _handle: &str, _items: usize, _current: usize, _total: usize) {}
    fn delivered(&self, _user_id: i64, _outcome: DeliveryOutcome, _current: usize, _total: usize) {}
    fn done(&self, _report: &CycleReport) {}
}

/// The daily digest pipeline.
pub struct DigestPipeline {
    registry: ChannelRegistry,
    source: Arc<dyn MessageSource>,
    summarizer: Arc<dyn Summarizer>,
    subscribers: Arc<dyn SubscriberStore>,
    archive: Arc<dyn DigestArchive>,
    delivery: DeliveryEngine,
    config: CycleConfig,
}

impl DigestPipeline {
    pub fn new(deps: PipelineDeps, config: CycleConfig) -> Self {
        Self {
            registry: ChannelRegistry::new(deps.directory, deps.channel_store, deps.channels_file),
            delivery: DeliveryEngine::new(
                deps.transport,
                deps.subscribers.clone(),
                config.inter_chunk_delay,
            ),
            source: deps.source,
            summarizer: deps.summarizer,
            subscribers: deps.subscribers,
            archive: deps.archive,
            config,
        }
    }

    /// Run one cycle for the UTC day before `now`.
    #[instrument(skip_all, fields(group = %self.config.group))]
    pub async fn run_cycle(
        &self,
        now: DateTime<Utc>,
        progress: &dyn ProgressReporter,
    ) -> Result<CycleReport> {
        let start = Instant::now();
        let window = IngestionWindow::previous_utc_day(now);
        info!(%window, "starting digest cycle");

        // --- Phase 1: Registry ---
        progress.phase("Refreshing channel registry");
        let channels = self.registry.refresh(&self.config.group).await?;

        // --- Phase 2: Ingest ---
        progress.phase("Collecting news");
        let mut items: Vec<NewsItem> = Vec::new();
        let mut channels_failed = 0;
        for (i, channel) in channels.iter().enumerate() {
            let found = match window::scan_channel(
                self.source.as_ref(),
                &channel.handle,
                &window,
                self.config.max_scan_messages,
            )
            .await
            {
                Ok(scan) => {
                    let n = scan.items.len();
                    items.extend(scan.items);
                    n
                }
                Err(e) => {
                    warn!(
                        handle = %channel.handle,
                        error = %e,
                        "channel ingestion failed, skipping"
                    );
                    channels_failed += 1;
                    0
                }
            };
            progress.channel_scanned(&channel.handle, found, i + 1, channels.len());
        }

        let mut report = CycleReport {
            window,
            channels_scanned: channels.len(),
            channels_failed,
            item_count: items.len(),
            digest: None,
            chunk_count: 0,
            records: Vec::new(),
            elapsed: Duration::ZERO,
        };

        if items.is_empty() {
            info!("no news in window, skipping digest");
            report.elapsed = start.elapsed();
            progress.done(&report);
            return Ok(report);
        }

        // --- Phase 3: Summarize ---
        progress.phase("Summarizing");
        let rendered: Vec<String> = items
            .iter()
            .map(|item| item.render(&self.config.web_base))
            .collect();
        let content = self.summarizer.summarize(&rendered).await?;
        if content.trim().is_empty() {
            return Err(NewsDigestError::Summarization("empty digest".into()));
        }
        let digest = Digest {
            date: window.digest_date(),
            content,
            item_count: items.len(),
            created_at: now,
        };

        // --- Phase 4: Chunk ---
        let chunks = chunker::split_digest(&digest.content, self.config.max_chunk_size)?;
        info!(
            items = digest.item_count,
            chars = digest.content.chars().count(),
            chunks = chunks.len(),
            "digest ready"
        );

        let digest_id = match self.archive.save_digest(&digest).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to archive digest");
                None
            }
        };

        // --- Phase 5: Deliver ---
        let recipients = self.subscribers.active_subscribers().await?;
        progress.phase(&format!("Delivering to {} subscribers", recipients.len()));
        let records = self
            .delivery
            .deliver(digest.date, &chunks, &recipients, progress)
            .await;

        if let Some(id) = &digest_id {
            for record in &records {
                if let Err(e) = self.archive.record_delivery(id, record).await {
                    warn!(
                        user_id = record.user_id,
                        error = %e,
                        "failed to archive delivery record"
                    );
                }
            }
        }

        report.chunk_count = chunks.len();
        report.digest = Some(digest);
        report.records = records;
        report.elapsed = start.elapsed();

        info!(
            delivered = report.count(DeliveryOutcome::Success),
            transient = report.count(DeliveryOutcome::TransientFailure),
            permanent = report.count(DeliveryOutcome::PermanentFailure),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "digest cycle complete"
        );
        progress.done(&report);
        Ok(report)
    }
}
