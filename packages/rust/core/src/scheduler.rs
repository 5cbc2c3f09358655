//! Daily scheduler: runs one cycle per day at a fixed UTC time.
//!
//! Errors escaping a cycle are logged and followed by a fixed backoff; the
//! loop itself only ends when the stop signal fires. The stop signal is
//! observed while sleeping. A running cycle is never cancelled.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, instrument};

use newsdigest_shared::Result;

use crate::pipeline::{DigestPipeline, SilentProgress};

/// Something the scheduler runs once per trigger.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    async fn run(&self, now: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
impl ScheduledJob for DigestPipeline {
    async fn run(&self, now: DateTime<Utc>) -> Result<()> {
        self.run_cycle(now, &SilentProgress).await.map(|_| ())
    }
}

/// The next occurrence of `at` (UTC) strictly after `now`.
pub fn next_trigger(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

pub struct Scheduler {
    send_at: NaiveTime,
    error_backoff: Duration,
}

impl Scheduler {
    pub fn new(send_at: NaiveTime, error_backoff: Duration) -> Self {
        Self {
            send_at,
            error_backoff,
        }
    }

    /// Loop until `stop` turns `true` (or its sender is dropped).
    #[instrument(skip_all, fields(send_at = %self.send_at))]
    pub async fn run(&self, job: &dyn ScheduledJob, mut stop: watch::Receiver<bool>) {
        info!("scheduler started");
        loop {
            if *stop.borrow() {
                break;
            }

            let now = Utc::now();
            let trigger = next_trigger(now, self.send_at);
            let wait = (trigger - now).to_std().unwrap_or_default();
            info!(
                next = %trigger,
                wait_hours = %format!("{:.1}", wait.as_secs_f64() / 3600.0),
                "waiting for next cycle"
            );
            if !sleep_or_stop(wait, &mut stop).await {
                break;
            }

            if let Err(e) = job.run(Utc::now()).await {
                error!(error = %e, backoff_secs = self.error_backoff.as_secs(), "cycle failed");
                if !sleep_or_stop(self.error_backoff, &mut stop).await {
                    break;
                }
            }
        }
        info!("scheduler stopped");
    }
}

/// Sleep for `duration`. Returns `false` if stop was requested meanwhile.
async fn sleep_or_stop(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        changed = stop.changed() => changed.is_ok() && !*stop.borrow(),
    }
}
