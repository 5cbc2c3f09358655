//! Delivery engine: fans a chunked digest out to subscribers.
//!
//! Subscribers are visited one after another in the order given. Each one
//! receives every chunk in order, with a pause between chunks. The first
//! failed send ends that subscriber's delivery:
//!
//! | failure kind          | outcome            | subscriber state     |
//! |-----------------------|--------------------|----------------------|
//! | `Permanent`           | `PermanentFailure` | deactivated          |
//! | `Transient`/`Unknown` | `TransientFailure` | unchanged            |
//!
//! A full delivery refreshes the subscriber's `last_interaction_at`.
//! Subscriber-store errors are logged and never change the outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use newsdigest_shared::{Chunk, DeliveryOutcome, DeliveryRecord, FailureKind};

use crate::pipeline::ProgressReporter;
use crate::traits::{SubscriberStore, Transport};

/// Sends chunks to subscribers and applies lifecycle transitions.
pub struct DeliveryEngine {
    transport: Arc<dyn Transport>,
    subscribers: Arc<dyn SubscriberStore>,
    inter_chunk_delay: Duration,
}

impl DeliveryEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        subscribers: Arc<dyn SubscriberStore>,
        inter_chunk_delay: Duration,
    ) -> Self {
        Self {
            transport,
            subscribers,
            inter_chunk_delay,
        }
    }

    /// Deliver `chunks` to every user in `recipients`.
    ///
    /// Returns exactly one record per recipient, in recipient order.
    #[instrument(
        skip_all,
        fields(date = %digest_date, chunks = chunks.len(), recipients = recipients.len())
    )]
    pub async fn deliver(
        &self,
        digest_date: NaiveDate,
        chunks: &[Chunk],
        recipients: &[i64],
        progress: &dyn ProgressReporter,
    ) -> Vec<DeliveryRecord> {
        let mut records = Vec::with_capacity(recipients.len());

        for (i, &user_id) in recipients.iter().enumerate() {
            let record = self.deliver_one(digest_date, chunks, user_id).await;
            progress.delivered(user_id, record.outcome, i + 1, recipients.len());
            records.push(record);
        }

        let delivered = records
            .iter()
            .filter(|r| r.outcome == DeliveryOutcome::Success)
            .count();
        info!(
            delivered,
            failed = records.len() - delivered,
            "delivery finished"
        );
        records
    }

    #[instrument(skip_all, fields(user_id = %user_id))]
    async fn deliver_one(
        &self,
        digest_date: NaiveDate,
        chunks: &[Chunk],
        user_id: i64,
    ) -> DeliveryRecord {
        let mut chunks_sent = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.inter_chunk_delay.is_zero() {
                tokio::time::sleep(self.inter_chunk_delay).await;
            }

            match self.transport.send(user_id, &chunk.text()).await {
                Ok(message_id) => {
                    chunks_sent += 1;
                    debug!(part = chunk.index, total = chunk.total, message_id, "chunk sent");
                }
                Err(failure) => {
                    let outcome = match failure.kind {
                        FailureKind::Permanent => {
                            warn!(
                                error = %failure.description,
                                chunks_sent,
                                "recipient unreachable, deactivating"
                            );
                            if let Err(e) = self.subscribers.deactivate(user_id).await {
                                warn!(error = %e, "failed to deactivate subscriber");
                            }
                            DeliveryOutcome::PermanentFailure
                        }
                        FailureKind::Transient | FailureKind::Unknown => {
                            warn!(
                                error = %failure.description,
                                kind = ?failure.kind,
                                chunks_sent,
                                "delivery failed, will retry next cycle"
                            );
                            DeliveryOutcome::TransientFailure
                        }
                    };
                    return DeliveryRecord {
                        digest_date,
                        user_id,
                        outcome,
                        chunks_sent,
                        error: Some(failure.description),
                    };
                }
            }
        }

        if let Err(e) = self.subscribers.mark_interaction(user_id).await {
            warn!(error = %e, "failed to record subscriber interaction");
        }
        DeliveryRecord {
            digest_date,
            user_id,
            outcome: DeliveryOutcome::Success,
            chunks_sent,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::testing::{FakeSubscribers, FakeTransport};
    use newsdigest_shared::SendFailure;

    fn chunks(n: usize) -> Vec<Chunk> {
        (1..=n)
            .map(|i| Chunk {
                index: i,
                total: n,
                body: format!("body {i}"),
            })
            .collect()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    fn engine(transport: &Arc<FakeTransport>, subs: &Arc<FakeSubscribers>) -> DeliveryEngine {
        DeliveryEngine::new(transport.clone(), subs.clone(), Duration::ZERO)
    }

    #[tokio::test]
    async fn test_success_sends_all_chunks_in_order() {
        let transport = Arc::new(FakeTransport::new());
        let subs = Arc::new(FakeSubscribers::with_active(&[1, 2]));

        let records = engine(&transport, &subs)
            .deliver(date(), &chunks(3), &[1, 2], &SilentProgress)
            .await;

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.outcome == DeliveryOutcome::Success));
        assert!(records.iter().all(|r| r.chunks_sent == 3));

        let sent = transport.sent_to(1);
        assert_eq!(sent, vec!["part 1/3\n\nbody 1", "part 2/3\n\nbody 2", "part 3/3\n\nbody 3"]);
        assert_eq!(subs.interactions(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_permanent_failure_deactivates_and_aborts() {
        let transport = Arc::new(FakeTransport::new().fail_at(
            2,
            1,
            SendFailure::permanent("403: Forbidden: bot was blocked by the user"),
        ));
        let subs = Arc::new(FakeSubscribers::with_active(&[1, 2, 3]));

        let records = engine(&transport, &subs)
            .deliver(date(), &chunks(3), &[1, 2, 3], &SilentProgress)
            .await;

        assert_eq!(records[1].outcome, DeliveryOutcome::PermanentFailure);
        assert_eq!(records[1].chunks_sent, 1);
        assert!(records[1].error.as_deref().unwrap().contains("blocked"));
        // Remaining chunks were not attempted
        assert_eq!(transport.sent_to(2).len(), 1);

        // Others unaffected
        assert_eq!(records[0].outcome, DeliveryOutcome::Success);
        assert_eq!(records[2].outcome, DeliveryOutcome::Success);

        assert_eq!(subs.active(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_subscriber_active() {
        let transport =
            Arc::new(FakeTransport::new().fail_at(1, 0, SendFailure::transient("timed out")));
        let subs = Arc::new(FakeSubscribers::with_active(&[1]));

        let records = engine(&transport, &subs)
            .deliver(date(), &chunks(2), &[1], &SilentProgress)
            .await;

        assert_eq!(records[0].outcome, DeliveryOutcome::TransientFailure);
        assert_eq!(records[0].chunks_sent, 0);
        assert_eq!(subs.active(), vec![1]);
        assert!(subs.interactions().is_empty());
        // No retry within the cycle
        assert_eq!(transport.attempts_to(1), 1);
    }

    #[tokio::test]
    async fn test_unknown_failure_is_treated_as_transient() {
        let transport = Arc::new(FakeTransport::new().fail_at(
            1,
            0,
            SendFailure::unknown("400: message is too long"),
        ));
        let subs = Arc::new(FakeSubscribers::with_active(&[1]));

        let records = engine(&transport, &subs)
            .deliver(date(), &chunks(1), &[1], &SilentProgress)
            .await;

        assert_eq!(records[0].outcome, DeliveryOutcome::TransientFailure);
        assert_eq!(subs.active(), vec![1]);
    }

    #[tokio::test]
    async fn test_inactive_iff_permanent_failure() {
        let transport = Arc::new(
            FakeTransport::new()
                .fail_at(2, 0, SendFailure::permanent("400: chat not found"))
                .fail_at(3, 1, SendFailure::transient("502: Bad Gateway"))
                .fail_at(5, 0, SendFailure::permanent("403: user is deactivated")),
        );
        let recipients = [1, 2, 3, 4, 5];
        let subs = Arc::new(FakeSubscribers::with_active(&recipients));

        let records = engine(&transport, &subs)
            .deliver(date(), &chunks(2), &recipients, &SilentProgress)
            .await;

        assert_eq!(records.len(), recipients.len());
        let active = subs.active();
        for record in &records {
            let inactive = !active.contains(&record.user_id);
            assert_eq!(inactive, record.outcome == DeliveryOutcome::PermanentFailure);
        }
    }

    #[tokio::test]
    async fn test_store_errors_do_not_change_outcome() {
        let transport =
            Arc::new(FakeTransport::new().fail_at(2, 0, SendFailure::permanent("403: Forbidden")));
        let subs = Arc::new(FakeSubscribers::with_active(&[1, 2]).broken());

        let records = engine(&transport, &subs)
            .deliver(date(), &chunks(1), &[1, 2], &SilentProgress)
            .await;

        assert_eq!(records[0].outcome, DeliveryOutcome::Success);
        assert_eq!(records[1].outcome, DeliveryOutcome::PermanentFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_chunks() {
        let transport = Arc::new(FakeTransport::new());
        let subs = Arc::new(FakeSubscribers::with_active(&[1]));
        let engine = DeliveryEngine::new(transport.clone(), subs.clone(), Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        engine.deliver(date(), &chunks(3), &[1], &SilentProgress).await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
