//! The poll -> filter -> dedupe -> notify -> persist cycle.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use fpn_adapters::{FeedError, FeedSource, Messenger};
use fpn_storage::DedupeStore;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::filter::{select_qualified, QualificationFilter};
use crate::format::NotificationFormatter;
use crate::pacer::Pacer;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub run_id: Uuid,
    pub fetched: usize,
    pub qualified: usize,
    pub malformed: usize,
    pub already_notified: usize,
    pub sent: usize,
    pub send_failures: usize,
    pub store_failures: usize,
    pub persist_failures: usize,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub chat_id: String,
    pub message_delay: Duration,
    pub cycle_delay: Duration,
}

/// Sequential dispatcher. One cycle at a time, one candidate at a time.
pub struct DispatchLoop<F, M, S, P> {
    feed: F,
    messenger: M,
    store: S,
    pacer: P,
    filter: QualificationFilter,
    formatter: NotificationFormatter,
    settings: DispatchSettings,
}

impl<F, M, S, P> DispatchLoop<F, M, S, P>
where
    F: FeedSource,
    M: Messenger,
    S: DedupeStore,
    P: Pacer,
{
    pub fn new(
        feed: F,
        messenger: M,
        store: S,
        pacer: P,
        filter: QualificationFilter,
        formatter: NotificationFormatter,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            feed,
            messenger,
            store,
            pacer,
            filter,
            formatter,
            settings,
        }
    }

    pub fn from_config(
        feed: F,
        messenger: M,
        store: S,
        pacer: P,
        config: &SyncConfig,
        chat_id: impl Into<String>,
    ) -> Self {
        Self::new(
            feed,
            messenger,
            store,
            pacer,
            config.filter.clone(),
            config.formatter.clone(),
            DispatchSettings {
                chat_id: chat_id.into(),
                message_delay: config.message_delay,
                cycle_delay: config.cycle_delay,
            },
        )
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// One full cycle. Only feed-level failures abort it; per-candidate failures are counted.
    pub async fn run_cycle(&self) -> Result<CycleSummary, FeedError> {
        let run_id = Uuid::new_v4();
        self.cycle(run_id)
            .instrument(info_span!("dispatch_cycle", %run_id))
            .await
    }

    async fn cycle(&self, run_id: Uuid) -> Result<CycleSummary, FeedError> {
        let mut summary = CycleSummary {
            run_id,
            ..CycleSummary::default()
        };

        info!("fetching projects");
        let batch = self.feed.fetch(run_id).await?;
        summary.fetched = batch.candidates.len();

        let selection = select_qualified(batch, &self.filter);
        for bad in &selection.malformed {
            warn!(candidate_id = ?bad.candidate_id, reason = %bad.reason, "skipping malformed project");
        }
        for (candidate, reason) in &selection.rejected {
            debug!(candidate_id = candidate.id, %reason, "qualification skip");
        }
        summary.malformed = selection.malformed.len();
        summary.qualified = selection.qualified.len();
        info!(qualified = summary.qualified, fetched = summary.fetched, "qualified projects");

        for q in &selection.qualified {
            let candidate_id = q.candidate.id;

            let (entry, created) = match self.store.find_or_create(candidate_id).await {
                Ok(found) => found,
                Err(err) => {
                    error!(candidate_id, error = %err, "dedupe lookup failed; skipping");
                    summary.store_failures += 1;
                    continue;
                }
            };

            if entry.notified {
                info!(candidate_id, "already notified");
                summary.already_notified += 1;
                continue;
            }
            if !created {
                debug!(candidate_id, "retrying project left unnotified by an earlier cycle");
            }

            let text = self.formatter.render(&q.candidate, &q.actor, Utc::now());
            if let Err(err) = self.messenger.send(&self.settings.chat_id, &text).await {
                error!(candidate_id, error = %err, "send failed; will retry next cycle");
                summary.send_failures += 1;
                continue;
            }

            info!(candidate_id, "notified project");
            summary.sent += 1;

            if let Err(err) = self.store.mark_notified(candidate_id).await {
                warn!(
                    candidate_id,
                    error = %err,
                    "sent but could not record it; a later cycle may notify again"
                );
                summary.persist_failures += 1;
            }

            self.pacer.pause(self.settings.message_delay).await;
        }

        info!(
            sent = summary.sent,
            already_notified = summary.already_notified,
            send_failures = summary.send_failures,
            persist_failures = summary.persist_failures,
            "cycle complete"
        );
        Ok(summary)
    }

    /// Cycle forever. Errors are logged and the next cycle starts after `cycle_delay`.
    pub async fn run_forever(&self) {
        loop {
            if let Err(err) = self.run_cycle().await {
                error!(error = %err, "cycle aborted");
            }
            self.pacer.pause(self.settings.cycle_delay).await;
            // Lets a pending shutdown win even when every wait above is zero.
            tokio::task::yield_now().await;
        }
    }

    /// Cycle until `shutdown` resolves. A cycle in flight is dropped at its next await point.
    pub async fn run_until<Fut>(&self, shutdown: Fut)
    where
        Fut: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = shutdown => info!("shutdown requested; stopping dispatch loop"),
            _ = self.run_forever() => {}
        }
    }
}
