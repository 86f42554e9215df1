//! Periodic reconciliation.
//!
//! The sweeper runs four passes in order: expire challenges whose slot has
//! passed, cancel matches nobody reported on, purge terminal records past
//! retention, and recompute ranks. Each pass only touches records that are
//! already past a deadline, so it can run alongside live traffic.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::config::before;
use crate::engine::LadderContext;
use crate::error::LadderError;
use crate::matches::{commit_transition, MatchEvent, MatchStatus};
use crate::notify::LadderEvent;
use crate::ranking::RankingEngine;
use crate::types::MatchId;

/// Counts from one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_challenges: u64,
    pub abandoned_matches: u64,
    pub purged_challenges: u64,
    pub purged_matches: u64,
    pub ranks_changed: usize,
    /// Passes or records that failed and were skipped.
    pub failures: usize,
}

#[derive(Clone)]
pub struct Sweeper {
    ctx: Arc<LadderContext>,
}

impl Sweeper {
    pub(crate) fn new(ctx: Arc<LadderContext>) -> Self {
        Self { ctx }
    }

    /// PENDING challenges with `expires_at <= now` become EXPIRED.
    #[instrument(skip_all)]
    pub async fn expire_challenges(&self) -> Result<u64, LadderError> {
        let now = self.ctx.now();
        let mut tx = self.ctx.store.begin().await?;
        let expired = tx.expire_challenges(now).await?;
        tx.commit().await?;
        if expired > 0 {
            tracing::info!(expired, "expired challenges");
        }
        Ok(expired)
    }

    /// IN_PROGRESS matches without submissions, scheduled more than the
    /// abandonment grace ago, become CANCELLED along with their challenge.
    ///
    /// Each match is handled in its own transaction; a failing match is
    /// logged and counted in the returned failure total.
    #[instrument(skip_all)]
    pub async fn cancel_abandoned_matches(&self) -> Result<(u64, usize), LadderError> {
        let now = self.ctx.now();
        let cutoff = before(now, self.ctx.config.grace())?;

        let mut tx = self.ctx.store.begin().await?;
        let candidates = tx.find_abandoned_matches(cutoff).await?;
        tx.commit().await?;

        let mut cancelled = 0;
        let mut failures = 0;
        for match_id in candidates {
            match self.cancel_abandoned(match_id, cutoff, now).await {
                Ok(true) => cancelled += 1,
                Ok(false) => {}
                Err(e) => {
                    failures += 1;
                    tracing::warn!(match_id = %match_id, error = %e, "failed to cancel abandoned match");
                }
            }
        }
        if cancelled > 0 {
            tracing::info!(cancelled, "cancelled abandoned matches");
        }
        Ok((cancelled, failures))
    }

    async fn cancel_abandoned(
        &self,
        match_id: MatchId,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, LadderError> {
        let mut tx = self.ctx.store.begin().await?;
        let Some(current) = tx.lock_match(match_id).await? else {
            return Ok(false);
        };
        // Re-check under the lock; a result may have arrived since the scan.
        if current.status != MatchStatus::InProgress
            || current.scheduled_at >= cutoff
            || tx.count_submissions(match_id).await? > 0
        {
            return Ok(false);
        }

        let sides = self.ctx.participants(tx.as_mut(), &current).await?;
        let transition = current.apply(MatchEvent::Abandoned, now)?;
        commit_transition(tx.as_mut(), &transition, now).await?;
        tx.commit().await?;

        self.ctx
            .notifier
            .publish(&sides.owners(), LadderEvent::MatchCancelled { match_id })
            .await;
        Ok(true)
    }

    /// Delete terminal challenges and cancelled matches older than retention.
    #[instrument(skip_all)]
    pub async fn purge_stale_records(&self) -> Result<(u64, u64), LadderError> {
        let cutoff = before(self.ctx.now(), self.ctx.config.retention_window())?;
        let mut tx = self.ctx.store.begin().await?;
        let challenges = tx.purge_challenges(cutoff).await?;
        let matches = tx.purge_matches(cutoff).await?;
        tx.commit().await?;
        if challenges + matches > 0 {
            tracing::info!(challenges, matches, "purged stale records");
        }
        Ok((challenges, matches))
    }

    /// Run all passes once. Failures are logged and counted, never returned.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.expire_challenges().await {
            Ok(n) => report.expired_challenges = n,
            Err(e) => {
                report.failures += 1;
                tracing::warn!(error = %e, "challenge expiry pass failed");
            }
        }
        match self.cancel_abandoned_matches().await {
            Ok((n, failures)) => {
                report.abandoned_matches = n;
                report.failures += failures;
            }
            Err(e) => {
                report.failures += 1;
                tracing::warn!(error = %e, "abandoned match pass failed");
            }
        }
        match self.purge_stale_records().await {
            Ok((challenges, matches)) => {
                report.purged_challenges = challenges;
                report.purged_matches = matches;
            }
            Err(e) => {
                report.failures += 1;
                tracing::warn!(error = %e, "purge pass failed");
            }
        }
        match RankingEngine::new(self.ctx.clone()).recompute_all().await {
            Ok(n) => report.ranks_changed = n,
            Err(e) => {
                report.failures += 1;
                tracing::warn!(error = %e, "rank pass failed");
            }
        }

        report
    }

    /// Run the sweeper every `sweep_interval` until `shutdown` is cancelled.
    /// The first sweep starts immediately.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let period = self.ctx.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = period.as_secs(), "sweeper started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.run_once().await;
                        tracing::debug!(?report, "sweep finished");
                    }
                }
            }
            tracing::info!("sweeper stopped");
        })
    }
}
