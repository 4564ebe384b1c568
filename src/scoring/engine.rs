//! Score computation and fleet recompute

use super::models::{FailedLead, LeadScore, RecomputeReport, ScoreBucket, ScoreFactors};
use super::strategy::ScoringStrategy;
use crate::error::{Result, SignalError};
use crate::metrics::METRICS;
use crate::sources::{LeadDirectory, LeadId, SignalQuery, SourceSet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Storage for score snapshots. `put` is an idempotent overwrite; `get`
/// returns the last computed snapshot however stale.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn get(&self, lead_id: LeadId) -> Result<Option<LeadScore>>;

    async fn put(&self, score: LeadScore) -> Result<()>;
}

/// In-memory score store
#[derive(Default)]
pub struct MemoryScoreStore {
    scores: DashMap<LeadId, LeadScore>,
}

impl MemoryScoreStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn get(&self, lead_id: LeadId) -> Result<Option<LeadScore>> {
        Ok(self.scores.get(&lead_id).map(|s| s.clone()))
    }

    async fn put(&self, score: LeadScore) -> Result<()> {
        self.scores.insert(score.lead_id, score);
        Ok(())
    }
}

/// Computes scores per lead and across the fleet.
///
/// Recompute is explicit: callers (an operator action, an external cron)
/// decide when to refresh. Reads return the stored snapshot.
pub struct ScoreEngine {
    directory: Arc<dyn LeadDirectory>,
    sources: Arc<SourceSet>,
    store: Arc<dyn ScoreStore>,
    strategy: Arc<dyn ScoringStrategy>,
    max_parallel: usize,
}

impl ScoreEngine {
    pub fn new(
        directory: Arc<dyn LeadDirectory>,
        sources: Arc<SourceSet>,
        store: Arc<dyn ScoreStore>,
        strategy: Arc<dyn ScoringStrategy>,
        max_parallel: usize,
    ) -> Self {
        Self {
            directory,
            sources,
            store,
            strategy,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Last stored snapshot for a lead; `None` means never scored
    pub async fn get_score(&self, lead_id: LeadId) -> Result<Option<LeadScore>> {
        self.store.get(lead_id).await
    }

    /// Compute and store one lead's score.
    ///
    /// A degraded source narrows the factors; an invariant violation fails
    /// this lead loudly and leaves its previous snapshot in place.
    pub async fn compute(&self, lead_id: LeadId, now: DateTime<Utc>) -> Result<LeadScore> {
        let lead = self
            .directory
            .get_lead(lead_id)
            .await?
            .ok_or(SignalError::OrphanReference(lead_id))?;

        let fan = self
            .sources
            .fetch_all(&SignalQuery::for_lead(lead_id))
            .await;
        if fan.is_degraded() {
            warn!(
                "Scoring lead {} with degraded sources: {:?}",
                lead_id,
                fan.failed_kinds()
            );
        }

        let factors = ScoreFactors::from_signals(&lead, &fan, now);
        let subs = self.strategy.score(&factors);

        validate_sub_scores(lead_id, &subs)?;

        let score = LeadScore {
            lead_id,
            overall_score: subs.overall,
            engagement_score: subs.engagement,
            urgency_score: subs.urgency,
            fit_score: subs.fit,
            bucket: ScoreBucket::from_score(subs.overall),
            factors,
            last_calculated: now,
        };

        self.store.put(score.clone()).await?;
        METRICS.record_score_compute(true);

        debug!(
            "Scored lead {} via {}: {:.1} ({})",
            lead_id,
            self.strategy.name(),
            score.overall_score,
            score.bucket.as_str()
        );

        Ok(score)
    }

    /// Recompute the whole fleet with bounded concurrency.
    ///
    /// Leads are scored independently; one lead's failure is recorded in
    /// the report and never aborts its siblings.
    pub async fn recompute_fleet(&self, now: DateTime<Utc>) -> Result<RecomputeReport> {
        let leads = self.directory.list_leads().await?;
        let total = leads.len();
        let started = Instant::now();

        info!("Recomputing scores for {} leads", total);

        let outcomes: Vec<(LeadId, Result<LeadScore>)> = stream::iter(leads)
            .map(|lead| async move { (lead.id, self.compute(lead.id, now).await) })
            .buffer_unordered(self.max_parallel)
            .collect()
            .await;

        let mut succeeded = 0usize;
        let mut failed = Vec::new();

        for (lead_id, outcome) in outcomes {
            match outcome {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    METRICS.record_score_compute(false);
                    error!("Score recompute failed for lead {}: {}", lead_id, e);
                    failed.push(FailedLead {
                        lead_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let duration = started.elapsed();
        METRICS.record_fleet_recompute(duration, succeeded, failed.len());

        info!(
            "Fleet recompute finished: {}/{} leads in {:?} ({} failed)",
            succeeded,
            total,
            duration,
            failed.len()
        );

        Ok(RecomputeReport {
            succeeded,
            failed,
            duration_ms: duration.as_millis() as u64,
            completed_at: now,
        })
    }
}

fn validate_sub_scores(lead_id: LeadId, subs: &super::models::SubScores) -> Result<()> {
    for (name, value) in [
        ("engagement", subs.engagement),
        ("urgency", subs.urgency),
        ("fit", subs.fit),
        ("overall", subs.overall),
    ] {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(SignalError::InvariantViolation(format!(
                "{} score {} for lead {} outside [0, 100]",
                name, value, lead_id
            )));
        }
    }
    Ok(())
}
