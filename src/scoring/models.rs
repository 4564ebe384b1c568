//! Data models for lead scoring

use crate::sources::models::{EventKind, Lead, LeadId, LeadStatus};
use crate::sources::FanOutResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engagement inputs: how much the lead has interacted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementFactors {
    pub demo_views: u32,
    pub email_opens: u32,
    pub replies: u32,
    pub days_since_interaction: i64,
}

/// Urgency inputs: how much the pipeline position is stalling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrgencyFactors {
    pub days_in_status: i64,
    pub follow_ups_ignored: u32,
    pub status: LeadStatus,
}

/// Fit inputs: how well the company matches the product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitFactors {
    pub industry_match: bool,
    pub has_website: bool,
    pub has_reviews: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_rating: Option<f64>,
}

/// Snapshot of every input that fed a score: the audit trail of
/// "why this score".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub engagement: EngagementFactors,
    pub urgency: UrgencyFactors,
    pub fit: FitFactors,
}

impl ScoreFactors {
    /// Build factors for one lead from its record and the events the
    /// fan-out returned. Email opens count clicks as well (a click implies
    /// an open); replies come from CRM activity entries.
    pub fn from_signals(lead: &Lead, fan: &FanOutResult, now: DateTime<Utc>) -> Self {
        let mut demo_views = 0u32;
        let mut email_opens = 0u32;
        let mut replies = 0u32;
        let mut last_interaction: Option<DateTime<Utc>> = None;

        for event in fan.all_events() {
            match event.kind {
                EventKind::DemoView => demo_views += 1,
                EventKind::EmailOpen | EventKind::EmailClick => email_opens += 1,
                EventKind::Activity => replies += 1,
                EventKind::Note | EventKind::Call => {}
            }

            // Activities are bookkeeping, not lead interactions.
            if event.kind != EventKind::Activity {
                last_interaction = match last_interaction {
                    Some(current) => Some(current.max(event.occurred_at)),
                    None => Some(event.occurred_at),
                };
            }
        }

        let days_since_interaction = (now - last_interaction.unwrap_or(lead.created_at))
            .num_days()
            .max(0);

        Self {
            engagement: EngagementFactors {
                demo_views,
                email_opens,
                replies,
                days_since_interaction,
            },
            urgency: UrgencyFactors {
                days_in_status: (now - lead.status_changed_at).num_days().max(0),
                follow_ups_ignored: lead.follow_ups_ignored,
                status: lead.status,
            },
            fit: FitFactors {
                industry_match: lead.profile.industry_match,
                has_website: lead.profile.has_website,
                has_reviews: lead.profile.has_reviews,
                review_rating: lead.profile.review_rating,
            },
        }
    }
}

/// Output of one strategy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub engagement: f64,
    pub urgency: f64,
    pub fit: f64,
    pub overall: f64,
}

/// Qualitative bucket for a score.
///
/// The partition is load-bearing: UI color and label key off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBucket {
    Hot,      // [80, 100]
    Warm,     // [60, 80)
    Lukewarm, // [40, 60)
    Cold,     // [0, 40)
}

impl ScoreBucket {
    /// Map an overall score to its bucket. Total over [0, 100].
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Hot
        } else if score >= 60.0 {
            Self::Warm
        } else if score >= 40.0 {
            Self::Lukewarm
        } else {
            Self::Cold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Lukewarm => "lukewarm",
            Self::Cold => "cold",
        }
    }
}

/// Current score snapshot for one lead. Overwritten, not versioned, on
/// recompute; staleness is surfaced via `last_calculated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadScore {
    pub lead_id: LeadId,
    pub overall_score: f64,
    pub engagement_score: f64,
    pub urgency_score: f64,
    pub fit_score: f64,
    pub bucket: ScoreBucket,
    pub factors: ScoreFactors,
    pub last_calculated: DateTime<Utc>,
}

/// One lead that failed inside a fleet recompute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedLead {
    pub lead_id: LeadId,
    pub reason: String,
}

/// Aggregate outcome of a fleet recompute. Failed leads retain their
/// previous score and are listed here rather than dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecomputeReport {
    pub succeeded: usize,
    pub failed: Vec<FailedLead>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl RecomputeReport {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_partition_boundaries() {
        assert_eq!(ScoreBucket::from_score(100.0), ScoreBucket::Hot);
        assert_eq!(ScoreBucket::from_score(80.0), ScoreBucket::Hot);
        assert_eq!(ScoreBucket::from_score(79.999), ScoreBucket::Warm);
        assert_eq!(ScoreBucket::from_score(60.0), ScoreBucket::Warm);
        assert_eq!(ScoreBucket::from_score(59.999), ScoreBucket::Lukewarm);
        assert_eq!(ScoreBucket::from_score(40.0), ScoreBucket::Lukewarm);
        assert_eq!(ScoreBucket::from_score(39.999), ScoreBucket::Cold);
        assert_eq!(ScoreBucket::from_score(0.0), ScoreBucket::Cold);
    }

    #[test]
    fn test_bucket_is_total_over_range() {
        let mut score = 0.0;
        while score <= 100.0 {
            // from_score always answers; no gap in the partition.
            let _ = ScoreBucket::from_score(score);
            score += 0.25;
        }
    }
}
