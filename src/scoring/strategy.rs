//! Scoring strategies
//!
//! The mapping from factors to scores is a tunable business policy, not a
//! structural contract. It sits behind `ScoringStrategy` so the weighting
//! can be replaced without touching aggregation or concurrency code. The
//! invariants every strategy must satisfy: sub-scores and overall in
//! [0, 100], and overall monotone non-decreasing in each sub-score.

use super::models::{ScoreFactors, SubScores};
use crate::error::{Result, SignalError};
use crate::sources::LeadStatus;
use serde::{Deserialize, Serialize};

/// Swappable scoring policy
pub trait ScoringStrategy: Send + Sync {
    /// Strategy name, for logs and score provenance
    fn name(&self) -> &'static str;

    /// Map factors to sub-scores and an overall score
    fn score(&self, factors: &ScoreFactors) -> SubScores;
}

/// Weight table for the default strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyWeights {
    /// Blend weights; must be non-negative and sum to 1.0
    pub engagement_weight: f64,
    pub urgency_weight: f64,
    pub fit_weight: f64,

    // Engagement point table
    pub demo_view_points: f64,
    pub email_open_points: f64,
    pub reply_points: f64,
    /// Days for the recency multiplier to halve
    pub recency_half_life_days: f64,
    /// Lower bound of the recency multiplier
    pub recency_floor: f64,

    // Urgency point table
    pub stagnation_points_per_day: f64,
    /// Days of stagnation past which pressure stops growing
    pub stagnation_cap_days: i64,
    pub ignored_follow_up_points: f64,

    // Fit point table
    pub industry_match_points: f64,
    pub website_points: f64,
    pub reviews_points: f64,
    pub rating_points: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            engagement_weight: 0.40,
            urgency_weight: 0.35,
            fit_weight: 0.25,
            demo_view_points: 18.0,
            email_open_points: 6.0,
            reply_points: 22.0,
            recency_half_life_days: 14.0,
            recency_floor: 0.25,
            stagnation_points_per_day: 1.5,
            stagnation_cap_days: 30,
            ignored_follow_up_points: 8.0,
            industry_match_points: 40.0,
            website_points: 20.0,
            reviews_points: 15.0,
            rating_points: 25.0,
        }
    }
}

/// Default weighted strategy.
///
/// Each sub-score accumulates capped point contributions, so every factor
/// is monotone; the overall score is a convex blend of the sub-scores and
/// therefore stays in [0, 100] and is monotone in each of them.
pub struct WeightedStrategy {
    weights: StrategyWeights,
}

impl WeightedStrategy {
    pub fn new(weights: StrategyWeights) -> Result<Self> {
        let blend = [
            weights.engagement_weight,
            weights.urgency_weight,
            weights.fit_weight,
        ];
        if blend.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SignalError::Configuration(
                "blend weights must be non-negative and finite".to_string(),
            ));
        }
        let sum: f64 = blend.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(SignalError::Configuration(format!(
                "blend weights must sum to 1.0, got {}",
                sum
            )));
        }
        if weights.recency_half_life_days <= 0.0 {
            return Err(SignalError::Configuration(
                "recency_half_life_days must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&weights.recency_floor) {
            return Err(SignalError::Configuration(
                "recency_floor must be within [0, 1]".to_string(),
            ));
        }

        Ok(Self { weights })
    }

    pub fn weights(&self) -> &StrategyWeights {
        &self.weights
    }

    fn engagement_score(&self, factors: &ScoreFactors) -> f64 {
        let w = &self.weights;
        let e = &factors.engagement;

        let raw = f64::from(e.demo_views) * w.demo_view_points
            + f64::from(e.email_opens) * w.email_open_points
            + f64::from(e.replies) * w.reply_points;

        // Multiplicative decay keeps each count monotone.
        let decay = 0.5_f64
            .powf(e.days_since_interaction as f64 / w.recency_half_life_days)
            .max(w.recency_floor);

        (raw.min(100.0) * decay).clamp(0.0, 100.0)
    }

    fn urgency_score(&self, factors: &ScoreFactors) -> f64 {
        let w = &self.weights;
        let u = &factors.urgency;

        let base = match u.status {
            LeadStatus::New => 35.0,
            LeadStatus::Contacted => 50.0,
            LeadStatus::DemoSent => 65.0,
            LeadStatus::Negotiating => 80.0,
            LeadStatus::Won | LeadStatus::ClosedLost => 0.0,
        };

        let stagnation =
            u.days_in_status.min(w.stagnation_cap_days).max(0) as f64 * w.stagnation_points_per_day;
        let ignored = f64::from(u.follow_ups_ignored) * w.ignored_follow_up_points;

        (base + stagnation + ignored).clamp(0.0, 100.0)
    }

    fn fit_score(&self, factors: &ScoreFactors) -> f64 {
        let w = &self.weights;
        let f = &factors.fit;

        let mut score = 0.0;
        if f.industry_match {
            score += w.industry_match_points;
        }
        if f.has_website {
            score += w.website_points;
        }
        if f.has_reviews {
            score += w.reviews_points;
        }
        if let Some(rating) = f.review_rating {
            score += (rating / 5.0).clamp(0.0, 1.0) * w.rating_points;
        }

        score.clamp(0.0, 100.0)
    }
}

impl ScoringStrategy for WeightedStrategy {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn score(&self, factors: &ScoreFactors) -> SubScores {
        let engagement = self.engagement_score(factors);
        let urgency = self.urgency_score(factors);
        let fit = self.fit_score(factors);

        let overall = engagement * self.weights.engagement_weight
            + urgency * self.weights.urgency_weight
            + fit * self.weights.fit_weight;

        SubScores {
            engagement,
            urgency,
            fit,
            overall,
        }
    }
}
