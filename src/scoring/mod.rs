//! Lead scoring
//!
//! A pure, swappable strategy maps factor snapshots to sub-scores and an
//! overall score in [0, 100]; the engine wires factor aggregation, invariant
//! validation, snapshot storage, and fleet recompute around it.

pub mod engine;
pub mod models;
pub mod strategy;

pub use engine::{MemoryScoreStore, ScoreEngine, ScoreStore};
pub use models::{
    EngagementFactors, FailedLead, FitFactors, LeadScore, RecomputeReport, ScoreBucket,
    ScoreFactors, SubScores, UrgencyFactors,
};
pub use strategy::{ScoringStrategy, StrategyWeights, WeightedStrategy};
