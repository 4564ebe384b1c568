//! Lead signal aggregation and prioritization
//!
//! Decides, for every lead in the pipeline, how engaged/urgent/qualified
//! they are (a 0-100 score with a hot/warm/lukewarm/cold bucket), whether
//! they currently need human follow-up (a rule-based flag), and whether
//! they are live right now (a presence signal). Inputs come from five
//! independent event collections (demo views, email events, notes, call
//! logs, CRM activities) with no referential integrity between them; the
//! engine fans out to them concurrently, tolerates partial failures, and
//! merges under time-window rules with stable tie-breaks.
//!
//! The crate boundary is in-process: callers hand in adapter
//! implementations over their record store and invoke recompute explicitly.

pub mod config;
pub mod engine;
pub mod error;
pub mod followup;
pub mod lastseen;
pub mod metrics;
pub mod presence;
pub mod scoring;
pub mod sources;

pub use config::EngineConfig;
pub use engine::SignalEngine;
pub use error::{Result, SignalError};
pub use followup::{FollowUpReason, FollowUpReport};
pub use lastseen::{InteractionLabel, LastSeen};
pub use presence::{PresenceHandle, PresenceState};
pub use scoring::{LeadScore, RecomputeReport, ScoreBucket, ScoreFactors};
pub use sources::{
    DemoRecord, EventKind, Lead, LeadDirectory, LeadId, LeadStatus, SignalEvent, SignalQuery,
    SourceAdapter, SourceKind,
};
