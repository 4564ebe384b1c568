//! Read model for the record store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lead identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub Uuid);

impl LeadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Demo identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DemoId(pub Uuid);

impl DemoId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DemoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DemoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Pipeline status of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    DemoSent,
    Negotiating,
    Won,
    ClosedLost,
}

impl LeadStatus {
    /// Terminal statuses are no longer actionable and are excluded from
    /// follow-up scanning.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Won | Self::ClosedLost)
    }
}

/// Company-fit attributes carried on the lead record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadProfile {
    pub industry_match: bool,
    pub has_website: bool,
    pub has_reviews: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_rating: Option<f64>,
}

/// A lead in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: LeadStatus,
    pub status_changed_at: DateTime<Utc>,
    /// Follow-up prompts this lead has already been surfaced for without a
    /// rep taking action, as tracked by the CRM.
    #[serde(default)]
    pub follow_ups_ignored: u32,
    #[serde(default)]
    pub profile: LeadProfile,
}

impl Lead {
    /// Create a new lead in the given status
    pub fn new(status: LeadStatus, created_at: DateTime<Utc>) -> Self {
        Self {
            id: LeadId::new(),
            created_at,
            updated_at: created_at,
            status,
            status_changed_at: created_at,
            follow_ups_ignored: 0,
            profile: LeadProfile::default(),
        }
    }
}

/// A demo delivered to a lead
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoRecord {
    pub id: DemoId,
    pub lead_id: LeadId,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_viewed_at: Option<DateTime<Utc>>,
}

impl DemoRecord {
    pub fn new(lead_id: LeadId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: DemoId::new(),
            lead_id,
            created_at,
            email_sent_at: None,
            first_viewed_at: None,
        }
    }

    pub fn with_email_sent(mut self, sent_at: DateTime<Utc>) -> Self {
        self.email_sent_at = Some(sent_at);
        self
    }

    pub fn with_first_viewed(mut self, viewed_at: DateTime<Utc>) -> Self {
        self.first_viewed_at = Some(viewed_at);
        self
    }
}

/// Kind of a normalized signal event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DemoView,
    EmailOpen,
    EmailClick,
    Note,
    Call,
    Activity,
}

impl EventKind {
    /// The collection this kind of event is read from
    pub fn source(&self) -> SourceKind {
        match self {
            Self::DemoView => SourceKind::DemoViews,
            Self::EmailOpen | Self::EmailClick => SourceKind::EmailEvents,
            Self::Note => SourceKind::Notes,
            Self::Call => SourceKind::CallLogs,
            Self::Activity => SourceKind::Activities,
        }
    }
}

/// Normalized view of one source record. A read projection computed per
/// adapter call, never persisted by this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    pub lead_id: LeadId,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SignalEvent {
    pub fn new(lead_id: LeadId, kind: EventKind, occurred_at: DateTime<Utc>) -> Self {
        Self {
            lead_id,
            kind,
            occurred_at,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// The five event sources.
///
/// Declaration order is the stable tie-break order wherever two sources
/// report the same timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    DemoViews,
    EmailEvents,
    Notes,
    CallLogs,
    Activities,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::DemoViews,
        SourceKind::EmailEvents,
        SourceKind::Notes,
        SourceKind::CallLogs,
        SourceKind::Activities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DemoViews => "demo_views",
            Self::EmailEvents => "email_events",
            Self::Notes => "notes",
            Self::CallLogs => "call_logs",
            Self::Activities => "activities",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for SourceKind {}

/// Query accepted by every source adapter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalQuery {
    /// Restrict to one lead; `None` is the full-scan form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<LeadId>,
    /// Lower bound on `occurred_at`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

impl SignalQuery {
    pub fn for_lead(lead_id: LeadId) -> Self {
        Self {
            lead_id: Some(lead_id),
            since: None,
        }
    }

    pub fn full_scan() -> Self {
        Self::default()
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Whether an event satisfies this query
    pub fn matches(&self, event: &SignalEvent) -> bool {
        if let Some(lead_id) = self.lead_id {
            if event.lead_id != lead_id {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.occurred_at < since {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_terminal_statuses() {
        assert!(LeadStatus::Won.is_terminal());
        assert!(LeadStatus::ClosedLost.is_terminal());
        assert!(!LeadStatus::New.is_terminal());
        assert!(!LeadStatus::Contacted.is_terminal());
    }

    #[test]
    fn test_query_matches_lead_and_since() {
        let lead = LeadId::new();
        let other = LeadId::new();
        let now = Utc::now();
        let event = SignalEvent::new(lead, EventKind::Note, now);

        assert!(SignalQuery::for_lead(lead).matches(&event));
        assert!(!SignalQuery::for_lead(other).matches(&event));
        assert!(SignalQuery::full_scan().matches(&event));
        assert!(!SignalQuery::full_scan()
            .since(now + Duration::seconds(1))
            .matches(&event));
        assert!(SignalQuery::full_scan().since(now).matches(&event));
    }

    #[test]
    fn test_source_kind_labels() {
        assert_eq!(SourceKind::DemoViews.as_str(), "demo_views");
        assert_eq!(SourceKind::ALL.len(), 5);
    }

    #[test]
    fn test_demo_record_builders() {
        let now = Utc::now();
        let demo = DemoRecord::new(LeadId::new(), now).with_email_sent(now);
        assert!(demo.email_sent_at.is_some());
        assert!(demo.first_viewed_at.is_none());
    }
}
