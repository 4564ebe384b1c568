//! Follow-up rule engine
//!
//! Full-scan classifier over all leads and all demos. Three ordered rules
//! with first-match-wins semantics decide which leads currently need human
//! follow-up; a second, independent scan marks leads with fresh activity.
//! Both are pure functions of store contents at a given `now`; callers
//! poll and cache rather than expect push invalidation.

use crate::config::FollowUpConfig;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::sources::{
    DemoRecord, Lead, LeadDirectory, LeadId, SignalQuery, SourceFailure, SourceKind, SourceSet,
};
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Sources that count as fresh activity for the recent-activity scan.
/// Email opens are excluded: they fire without the lead doing anything a
/// rep could act on.
const RECENT_ACTIVITY_SOURCES: [SourceKind; 4] = [
    SourceKind::Activities,
    SourceKind::Notes,
    SourceKind::DemoViews,
    SourceKind::CallLogs,
];

/// Why a lead was flagged, attributed to the first matching rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpReason {
    /// Demo email sent, never viewed
    DemoNotViewed,
    /// Demo viewed, no activity since
    ViewedNoReply,
    /// Lead has gone quiet across the board
    Inactive,
}

impl FollowUpReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DemoNotViewed => "demo_not_viewed",
            Self::ViewedNoReply => "viewed_no_reply",
            Self::Inactive => "inactive",
        }
    }
}

/// Result of one follow-up scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpReport {
    /// Leads needing follow-up, in evaluation order
    pub flagged: IndexSet<LeadId>,
    /// First matching rule per flagged lead
    pub reasons: HashMap<LeadId, FollowUpReason>,
    /// Leads with fresh activity, in evaluation order. Overlap with
    /// `flagged` is expected; the sets are independent signals.
    pub recent_activity: IndexSet<LeadId>,
    /// Sources that degraded during the scan; with a degraded activities
    /// source the scan is advisory
    pub source_failures: Vec<SourceFailure>,
    pub leads_scanned: usize,
    pub scanned_at: DateTime<Utc>,
}

impl FollowUpReport {
    pub fn reason_for(&self, lead_id: LeadId) -> Option<FollowUpReason> {
        self.reasons.get(&lead_id).copied()
    }

    pub fn needs_follow_up(&self, lead_id: LeadId) -> bool {
        self.flagged.contains(&lead_id)
    }
}

/// Full-scan rule evaluation over leads, demos, and activities
pub struct FollowUpEngine {
    directory: Arc<dyn LeadDirectory>,
    sources: Arc<SourceSet>,
    config: FollowUpConfig,
}

impl FollowUpEngine {
    pub fn new(
        directory: Arc<dyn LeadDirectory>,
        sources: Arc<SourceSet>,
        config: FollowUpConfig,
    ) -> Self {
        Self {
            directory,
            sources,
            config,
        }
    }

    /// Scan the fleet at `now`.
    ///
    /// The table reads run concurrently; rule evaluation itself is a
    /// single deterministic pass so first-match-wins ordering holds.
    /// Terminal-status leads are excluded before any rule runs.
    pub async fn scan(&self, now: DateTime<Utc>) -> Result<FollowUpReport> {
        let recent_since = now - self.config.recent_activity_window();

        let activity_query = SignalQuery::full_scan();
        let recent_query = SignalQuery::full_scan().since(recent_since);
        let (leads, demos, activity_fan, recent_fan) = tokio::join!(
            self.directory.list_leads(),
            self.directory.list_demos(),
            self.sources
                .fetch_kinds(&[SourceKind::Activities], &activity_query),
            self.sources
                .fetch_kinds(&RECENT_ACTIVITY_SOURCES, &recent_query),
        );
        let leads = leads?;
        let demos = demos?;

        let known: HashSet<LeadId> = leads.iter().map(|l| l.id).collect();

        let mut activities_by_lead: HashMap<LeadId, Vec<DateTime<Utc>>> = HashMap::new();
        let mut orphaned = 0usize;
        for event in activity_fan.events_for(SourceKind::Activities) {
            if !known.contains(&event.lead_id) {
                orphaned += 1;
                continue;
            }
            activities_by_lead
                .entry(event.lead_id)
                .or_default()
                .push(event.occurred_at);
        }
        if orphaned > 0 {
            debug!("Skipped {} activity events with no matching lead", orphaned);
        }

        let mut demos_by_lead: HashMap<LeadId, Vec<&DemoRecord>> = HashMap::new();
        for demo in &demos {
            if !known.contains(&demo.lead_id) {
                continue;
            }
            demos_by_lead.entry(demo.lead_id).or_default().push(demo);
        }

        let mut flagged = IndexSet::new();
        let mut reasons = HashMap::new();

        for lead in &leads {
            if lead.status.is_terminal() {
                continue;
            }

            let lead_demos = demos_by_lead.get(&lead.id).map(Vec::as_slice).unwrap_or(&[]);
            let lead_activities = activities_by_lead
                .get(&lead.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            if let Some(reason) = self.evaluate(lead, lead_demos, lead_activities, now) {
                flagged.insert(lead.id);
                reasons.insert(lead.id, reason);
            }
        }

        let fresh: HashSet<LeadId> = recent_fan.all_events().map(|e| e.lead_id).collect();
        let recent_activity: IndexSet<LeadId> = leads
            .iter()
            .map(|l| l.id)
            .filter(|id| fresh.contains(id))
            .collect();

        let mut source_failures = activity_fan.failures;
        source_failures.extend(recent_fan.failures);

        METRICS.record_followup_scan(flagged.len(), recent_activity.len());
        info!(
            "Follow-up scan: {}/{} leads flagged, {} with recent activity",
            flagged.len(),
            leads.len(),
            recent_activity.len()
        );

        Ok(FollowUpReport {
            flagged,
            reasons,
            recent_activity,
            source_failures,
            leads_scanned: leads.len(),
            scanned_at: now,
        })
    }

    /// Apply the rules to one lead in order; the first match wins.
    fn evaluate(
        &self,
        lead: &Lead,
        demos: &[&DemoRecord],
        activities: &[DateTime<Utc>],
        now: DateTime<Utc>,
    ) -> Option<FollowUpReason> {
        // Demo sent, never viewed.
        let unviewed_cutoff = self.config.demo_unviewed_window();
        for demo in demos {
            if let (Some(sent_at), None) = (demo.email_sent_at, demo.first_viewed_at) {
                if now - sent_at > unviewed_cutoff {
                    return Some(FollowUpReason::DemoNotViewed);
                }
            }
        }

        // Demo viewed, nothing logged since the view.
        let no_reply_cutoff = self.config.viewed_no_reply_window();
        for demo in demos {
            if let Some(viewed_at) = demo.first_viewed_at {
                let replied = activities.iter().any(|a| *a > viewed_at);
                if now - viewed_at > no_reply_cutoff && !replied {
                    return Some(FollowUpReason::ViewedNoReply);
                }
            }
        }

        // Lead inactive across the board.
        let inactive_cutoff = self.config.inactive_window();
        let active_recently = activities.iter().any(|a| now - *a <= inactive_cutoff);
        if now - lead.created_at > inactive_cutoff
            && now - lead.updated_at > inactive_cutoff
            && !active_recently
        {
            return Some(FollowUpReason::Inactive);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::sources::{EventKind, LeadStatus, MemoryRecordStore, SignalEvent};
    use chrono::Duration;

    fn engine_over(store: &Arc<MemoryRecordStore>) -> FollowUpEngine {
        let sources =
            Arc::new(SourceSet::new(store.adapters(), &SourceConfig::default()).unwrap());
        FollowUpEngine::new(
            Arc::clone(store) as Arc<dyn LeadDirectory>,
            sources,
            FollowUpConfig::default(),
        )
    }

    fn lead_with(
        store: &Arc<MemoryRecordStore>,
        status: LeadStatus,
        created_at: DateTime<Utc>,
    ) -> LeadId {
        let lead = Lead::new(status, created_at);
        let id = lead.id;
        store.upsert_lead(lead);
        id
    }

    #[tokio::test]
    async fn test_four_lead_pipeline_scenario() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();

        // L1: demo emailed 50h ago, never viewed, non-terminal status.
        let l1 = lead_with(&store, LeadStatus::Contacted, now - Duration::days(3));
        store.upsert_demo(
            DemoRecord::new(l1, now - Duration::days(3))
                .with_email_sent(now - Duration::hours(50)),
        );

        // L2: demo viewed 30h ago, but an activity landed 20h ago.
        let l2 = lead_with(&store, LeadStatus::Contacted, now - Duration::days(4));
        store.upsert_demo(
            DemoRecord::new(l2, now - Duration::days(4))
                .with_email_sent(now - Duration::days(3))
                .with_first_viewed(now - Duration::hours(30)),
        );
        store.record_event(SignalEvent::new(
            l2,
            EventKind::Activity,
            now - Duration::hours(20),
        ));

        // L3: created 10d ago, untouched ever since.
        let l3 = {
            let mut lead = Lead::new(LeadStatus::New, now - Duration::days(10));
            lead.updated_at = now - Duration::days(10);
            let id = lead.id;
            store.upsert_lead(lead);
            id
        };

        // L4: would match the inactivity rule but is closed lost.
        let l4 = {
            let mut lead = Lead::new(LeadStatus::ClosedLost, now - Duration::days(10));
            lead.updated_at = now - Duration::days(10);
            let id = lead.id;
            store.upsert_lead(lead);
            id
        };

        let report = engine_over(&store).scan(now).await.unwrap();

        assert_eq!(report.reason_for(l1), Some(FollowUpReason::DemoNotViewed));
        assert!(!report.needs_follow_up(l2));
        assert_eq!(report.reason_for(l3), Some(FollowUpReason::Inactive));
        assert!(!report.needs_follow_up(l4));
        assert_eq!(report.leads_scanned, 4);
    }

    #[tokio::test]
    async fn test_first_match_wins_attribution() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();

        // Matches both the unviewed-demo rule and the inactivity rule.
        let lead = {
            let mut l = Lead::new(LeadStatus::DemoSent, now - Duration::days(10));
            l.updated_at = now - Duration::days(10);
            let id = l.id;
            store.upsert_lead(l);
            id
        };
        store.upsert_demo(
            DemoRecord::new(lead, now - Duration::days(9))
                .with_email_sent(now - Duration::days(9)),
        );

        let report = engine_over(&store).scan(now).await.unwrap();

        assert_eq!(report.flagged.len(), 1);
        assert_eq!(report.reason_for(lead), Some(FollowUpReason::DemoNotViewed));
    }

    #[tokio::test]
    async fn test_viewed_no_reply_flags_without_activity() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();

        let lead = lead_with(&store, LeadStatus::DemoSent, now - Duration::days(5));
        store.upsert_demo(
            DemoRecord::new(lead, now - Duration::days(5))
                .with_email_sent(now - Duration::days(4))
                .with_first_viewed(now - Duration::hours(30)),
        );
        // An activity before the view does not count as a reply.
        store.record_event(SignalEvent::new(
            lead,
            EventKind::Activity,
            now - Duration::days(2),
        ));

        let report = engine_over(&store).scan(now).await.unwrap();
        assert_eq!(report.reason_for(lead), Some(FollowUpReason::ViewedNoReply));
    }

    #[tokio::test]
    async fn test_recent_view_blocks_unviewed_rule_window() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();

        // Sent 20h ago: inside the 48h grace window, nothing to flag yet.
        let lead = lead_with(&store, LeadStatus::DemoSent, now - Duration::days(1));
        store.upsert_demo(
            DemoRecord::new(lead, now - Duration::days(1))
                .with_email_sent(now - Duration::hours(20)),
        );

        let report = engine_over(&store).scan(now).await.unwrap();
        assert!(report.flagged.is_empty());
    }

    #[tokio::test]
    async fn test_recent_activity_set_is_independent() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();

        // Flagged for an unviewed demo AND freshly active via a call log.
        let lead = lead_with(&store, LeadStatus::Contacted, now - Duration::days(5));
        store.upsert_demo(
            DemoRecord::new(lead, now - Duration::days(5))
                .with_email_sent(now - Duration::days(4)),
        );
        store.record_event(SignalEvent::new(
            lead,
            EventKind::Call,
            now - Duration::hours(3),
        ));

        let report = engine_over(&store).scan(now).await.unwrap();

        assert!(report.needs_follow_up(lead));
        assert!(report.recent_activity.contains(&lead));
    }

    #[tokio::test]
    async fn test_old_activity_not_recent() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();

        let lead = lead_with(&store, LeadStatus::Contacted, now - Duration::days(5));
        store.record_event(SignalEvent::new(
            lead,
            EventKind::Note,
            now - Duration::hours(72),
        ));

        let report = engine_over(&store).scan(now).await.unwrap();
        assert!(report.recent_activity.is_empty());
    }

    #[tokio::test]
    async fn test_orphan_events_are_skipped() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();

        lead_with(&store, LeadStatus::Contacted, now - Duration::days(1));
        // Events referencing a lead the master collection does not know.
        let ghost = LeadId::new();
        store.record_event(SignalEvent::new(
            ghost,
            EventKind::Activity,
            now - Duration::hours(1),
        ));
        store.record_event(SignalEvent::new(
            ghost,
            EventKind::Call,
            now - Duration::hours(1),
        ));

        let report = engine_over(&store).scan(now).await.unwrap();
        assert!(report.flagged.is_empty());
        assert!(report.recent_activity.is_empty());
    }

    #[tokio::test]
    async fn test_scan_is_deterministic() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();

        for _ in 0..5 {
            let lead = {
                let mut l = Lead::new(LeadStatus::New, now - Duration::days(10));
                l.updated_at = now - Duration::days(10);
                let id = l.id;
                store.upsert_lead(l);
                id
            };
            store.upsert_demo(
                DemoRecord::new(lead, now - Duration::days(9))
                    .with_email_sent(now - Duration::days(9)),
            );
        }

        let engine = engine_over(&store);
        let first = engine.scan(now).await.unwrap();
        let second = engine.scan(now).await.unwrap();

        let first_order: Vec<LeadId> = first.flagged.iter().copied().collect();
        let second_order: Vec<LeadId> = second.flagged.iter().copied().collect();
        assert_eq!(first_order, second_order);
        assert_eq!(first.reasons, second.reasons);
    }
}
