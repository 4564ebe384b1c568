//! Last-seen resolution
//!
//! Merges the most recent timestamp for one lead across demo views, email
//! opens/clicks, notes, and call logs, tagging the winner with a
//! human-readable interaction label. All-sources-empty is a valid terminal
//! state, not an error, and a degraded source only narrows the answer.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::sources::{EventKind, LeadId, SignalEvent, SignalQuery, SourceKind, SourceSet};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Sources consulted for last-seen, in tie-break order. Activities are a
/// bookkeeping trail, not a lead interaction, and are not consulted.
const LAST_SEEN_SOURCES: [SourceKind; 4] = [
    SourceKind::DemoViews,
    SourceKind::EmailEvents,
    SourceKind::Notes,
    SourceKind::CallLogs,
];

/// Human-readable label for the winning interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionLabel {
    ViewedDemo,
    OpenedEmail,
    ClickedEmailLink,
    NoteAdded,
    CallLogged,
}

impl InteractionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewedDemo => "Viewed demo",
            Self::OpenedEmail => "Opened email",
            Self::ClickedEmailLink => "Clicked email link",
            Self::NoteAdded => "Note added",
            Self::CallLogged => "Call logged",
        }
    }

    /// Label for an event, if its kind counts as a lead interaction
    pub fn for_event(event: &SignalEvent) -> Option<Self> {
        match event.kind {
            EventKind::DemoView => Some(Self::ViewedDemo),
            EventKind::EmailOpen => Some(Self::OpenedEmail),
            EventKind::EmailClick => Some(Self::ClickedEmailLink),
            EventKind::Note => Some(Self::NoteAdded),
            EventKind::Call => Some(Self::CallLogged),
            EventKind::Activity => None,
        }
    }
}

/// Most recent interaction for a lead. Both fields are `None` when no
/// source has ever recorded an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastSeen {
    pub lead_id: LeadId,
    pub seen_at: Option<DateTime<Utc>>,
    pub label: Option<InteractionLabel>,
}

impl LastSeen {
    fn empty(lead_id: LeadId) -> Self {
        Self {
            lead_id,
            seen_at: None,
            label: None,
        }
    }
}

/// Resolves the most recent interaction per lead, with an advisory
/// read-through cache. The cache is never authoritative; `invalidate`
/// drops a lead after a write the caller knows about.
pub struct LastSeenResolver {
    sources: Arc<SourceSet>,
    cache: Cache<LeadId, LastSeen>,
}

impl LastSeenResolver {
    pub fn new(sources: Arc<SourceSet>, cache_config: &CacheConfig) -> Self {
        Self {
            sources,
            cache: Cache::builder()
                .max_capacity(cache_config.capacity)
                .time_to_live(cache_config.ttl())
                .build(),
        }
    }

    /// Resolve the most recent interaction for a lead, bypassing the cache.
    ///
    /// Each of the four sources is queried once; only timestamps are
    /// compared. Exact-timestamp ties keep the earliest source in
    /// `LAST_SEEN_SOURCES` order, which makes repeated resolutions stable.
    pub async fn resolve(&self, lead_id: LeadId) -> LastSeen {
        let fan = self
            .sources
            .fetch_kinds(&LAST_SEEN_SOURCES, &SignalQuery::for_lead(lead_id))
            .await;

        let mut best: Option<(DateTime<Utc>, InteractionLabel)> = None;

        for kind in LAST_SEEN_SOURCES {
            let latest = fan
                .events_for(kind)
                .iter()
                .filter(|e| InteractionLabel::for_event(e).is_some())
                .max_by_key(|e| e.occurred_at);

            if let Some(event) = latest {
                let replace = match best {
                    Some((ts, _)) => event.occurred_at > ts,
                    None => true,
                };
                if replace {
                    // for_event is Some for everything the filter kept
                    if let Some(label) = InteractionLabel::for_event(event) {
                        best = Some((event.occurred_at, label));
                    }
                }
            }
        }

        METRICS.record_last_seen_resolution(fan.is_degraded());

        match best {
            Some((seen_at, label)) => {
                debug!("Lead {} last seen {} ({})", lead_id, seen_at, label.as_str());
                LastSeen {
                    lead_id,
                    seen_at: Some(seen_at),
                    label: Some(label),
                }
            }
            None => LastSeen::empty(lead_id),
        }
    }

    /// Resolve through the advisory cache
    pub async fn resolve_cached(&self, lead_id: LeadId) -> LastSeen {
        self.cache.get_with(lead_id, self.resolve(lead_id)).await
    }

    /// Drop one lead's cached entry
    pub async fn invalidate(&self, lead_id: LeadId) -> Result<()> {
        self.cache.invalidate(&lead_id).await;
        Ok(())
    }
}
