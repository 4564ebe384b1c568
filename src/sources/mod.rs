//! Source adapters and the concurrent fan-out over them
//!
//! The five event collections (demo views, email events, notes, call logs,
//! CRM activities) live in an external record store with no referential
//! integrity between them. Each is reached through its own read-only
//! adapter; a fan-out issues the adapters concurrently under a shared
//! deadline and degrades a slow or failing source to an empty slot instead
//! of failing the computation.

pub mod breaker;
pub mod memory;
pub mod models;

pub use breaker::{BreakerConfig, BreakerState, SourceBreaker};
pub use memory::MemoryRecordStore;
pub use models::{
    DemoId, DemoRecord, EventKind, Lead, LeadId, LeadProfile, LeadStatus, SignalEvent,
    SignalQuery, SourceKind,
};

use crate::config::SourceConfig;
use crate::error::Result;
use crate::metrics::METRICS;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Read-only adapter over one event collection.
///
/// Adapters never mutate source data and never treat an empty result as an
/// error. Failures surface as `SignalError::SourceUnavailable`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which collection this adapter reads
    fn kind(&self) -> SourceKind;

    /// Fetch events matching the query, newest last
    async fn fetch(&self, query: &SignalQuery) -> Result<Vec<SignalEvent>>;
}

/// Read access to the lead master collection, demo records, and the
/// explicit presence record written by the external reporter.
#[async_trait]
pub trait LeadDirectory: Send + Sync {
    async fn list_leads(&self) -> Result<Vec<Lead>>;

    async fn get_lead(&self, id: LeadId) -> Result<Option<Lead>>;

    async fn list_demos(&self) -> Result<Vec<DemoRecord>>;

    /// Latest explicit presence timestamp for a lead, if any
    async fn presence_record(&self, id: LeadId) -> Result<Option<DateTime<Utc>>>;
}

/// One degraded source in a fan-out
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SourceFailure {
    pub source: SourceKind,
    pub reason: String,
}

/// Partial result of a fan-out: events per source that answered, plus the
/// sources that did not.
#[derive(Debug, Default)]
pub struct FanOutResult {
    events: HashMap<SourceKind, Vec<SignalEvent>>,
    pub failures: Vec<SourceFailure>,
}

impl FanOutResult {
    /// Events from one source; empty if it degraded or was not queried
    pub fn events_for(&self, kind: SourceKind) -> &[SignalEvent] {
        self.events.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Most recent event from one source
    pub fn latest_for(&self, kind: SourceKind) -> Option<&SignalEvent> {
        self.events_for(kind)
            .iter()
            .max_by_key(|e| e.occurred_at)
    }

    /// All events across the sources that answered
    pub fn all_events(&self) -> impl Iterator<Item = &SignalEvent> {
        self.events.values().flatten()
    }

    /// Whether any queried source degraded
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failed_kinds(&self) -> Vec<SourceKind> {
        self.failures.iter().map(|f| f.source).collect()
    }
}

/// The five adapters plus the shared fetch deadline and per-source breaker
pub struct SourceSet {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    breaker: SourceBreaker,
    fetch_timeout: Duration,
}

impl SourceSet {
    /// Create a source set. Every `SourceKind` must be covered exactly once.
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, config: &SourceConfig) -> Result<Self> {
        for kind in SourceKind::ALL {
            let count = adapters.iter().filter(|a| a.kind() == kind).count();
            if count != 1 {
                return Err(crate::error::SignalError::Configuration(format!(
                    "expected exactly one adapter for {}, found {}",
                    kind, count
                )));
            }
        }

        Ok(Self {
            adapters,
            breaker: SourceBreaker::new(BreakerConfig {
                failure_threshold: config.breaker_failure_threshold,
                reset_timeout: config.breaker_reset(),
            }),
            fetch_timeout: config.fetch_timeout(),
        })
    }

    /// Fan out the query to all five sources
    pub async fn fetch_all(&self, query: &SignalQuery) -> FanOutResult {
        self.fetch_kinds(&SourceKind::ALL, query).await
    }

    /// Fan out the query to a subset of sources, concurrently, each under
    /// the shared deadline.
    ///
    /// A fetch still in flight when its deadline hits is dropped, which is
    /// the cancellation path; the source is recorded as degraded, not as a
    /// batch failure. Results for sources whose circuit is open are skipped
    /// without issuing the fetch.
    pub async fn fetch_kinds(&self, kinds: &[SourceKind], query: &SignalQuery) -> FanOutResult {
        let mut result = FanOutResult::default();
        let mut fetches = Vec::new();

        for adapter in self.adapters.iter().filter(|a| kinds.contains(&a.kind())) {
            let kind = adapter.kind();

            if self.breaker.is_open(kind) {
                warn!("Skipping source {}: circuit open", kind);
                METRICS.record_source_fetch(kind, false);
                result.failures.push(SourceFailure {
                    source: kind,
                    reason: "circuit open".to_string(),
                });
                continue;
            }

            let adapter = Arc::clone(adapter);
            let query = query.clone();
            let deadline = self.fetch_timeout;

            fetches.push(async move {
                let started = Instant::now();
                let outcome = match tokio::time::timeout(deadline, adapter.fetch(&query)).await {
                    Ok(Ok(events)) => Ok(events),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {:?}", deadline)),
                };
                (kind, outcome, started.elapsed())
            });
        }

        for (kind, outcome, elapsed) in join_all(fetches).await {
            METRICS.observe_source_duration(kind, elapsed);

            match outcome {
                Ok(events) => {
                    self.breaker.mark_success(kind);
                    METRICS.record_source_fetch(kind, true);
                    debug!("Source {} returned {} events", kind, events.len());
                    result.events.insert(kind, events);
                }
                Err(reason) => {
                    self.breaker.mark_failure(kind);
                    METRICS.record_source_fetch(kind, false);
                    warn!("Source {} degraded to empty: {}", kind, reason);
                    result.failures.push(SourceFailure {
                        source: kind,
                        reason,
                    });
                }
            }
        }

        result
    }

    /// Breaker state for a source, for observability
    pub fn breaker_state(&self, kind: SourceKind) -> BreakerState {
        self.breaker.state(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignalError;
    use chrono::Utc;

    struct StaticSource {
        kind: SourceKind,
        events: Vec<SignalEvent>,
    }

    #[async_trait]
    impl SourceAdapter for StaticSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch(&self, query: &SignalQuery) -> Result<Vec<SignalEvent>> {
            Ok(self
                .events
                .iter()
                .filter(|e| query.matches(e))
                .cloned()
                .collect())
        }
    }

    struct FailingSource {
        kind: SourceKind,
    }

    #[async_trait]
    impl SourceAdapter for FailingSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch(&self, _query: &SignalQuery) -> Result<Vec<SignalEvent>> {
            Err(SignalError::source_unavailable(self.kind, "backend down"))
        }
    }

    struct SlowSource {
        kind: SourceKind,
    }

    #[async_trait]
    impl SourceAdapter for SlowSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch(&self, _query: &SignalQuery) -> Result<Vec<SignalEvent>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![])
        }
    }

    fn set_with(adapters: Vec<Arc<dyn SourceAdapter>>) -> SourceSet {
        let config = SourceConfig {
            fetch_timeout_ms: 100,
            ..SourceConfig::default()
        };
        SourceSet::new(adapters, &config).unwrap()
    }

    fn static_source(kind: SourceKind) -> Arc<dyn SourceAdapter> {
        Arc::new(StaticSource {
            kind,
            events: vec![],
        })
    }

    #[test]
    fn test_rejects_missing_adapter() {
        let config = SourceConfig::default();
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![static_source(SourceKind::DemoViews)];
        assert!(SourceSet::new(adapters, &config).is_err());
    }

    #[tokio::test]
    async fn test_fan_out_partial_results() {
        let lead = LeadId::new();
        let now = Utc::now();

        let mut adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(StaticSource {
            kind: SourceKind::DemoViews,
            events: vec![SignalEvent::new(lead, EventKind::DemoView, now)],
        })];
        adapters.push(Arc::new(FailingSource {
            kind: SourceKind::EmailEvents,
        }));
        adapters.push(static_source(SourceKind::Notes));
        adapters.push(static_source(SourceKind::CallLogs));
        adapters.push(static_source(SourceKind::Activities));

        let set = set_with(adapters);
        let result = set.fetch_all(&SignalQuery::for_lead(lead)).await;

        assert_eq!(result.events_for(SourceKind::DemoViews).len(), 1);
        assert!(result.events_for(SourceKind::EmailEvents).is_empty());
        assert!(result.is_degraded());
        assert_eq!(result.failed_kinds(), vec![SourceKind::EmailEvents]);
    }

    #[tokio::test]
    async fn test_fan_out_timeout_degrades_slow_source() {
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(SlowSource {
            kind: SourceKind::DemoViews,
        })];
        adapters.push(static_source(SourceKind::EmailEvents));
        adapters.push(static_source(SourceKind::Notes));
        adapters.push(static_source(SourceKind::CallLogs));
        adapters.push(static_source(SourceKind::Activities));

        let set = set_with(adapters);
        let result = set.fetch_all(&SignalQuery::full_scan()).await;

        assert_eq!(result.failed_kinds(), vec![SourceKind::DemoViews]);
        assert!(result.failures[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn test_fetch_kinds_queries_subset_only() {
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = vec![static_source(SourceKind::DemoViews)];
        adapters.push(static_source(SourceKind::EmailEvents));
        adapters.push(static_source(SourceKind::Notes));
        adapters.push(static_source(SourceKind::CallLogs));
        adapters.push(Arc::new(FailingSource {
            kind: SourceKind::Activities,
        }));

        let set = set_with(adapters);
        let result = set
            .fetch_kinds(
                &[SourceKind::DemoViews, SourceKind::Notes],
                &SignalQuery::full_scan(),
            )
            .await;

        // The failing activities source was never queried.
        assert!(!result.is_degraded());
    }

    #[tokio::test]
    async fn test_circuit_opens_after_repeated_failures() {
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = vec![static_source(SourceKind::DemoViews)];
        adapters.push(Arc::new(FailingSource {
            kind: SourceKind::EmailEvents,
        }));
        adapters.push(static_source(SourceKind::Notes));
        adapters.push(static_source(SourceKind::CallLogs));
        adapters.push(static_source(SourceKind::Activities));

        let config = SourceConfig {
            fetch_timeout_ms: 100,
            breaker_failure_threshold: 2,
            ..SourceConfig::default()
        };
        let set = SourceSet::new(adapters, &config).unwrap();

        let query = SignalQuery::full_scan();
        set.fetch_all(&query).await;
        set.fetch_all(&query).await;
        assert_eq!(set.breaker_state(SourceKind::EmailEvents), BreakerState::Open);

        // The third fan-out skips the source without fetching.
        let result = set.fetch_all(&query).await;
        assert_eq!(result.failures[0].reason, "circuit open");
    }
}
