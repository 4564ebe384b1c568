//! Live-presence detection
//!
//! Combines the explicit presence record written by the external reporter
//! with a fallback "recent demo view" signal to decide whether a lead is
//! active right now. Each observed lead gets its own observer task holding
//! that lead's in-memory timestamp; there is no shared singleton. Observers
//! are created on subscribe and torn down on unsubscribe.

use crate::config::PresenceConfig;
use crate::metrics::METRICS;
use crate::sources::{LeadDirectory, LeadId, SignalQuery, SourceKind, SourceSet};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Whether a lead is active, and the timestamp that decided it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceState {
    pub lead_id: LeadId,
    pub is_active: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
}

impl PresenceState {
    /// Evaluate the activity invariant:
    /// `is_active == now - last_seen_at < threshold`.
    pub fn evaluate(
        lead_id: LeadId,
        last_seen_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Self {
        let is_active = last_seen_at.map_or(false, |seen| now - seen < threshold);
        Self {
            lead_id,
            is_active,
            last_seen_at,
            checked_at: now,
        }
    }
}

/// Read side of one lead's presence
#[derive(Debug, Clone)]
pub struct PresenceHandle {
    rx: watch::Receiver<PresenceState>,
}

impl PresenceHandle {
    /// Latest published state
    pub fn current(&self) -> PresenceState {
        self.rx.borrow().clone()
    }

    /// Wait for the next published state
    pub async fn changed(&mut self) -> Option<PresenceState> {
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow().clone()),
            Err(_) => None, // observer torn down
        }
    }
}

struct Observer {
    push_tx: mpsc::UnboundedSender<DateTime<Utc>>,
    state_rx: watch::Receiver<PresenceState>,
    task: JoinHandle<()>,
}

/// Per-lead presence observers.
///
/// Three triggers re-evaluate a lead: a staleness recheck tick (so
/// `is_active` can flip to false with no new data), a slower refetch of the
/// underlying timestamps (catching writes that bypass the push channel),
/// and a push notification, which applies immediately without waiting for
/// either timer. Without a push producer the polling path alone keeps the
/// state correct.
pub struct PresenceDetector {
    directory: Arc<dyn LeadDirectory>,
    sources: Arc<SourceSet>,
    config: PresenceConfig,
    observers: DashMap<LeadId, Observer>,
}

impl PresenceDetector {
    pub fn new(
        directory: Arc<dyn LeadDirectory>,
        sources: Arc<SourceSet>,
        config: PresenceConfig,
    ) -> Self {
        Self {
            directory,
            sources,
            config,
            observers: DashMap::new(),
        }
    }

    /// Start observing a lead (idempotent) and return a read handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, lead_id: LeadId) -> PresenceHandle {
        let entry = self.observers.entry(lead_id).or_insert_with(|| {
            debug!("Starting presence observer for lead {}", lead_id);
            METRICS.observer_started();

            let initial = PresenceState::evaluate(
                lead_id,
                None,
                Utc::now(),
                self.config.active_threshold(),
            );
            let (state_tx, state_rx) = watch::channel(initial);
            let (push_tx, push_rx) = mpsc::unbounded_channel();

            let task = tokio::spawn(run_observer(
                lead_id,
                Arc::clone(&self.directory),
                Arc::clone(&self.sources),
                self.config.clone(),
                state_tx,
                push_rx,
            ));

            Observer {
                push_tx,
                state_rx,
                task,
            }
        });

        PresenceHandle {
            rx: entry.state_rx.clone(),
        }
    }

    /// Apply a pushed `last_seen_at` for a lead immediately, pre-empting
    /// the timers. Returns false when the lead is not being observed.
    pub fn push(&self, lead_id: LeadId, last_seen_at: DateTime<Utc>) -> bool {
        match self.observers.get(&lead_id) {
            Some(observer) => observer.push_tx.send(last_seen_at).is_ok(),
            None => {
                debug!("Dropping presence push for unobserved lead {}", lead_id);
                false
            }
        }
    }

    /// Stop observing a lead and tear its observer down
    pub fn unsubscribe(&self, lead_id: LeadId) {
        if let Some((_, observer)) = self.observers.remove(&lead_id) {
            debug!("Stopping presence observer for lead {}", lead_id);
            observer.task.abort();
            METRICS.observer_stopped();
        }
    }

    /// Number of currently observed leads
    pub fn observed(&self) -> usize {
        self.observers.len()
    }
}

impl Drop for PresenceDetector {
    fn drop(&mut self) {
        for entry in self.observers.iter() {
            entry.task.abort();
        }
    }
}

async fn run_observer(
    lead_id: LeadId,
    directory: Arc<dyn LeadDirectory>,
    sources: Arc<SourceSet>,
    config: PresenceConfig,
    state_tx: watch::Sender<PresenceState>,
    mut push_rx: mpsc::UnboundedReceiver<DateTime<Utc>>,
) {
    let threshold = config.active_threshold();
    let mut last_seen: Option<DateTime<Utc>> = None;

    // The first refetch tick fires immediately and is the initial load.
    let mut recheck = tokio::time::interval(config.recheck_interval());
    let mut refetch = tokio::time::interval(config.refetch_interval());
    recheck.set_missed_tick_behavior(MissedTickBehavior::Skip);
    refetch.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            pushed = push_rx.recv() => match pushed {
                Some(ts) => {
                    // Pushes only ever advance the timestamp.
                    if last_seen.map_or(true, |current| ts > current) {
                        last_seen = Some(ts);
                    }
                    METRICS.record_presence_push();
                    publish(&state_tx, lead_id, last_seen, threshold);
                }
                None => break,
            },
            _ = refetch.tick() => {
                if let Some(fetched) = fetch_last_seen(lead_id, &directory, &sources, threshold).await {
                    if last_seen.map_or(true, |current| fetched > current) {
                        last_seen = Some(fetched);
                    }
                }
                publish(&state_tx, lead_id, last_seen, threshold);
            }
            _ = recheck.tick() => {
                // No new data; re-evaluate so is_active can go stale.
                publish(&state_tx, lead_id, last_seen, threshold);
            }
        }
    }
}

fn publish(
    state_tx: &watch::Sender<PresenceState>,
    lead_id: LeadId,
    last_seen: Option<DateTime<Utc>>,
    threshold: Duration,
) {
    state_tx.send_replace(PresenceState::evaluate(
        lead_id,
        last_seen,
        Utc::now(),
        threshold,
    ));
}

/// Later of the explicit presence record and the freshest recent demo view.
/// A failed read degrades to the other signal.
async fn fetch_last_seen(
    lead_id: LeadId,
    directory: &Arc<dyn LeadDirectory>,
    sources: &Arc<SourceSet>,
    threshold: Duration,
) -> Option<DateTime<Utc>> {
    let explicit = match directory.presence_record(lead_id).await {
        Ok(record) => record,
        Err(e) => {
            warn!("Presence record read failed for lead {}: {}", lead_id, e);
            None
        }
    };

    let query = SignalQuery::for_lead(lead_id).since(Utc::now() - threshold);
    let fan = sources.fetch_kinds(&[SourceKind::DemoViews], &query).await;
    let fallback = fan
        .latest_for(SourceKind::DemoViews)
        .map(|e| e.occurred_at);

    match (explicit, fallback) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}
