//! In-memory record store
//!
//! The production record store is a hosted backend reached through the
//! adapter traits. This implementation backs the same traits with in-memory
//! collections for tests and for embedders running without the backend.

use super::models::*;
use super::{LeadDirectory, SourceAdapter};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory backing store for the five event collections, the lead master
/// collection, demo records, and explicit presence records.
#[derive(Default)]
pub struct MemoryRecordStore {
    leads: RwLock<Vec<Lead>>,
    demos: RwLock<Vec<DemoRecord>>,
    events: RwLock<HashMap<SourceKind, Vec<SignalEvent>>>,
    presence: RwLock<HashMap<LeadId, DateTime<Utc>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert or replace a lead
    pub fn upsert_lead(&self, lead: Lead) {
        let mut leads = self.leads.write().unwrap();
        match leads.iter_mut().find(|l| l.id == lead.id) {
            Some(existing) => *existing = lead,
            None => leads.push(lead),
        }
    }

    /// Insert or replace a demo record
    pub fn upsert_demo(&self, demo: DemoRecord) {
        let mut demos = self.demos.write().unwrap();
        match demos.iter_mut().find(|d| d.id == demo.id) {
            Some(existing) => *existing = demo,
            None => demos.push(demo),
        }
    }

    /// Append an event to the collection its kind belongs to
    pub fn record_event(&self, event: SignalEvent) {
        let mut events = self.events.write().unwrap();
        events.entry(event.kind.source()).or_default().push(event);
    }

    /// Write the explicit presence record for a lead
    pub fn set_presence(&self, lead_id: LeadId, last_seen_at: DateTime<Utc>) {
        let mut presence = self.presence.write().unwrap();
        presence.insert(lead_id, last_seen_at);
    }

    /// Build the five source adapters over this store
    pub fn adapters(self: &Arc<Self>) -> Vec<Arc<dyn SourceAdapter>> {
        SourceKind::ALL
            .into_iter()
            .map(|kind| {
                Arc::new(MemorySource {
                    store: Arc::clone(self),
                    kind,
                }) as Arc<dyn SourceAdapter>
            })
            .collect()
    }
}

#[async_trait]
impl LeadDirectory for MemoryRecordStore {
    async fn list_leads(&self) -> Result<Vec<Lead>> {
        Ok(self.leads.read().unwrap().clone())
    }

    async fn get_lead(&self, id: LeadId) -> Result<Option<Lead>> {
        Ok(self
            .leads
            .read()
            .unwrap()
            .iter()
            .find(|l| l.id == id)
            .cloned())
    }

    async fn list_demos(&self) -> Result<Vec<DemoRecord>> {
        Ok(self.demos.read().unwrap().clone())
    }

    async fn presence_record(&self, id: LeadId) -> Result<Option<DateTime<Utc>>> {
        Ok(self.presence.read().unwrap().get(&id).copied())
    }
}

/// Adapter over one of the store's event collections
struct MemorySource {
    store: Arc<MemoryRecordStore>,
    kind: SourceKind,
}

#[async_trait]
impl SourceAdapter for MemorySource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, query: &SignalQuery) -> Result<Vec<SignalEvent>> {
        let events = self.store.events.read().unwrap();
        Ok(events
            .get(&self.kind)
            .map(|collection| {
                collection
                    .iter()
                    .filter(|e| query.matches(e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_routing_by_kind() {
        let store = MemoryRecordStore::new();
        let lead = LeadId::new();
        let now = Utc::now();

        store.record_event(SignalEvent::new(lead, EventKind::DemoView, now));
        store.record_event(SignalEvent::new(lead, EventKind::EmailClick, now));
        store.record_event(SignalEvent::new(lead, EventKind::Note, now));

        let adapters = store.adapters();
        let query = SignalQuery::for_lead(lead);

        for adapter in &adapters {
            let events = adapter.fetch(&query).await.unwrap();
            match adapter.kind() {
                SourceKind::DemoViews | SourceKind::EmailEvents | SourceKind::Notes => {
                    assert_eq!(events.len(), 1)
                }
                SourceKind::CallLogs | SourceKind::Activities => assert!(events.is_empty()),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_fetch_is_success() {
        let store = MemoryRecordStore::new();
        let adapters = store.adapters();
        let events = adapters[0].fetch(&SignalQuery::full_scan()).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_directory_upsert_and_lookup() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();

        let mut lead = Lead::new(LeadStatus::New, now);
        store.upsert_lead(lead.clone());
        assert_eq!(store.list_leads().await.unwrap().len(), 1);

        lead.status = LeadStatus::Contacted;
        store.upsert_lead(lead.clone());

        let fetched = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, LeadStatus::Contacted);
        assert_eq!(store.list_leads().await.unwrap().len(), 1);

        assert!(store.get_lead(LeadId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_presence_record_roundtrip() {
        let store = MemoryRecordStore::new();
        let lead = LeadId::new();
        let now = Utc::now();

        assert!(store.presence_record(lead).await.unwrap().is_none());
        store.set_presence(lead, now);
        assert_eq!(store.presence_record(lead).await.unwrap(), Some(now));
    }
}
