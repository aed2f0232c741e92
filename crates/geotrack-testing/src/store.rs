use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geotrack_core::{
    AuditLogEntry, AuditLogStore, Geofence, GeofenceStore, LocationSample, LocationStore,
    TransitionEvent, TransitionKind, TransitionStore,
};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    InsertLocation,
    LoadGeofences,
    InsertTransition,
    LookupTransition,
    AppendAudit,
}

/// All four stores in one struct, backed by vectors.
#[derive(Default)]
pub struct InMemoryStore {
    locations: Mutex<Vec<LocationSample>>,
    geofences: Mutex<Vec<Geofence>>,
    transitions: Mutex<Vec<TransitionEvent>>,
    audit: Mutex<Vec<AuditLogEntry>>,
    faults: Mutex<HashSet<Fault>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geofences(geofences: impl IntoIterator<Item = Geofence>) -> Self {
        let store = Self::default();
        lock(&store.geofences).extend(geofences);
        store
    }

    pub fn inject(&self, fault: Fault) {
        lock(&self.faults).insert(fault);
    }

    pub fn clear(&self, fault: Fault) {
        lock(&self.faults).remove(&fault);
    }

    /// Seed a transition as if it had been recorded earlier.
    pub fn seed_transition(&self, event: TransitionEvent) {
        lock(&self.transitions).push(event);
    }

    pub fn locations(&self) -> Vec<LocationSample> {
        lock(&self.locations).clone()
    }

    pub fn transitions(&self) -> Vec<TransitionEvent> {
        lock(&self.transitions).clone()
    }

    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        lock(&self.audit).clone()
    }

    fn check(&self, fault: Fault) -> Result<()> {
        if lock(&self.faults).contains(&fault) {
            bail!("injected {fault:?} failure");
        }
        Ok(())
    }
}

#[async_trait]
impl LocationStore for InMemoryStore {
    async fn insert_location(&self, sample: &LocationSample) -> Result<()> {
        self.check(Fault::InsertLocation)?;
        lock(&self.locations).push(sample.clone());
        Ok(())
    }

    async fn latest_location(&self, vehicle_id: &str) -> Result<Option<LocationSample>> {
        Ok(lock(&self.locations)
            .iter()
            .filter(|s| s.vehicle_id == vehicle_id)
            .max_by_key(|s| s.timestamp)
            .cloned())
    }

    async fn location_history(
        &self,
        vehicle_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocationSample>> {
        let mut history: Vec<_> = lock(&self.locations)
            .iter()
            .filter(|s| s.vehicle_id == vehicle_id && s.timestamp >= start && s.timestamp <= end)
            .cloned()
            .collect();
        history.sort_by_key(|s| s.timestamp);
        Ok(history)
    }
}

#[async_trait]
impl GeofenceStore for InMemoryStore {
    async fn active_geofences(&self) -> Result<Vec<Geofence>> {
        self.check(Fault::LoadGeofences)?;
        Ok(lock(&self.geofences)
            .iter()
            .filter(|g| g.active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TransitionStore for InMemoryStore {
    async fn insert_transition(&self, event: &TransitionEvent) -> Result<()> {
        self.check(Fault::InsertTransition)?;
        lock(&self.transitions).push(event.clone());
        Ok(())
    }

    async fn last_transition_kind(
        &self,
        vehicle_id: &str,
        geofence_id: i64,
    ) -> Result<Option<TransitionKind>> {
        self.check(Fault::LookupTransition)?;
        Ok(lock(&self.transitions)
            .iter()
            .filter(|t| t.vehicle_id == vehicle_id && t.geofence_id == geofence_id)
            .max_by_key(|t| t.timestamp)
            .map(|t| t.kind))
    }
}

#[async_trait]
impl AuditLogStore for InMemoryStore {
    async fn append_audit_entry(&self, entry: &AuditLogEntry) -> Result<i64> {
        self.check(Fault::AppendAudit)?;
        let mut audit = lock(&self.audit);
        let id = audit.len() as i64 + 1;
        audit.push(AuditLogEntry {
            id: Some(id),
            ..entry.clone()
        });
        Ok(id)
    }
}
