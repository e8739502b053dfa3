//! Incident persistence — pluggable storage backend
//!
//! Abstracts incident and notification persistence so backends can be swapped
//! without touching pipeline code:
//! - `SledIncidentStore`: durable sled backend for deployments
//! - `InMemoryStore`: in-memory store for testing and minimal deployments
//!
//! The store is the single source of truth for incident status. Every write
//! is durable before the call returns so concurrent readers (including the
//! reminder scheduler's delayed check) observe a consistent view.

mod sled_store;

pub use sled_store::SledIncidentStore;

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::types::{Incident, IncidentStats, IncidentStatus, Notification};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("incident id already exists: {0}")]
    DuplicateId(String),
    #[error("not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Trait for pluggable incident storage backends
///
/// Implementations must be thread-safe (Send + Sync) for shared access across
/// async tasks, and must serialize concurrent single-row mutations
/// (`resolve_incident`, `mark_reminder_sent`) against concurrent reads.
pub trait IncidentStore: Send + Sync {
    /// Insert a freshly created incident. Fails with `DuplicateId` if the id
    /// is already present.
    fn create_incident(&self, incident: &Incident) -> Result<(), StoreError>;

    /// Fetch a full incident record by id.
    fn get_incident(&self, id: &str) -> Result<Incident, StoreError>;

    /// All incidents for a customer, newest first.
    fn list_by_customer(&self, customer_id: &str) -> Result<Vec<Incident>, StoreError>;

    /// Transition an incident to resolved, setting `resolved_at`.
    ///
    /// Idempotent: resolving an already-resolved incident is a no-op success
    /// and leaves the original `resolved_at` untouched.
    fn resolve_incident(&self, id: &str) -> Result<Incident, StoreError>;

    /// Status-only read used by the reminder scheduler at fire time.
    fn get_status(&self, id: &str) -> Result<IncidentStatus, StoreError>;

    /// Flip `reminder_sent` to true. Call only after the reminder
    /// notification has been durably recorded.
    fn mark_reminder_sent(&self, id: &str) -> Result<(), StoreError>;

    /// Append a notification attempt to the audit log. Fails with `NotFound`
    /// if the referenced incident does not exist.
    fn record_notification(&self, notification: &Notification) -> Result<(), StoreError>;

    /// All notifications for an incident, newest first.
    fn list_notifications(&self, incident_id: &str) -> Result<Vec<Notification>, StoreError>;

    /// Aggregate counts, computed fresh on each call.
    fn stats(&self) -> Result<IncidentStats, StoreError>;

    /// Open incidents whose reminder has not yet fired — the startup
    /// recovery scan for the reminder scheduler.
    fn list_open_unreminded(&self) -> Result<Vec<Incident>, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Compute aggregate stats from a full incident sweep.
///
/// Shared by both backends — volumes are small enough that a fresh scan per
/// call is the simplest correct answer.
fn stats_from_incidents<'a>(incidents: impl Iterator<Item = &'a Incident>) -> IncidentStats {
    let mut total = 0;
    let mut open = 0;
    let mut resolved = 0;
    let mut by_classification: BTreeMap<String, usize> = BTreeMap::new();

    for incident in incidents {
        total += 1;
        match incident.status {
            IncidentStatus::Open => open += 1,
            IncidentStatus::Resolved => resolved += 1,
        }
        *by_classification
            .entry(incident.classification.as_str().to_string())
            .or_insert(0) += 1;
    }

    IncidentStats {
        total,
        open,
        resolved,
        by_classification,
    }
}

/// In-memory store for testing and minimal deployments
///
/// Thread-safe via `RwLock`. Not durable — data lost on restart.
pub struct InMemoryStore {
    incidents: RwLock<Vec<Incident>>,
    notifications: RwLock<Vec<Notification>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            incidents: RwLock::new(Vec::new()),
            notifications: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IncidentStore for InMemoryStore {
    fn create_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        let mut store = self
            .incidents
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if store.iter().any(|i| i.id == incident.id) {
            return Err(StoreError::DuplicateId(incident.id.clone()));
        }

        store.push(incident.clone());
        Ok(())
    }

    fn get_incident(&self, id: &str) -> Result<Incident, StoreError> {
        let store = self
            .incidents
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        store
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn list_by_customer(&self, customer_id: &str) -> Result<Vec<Incident>, StoreError> {
        let store = self
            .incidents
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut matches: Vec<Incident> = store
            .iter()
            .filter(|i| i.customer_id == customer_id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    fn resolve_incident(&self, id: &str) -> Result<Incident, StoreError> {
        let mut store = self
            .incidents
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let incident = store
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(StoreError::NotFound)?;

        if incident.status == IncidentStatus::Open {
            incident.status = IncidentStatus::Resolved;
            incident.resolved_at = Some(Utc::now());
        }
        Ok(incident.clone())
    }

    fn get_status(&self, id: &str) -> Result<IncidentStatus, StoreError> {
        Ok(self.get_incident(id)?.status)
    }

    fn mark_reminder_sent(&self, id: &str) -> Result<(), StoreError> {
        let mut store = self
            .incidents
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let incident = store
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(StoreError::NotFound)?;
        incident.reminder_sent = true;
        Ok(())
    }

    fn record_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        {
            let incidents = self
                .incidents
                .read()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            if !incidents.iter().any(|i| i.id == notification.incident_id) {
                return Err(StoreError::NotFound);
            }
        }

        let mut store = self
            .notifications
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        store.push(notification.clone());
        Ok(())
    }

    fn list_notifications(&self, incident_id: &str) -> Result<Vec<Notification>, StoreError> {
        let store = self
            .notifications
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut matches: Vec<Notification> = store
            .iter()
            .filter(|n| n.incident_id == incident_id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(matches)
    }

    fn stats(&self) -> Result<IncidentStats, StoreError> {
        let store = self
            .incidents
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(stats_from_incidents(store.iter()))
    }

    fn list_open_unreminded(&self) -> Result<Vec<Incident>, StoreError> {
        let store = self
            .incidents
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(store
            .iter()
            .filter(|i| i.status == IncidentStatus::Open && !i.reminder_sent)
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::types::{Category, Channel};

    pub fn make_incident(id: &str, customer_id: &str) -> Incident {
        Incident {
            id: id.to_string(),
            customer_id: customer_id.to_string(),
            channel: Channel::Email,
            message: "My payment went through twice".to_string(),
            classification: Category::DuplicatePayment,
            confidence: 0.92,
            reason: "double charge".to_string(),
            ticket_id: "TKT-0badc0de".to_string(),
            status: IncidentStatus::Open,
            created_at: Utc::now(),
            resolved_at: None,
            reminder_sent: false,
            contact_email: None,
        }
    }

    pub fn make_notification(id: &str, incident_id: &str, channel: Channel) -> Notification {
        Notification {
            id: id.to_string(),
            incident_id: incident_id.to_string(),
            channel,
            message: "ack".to_string(),
            status: crate::types::NotificationStatus::Sent,
            sent_at: Utc::now(),
        }
    }
}
