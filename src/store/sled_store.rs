//! Durable sled backend for the incident store.
//!
//! Two named trees inside one sled DB:
//! - `incidents`: keyed by incident id, JSON-serialized [`Incident`] values
//! - `notifications`: keyed by `{incident_id}/{sent_at_nanos:020}/{id}` so a
//!   prefix scan yields one incident's notifications in chronological order
//!   (reversed for newest-first)
//!
//! Every write flushes before returning. Read-modify-write mutations
//! (`resolve_incident`, `mark_reminder_sent`) are serialized by a store-level
//! mutex — each is a single-row, single-field update, so no cross-row
//! transaction is needed.

use chrono::Utc;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{stats_from_incidents, IncidentStore, StoreError};
use crate::types::{Incident, IncidentStats, IncidentStatus, Notification};

const INCIDENTS_TREE: &str = "incidents";
const NOTIFICATIONS_TREE: &str = "notifications";

/// Sled-backed incident storage
#[derive(Clone)]
pub struct SledIncidentStore {
    db: Arc<sled::Db>,
    incidents: sled::Tree,
    notifications: sled::Tree,
    /// Serializes read-modify-write mutations.
    write_lock: Arc<Mutex<()>>,
}

impl SledIncidentStore {
    /// Open or create the incident database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref).map_err(|e| StoreError::Database(e.to_string()))?;

        let incidents = db
            .open_tree(INCIDENTS_TREE)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let notifications = db
            .open_tree(NOTIFICATIONS_TREE)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!(path = %path_ref.display(), "Incident storage opened");

        Ok(Self {
            db: Arc::new(db),
            incidents,
            notifications,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn load_incident(&self, id: &str) -> Result<Incident, StoreError> {
        let bytes = self
            .incidents
            .get(id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .ok_or(StoreError::NotFound)?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn put_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(incident)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.incidents
            .insert(incident.id.as_bytes(), bytes)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        self.flush()
    }

    /// Full sweep of the incidents tree, skipping undecodable rows.
    fn all_incidents(&self) -> Result<Vec<Incident>, StoreError> {
        let mut out = Vec::new();
        for item in self.incidents.iter() {
            let (_key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            match serde_json::from_slice::<Incident>(&value) {
                Ok(incident) => out.push(incident),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable incident row");
                }
            }
        }
        Ok(out)
    }

    /// Notification key: `{incident_id}/{sent_at_nanos:020}/{id}`.
    ///
    /// Zero-padded decimal nanos sort lexicographically, so a prefix scan
    /// returns chronological order.
    fn notification_key(notification: &Notification) -> Vec<u8> {
        let nanos = notification
            .sent_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| notification.sent_at.timestamp() * 1_000_000_000);
        format!(
            "{}/{:020}/{}",
            notification.incident_id, nanos, notification.id
        )
        .into_bytes()
    }
}

impl IncidentStore for SledIncidentStore {
    fn create_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let exists = self
            .incidents
            .contains_key(incident.id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if exists {
            return Err(StoreError::DuplicateId(incident.id.clone()));
        }

        self.put_incident(incident)?;

        tracing::debug!(
            incident_id = %incident.id,
            customer_id = %incident.customer_id,
            classification = %incident.classification,
            "Incident stored"
        );
        Ok(())
    }

    fn get_incident(&self, id: &str) -> Result<Incident, StoreError> {
        self.load_incident(id)
    }

    fn list_by_customer(&self, customer_id: &str) -> Result<Vec<Incident>, StoreError> {
        let mut matches: Vec<Incident> = self
            .all_incidents()?
            .into_iter()
            .filter(|i| i.customer_id == customer_id)
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    fn resolve_incident(&self, id: &str) -> Result<Incident, StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut incident = self.load_incident(id)?;
        if incident.status == IncidentStatus::Open {
            incident.status = IncidentStatus::Resolved;
            incident.resolved_at = Some(Utc::now());
            self.put_incident(&incident)?;
            tracing::info!(incident_id = %id, "Incident resolved");
        }
        Ok(incident)
    }

    fn get_status(&self, id: &str) -> Result<IncidentStatus, StoreError> {
        Ok(self.load_incident(id)?.status)
    }

    fn mark_reminder_sent(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut incident = self.load_incident(id)?;
        incident.reminder_sent = true;
        self.put_incident(&incident)
    }

    fn record_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        let exists = self
            .incidents
            .contains_key(notification.incident_id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if !exists {
            return Err(StoreError::NotFound);
        }

        let bytes = serde_json::to_vec(notification)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.notifications
            .insert(Self::notification_key(notification), bytes)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        self.flush()
    }

    fn list_notifications(&self, incident_id: &str) -> Result<Vec<Notification>, StoreError> {
        let prefix = format!("{incident_id}/");
        let mut out = Vec::new();
        for item in self.notifications.scan_prefix(prefix.as_bytes()).rev() {
            let (_key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            match serde_json::from_slice::<Notification>(&value) {
                Ok(notification) => out.push(notification),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable notification row");
                }
            }
        }
        Ok(out)
    }

    fn stats(&self) -> Result<IncidentStats, StoreError> {
        let incidents = self.all_incidents()?;
        Ok(stats_from_incidents(incidents.iter()))
    }

    fn list_open_unreminded(&self) -> Result<Vec<Incident>, StoreError> {
        Ok(self
            .all_incidents()?
            .into_iter()
            .filter(|i| i.status == IncidentStatus::Open && !i.reminder_sent)
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{make_incident, make_notification};
    use super::*;
    use crate::types::Channel;
    use chrono::Duration;

    fn open_temp() -> (tempfile::TempDir, SledIncidentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledIncidentStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_and_create() {
        let (_dir, store) = open_temp();
        store.create_incident(&make_incident("i-1", "c-1")).unwrap();
        assert_eq!(store.get_incident("i-1").unwrap().customer_id, "c-1");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (_dir, store) = open_temp();
        store.create_incident(&make_incident("i-1", "c-1")).unwrap();
        assert!(matches!(
            store.create_incident(&make_incident("i-1", "c-1")),
            Err(StoreError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_customer_listing_newest_first() {
        let (_dir, store) = open_temp();
        let mut older = make_incident("i-1", "c-1");
        older.created_at = Utc::now() - Duration::hours(2);
        let newer = make_incident("i-2", "c-1");
        let other_customer = make_incident("i-3", "c-2");

        store.create_incident(&older).unwrap();
        store.create_incident(&newer).unwrap();
        store.create_incident(&other_customer).unwrap();

        let list = store.list_by_customer("c-1").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "i-2");
        assert_eq!(list[1].id, "i-1");
    }

    #[test]
    fn test_resolve_idempotent_preserves_timestamp() {
        let (_dir, store) = open_temp();
        store.create_incident(&make_incident("i-1", "c-1")).unwrap();

        let first = store.resolve_incident("i-1").unwrap();
        let second = store.resolve_incident("i-1").unwrap();
        assert_eq!(first.resolved_at, second.resolved_at);
        assert_eq!(store.get_status("i-1").unwrap(), IncidentStatus::Resolved);
    }

    #[test]
    fn test_notifications_ordered_newest_first() {
        let (_dir, store) = open_temp();
        store.create_incident(&make_incident("i-1", "c-1")).unwrap();

        let mut first = make_notification("n-1", "i-1", Channel::Email);
        first.sent_at = Utc::now() - Duration::minutes(5);
        let second = make_notification("n-2", "i-1", Channel::Sms);

        store.record_notification(&first).unwrap();
        store.record_notification(&second).unwrap();

        let list = store.list_notifications("i-1").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "n-2");
        assert_eq!(list[1].id, "n-1");
    }

    #[test]
    fn test_notification_for_missing_incident() {
        let (_dir, store) = open_temp();
        assert!(matches!(
            store.record_notification(&make_notification("n-1", "ghost", Channel::Sms)),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledIncidentStore::open(dir.path()).unwrap();
            store.create_incident(&make_incident("i-1", "c-1")).unwrap();
        }
        let store = SledIncidentStore::open(dir.path()).unwrap();
        assert_eq!(store.get_incident("i-1").unwrap().id, "i-1");
        assert_eq!(store.list_open_unreminded().unwrap().len(), 1);
    }
}
