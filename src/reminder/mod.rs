//! Reminder scheduling
//!
//! One deferred check per incident: armed at creation, parked on a tokio
//! timer for the configured delay, then fired exactly once. At fire time the
//! store's status is authoritative — an incident resolved in the meantime
//! makes the check a silent no-op, so no cancellation path is needed.
//!
//! The in-process registry of armed tasks exists for introspection and
//! shutdown only; it is not durable. Restart safety comes from
//! [`ReminderScheduler::recover`], which re-arms open, un-reminded incidents
//! from the store with their remaining delay.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::notify::Dispatcher;
use crate::store::{IncidentStore, StoreError};
use crate::types::{Incident, IncidentStatus};

/// Schedules one-shot reminder checks for open incidents.
pub struct ReminderScheduler {
    store: Arc<dyn IncidentStore>,
    dispatcher: Arc<Dispatcher>,
    delay: Duration,
    shutdown: CancellationToken,
    armed: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        dispatcher: Arc<Dispatcher>,
        delay: Duration,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            dispatcher,
            delay,
            shutdown,
            armed: Mutex::new(HashMap::new()),
        })
    }

    /// Arm the reminder check for a freshly created incident.
    pub fn arm(self: &Arc<Self>, incident: &Incident) {
        self.arm_after(incident, self.delay);
    }

    /// Arm with an explicit delay — used by [`recover`](Self::recover) to
    /// resume with the remaining window after a restart.
    fn arm_after(self: &Arc<Self>, incident: &Incident, delay: Duration) {
        let incident_id = incident.id.clone();
        let channel = incident.channel;
        let contact_email = incident.contact_email.clone();
        let scheduler = Arc::clone(self);

        let handle = tokio::spawn({
            let incident_id = incident_id.clone();
            async move {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {
                        scheduler
                            .fire(&incident_id, channel, contact_email.as_deref())
                            .await;
                    }
                    () = scheduler.shutdown.cancelled() => {
                        debug!(incident_id = %incident_id, "Reminder task cancelled by shutdown");
                    }
                }
                if let Ok(mut armed) = scheduler.armed.lock() {
                    armed.remove(&incident_id);
                }
            }
        });

        match self.armed.lock() {
            Ok(mut armed) => {
                armed.insert(incident_id.clone(), handle);
            }
            Err(e) => {
                warn!(incident_id = %incident_id, error = %e, "Reminder registry poisoned");
            }
        }

        debug!(
            incident_id = %incident_id,
            delay_secs = delay.as_secs(),
            "Reminder armed"
        );
    }

    /// The fire-time check: read status through the store, remind if still
    /// open, no-op otherwise.
    async fn fire(&self, incident_id: &str, channel: crate::types::Channel, recipient: Option<&str>) {
        match self.store.get_status(incident_id) {
            Ok(IncidentStatus::Open) => {
                match self
                    .dispatcher
                    .dispatch_reminder(incident_id, channel, recipient)
                    .await
                {
                    Ok(notification_id) => {
                        // Mark only after the reminder is durably recorded.
                        if let Err(e) = self.store.mark_reminder_sent(incident_id) {
                            warn!(incident_id = %incident_id, error = %e, "Failed to mark reminder sent");
                        } else {
                            info!(
                                incident_id = %incident_id,
                                notification_id = %notification_id,
                                "Reminder sent for still-open incident"
                            );
                        }
                    }
                    Err(e) => {
                        warn!(incident_id = %incident_id, error = %e, "Failed to record reminder notification");
                    }
                }
            }
            Ok(IncidentStatus::Resolved) => {
                debug!(incident_id = %incident_id, "Incident resolved before reminder fired, skipping");
            }
            Err(StoreError::NotFound) => {
                debug!(incident_id = %incident_id, "Incident gone before reminder fired, skipping");
            }
            Err(e) => {
                warn!(incident_id = %incident_id, error = %e, "Reminder status check failed");
            }
        }
    }

    /// Re-arm reminders for open, un-reminded incidents after a restart.
    ///
    /// Each is resumed with the delay remaining from its `created_at`; an
    /// already-overdue incident fires immediately.
    pub fn recover(self: &Arc<Self>) -> Result<usize, StoreError> {
        let pending = self.store.list_open_unreminded()?;
        let now = Utc::now();
        let count = pending.len();

        for incident in &pending {
            let fire_at = incident.created_at
                + chrono::Duration::from_std(self.delay).unwrap_or(chrono::Duration::zero());
            let remaining = (fire_at - now).to_std().unwrap_or(Duration::ZERO);
            self.arm_after(incident, remaining);
        }

        if count > 0 {
            info!(count, "Recovered armed reminders from store");
        }
        Ok(count)
    }

    /// Number of currently armed reminder tasks.
    pub fn armed_count(&self) -> usize {
        self.armed.lock().map(|armed| armed.len()).unwrap_or(0)
    }
}
