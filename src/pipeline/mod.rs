//! Incident processing pipeline
//!
//! Composes classifier, ticketing, store, dispatcher and reminder scheduler
//! into the end-to-end incident-creation workflow:
//!
//! 1. validate input
//! 2. generate incident id
//! 3. classify (never fails outward)
//! 4. issue ticket (never fails outward)
//! 5. persist — the only stage allowed to abort
//! 6. acknowledgment fan-out (best-effort)
//! 7. arm reminder (best-effort)
//!
//! Nothing partially visible survives a step-5 failure: an incident that
//! cannot be recorded is never notified about or scheduled.

use chrono::Utc;
use std::sync::Arc;

use crate::classify::{classify_or_default, Classifier};
use crate::notify::{Dispatcher, DEFAULT_ACK_CHANNELS};
use crate::reminder::ReminderScheduler;
use crate::store::{IncidentStore, StoreError};
use crate::ticketing::TicketClient;
use crate::types::{Category, Channel, Incident, IncidentStatus};

/// User-visible pipeline failures. Collaborator outages (classification,
/// ticketing, channel sends, reminder arming) never appear here — they
/// degrade silently by design.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

/// Outcome of `handle_incident`, echoed back to the caller.
#[derive(Debug, Clone)]
pub struct IncidentOutcome {
    pub incident_id: String,
    pub ticket_id: String,
    pub status: IncidentStatus,
    pub classification: Category,
    pub confidence: f64,
    pub summary: String,
}

/// New incident submission.
#[derive(Debug, Clone)]
pub struct IncidentSubmission {
    pub customer_id: String,
    pub message: String,
    pub channel: Channel,
    pub email: Option<String>,
}

/// The orchestrator over all pipeline collaborators.
pub struct IncidentPipeline {
    classifier: Arc<dyn Classifier>,
    tickets: TicketClient,
    store: Arc<dyn IncidentStore>,
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<ReminderScheduler>,
}

impl IncidentPipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        tickets: TicketClient,
        store: Arc<dyn IncidentStore>,
        dispatcher: Arc<Dispatcher>,
        scheduler: Arc<ReminderScheduler>,
    ) -> Self {
        Self {
            classifier,
            tickets,
            store,
            dispatcher,
            scheduler,
        }
    }

    /// Run the full incident-creation workflow.
    pub async fn handle_incident(
        &self,
        submission: IncidentSubmission,
    ) -> Result<IncidentOutcome, PipelineError> {
        // Stage 1: validate
        if submission.customer_id.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "customer_id must not be empty".to_string(),
            ));
        }
        if submission.message.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }

        // Stage 2: fresh id
        let incident_id = uuid::Uuid::new_v4().to_string();

        tracing::info!(
            incident_id = %incident_id,
            customer_id = %submission.customer_id,
            channel = %submission.channel,
            "Incident received"
        );

        // Stage 3: classify — degrades to {other, 0.3, reason} on failure
        let classification =
            classify_or_default(self.classifier.as_ref(), &submission.message).await;
        tracing::info!(
            incident_id = %incident_id,
            category = %classification.category,
            confidence = classification.confidence,
            reason = %classification.reason,
            "Incident classified"
        );

        // Stage 4: ticket — degrades to a local TKT- id on failure
        let ticket = self
            .tickets
            .issue(&incident_id, classification.category, &submission.message)
            .await;

        // Stage 5: persist — the only aborting stage
        let incident = Incident {
            id: incident_id.clone(),
            customer_id: submission.customer_id,
            channel: submission.channel,
            message: submission.message,
            classification: classification.category,
            confidence: classification.confidence,
            reason: classification.reason,
            ticket_id: ticket.id.clone(),
            status: IncidentStatus::Open,
            created_at: Utc::now(),
            resolved_at: None,
            reminder_sent: false,
            contact_email: submission.email.clone(),
        };
        self.store.create_incident(&incident)?;

        // Stage 6: acknowledgment fan-out — best-effort, runs only after the
        // incident is durably persisted
        self.dispatcher
            .dispatch_ack(
                &incident_id,
                &ticket.id,
                submission.email.as_deref(),
                &DEFAULT_ACK_CHANNELS,
            )
            .await;

        // Stage 7: arm reminder — best-effort
        self.scheduler.arm(&incident);

        Ok(IncidentOutcome {
            incident_id,
            ticket_id: ticket.id,
            status: IncidentStatus::Open,
            classification: classification.category,
            confidence: classification.confidence,
            summary: "Incident received and ticket created. Acknowledgments sent via email and SMS."
                .to_string(),
        })
    }

    /// Read access for callers that share the pipeline's store.
    pub fn store(&self) -> &Arc<dyn IncidentStore> {
        &self.store
    }
}
