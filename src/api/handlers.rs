//! API route handlers
//!
//! Request handling logic for the incident workflow endpoints: incident
//! creation through the pipeline, queries against the store, the resolve
//! mutation, notification history and aggregate stats.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::pipeline::{IncidentPipeline, IncidentSubmission};
use crate::store::IncidentStore;
use crate::types::{Channel, Incident, Notification};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// The incident-creation pipeline
    pub pipeline: Arc<IncidentPipeline>,
    /// Direct store access for query/read paths
    pub store: Arc<dyn IncidentStore>,
}

impl ApiState {
    pub fn new(pipeline: Arc<IncidentPipeline>, store: Arc<dyn IncidentStore>) -> Self {
        Self { pipeline, store }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

/// Customer incident submission
#[derive(Debug, Deserialize)]
pub struct CreateIncidentRequest {
    pub customer_id: String,
    pub message: String,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub email: Option<String>,
}

/// Incident creation response
#[derive(Debug, Serialize)]
pub struct CreateIncidentResponse {
    pub incident_id: String,
    pub ticket_id: String,
    pub status: String,
    pub classification: String,
    pub confidence: f64,
    pub message: String,
}

/// Full incident details
#[derive(Debug, Serialize)]
pub struct IncidentDetail {
    pub id: String,
    pub customer_id: String,
    pub channel: String,
    pub message: String,
    pub classification: String,
    pub confidence: f64,
    pub ticket_id: String,
    pub status: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
    pub reminder_sent: bool,
}

impl From<Incident> for IncidentDetail {
    fn from(incident: Incident) -> Self {
        Self {
            id: incident.id,
            customer_id: incident.customer_id,
            channel: incident.channel.to_string(),
            message: incident.message,
            classification: incident.classification.to_string(),
            confidence: incident.confidence,
            ticket_id: incident.ticket_id,
            status: incident.status.to_string(),
            created_at: incident.created_at.to_rfc3339(),
            resolved_at: incident.resolved_at.map(|t| t.to_rfc3339()),
            reminder_sent: incident.reminder_sent,
        }
    }
}

/// Notification audit record
#[derive(Debug, Serialize)]
pub struct NotificationRecord {
    pub id: String,
    pub incident_id: String,
    pub channel: String,
    pub message: String,
    pub status: String,
    pub sent_at: String,
}

impl From<Notification> for NotificationRecord {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            incident_id: n.incident_id,
            channel: n.channel.to_string(),
            message: n.message,
            status: match n.status {
                crate::types::NotificationStatus::Sent => "sent".to_string(),
                crate::types::NotificationStatus::Failed => "failed".to_string(),
            },
            sent_at: n.sent_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/incidents — run the full intake pipeline.
pub async fn create_incident(
    State(state): State<ApiState>,
    Json(request): Json<CreateIncidentRequest>,
) -> Response {
    let submission = IncidentSubmission {
        customer_id: request.customer_id,
        message: request.message,
        channel: request.channel,
        email: request.email,
    };

    match state.pipeline.handle_incident(submission).await {
        Ok(outcome) => ApiResponse::created(CreateIncidentResponse {
            incident_id: outcome.incident_id,
            ticket_id: outcome.ticket_id,
            status: outcome.status.to_string(),
            classification: outcome.classification.to_string(),
            confidence: outcome.confidence,
            message: outcome.summary,
        }),
        Err(e) => ApiErrorResponse::from_pipeline_error(&e),
    }
}

/// GET /api/v1/incidents/:id
pub async fn get_incident(
    State(state): State<ApiState>,
    Path(incident_id): Path<String>,
) -> Response {
    match state.store.get_incident(&incident_id) {
        Ok(incident) => ApiResponse::ok(IncidentDetail::from(incident)),
        Err(e) => ApiErrorResponse::from_store_error(&e),
    }
}

/// GET /api/v1/incidents/customer/:customer_id — newest first.
pub async fn get_customer_incidents(
    State(state): State<ApiState>,
    Path(customer_id): Path<String>,
) -> Response {
    match state.store.list_by_customer(&customer_id) {
        Ok(incidents) => {
            let details: Vec<IncidentDetail> =
                incidents.into_iter().map(IncidentDetail::from).collect();
            ApiResponse::ok(details)
        }
        Err(e) => ApiErrorResponse::from_store_error(&e),
    }
}

/// PUT /api/v1/incidents/:id/resolve — idempotent.
pub async fn resolve_incident(
    State(state): State<ApiState>,
    Path(incident_id): Path<String>,
) -> Response {
    match state.store.resolve_incident(&incident_id) {
        Ok(incident) => ApiResponse::ok(IncidentDetail::from(incident)),
        Err(e) => ApiErrorResponse::from_store_error(&e),
    }
}

/// GET /api/v1/notifications/:incident_id — newest first.
pub async fn get_incident_notifications(
    State(state): State<ApiState>,
    Path(incident_id): Path<String>,
) -> Response {
    match state.store.list_notifications(&incident_id) {
        Ok(notifications) => {
            let records: Vec<NotificationRecord> = notifications
                .into_iter()
                .map(NotificationRecord::from)
                .collect();
            ApiResponse::ok(records)
        }
        Err(e) => ApiErrorResponse::from_store_error(&e),
    }
}

/// GET /api/v1/stats — totals and per-category counts, computed fresh.
pub async fn get_stats(State(state): State<ApiState>) -> Response {
    match state.store.stats() {
        Ok(stats) => ApiResponse::ok(stats),
        Err(e) => ApiErrorResponse::from_store_error(&e),
    }
}

/// GET /health — liveness signal with current timestamp.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
