//! IncidentFlow: customer incident automation
//!
//! Ingests customer-reported incidents, classifies them by intent, opens a
//! tracking ticket, persists the incident, and drives a multi-channel
//! acknowledgment/reminder notification workflow.
//!
//! ## Architecture
//!
//! - **Classifier**: LLM-backed intent classification with a safe default on
//!   any service failure
//! - **Ticketing**: remote ticket creation with a local fallback id
//! - **Store**: sled-backed source of truth for incidents and notifications
//! - **Dispatcher**: pluggable channel senders with attempt-recorded auditing
//! - **Reminder**: one-shot deferred follow-up check per open incident
//! - **Pipeline**: composes the above into the intake workflow

pub mod api;
pub mod classify;
pub mod config;
pub mod notify;
pub mod pipeline;
pub mod reminder;
pub mod store;
pub mod ticketing;
pub mod types;

// Re-export service configuration
pub use config::ServiceConfig;

// Re-export commonly used types
pub use types::{
    Category, Channel, ClassificationResult, Incident, IncidentStats, IncidentStatus,
    Notification, NotificationStatus,
};

// Re-export the pipeline surface
pub use pipeline::{IncidentOutcome, IncidentPipeline, IncidentSubmission, PipelineError};

// Re-export storage
pub use store::{IncidentStore, InMemoryStore, SledIncidentStore, StoreError};

// Re-export collaborators
pub use classify::{Classifier, GeminiClassifier};
pub use notify::{Dispatcher, EmailSender};
pub use reminder::ReminderScheduler;
pub use ticketing::{TicketClient, TicketOutcome, TicketSource};
