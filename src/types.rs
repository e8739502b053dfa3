//! Domain types: Incident, Notification, Category, Channel, lifecycle statuses
//! and the aggregate stats shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Classification
// ============================================================================

/// Closed set of incident categories the classifier may assign.
///
/// Anything outside this set coming back from the classification service is
/// treated as malformed output and falls back to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    DuplicatePayment,
    FailedPayment,
    FraudReport,
    RefundRequest,
    AccountLocked,
    StatementError,
    Other,
}

impl Category {
    /// Stable snake_case label, matching the wire/storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::DuplicatePayment => "duplicate_payment",
            Category::FailedPayment => "failed_payment",
            Category::FraudReport => "fraud_report",
            Category::RefundRequest => "refund_request",
            Category::AccountLocked => "account_locked",
            Category::StatementError => "statement_error",
            Category::Other => "other",
        }
    }

    /// Parse a label returned by the classification service.
    ///
    /// Returns `None` for anything outside the closed set — the caller maps
    /// that to a malformed-output fallback, never to a new category.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "duplicate_payment" => Some(Category::DuplicatePayment),
            "failed_payment" => Some(Category::FailedPayment),
            "fraud_report" => Some(Category::FraudReport),
            "refund_request" => Some(Category::RefundRequest),
            "account_locked" => Some(Category::AccountLocked),
            "statement_error" => Some(Category::StatementError),
            "other" => Some(Category::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the classifier for one incident message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    /// Confidence score, always within [0.0, 1.0].
    pub confidence: f64,
    /// Short reasoning, or the failure class on the degraded path.
    pub reason: String,
}

// ============================================================================
// Channels
// ============================================================================

/// Delivery medium for notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Email,
    Sms,
    Whatsapp,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Whatsapp => "whatsapp",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Incident
// ============================================================================

/// Incident lifecycle status. Transitions one-way: `Open` → `Resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentStatus::Open => f.write_str("open"),
            IncidentStatus::Resolved => f.write_str("resolved"),
        }
    }
}

/// A single customer-reported issue, tracked through its lifecycle.
///
/// Invariants maintained by the store:
/// - `resolved_at` is `Some` iff `status == Resolved`
/// - `reminder_sent` becomes true only after a reminder notification has been
///   durably recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub customer_id: String,
    pub channel: Channel,
    pub message: String,
    pub classification: Category,
    pub confidence: f64,
    /// Classifier reasoning captured at creation time.
    pub reason: String,
    pub ticket_id: String,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminder_sent: bool,
    /// Customer email persisted so reminder recovery after a restart can
    /// still reach the original recipient.
    #[serde(default)]
    pub contact_email: Option<String>,
}

// ============================================================================
// Notification
// ============================================================================

/// Notification attempt status as recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Sent,
    Failed,
}

/// One dispatch attempt on one channel. Append-only — created once, never
/// mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub incident_id: String,
    pub channel: Channel,
    pub message: String,
    pub status: NotificationStatus,
    pub sent_at: DateTime<Utc>,
}

// ============================================================================
// Aggregates
// ============================================================================

/// Aggregate incident counts, computed fresh on each call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentStats {
    pub total: usize,
    pub open: usize,
    pub resolved: usize,
    /// Per-category counts, keyed by the snake_case category label.
    pub by_classification: BTreeMap<String, usize>,
}
