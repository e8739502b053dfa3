//! Notification dispatch
//!
//! [`Dispatcher`] sends a message over one or more channels and records every
//! attempt in the incident store. Channel senders are pluggable behind
//! [`ChannelSender`] and independently failable — a failed send never blocks
//! the audit record or the remaining channels.
//!
//! Audit semantics: the notification row is written with status `sent`
//! *before* the channel send runs, recording intent-to-send rather than
//! delivery confirmation. This mirrors the at-least-once acknowledgment
//! contract of the original system and is a documented design choice.

pub mod email;

pub use email::EmailSender;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::{IncidentStore, StoreError};
use crate::types::{Channel, Notification, NotificationStatus};

/// Channels used for the initial acknowledgment fan-out when the caller does
/// not specify a list.
pub const DEFAULT_ACK_CHANNELS: [Channel; 2] = [Channel::Email, Channel::Sms];

/// Channel send failures. Logged, never propagated past the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Credentials or recipient address missing — a configuration gap, not
    /// a crash.
    #[error("channel not configured: {0}")]
    NotConfigured(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Trait for pluggable notification channel senders
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The channel this sender serves.
    fn channel(&self) -> Channel;

    /// Perform the channel-specific send.
    async fn send(
        &self,
        recipient: Option<&str>,
        incident_id: &str,
        message: &str,
    ) -> Result<(), SendError>;
}

/// Simulated SMS gateway. Always succeeds — placeholder for a real
/// integration (e.g. Twilio).
pub struct SmsSender;

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(
        &self,
        _recipient: Option<&str>,
        incident_id: &str,
        message: &str,
    ) -> Result<(), SendError> {
        tracing::info!(incident_id = %incident_id, preview = %preview(message), "SMS (simulated) sent");
        Ok(())
    }
}

/// Simulated WhatsApp gateway. Always succeeds.
pub struct WhatsAppSender;

#[async_trait]
impl ChannelSender for WhatsAppSender {
    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    async fn send(
        &self,
        _recipient: Option<&str>,
        incident_id: &str,
        message: &str,
    ) -> Result<(), SendError> {
        tracing::info!(incident_id = %incident_id, preview = %preview(message), "WhatsApp (simulated) sent");
        Ok(())
    }
}

fn preview(message: &str) -> &str {
    let end = message
        .char_indices()
        .nth(50)
        .map_or(message.len(), |(i, _)| i);
    &message[..end]
}

// ============================================================================
// Message templates
// ============================================================================

/// Acknowledgment sent on every channel right after incident creation.
pub fn acknowledgment_message(ticket_id: &str, incident_id: &str) -> String {
    format!(
        "Thank you for reporting this issue.\n\n\
         We've created ticket #{ticket_id} and our team is investigating.\n\
         We'll follow up within 24 hours.\n\n\
         Reference: Incident {incident_id}"
    )
}

/// Follow-up sent when an incident is still open after the reminder delay.
pub fn reminder_message(incident_id: &str) -> String {
    format!(
        "Reminder: Your support ticket {incident_id} is still open.\n\
         We're working on resolving your issue. Thank you for your patience."
    )
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Sends messages across channels and records every attempt.
pub struct Dispatcher {
    store: Arc<dyn IncidentStore>,
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl Dispatcher {
    /// Build a dispatcher over the given senders. Later senders for the same
    /// channel replace earlier ones.
    pub fn new(store: Arc<dyn IncidentStore>, senders: Vec<Arc<dyn ChannelSender>>) -> Self {
        let senders = senders.into_iter().map(|s| (s.channel(), s)).collect();
        Self { store, senders }
    }

    /// Dispatcher with the standard channel set: lettre email plus simulated
    /// SMS and WhatsApp.
    pub fn with_default_senders(store: Arc<dyn IncidentStore>, email: EmailSender) -> Self {
        Self::new(
            store,
            vec![Arc::new(email), Arc::new(SmsSender), Arc::new(WhatsAppSender)],
        )
    }

    /// Send one message on one channel, recording the attempt first.
    ///
    /// Returns the notification id. Only a store failure surfaces — the
    /// channel send itself is best-effort and its failure is logged.
    pub async fn dispatch(
        &self,
        incident_id: &str,
        channel: Channel,
        message: &str,
        recipient: Option<&str>,
    ) -> Result<String, StoreError> {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            incident_id: incident_id.to_string(),
            channel,
            message: message.to_string(),
            status: NotificationStatus::Sent,
            sent_at: Utc::now(),
        };

        // Record before sending — the audit row documents the attempt.
        self.store.record_notification(&notification)?;

        match self.senders.get(&channel) {
            Some(sender) => {
                if let Err(e) = sender.send(recipient, incident_id, message).await {
                    tracing::warn!(
                        incident_id = %incident_id,
                        channel = %channel,
                        error = %e,
                        "Channel send failed, attempt recorded"
                    );
                }
            }
            None => {
                tracing::warn!(
                    incident_id = %incident_id,
                    channel = %channel,
                    "No sender registered for channel, attempt recorded"
                );
            }
        }

        Ok(notification.id)
    }

    /// Send the acknowledgment template over each channel in order.
    ///
    /// One channel failing (including its audit write) never prevents
    /// attempting the next.
    pub async fn dispatch_ack(
        &self,
        incident_id: &str,
        ticket_id: &str,
        recipient: Option<&str>,
        channels: &[Channel],
    ) {
        let message = acknowledgment_message(ticket_id, incident_id);

        for channel in channels {
            if let Err(e) = self.dispatch(incident_id, *channel, &message, recipient).await {
                tracing::error!(
                    incident_id = %incident_id,
                    channel = %channel,
                    error = %e,
                    "Failed to record acknowledgment notification"
                );
            }
        }
    }

    /// Send the reminder template on the incident's original channel.
    pub async fn dispatch_reminder(
        &self,
        incident_id: &str,
        channel: Channel,
        recipient: Option<&str>,
    ) -> Result<String, StoreError> {
        let message = reminder_message(incident_id);
        self.dispatch(incident_id, channel, &message, recipient).await
    }
}
