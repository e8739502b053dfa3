//! Email sender over SMTP using lettre.
//!
//! Credentials come from the environment (`SENDER_EMAIL`, `SENDER_PASSWORD`);
//! the SMTP relay host and port come from configuration. Missing credentials
//! or a missing recipient address fail the send as a configuration gap — the
//! dispatcher still records the attempt.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{ChannelSender, SendError};
use crate::types::Channel;

/// Environment variable holding the sender address.
pub const SENDER_EMAIL_VAR: &str = "SENDER_EMAIL";
/// Environment variable holding the SMTP password / app secret.
pub const SENDER_PASSWORD_VAR: &str = "SENDER_PASSWORD";

/// SMTP email sender
pub struct EmailSender {
    smtp_host: String,
    smtp_port: u16,
    credentials: Option<(String, String)>,
}

impl EmailSender {
    /// Build a sender for the given relay, taking credentials from the
    /// environment. Absent credentials are tolerated — sends will fail
    /// with `NotConfigured` until both variables are set.
    pub fn from_env(smtp_host: &str, smtp_port: u16) -> Self {
        let credentials = match (
            std::env::var(SENDER_EMAIL_VAR),
            std::env::var(SENDER_PASSWORD_VAR),
        ) {
            (Ok(address), Ok(password)) if !address.is_empty() && !password.is_empty() => {
                Some((address, password))
            }
            _ => {
                tracing::warn!(
                    "Email credentials not configured ({SENDER_EMAIL_VAR}/{SENDER_PASSWORD_VAR}) — email sends will be recorded but not delivered"
                );
                None
            }
        };

        Self {
            smtp_host: smtp_host.to_string(),
            smtp_port,
            credentials,
        }
    }

    /// Sender with explicit credentials, for tests.
    #[cfg(test)]
    pub fn with_credentials(smtp_host: &str, smtp_port: u16, address: &str, password: &str) -> Self {
        Self {
            smtp_host: smtp_host.to_string(),
            smtp_port,
            credentials: Some((address.to_string(), password.to_string())),
        }
    }

    fn build_message(
        &self,
        from: &str,
        recipient: &str,
        incident_id: &str,
        body: &str,
    ) -> Result<Message, SendError> {
        let from: Mailbox = from
            .parse()
            .map_err(|_| SendError::NotConfigured(format!("invalid sender address: {from}")))?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|_| SendError::Transport(format!("invalid recipient address: {recipient}")))?;

        let full_body = format!(
            "Hello,\n\n\
             Thank you for reporting this issue to us.\n\n\
             Incident ID: {incident_id}\n\
             Status: Your ticket has been created and is being investigated.\n\n\
             Message:\n{body}\n\n\
             We will follow up with you within 24 hours.\n\n\
             Best regards,\n\
             Customer Support Team"
        );

        Message::builder()
            .from(from)
            .to(to)
            .subject(format!("Incident Update - Ticket {incident_id}"))
            .header(ContentType::TEXT_PLAIN)
            .body(full_body)
            .map_err(|e| SendError::Transport(e.to_string()))
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(
        &self,
        recipient: Option<&str>,
        incident_id: &str,
        message: &str,
    ) -> Result<(), SendError> {
        let (address, password) = self
            .credentials
            .as_ref()
            .ok_or_else(|| SendError::NotConfigured("missing SMTP credentials".to_string()))?;
        let recipient = recipient
            .ok_or_else(|| SendError::NotConfigured("no recipient address".to_string()))?;

        let email = self.build_message(address, recipient, incident_id, message)?;

        let creds = Credentials::new(address.clone(), password.clone());
        let mailer: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp_host)
                .map_err(|e| SendError::Transport(e.to_string()))?
                .port(self.smtp_port)
                .credentials(creds)
                .build();

        mailer
            .send(email)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        tracing::info!(incident_id = %incident_id, to = %recipient, "Email sent");
        Ok(())
    }
}
