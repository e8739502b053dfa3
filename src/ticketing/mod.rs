//! Ticketing service boundary
//!
//! Obtains an external tracking identifier for each incident. The remote
//! create-ticket call runs under a bounded timeout; on any failure the client
//! synthesizes a locally unique `TKT-`-prefixed id so the pipeline can always
//! proceed. Issuing a ticket therefore never fails outward — the
//! [`TicketOutcome`] source keeps the degraded branch visible to callers and
//! tests.

use serde_json::json;
use std::time::Duration;

use crate::types::Category;

/// Prefix of locally synthesized ticket ids.
pub const LOCAL_TICKET_PREFIX: &str = "TKT-";

/// Where a ticket id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketSource {
    /// Assigned by the remote ticketing service.
    Remote,
    /// Synthesized locally after a remote failure or timeout.
    LocalFallback,
}

/// Result of issuing a ticket. Always carries a usable id.
#[derive(Debug, Clone)]
pub struct TicketOutcome {
    pub id: String,
    pub source: TicketSource,
}

/// Internal failure modes of the remote call. Never propagated — logged and
/// absorbed into the local fallback.
#[derive(Debug, thiserror::Error)]
enum TicketError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    ServerError(reqwest::StatusCode),
    #[error("response missing ticket id")]
    MissingId,
}

/// HTTP client for the external ticketing system
#[derive(Clone)]
pub struct TicketClient {
    http: reqwest::Client,
    endpoint: String,
}

impl TicketClient {
    /// Create a client for the given ticketing endpoint.
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            endpoint: endpoint.to_string(),
        }
    }

    /// Issue a ticket for an incident. Never fails outward.
    pub async fn issue(
        &self,
        incident_id: &str,
        category: Category,
        message: &str,
    ) -> TicketOutcome {
        match self.create_remote(incident_id, category, message).await {
            Ok(id) => {
                tracing::info!(incident_id = %incident_id, ticket_id = %id, "Remote ticket created");
                TicketOutcome {
                    id,
                    source: TicketSource::Remote,
                }
            }
            Err(e) => {
                let id = local_ticket_id();
                tracing::warn!(
                    incident_id = %incident_id,
                    error = %e,
                    ticket_id = %id,
                    "Ticketing service degraded, using local ticket id"
                );
                TicketOutcome {
                    id,
                    source: TicketSource::LocalFallback,
                }
            }
        }
    }

    async fn create_remote(
        &self,
        incident_id: &str,
        category: Category,
        message: &str,
    ) -> Result<String, TicketError> {
        let payload = json!({
            "name": format!("Incident {incident_id}: {category}"),
            "description": message,
            "status": "open"
        });

        let resp = self.http.post(&self.endpoint).json(&payload).send().await?;

        if resp.status() != reqwest::StatusCode::CREATED {
            return Err(TicketError::ServerError(resp.status()));
        }

        let body: serde_json::Value = resp.json().await?;
        // Remote ids may be numeric — normalize to a string either way.
        match body.get("id") {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
            _ => Err(TicketError::MissingId),
        }
    }
}

/// Synthesize a locally unique ticket id: `TKT-` + 8 hex characters.
fn local_ticket_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{LOCAL_TICKET_PREFIX}{}", &hex[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TicketClient {
        TicketClient::new(&format!("{}/api/tickets", server.uri()), Duration::from_secs(2))
    }

    fn assert_local_fallback(outcome: &TicketOutcome) {
        assert_eq!(outcome.source, TicketSource::LocalFallback);
        let suffix = outcome.id.strip_prefix(LOCAL_TICKET_PREFIX).unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_remote_string_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tickets"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "T-7781"})),
            )
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .issue("i-1", Category::FraudReport, "suspicious charge")
            .await;
        assert_eq!(outcome.source, TicketSource::Remote);
        assert_eq!(outcome.id, "T-7781");
    }

    #[tokio::test]
    async fn test_remote_numeric_id_stringified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tickets"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 482})))
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .issue("i-1", Category::Other, "help")
            .await;
        assert_eq!(outcome.source, TicketSource::Remote);
        assert_eq!(outcome.id, "482");
    }

    #[tokio::test]
    async fn test_non_created_status_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tickets"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .issue("i-1", Category::Other, "help")
            .await;
        assert_local_fallback(&outcome);
    }

    #[tokio::test]
    async fn test_malformed_response_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tickets"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"created": true})),
            )
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .issue("i-1", Category::Other, "help")
            .await;
        assert_local_fallback(&outcome);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_falls_back() {
        // Nothing listens on this port.
        let client = TicketClient::new("http://127.0.0.1:9/api/tickets", Duration::from_millis(200));
        let outcome = client.issue("i-1", Category::Other, "help").await;
        assert_local_fallback(&outcome);
    }

    #[test]
    fn test_local_ids_unique() {
        let ids: HashSet<String> = (0..64).map(|_| local_ticket_id()).collect();
        assert_eq!(ids.len(), 64);
    }
}
