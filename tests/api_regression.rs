//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the /api/v1/* endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port — runs in CI without `#[ignore]`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use incidentflow::api::{create_app, ApiState};
use incidentflow::classify::{Classifier, ClassifyError};
use incidentflow::notify::{Dispatcher, SmsSender, WhatsAppSender};
use incidentflow::store::{IncidentStore, InMemoryStore};
use incidentflow::ticketing::TicketClient;
use incidentflow::types::{Category, ClassificationResult};
use incidentflow::{IncidentPipeline, ReminderScheduler};

/// Deterministic classifier: categorizes anything mentioning "twice" as a
/// duplicate payment, fails otherwise.
struct StubClassifier;

#[async_trait]
impl Classifier for StubClassifier {
    async fn try_classify(&self, message: &str) -> Result<ClassificationResult, ClassifyError> {
        if message.contains("twice") {
            Ok(ClassificationResult {
                category: Category::DuplicatePayment,
                confidence: 0.95,
                reason: "double charge".to_string(),
            })
        } else {
            Err(ClassifyError::ApiError("unreachable".to_string()))
        }
    }

    fn backend_name(&self) -> &'static str {
        "stub"
    }
}

fn create_test_app() -> (Router, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let dyn_store: Arc<dyn IncidentStore> = store.clone();

    let dispatcher = Arc::new(Dispatcher::new(
        dyn_store.clone(),
        vec![Arc::new(SmsSender), Arc::new(WhatsAppSender)],
    ));
    let scheduler = ReminderScheduler::new(
        dyn_store.clone(),
        dispatcher.clone(),
        Duration::from_secs(86_400),
        CancellationToken::new(),
    );
    // Nothing listens on port 9 — every ticket takes the local fallback.
    let tickets = TicketClient::new("http://127.0.0.1:9/api/tickets", Duration::from_millis(100));
    let pipeline = Arc::new(IncidentPipeline::new(
        Arc::new(StubClassifier),
        tickets,
        dyn_store.clone(),
        dispatcher,
        scheduler,
    ));

    (create_app(ApiState::new(pipeline, dyn_store)), store)
}

fn post_incident_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/incidents")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _store) = create_test_app();
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    assert_eq!(v["status"], "healthy");
    assert!(v["timestamp"].is_string());
}

#[tokio::test]
async fn test_create_incident_returns_created() {
    let (app, _store) = create_test_app();
    let resp = app
        .oneshot(post_incident_request(serde_json::json!({
            "customer_id": "99876",
            "message": "My credit card payment was deducted twice yesterday.",
            "channel": "whatsapp",
            "email": "c@example.com"
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let v = json_body(resp).await;
    let data = &v["data"];
    assert_eq!(data["classification"], "duplicate_payment");
    assert_eq!(data["status"], "open");
    assert!(data["incident_id"].as_str().map_or(false, |s| !s.is_empty()));
    assert!(data["ticket_id"].as_str().map_or(false, |s| !s.is_empty()));
    let confidence = data["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
}

#[tokio::test]
async fn test_create_incident_classifier_fallback() {
    let (app, _store) = create_test_app();
    let resp = app
        .oneshot(post_incident_request(serde_json::json!({
            "customer_id": "1001",
            "message": "something unrelated"
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let v = json_body(resp).await;
    assert_eq!(v["data"]["classification"], "other");
    assert_eq!(v["data"]["confidence"], 0.3);
}

#[tokio::test]
async fn test_create_incident_empty_customer_is_bad_request() {
    let (app, _store) = create_test_app();
    let resp = app
        .oneshot(post_incident_request(serde_json::json!({
            "customer_id": "",
            "message": "help"
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let v = json_body(resp).await;
    assert_eq!(v["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_create_then_fetch_incident() {
    let (app, _store) = create_test_app();

    let resp = app
        .clone()
        .oneshot(post_incident_request(serde_json::json!({
            "customer_id": "42",
            "message": "charged twice"
        })))
        .await
        .unwrap();
    let created = json_body(resp).await;
    let incident_id = created["data"]["incident_id"].as_str().unwrap().to_string();

    let resp = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/incidents/{incident_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    assert_eq!(v["data"]["id"], incident_id.as_str());
    assert_eq!(v["data"]["customer_id"], "42");
    // Default channel applies when the request omits it.
    assert_eq!(v["data"]["channel"], "email");
    assert_eq!(v["data"]["reminder_sent"], false);
}

#[tokio::test]
async fn test_unknown_incident_is_not_found() {
    let (app, _store) = create_test_app();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/incidents/no-such-id")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let v = json_body(resp).await;
    assert_eq!(v["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_customer_listing_newest_first() {
    let (app, _store) = create_test_app();

    for message in ["first issue twice", "second issue twice"] {
        let resp = app
            .clone()
            .oneshot(post_incident_request(serde_json::json!({
                "customer_id": "7",
                "message": message
            })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/incidents/customer/7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    let list = v["data"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["message"], "second issue twice");
    assert_eq!(list[1]["message"], "first issue twice");
}

#[tokio::test]
async fn test_resolve_is_idempotent_over_http() {
    let (app, _store) = create_test_app();

    let resp = app
        .clone()
        .oneshot(post_incident_request(serde_json::json!({
            "customer_id": "7",
            "message": "charged twice"
        })))
        .await
        .unwrap();
    let created = json_body(resp).await;
    let incident_id = created["data"]["incident_id"].as_str().unwrap().to_string();

    let resolve_request = || {
        Request::builder()
            .method(Method::PUT)
            .uri(format!("/api/v1/incidents/{incident_id}/resolve"))
            .body(Body::empty())
            .unwrap()
    };

    let first = json_body(app.clone().oneshot(resolve_request()).await.unwrap()).await;
    assert_eq!(first["data"]["status"], "resolved");
    let first_resolved_at = first["data"]["resolved_at"].clone();

    let second = json_body(app.clone().oneshot(resolve_request()).await.unwrap()).await;
    assert_eq!(second["data"]["status"], "resolved");
    assert_eq!(second["data"]["resolved_at"], first_resolved_at);

    let missing = app
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri("/api/v1/incidents/ghost/resolve")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_acknowledgment_notifications_recorded() {
    let (app, _store) = create_test_app();

    let resp = app
        .clone()
        .oneshot(post_incident_request(serde_json::json!({
            "customer_id": "99876",
            "message": "My credit card payment was deducted twice yesterday.",
            "channel": "whatsapp",
            "email": "c@example.com"
        })))
        .await
        .unwrap();
    let created = json_body(resp).await;
    let incident_id = created["data"]["incident_id"].as_str().unwrap().to_string();

    let resp = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/notifications/{incident_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Acknowledgment fan-out uses the default [email, sms] regardless of the
    // incident's own channel.
    let v = json_body(resp).await;
    let list = v["data"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    let mut channels: Vec<&str> = list.iter().map(|n| n["channel"].as_str().unwrap()).collect();
    channels.sort_unstable();
    assert_eq!(channels, ["email", "sms"]);
    for n in list {
        assert_eq!(n["status"], "sent");
    }
}

#[tokio::test]
async fn test_stats_aggregate() {
    let (app, _store) = create_test_app();

    // Two duplicate_payment, one classifier-fallback "other".
    for message in ["charged twice", "billed twice", "hello there"] {
        app.clone()
            .oneshot(post_incident_request(serde_json::json!({
                "customer_id": "9",
                "message": message
            })))
            .await
            .unwrap();
    }

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    assert_eq!(v["data"]["total"], 3);
    assert_eq!(v["data"]["open"], 3);
    assert_eq!(v["data"]["resolved"], 0);
    assert_eq!(v["data"]["by_classification"]["duplicate_payment"], 2);
    assert_eq!(v["data"]["by_classification"]["other"], 1);
}
