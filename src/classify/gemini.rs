//! Gemini classification backend
//!
//! Posts the fixed fintech taxonomy prompt to the Generative Language API and
//! parses the model's JSON reply. All network and parsing failures map to
//! [`ClassifyError`] variants; the pipeline never sees them directly.

use serde_json::json;
use std::time::Duration;

use super::{validate_response, Classifier, ClassifyError};
use crate::types::ClassificationResult;

/// Classification prompt. The category taxonomy here is the single source of
/// truth for what the model may answer; anything else is rejected as
/// malformed output.
const PROMPT_TEMPLATE: &str = r#"You are an incident classification expert for a fintech customer service team.

Classify the following customer message into ONE category and provide a confidence score between 0.0 and 1.0.

Customer Message: "{message}"

Categories:
1. duplicate_payment - Customer was charged multiple times for the same transaction
2. failed_payment - Payment failed but money was still deducted
3. fraud_report - Customer suspects unauthorized or fraudulent activity
4. refund_request - Customer explicitly requests a refund
5. account_locked - Customer cannot access their account
6. statement_error - Discrepancy in account balance or statement
7. other - Message does not fit any of the above

Respond with ONLY valid JSON, no markdown, no extra text:
{"category": "one_of_the_categories_above", "confidence": 0.95, "reason": "2-3 word explanation"}"#;

/// HTTP client for the Gemini classification boundary
#[derive(Clone)]
pub struct GeminiClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClassifier {
    /// Create a classifier for the given API base URL and model.
    ///
    /// `base_url` is normally `https://generativelanguage.googleapis.com`;
    /// tests point it at a local mock server.
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
            api_key: api_key.to_string(),
        }
    }

    /// Extract the first candidate's text from a generateContent response.
    fn candidate_text(body: &serde_json::Value) -> Option<&str> {
        body.get("candidates")?
            .get(0)?
            .get("content")?
            .get("parts")?
            .get(0)?
            .get("text")?
            .as_str()
    }

    /// Strip markdown code fences the model sometimes wraps around JSON.
    fn strip_fences(text: &str) -> &str {
        let trimmed = text.trim();
        let trimmed = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .unwrap_or(trimmed);
        trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
    }
}

#[async_trait::async_trait]
impl Classifier for GeminiClassifier {
    async fn try_classify(&self, message: &str) -> Result<ClassificationResult, ClassifyError> {
        let prompt = PROMPT_TEMPLATE.replace("{message}", message);

        let request = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": 0.1,
                "maxOutputTokens": 200
            }
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassifyError::ApiError(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ClassifyError::ApiError(format!(
                "status {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ClassifyError::ApiError(e.to_string()))?;

        let text = Self::candidate_text(&body).ok_or(ClassifyError::EmptyResponse)?;
        let cleaned = Self::strip_fences(text);
        if cleaned.is_empty() {
            return Err(ClassifyError::EmptyResponse);
        }

        tracing::debug!(response = cleaned, "Classification model response");

        let value: serde_json::Value =
            serde_json::from_str(cleaned).map_err(|_| ClassifyError::ParseFailed)?;

        validate_response(&value)
    }

    fn backend_name(&self) -> &'static str {
        "Gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gemini_body(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": {"parts": [{"text": text}]}
            }]
        })
    }

    async fn classifier_for(server: &MockServer) -> GeminiClassifier {
        GeminiClassifier::new(
            &server.uri(),
            "gemini-2.0-flash",
            "test-key",
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn test_parses_clean_json_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/v1beta/models/.*:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(
                r#"{"category": "duplicate_payment", "confidence": 0.95, "reason": "charged twice"}"#,
            )))
            .mount(&server)
            .await;

        let result = classifier_for(&server)
            .await
            .try_classify("My card was charged twice")
            .await
            .unwrap();
        assert_eq!(result.category, Category::DuplicatePayment);
        assert_eq!(result.confidence, 0.95);
    }

    #[tokio::test]
    async fn test_strips_markdown_fences() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/v1beta/models/.*:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(
                "```json\n{\"category\": \"refund_request\", \"confidence\": 0.8, \"reason\": \"wants refund\"}\n```",
            )))
            .mount(&server)
            .await;

        let result = classifier_for(&server)
            .await
            .try_classify("please refund me")
            .await
            .unwrap();
        assert_eq!(result.category, Category::RefundRequest);
    }

    #[tokio::test]
    async fn test_empty_candidates_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/v1beta/models/.*:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = classifier_for(&server)
            .await
            .try_classify("hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_non_json_reply_is_parse_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/v1beta/models/.*:generateContent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(gemini_body("the customer seems upset about billing")),
            )
            .mount(&server)
            .await;

        let err = classifier_for(&server)
            .await
            .try_classify("hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::ParseFailed));
    }

    #[tokio::test]
    async fn test_server_error_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/v1beta/models/.*:generateContent"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = classifier_for(&server)
            .await
            .try_classify("hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::ApiError(_)));
    }

    #[test]
    fn test_fence_stripping_variants() {
        assert_eq!(GeminiClassifier::strip_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(
            GeminiClassifier::strip_fences("```json\n{\"a\":1}\n```"),
            "{\"a\":1}"
        );
        assert_eq!(
            GeminiClassifier::strip_fences("```\n{\"a\":1}\n```"),
            "{\"a\":1}"
        );
    }
}
