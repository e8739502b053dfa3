//! Incident classification
//!
//! A [`Classifier`] backend turns free-form incident text into a category,
//! confidence, and short reason. The inner call is fallible; the pipeline
//! only ever sees [`classify_or_default`], which maps every failure mode to
//! the safe default `{other, 0.3, <failure reason>}` so classification can
//! never abort incident intake.

mod gemini;

pub use gemini::GeminiClassifier;

use async_trait::async_trait;

use crate::types::{Category, ClassificationResult};

/// Default confidence assigned when classification degrades.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Classification failure modes.
///
/// Each variant carries the reason string recorded on the fallback result,
/// so the degraded branch is explicit and testable rather than an implicit
/// catch-all.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// The service responded with no usable content.
    #[error("empty response")]
    EmptyResponse,
    /// The response text was not valid JSON.
    #[error("parse failed")]
    ParseFailed,
    /// JSON parsed but fields were missing, the category was outside the
    /// closed set, or the confidence was out of range.
    #[error("invalid format")]
    InvalidFormat,
    /// Transport failure, non-success status, or timeout.
    #[error("api error")]
    ApiError(String),
}

impl ClassifyError {
    /// Failure-class label recorded as the fallback reason.
    pub fn reason(&self) -> &'static str {
        match self {
            ClassifyError::EmptyResponse => "empty response",
            ClassifyError::ParseFailed => "parse failed",
            ClassifyError::InvalidFormat => "invalid format",
            ClassifyError::ApiError(_) => "api error",
        }
    }
}

/// Trait for classification backends
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Attempt to classify the message. May fail; callers on the pipeline
    /// path must go through [`classify_or_default`] instead.
    async fn try_classify(&self, message: &str) -> Result<ClassificationResult, ClassifyError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Classify with the default-on-degraded-service policy.
///
/// Never fails outward: any [`ClassifyError`] becomes
/// `{other, 0.3, <failure reason>}` and is logged for operability.
pub async fn classify_or_default(
    classifier: &dyn Classifier,
    message: &str,
) -> ClassificationResult {
    match classifier.try_classify(message).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(
                backend = classifier.backend_name(),
                error = %e,
                "Classification degraded, using fallback category"
            );
            ClassificationResult {
                category: Category::Other,
                confidence: FALLBACK_CONFIDENCE,
                reason: e.reason().to_string(),
            }
        }
    }
}

/// Validate a raw `{category, confidence, reason}` JSON value from the live
/// classification path.
///
/// Out-of-set categories and out-of-range confidences are malformed output,
/// not new behavior — both map to `InvalidFormat`.
pub(crate) fn validate_response(value: &serde_json::Value) -> Result<ClassificationResult, ClassifyError> {
    let category_label = value
        .get("category")
        .and_then(|v| v.as_str())
        .ok_or(ClassifyError::InvalidFormat)?;
    let confidence = value
        .get("confidence")
        .and_then(serde_json::Value::as_f64)
        .ok_or(ClassifyError::InvalidFormat)?;

    let category = Category::parse(category_label).ok_or(ClassifyError::InvalidFormat)?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ClassifyError::InvalidFormat);
    }

    let reason = value
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    Ok(ClassificationResult {
        category,
        confidence,
        reason,
    })
}
