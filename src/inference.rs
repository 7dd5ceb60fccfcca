//! Contract with the external object-detection service.
//!
//! The service receives one image and answers with either an error or a list
//! of detection records plus an annotated image for display. Only the records
//! are consumed here; they are validated and turned into an [`ImageResult`].

use crate::catalog::LabelCatalog;
use crate::schema::{
    Category, Detection, ImageResult, InfestationType, InvalidDetection, InvalidReason,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Failed(String),
    #[error("malformed inference reply: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A detection record exactly as the service sends it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f64, category: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            confidence: Some(confidence),
            category: Some(category.into()),
            kind: None,
        }
    }

    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Validate the record. A missing or unrecognized category (and a missing
    /// type) is filled in from the catalog when it knows the label.
    pub fn into_detection(self, catalog: &LabelCatalog) -> Result<Detection, InvalidDetection> {
        let known = catalog.lookup(&self.label);
        let category = match self.category.as_deref().and_then(Category::parse) {
            Some(category) => category,
            None => match known {
                Some((category, _)) => category,
                None => {
                    let raw = self.category.unwrap_or_default();
                    return Err(InvalidDetection::new(
                        self.label,
                        InvalidReason::UnknownCategory(raw),
                    ));
                }
            },
        };

        let mut kind = self
            .kind
            .as_deref()
            .map(InfestationType::parse)
            .unwrap_or_default();
        if !kind.is_known()
            && let Some((_, catalog_kind)) = known
        {
            kind = catalog_kind;
        }
        if category == Category::Crop {
            kind = InfestationType::Unknown;
        }

        let Some(confidence) = self.confidence else {
            return Err(InvalidDetection::new(
                self.label,
                InvalidReason::MissingConfidence,
            ));
        };
        Detection::new(self.label, confidence, category, kind)
    }
}

/// One entry of the `detections` array. Entries whose fields have the wrong
/// JSON types are kept verbatim so the rest of the image still decodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRecord {
    Detection(RawDetection),
    Malformed(serde_json::Value),
}

impl RawRecord {
    pub fn into_detection(self, catalog: &LabelCatalog) -> Result<Detection, InvalidDetection> {
        match self {
            Self::Detection(raw) => raw.into_detection(catalog),
            Self::Malformed(value) => {
                let label = match value.get("label") {
                    Some(serde_json::Value::String(label)) => label.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                Err(InvalidDetection::new(
                    label,
                    InvalidReason::Malformed(value.to_string()),
                ))
            }
        }
    }
}

impl From<RawDetection> for RawRecord {
    fn from(raw: RawDetection) -> Self {
        Self::Detection(raw)
    }
}

/// Successful answer for one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    /// Base64 encoded annotated image, for display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub detections: Vec<RawRecord>,
}

impl InferenceResponse {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self {
            image: None,
            detections: detections.into_iter().map(RawRecord::from).collect(),
        }
    }
}

/// Either shape the service may answer with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InferenceReply {
    Failure { error: String },
    Success(InferenceResponse),
}

impl InferenceReply {
    pub fn into_result(self) -> Result<InferenceResponse, InferenceError> {
        match self {
            Self::Failure { error } => Err(InferenceError::Failed(error)),
            Self::Success(response) => Ok(response),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordedReplies {
    Many(Vec<InferenceReply>),
    One(InferenceReply),
}

/// Parse recorded replies: a single reply object or an array of them.
pub fn parse_replies(json: &str) -> Result<Vec<InferenceReply>, InferenceError> {
    Ok(match serde_json::from_str::<RecordedReplies>(json)? {
        RecordedReplies::Many(replies) => replies,
        RecordedReplies::One(reply) => vec![reply],
    })
}

/// The detection service, seen as a synchronous call.
pub trait Inference {
    fn name(&self) -> &'static str;
    fn infer(&self, image: &[u8]) -> Result<InferenceResponse, InferenceError>;
}

/// Validated image plus the records that were dropped on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub image: ImageResult,
    pub rejected: Vec<InvalidDetection>,
}

/// Turn a response into an [`ImageResult`]. Invalid records are dropped
/// individually; the rest of the image is kept.
pub fn ingest(response: InferenceResponse, catalog: &LabelCatalog) -> Ingested {
    let mut detections = Vec::with_capacity(response.detections.len());
    let mut rejected = Vec::new();

    for record in response.detections {
        match record.into_detection(catalog) {
            Ok(detection) => detections.push(detection),
            Err(invalid) => {
                tracing::warn!(
                    label = %invalid.label,
                    reason = %invalid.reason,
                    "dropping invalid detection"
                );
                rejected.push(invalid);
            }
        }
    }

    Ingested {
        image: ImageResult::new(detections),
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_reply() {
        let json = r#"{
            "image": "aGVsbG8=",
            "detections": [
                {"label": "Paddy", "category": "crop", "type": "unknown", "confidence": 0.912},
                {"label": "blast", "category": "infestation", "type": "biotic", "confidence": 0.5}
            ]
        }"#;
        let replies = parse_replies(json).unwrap();
        assert_eq!(replies.len(), 1);
        let response = replies.into_iter().next().unwrap().into_result().unwrap();
        assert_eq!(response.image.as_deref(), Some("aGVsbG8="));
        assert_eq!(response.detections.len(), 2);
    }

    #[test]
    fn parses_failure_and_arrays() {
        let json = r#"[{"error": "model not loaded"}, {"detections": []}]"#;
        let replies = parse_replies(json).unwrap();
        assert_eq!(replies.len(), 2);
        assert!(matches!(
            replies[0].clone().into_result(),
            Err(InferenceError::Failed(msg)) if msg == "model not loaded"
        ));
        assert_eq!(
            replies[1].clone().into_result().unwrap(),
            InferenceResponse::default()
        );
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            parse_replies("{not json"),
            Err(InferenceError::Malformed(_))
        ));
    }

    #[test]
    fn ingest_drops_only_invalid_records() {
        let response = InferenceResponse::new(vec![
            RawDetection::new("paddy", 0.9, "crop"),
            RawDetection::new("", 0.9, "crop"),
            RawDetection::new("blast", 1.5, "infestation"),
            RawDetection::new("mystery", 0.4, "unknown"),
            RawDetection::new("aphid", 0.7, "infestation").with_type("biotic"),
        ]);
        let ingested = ingest(response, &LabelCatalog::empty());
        assert_eq!(ingested.image.len(), 2);
        let reasons: Vec<&InvalidReason> = ingested.rejected.iter().map(|r| &r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                &InvalidReason::EmptyLabel,
                &InvalidReason::ConfidenceOutOfRange(1.5),
                &InvalidReason::UnknownCategory("unknown".into()),
            ]
        );
    }

    #[test]
    fn wrongly_typed_record_drops_only_itself() {
        let json = r#"{"detections": [
            {"label": "blast", "category": "infestation", "type": "biotic", "confidence": 0.5},
            {"label": "aphid", "category": "infestation", "confidence": "high"},
            {"label": 7, "category": "crop", "confidence": 0.5}
        ]}"#;
        let response = parse_replies(json)
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(response.detections.len(), 3);

        let ingested = ingest(response, &LabelCatalog::empty());
        assert_eq!(ingested.image.len(), 1);
        assert_eq!(ingested.image.detections()[0].label(), "blast");

        let labels: Vec<&str> = ingested.rejected.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["aphid", "7"]);
        assert!(
            ingested
                .rejected
                .iter()
                .all(|r| matches!(r.reason, InvalidReason::Malformed(_)))
        );
    }

    #[test]
    fn catalog_fills_missing_category_and_type() {
        let raw = RawDetection {
            label: "Brown Planthopper".into(),
            confidence: Some(0.6),
            category: None,
            kind: None,
        };
        let detection = raw.into_detection(&LabelCatalog::builtin()).unwrap();
        assert_eq!(detection.category(), Category::Infestation);
        assert_eq!(detection.kind(), InfestationType::Biotic);
        assert_eq!(detection.label(), "Brown Planthopper");
    }

    #[test]
    fn missing_confidence_is_invalid() {
        let raw = RawDetection {
            label: "paddy".into(),
            confidence: None,
            category: Some("crop".into()),
            kind: None,
        };
        assert_eq!(
            raw.into_detection(&LabelCatalog::empty()).unwrap_err().reason,
            InvalidReason::MissingConfidence
        );
    }
}
