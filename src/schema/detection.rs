use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Whether a detection identifies a crop or an infestation.
#[derive(Debug, Serialize, Deserialize, JsonSchema, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Crop,
    Infestation,
}

impl Category {
    /// Parse a category as reported by the inference service.
    ///
    /// Only the two recognized values are accepted; anything else (including the
    /// `unknown` placeholder some models emit) yields `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "crop" => Some(Self::Crop),
            "infestation" => Some(Self::Infestation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crop => "crop",
            Self::Infestation => "infestation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cause of an infestation. Only meaningful for [`Category::Infestation`].
#[derive(
    Debug, Serialize, Deserialize, JsonSchema, Clone, Copy, PartialEq, Eq, Hash, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum InfestationType {
    Biotic,
    Abiotic,
    #[default]
    Unknown,
}

impl InfestationType {
    /// Lenient parse: unrecognized or empty values become `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "biotic" => Self::Biotic,
            "abiotic" => Self::Abiotic,
            _ => Self::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Biotic => "biotic",
            Self::Abiotic => "abiotic",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InfestationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidReason {
    #[error("label is empty")]
    EmptyLabel,
    #[error("confidence is missing")]
    MissingConfidence,
    #[error("confidence is not a finite number")]
    NonFiniteConfidence,
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("unrecognized category '{0}'")]
    UnknownCategory(String),
    #[error("record has fields of the wrong type: {0}")]
    Malformed(String),
}

/// A detection that failed validation. It is dropped at ingestion and never
/// reaches the history.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("invalid detection '{label}': {reason}")]
pub struct InvalidDetection {
    pub label: String,
    pub reason: InvalidReason,
}

impl InvalidDetection {
    pub fn new(label: impl Into<String>, reason: InvalidReason) -> Self {
        Self {
            label: label.into(),
            reason,
        }
    }
}

/// One labeled, confidence-scored identification within an image.
///
/// Only constructible through the validating constructors, so every value held
/// by the history satisfies the label and confidence invariants.
#[derive(Debug, Serialize, JsonSchema, Clone, PartialEq)]
pub struct Detection {
    label: String,
    confidence: f64,
    category: Category,
    #[serde(rename = "type")]
    kind: InfestationType,
}

impl Detection {
    /// Build a validated detection.
    pub fn new(
        label: impl Into<String>,
        confidence: f64,
        category: Category,
        kind: InfestationType,
    ) -> Result<Self, InvalidDetection> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(InvalidDetection::new(label, InvalidReason::EmptyLabel));
        }
        if !confidence.is_finite() {
            return Err(InvalidDetection::new(
                label,
                InvalidReason::NonFiniteConfidence,
            ));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(InvalidDetection::new(
                label,
                InvalidReason::ConfidenceOutOfRange(confidence),
            ));
        }
        Ok(Self {
            label,
            confidence,
            category,
            kind,
        })
    }

    /// Crop detection. The type is always `Unknown` for crops.
    pub fn crop(label: impl Into<String>, confidence: f64) -> Result<Self, InvalidDetection> {
        Self::new(label, confidence, Category::Crop, InfestationType::Unknown)
    }

    pub fn infestation(
        label: impl Into<String>,
        confidence: f64,
        kind: InfestationType,
    ) -> Result<Self, InvalidDetection> {
        Self::new(label, confidence, Category::Infestation, kind)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn kind(&self) -> InfestationType {
        self.kind
    }

    pub fn is_infestation(&self) -> bool {
        self.category == Category::Infestation
    }
}

/// All detections produced for exactly one submitted image. May be empty.
#[derive(Debug, Serialize, JsonSchema, Clone, PartialEq, Default)]
pub struct ImageResult {
    detections: Vec<Detection>,
}

impl ImageResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn crops(&self) -> impl Iterator<Item = &Detection> {
        self.detections
            .iter()
            .filter(|d| d.category == Category::Crop)
    }

    pub fn infestations(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter().filter(|d| d.is_infestation())
    }

    /// Infestations of one cause, e.g. only the biotic ones.
    pub fn infestations_of(&self, kind: InfestationType) -> impl Iterator<Item = &Detection> {
        self.infestations().filter(move |d| d.kind == kind)
    }

    /// True when at least one infestation was detected in this image.
    pub fn has_infestation(&self) -> bool {
        self.detections.iter().any(Detection::is_infestation)
    }
}

impl FromIterator<Detection> for ImageResult {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
