use crate::schema::InfestationType;
use crate::severity::SeverityBucket;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of the infestation breakdown.
#[derive(Debug, Serialize, Deserialize, JsonSchema, Clone, PartialEq)]
pub struct InfestationEntry {
    pub label: String,
    #[serde(rename = "type")]
    pub kind: InfestationType,
    /// Number of images in which the label appears at least once.
    pub count: usize,
    pub prevalence_pct: f64,
    /// `None` when no confidence was recorded for the label.
    pub avg_confidence_pct: Option<f64>,
    pub severity: SeverityBucket,
    pub is_major: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema, Clone, PartialEq)]
pub struct CropEntry {
    pub label: String,
    /// Number of crop detections, not deduplicated per image.
    pub count: usize,
    /// Mean confidence as a fraction in `[0, 1]`.
    pub avg_confidence: Option<f64>,
}

/// Aggregate severity report over the qualifying images of a history.
#[derive(Debug, Serialize, Deserialize, JsonSchema, Clone, PartialEq)]
pub struct SeverityReport {
    pub version: String,
    pub total_images: usize,
    pub final_crop: Option<String>,
    pub major_infestation: Option<String>,
    pub infestation_breakdown: Vec<InfestationEntry>,
    pub crops: Vec<CropEntry>,
    /// Mean prevalence across all infestation labels, `None` without infestations.
    pub overall_damage_pct: Option<f64>,
}

impl SeverityReport {
    pub fn crop_counts(&self) -> HashMap<&str, usize> {
        self.crops
            .iter()
            .map(|c| (c.label.as_str(), c.count))
            .collect()
    }

    pub fn crop_avg_confidence(&self) -> HashMap<&str, f64> {
        self.crops
            .iter()
            .filter_map(|c| c.avg_confidence.map(|avg| (c.label.as_str(), avg)))
            .collect()
    }

    pub fn infestation(&self, label: &str) -> Option<&InfestationEntry> {
        self.infestation_breakdown.iter().find(|e| e.label == label)
    }

    pub fn major(&self) -> Option<&InfestationEntry> {
        self.infestation_breakdown.iter().find(|e| e.is_major)
    }
}
