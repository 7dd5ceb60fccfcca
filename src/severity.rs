//! Severity classification of aggregated detections.
//!
//! A pure function of an [`Aggregate`]: prevalence and confidence percentages
//! per infestation, the bucket each prevalence falls into, the major
//! infestation, the dominant crop and the overall damage estimate.

use crate::aggregate::{Aggregate, LabelStats, StatsError};
use crate::schema::InfestationType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize, JsonSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeverityBucket {
    Low,
    Moderate,
    Severe,
    HighlySevere,
}

impl SeverityBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::Severe => "Severe",
            Self::HighlySevere => "Highly Severe",
        }
    }
}

impl fmt::Display for SeverityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("threshold {name} must be a finite percentage, got {value}")]
    NotFinite { name: &'static str, value: f64 },
    #[error("thresholds must satisfy moderate <= severe <= highly_severe ({moderate}, {severe}, {highly_severe})")]
    OutOfOrder {
        moderate: f64,
        severe: f64,
        highly_severe: f64,
    },
}

/// Prevalence bounds for the severity buckets, in percent.
///
/// `p > highly_severe` is Highly Severe, `severe <= p <= highly_severe` is
/// Severe, `moderate <= p < severe` is Moderate, anything lower is Low.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    pub highly_severe: f64,
    pub severe: f64,
    pub moderate: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            highly_severe: 90.0,
            severe: 50.0,
            moderate: 30.0,
        }
    }
}

impl SeverityThresholds {
    pub fn validate(&self) -> Result<(), ThresholdError> {
        for (name, value) in [
            ("highly_severe", self.highly_severe),
            ("severe", self.severe),
            ("moderate", self.moderate),
        ] {
            if !value.is_finite() {
                return Err(ThresholdError::NotFinite { name, value });
            }
        }
        if !(self.moderate <= self.severe && self.severe <= self.highly_severe) {
            return Err(ThresholdError::OutOfOrder {
                moderate: self.moderate,
                severe: self.severe,
                highly_severe: self.highly_severe,
            });
        }
        Ok(())
    }

    pub fn bucket(&self, prevalence_pct: f64) -> SeverityBucket {
        if prevalence_pct > self.highly_severe {
            SeverityBucket::HighlySevere
        } else if prevalence_pct >= self.severe {
            SeverityBucket::Severe
        } else if prevalence_pct >= self.moderate {
            SeverityBucket::Moderate
        } else {
            SeverityBucket::Low
        }
    }
}

/// Share of scanned images a label appears in, in percent.
pub fn prevalence_pct(count: usize, total_images: usize) -> f64 {
    if total_images == 0 {
        return 0.0;
    }
    count as f64 / total_images as f64 * 100.0
}

pub fn avg_confidence_pct(stats: &LabelStats) -> Result<f64, StatsError> {
    stats.mean_confidence().map(|mean| mean * 100.0)
}

/// Mean prevalence across all infestation labels.
pub fn overall_damage_pct(prevalences: &[f64]) -> Result<f64, StatsError> {
    if prevalences.is_empty() {
        return Err(StatsError::NoInfestationData);
    }
    Ok(prevalences.iter().sum::<f64>() / prevalences.len() as f64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfestationAssessment {
    pub label: String,
    pub kind: InfestationType,
    pub count: usize,
    pub prevalence_pct: f64,
    pub avg_confidence_pct: Option<f64>,
    pub bucket: SeverityBucket,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CropAssessment {
    pub label: String,
    pub count: usize,
    pub avg_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub total_images: usize,
    pub infestations: Vec<InfestationAssessment>,
    pub crops: Vec<CropAssessment>,
    pub major_infestation: Option<String>,
    pub final_crop: Option<String>,
    pub overall_damage_pct: Option<f64>,
}

/// Highest count wins; ties go to the higher average confidence, then to the
/// label encountered first.
fn select_major(infestations: &[InfestationAssessment]) -> Option<&InfestationAssessment> {
    let mut best: Option<&InfestationAssessment> = None;
    for candidate in infestations {
        let better = match best {
            None => true,
            Some(current) => {
                candidate.count > current.count
                    || (candidate.count == current.count
                        && candidate.avg_confidence_pct.unwrap_or(f64::NEG_INFINITY)
                            > current.avg_confidence_pct.unwrap_or(f64::NEG_INFINITY))
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

/// Highest count wins; ties go to the label encountered first.
fn select_dominant_crop(crops: &[CropAssessment]) -> Option<&CropAssessment> {
    let mut best: Option<&CropAssessment> = None;
    for candidate in crops {
        if best.is_none_or(|current| candidate.count > current.count) {
            best = Some(candidate);
        }
    }
    best
}

pub fn assess(aggregate: &Aggregate, thresholds: &SeverityThresholds) -> Assessment {
    let total_images = aggregate.total_images;

    let infestations: Vec<InfestationAssessment> = aggregate
        .infestations
        .iter()
        .map(|stats| {
            let prevalence = prevalence_pct(stats.count, total_images);
            InfestationAssessment {
                label: stats.label.clone(),
                kind: stats.kind,
                count: stats.count,
                prevalence_pct: prevalence,
                avg_confidence_pct: avg_confidence_pct(stats).ok(),
                bucket: thresholds.bucket(prevalence),
            }
        })
        .collect();

    let crops: Vec<CropAssessment> = aggregate
        .crops
        .iter()
        .map(|stats| CropAssessment {
            label: stats.label.clone(),
            count: stats.count,
            avg_confidence: stats.mean_confidence().ok(),
        })
        .collect();

    let prevalences: Vec<f64> = infestations.iter().map(|i| i.prevalence_pct).collect();

    Assessment {
        total_images,
        major_infestation: select_major(&infestations).map(|i| i.label.clone()),
        final_crop: select_dominant_crop(&crops).map(|c| c.label.clone()),
        overall_damage_pct: overall_damage_pct(&prevalences).ok(),
        infestations,
        crops,
    }
}
