//! Reduction of per-image detections into per-label statistics.
//!
//! Crop detections are counted once per occurrence. Infestation labels are
//! counted at most once per image, so their count is the number of images the
//! label appears in, while every occurrence still contributes its confidence.

use crate::schema::{Category, ImageResult, InfestationType};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("no confidences recorded for '{label}'")]
    EmptyConfidenceAverage { label: String },
    #[error("no infestation labels present")]
    NoInfestationData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelStats {
    pub label: String,
    pub count: usize,
    pub confidences: Vec<f64>,
    /// First known infestation type seen for the label; `Unknown` for crops.
    pub kind: InfestationType,
}

impl LabelStats {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            count: 0,
            confidences: Vec::new(),
            kind: InfestationType::Unknown,
        }
    }

    pub fn mean_confidence(&self) -> Result<f64, StatsError> {
        if self.confidences.is_empty() {
            return Err(StatsError::EmptyConfidenceAverage {
                label: self.label.clone(),
            });
        }
        Ok(self.confidences.iter().sum::<f64>() / self.confidences.len() as f64)
    }
}

/// Per-label statistics in first-encountered order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTally {
    stats: Vec<LabelStats>,
    index: HashMap<String, usize>,
}

impl LabelTally {
    fn entry(&mut self, label: &str) -> &mut LabelStats {
        let existing = self.index.get(label).copied();
        let idx = match existing {
            Some(idx) => idx,
            None => {
                self.stats.push(LabelStats::new(label));
                self.index.insert(label.to_string(), self.stats.len() - 1);
                self.stats.len() - 1
            }
        };
        &mut self.stats[idx]
    }

    pub fn get(&self, label: &str) -> Option<&LabelStats> {
        self.index.get(label).map(|&idx| &self.stats[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelStats> {
        self.stats.iter()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    pub crops: LabelTally,
    pub infestations: LabelTally,
    /// Number of images scanned.
    pub total_images: usize,
}

pub fn aggregate<'a, I>(images: I) -> Aggregate
where
    I: IntoIterator<Item = &'a ImageResult>,
{
    let mut result = Aggregate::default();

    for image in images {
        result.total_images += 1;
        let mut seen: HashSet<&str> = HashSet::new();

        for detection in image.detections() {
            match detection.category() {
                Category::Crop => {
                    let stats = result.crops.entry(detection.label());
                    stats.count += 1;
                    stats.confidences.push(detection.confidence());
                }
                Category::Infestation => {
                    let stats = result.infestations.entry(detection.label());
                    if seen.insert(detection.label()) {
                        stats.count += 1;
                    }
                    stats.confidences.push(detection.confidence());
                    if !stats.kind.is_known() {
                        stats.kind = detection.kind();
                    }
                }
            }
        }
    }

    tracing::debug!(
        images = result.total_images,
        crop_labels = result.crops.len(),
        infestation_labels = result.infestations.len(),
        "aggregated detections"
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Detection;

    fn pest(label: &str, confidence: f64) -> Detection {
        Detection::infestation(label, confidence, InfestationType::Unknown).unwrap()
    }

    #[test]
    fn infestations_count_once_per_image() {
        let images = vec![
            ImageResult::new(vec![pest("aphid", 0.9), pest("aphid", 0.5)]),
            ImageResult::new(vec![pest("aphid", 0.4)]),
        ];
        let agg = aggregate(&images);
        let aphid = agg.infestations.get("aphid").unwrap();
        assert_eq!(aphid.count, 2);
        assert_eq!(aphid.confidences, vec![0.9, 0.5, 0.4]);
        assert_eq!(agg.total_images, 2);
    }

    #[test]
    fn crops_count_every_occurrence() {
        let images = vec![ImageResult::new(vec![
            Detection::crop("paddy", 0.8).unwrap(),
            Detection::crop("paddy", 0.6).unwrap(),
        ])];
        let agg = aggregate(&images);
        assert_eq!(agg.crops.get("paddy").unwrap().count, 2);
    }

    #[test]
    fn records_first_known_type() {
        let images = vec![
            ImageResult::new(vec![pest("blast", 0.5)]),
            ImageResult::new(vec![
                Detection::infestation("blast", 0.5, InfestationType::Biotic).unwrap(),
            ]),
            ImageResult::new(vec![
                Detection::infestation("blast", 0.5, InfestationType::Abiotic).unwrap(),
            ]),
        ];
        let agg = aggregate(&images);
        assert_eq!(
            agg.infestations.get("blast").unwrap().kind,
            InfestationType::Biotic
        );
    }

    #[test]
    fn keeps_first_encountered_order() {
        let images = vec![
            ImageResult::new(vec![pest("mite", 0.5)]),
            ImageResult::new(vec![pest("whitefly", 0.5), pest("mite", 0.5)]),
        ];
        let agg = aggregate(&images);
        let labels: Vec<&str> = agg.infestations.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["mite", "whitefly"]);
    }

    #[test]
    fn empty_images_are_counted() {
        let images = vec![ImageResult::empty(), ImageResult::empty()];
        let agg = aggregate(&images);
        assert_eq!(agg.total_images, 2);
        assert!(agg.crops.is_empty());
        assert!(agg.infestations.is_empty());
    }

    #[test]
    fn mean_of_empty_list_is_an_error() {
        let stats = LabelStats::new("ghost");
        assert_eq!(
            stats.mean_confidence(),
            Err(StatsError::EmptyConfidenceAverage {
                label: "ghost".into()
            })
        );
    }
}
