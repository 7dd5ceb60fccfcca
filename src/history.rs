use crate::schema::ImageResult;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How a [`History`] admits new images once it reaches capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AdmissionPolicy {
    /// Fill up to capacity, then reject appends until cleared.
    /// Ready exactly when full.
    #[default]
    FixedLock,
    /// Keep only the most recent `capacity` images, evicting the oldest.
    /// Ready once enough images in the window contain an infestation.
    SlidingWindow,
}

impl AdmissionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FixedLock => "fixed-lock",
            Self::SlidingWindow => "sliding-window",
        }
    }
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown admission policy '{0}' (expected fixed-lock or sliding-window)")]
pub struct UnknownPolicy(pub String);

impl FromStr for AdmissionPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fixed-lock" => Ok(Self::FixedLock),
            "sliding-window" => Ok(Self::SlidingWindow),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history is full ({capacity} images); clear it before adding more")]
    HistoryFull { capacity: usize },
}

/// Bounded, ordered sequence of per-image results.
///
/// Transitions never mutate in place: [`History::append`] and
/// [`History::clear`] return the next state and leave `self` untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    policy: AdmissionPolicy,
    capacity: usize,
    min_qualifying: usize,
    entries: VecDeque<ImageResult>,
}

impl History {
    /// Capacity and the qualification minimum are clamped to at least 1.
    pub fn new(policy: AdmissionPolicy, capacity: usize, min_qualifying: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            policy,
            capacity,
            min_qualifying: min_qualifying.max(1),
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn fixed_lock(capacity: usize) -> Self {
        Self::new(AdmissionPolicy::FixedLock, capacity, 1)
    }

    pub fn sliding_window(capacity: usize, min_qualifying: usize) -> Self {
        Self::new(AdmissionPolicy::SlidingWindow, capacity, min_qualifying)
    }

    pub fn append(&self, image: ImageResult) -> Result<Self, HistoryError> {
        let mut next = self.clone();
        match self.policy {
            AdmissionPolicy::FixedLock => {
                if self.entries.len() >= self.capacity {
                    return Err(HistoryError::HistoryFull {
                        capacity: self.capacity,
                    });
                }
                next.entries.push_back(image);
            }
            AdmissionPolicy::SlidingWindow => {
                next.entries.push_back(image);
                while next.entries.len() > next.capacity {
                    next.entries.pop_front();
                }
            }
        }
        Ok(next)
    }

    /// Empty history with the same policy. Always succeeds.
    pub fn clear(&self) -> Self {
        Self::new(self.policy, self.capacity, self.min_qualifying)
    }

    pub fn is_ready(&self) -> bool {
        match self.policy {
            AdmissionPolicy::FixedLock => self.entries.len() == self.capacity,
            AdmissionPolicy::SlidingWindow => self.qualifying_count() >= self.min_qualifying,
        }
    }

    /// Images containing at least one infestation detection.
    pub fn qualifying_count(&self) -> usize {
        self.entries.iter().filter(|i| i.has_infestation()).count()
    }

    /// The images a report is computed from: every image under the fixed lock,
    /// only the qualifying ones under the sliding window.
    pub fn aggregation_input(&self) -> Vec<&ImageResult> {
        match self.policy {
            AdmissionPolicy::FixedLock => self.entries.iter().collect(),
            AdmissionPolicy::SlidingWindow => self
                .entries
                .iter()
                .filter(|i| i.has_infestation())
                .collect(),
        }
    }

    /// Whether further appends would be rejected.
    pub fn is_locked(&self) -> bool {
        self.policy == AdmissionPolicy::FixedLock && self.entries.len() >= self.capacity
    }

    /// Human readable description of what is still missing before a report.
    pub fn readiness_hint(&self) -> String {
        match self.policy {
            AdmissionPolicy::FixedLock => format!(
                "{} of {} images collected; severity analysis starts after {} images",
                self.entries.len(),
                self.capacity,
                self.capacity
            ),
            AdmissionPolicy::SlidingWindow => format!(
                "{} of the last {} images show an infestation; severity analysis needs at least {}",
                self.qualifying_count(),
                self.entries.len(),
                self.min_qualifying
            ),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_qualifying(&self) -> usize {
        self.min_qualifying
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }
}
