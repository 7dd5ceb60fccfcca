//! Explicit analysis state: the image history plus the last computed report.
//!
//! Every transition takes `&self` and returns the next [`Session`], so the
//! caller owns exactly one value and decides when to replace it.

use crate::catalog::LabelCatalog;
use crate::config::Config;
use crate::history::{History, HistoryError};
use crate::inference::{Inference, InferenceError, InferenceResponse, ingest};
use crate::report::generate;
use crate::schema::{ImageResult, InvalidDetection, SeverityReport};
use crate::severity::SeverityThresholds;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    history: History,
    thresholds: SeverityThresholds,
    catalog: LabelCatalog,
    report: Option<SeverityReport>,
}

/// Result of feeding one inference response into a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    pub session: Session,
    pub rejected: Vec<InvalidDetection>,
}

impl Session {
    pub fn new(history: History, thresholds: SeverityThresholds, catalog: LabelCatalog) -> Self {
        Self {
            history,
            thresholds,
            catalog,
            report: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.history.build(), config.severity, config.catalog())
    }

    /// Add one image and recompute the report if the history is ready.
    pub fn append(&self, image: ImageResult) -> Result<Self, SessionError> {
        let history = match self.history.append(image) {
            Ok(history) => history,
            Err(err) => {
                tracing::warn!(capacity = self.history.capacity(), "{err}");
                return Err(err.into());
            }
        };
        let report = generate(&history, &self.thresholds);
        if report.is_some() && self.report.is_none() {
            tracing::info!(images = history.len(), "severity report ready");
        }
        Ok(Self {
            history,
            report,
            ..self.clone()
        })
    }

    /// Empty history, no report. Always succeeds.
    pub fn clear(&self) -> Self {
        tracing::info!(discarded = self.history.len(), "history cleared");
        Self {
            history: self.history.clear(),
            report: None,
            ..self.clone()
        }
    }

    /// Validate a response against the catalog and append the resulting image.
    pub fn ingest(&self, response: InferenceResponse) -> Result<Submitted, SessionError> {
        let ingested = ingest(response, &self.catalog);
        let session = self.append(ingested.image)?;
        Ok(Submitted {
            session,
            rejected: ingested.rejected,
        })
    }

    /// Run one image through the detection service and ingest the answer.
    pub fn submit(
        &self,
        service: &dyn Inference,
        payload: &[u8],
    ) -> Result<Submitted, SessionError> {
        if self.history.is_locked() {
            return Err(HistoryError::HistoryFull {
                capacity: self.history.capacity(),
            }
            .into());
        }
        let response = service.infer(payload).inspect_err(|err| {
            tracing::warn!(service = service.name(), "{err}");
        })?;
        self.ingest(response)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn report(&self) -> Option<&SeverityReport> {
        self.report.as_ref()
    }

    pub fn thresholds(&self) -> &SeverityThresholds {
        &self.thresholds
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }
}
