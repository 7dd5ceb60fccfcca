use crate::catalog::{LabelCatalog, LabelEntry};
use crate::history::{AdmissionPolicy, History};
use crate::report::DEFAULT_CSV_FILE_NAME;
use crate::severity::{SeverityThresholds, ThresholdError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "CROPSENSE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("history capacity must be at least 1")]
    ZeroCapacity,
    #[error("min_qualifying_images must be between 1 and the capacity ({capacity}), got {value}")]
    MinQualifyingOutOfRange { value: usize, capacity: usize },
    #[error(transparent)]
    Thresholds(#[from] ThresholdError),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub severity: SeverityThresholds,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub admission_policy: AdmissionPolicy,
    /// Only used by the sliding-window policy.
    pub min_qualifying_images: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub csv_file_name: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            admission_policy: AdmissionPolicy::FixedLock,
            min_qualifying_images: 2,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_file_name: DEFAULT_CSV_FILE_NAME.to_string(),
        }
    }
}

impl HistoryConfig {
    pub fn build(&self) -> History {
        History::new(
            self.admission_policy,
            self.capacity,
            self.min_qualifying_images,
        )
    }
}

impl Config {
    /// Load from the discovered config file, falling back to defaults when no
    /// file exists. A file that exists but is broken is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let history = &self.history;
        if history.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if history.admission_policy == AdmissionPolicy::SlidingWindow
            && !(1..=history.capacity).contains(&history.min_qualifying_images)
        {
            return Err(ConfigError::MinQualifyingOutOfRange {
                value: history.min_qualifying_images,
                capacity: history.capacity,
            });
        }
        self.severity.validate()?;
        Ok(())
    }

    /// Built-in catalog extended with the configured labels.
    pub fn catalog(&self) -> LabelCatalog {
        LabelCatalog::builtin().with_entries(&self.labels)
    }

    /// `$CROPSENSE_CONFIG`, else `<config dir>/cropsense/config.toml`.
    pub fn config_file_path() -> Option<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(explicit));
        }
        Self::config_dir().map(|mut path| {
            path.push("config.toml");
            path
        })
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("cropsense");
            path
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Category, InfestationType};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.history.capacity, 5);
        assert_eq!(config.history.admission_policy, AdmissionPolicy::FixedLock);
        assert_eq!(config.history.min_qualifying_images, 2);
        assert_eq!(config.severity, SeverityThresholds::default());
        assert_eq!(config.output.csv_file_name, "crop_infestation_report.csv");
        assert!(config.labels.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();

        assert!(toml_str.contains("[history]"));
        assert!(toml_str.contains("[severity]"));
        assert!(toml_str.contains("[output]"));

        assert!(toml_str.contains("capacity = 5"));
        assert!(toml_str.contains("admission_policy = \"fixed-lock\""));
        assert!(toml_str.contains("highly_severe = 90.0"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
[history]
capacity = 10
admission_policy = "sliding-window"
min_qualifying_images = 3

[severity]
highly_severe = 80.0
severe = 40.0
moderate = 20.0

[output]
csv_file_name = "field.csv"

[[labels]]
label = "locust"
category = "infestation"
type = "biotic"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.history.capacity, 10);
        assert_eq!(
            config.history.admission_policy,
            AdmissionPolicy::SlidingWindow
        );
        assert_eq!(config.history.min_qualifying_images, 3);
        assert_eq!(config.severity.highly_severe, 80.0);
        assert_eq!(config.output.csv_file_name, "field.csv");
        assert_eq!(
            config.catalog().lookup("Locust"),
            Some((Category::Infestation, InfestationType::Biotic))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_partial_deserialization() {
        let toml_str = r#"
[history]
admission_policy = "sliding-window"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.history.admission_policy,
            AdmissionPolicy::SlidingWindow
        );
        // These should use defaults since they're missing from the TOML
        assert_eq!(config.history.capacity, 5);
        assert_eq!(config.history.min_qualifying_images, 2);
        assert_eq!(config.severity.moderate, 30.0);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.history.capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCapacity)));

        let mut config = Config::default();
        config.history.admission_policy = AdmissionPolicy::SlidingWindow;
        config.history.min_qualifying_images = 6;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MinQualifyingOutOfRange {
                value: 6,
                capacity: 5
            })
        ));

        let mut config = Config::default();
        config.severity.severe = 95.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Thresholds(_))
        ));
    }

    #[test]
    fn test_history_config_builds_matching_history() {
        let config = HistoryConfig {
            capacity: 7,
            admission_policy: AdmissionPolicy::SlidingWindow,
            min_qualifying_images: 3,
        };
        let history = config.build();
        assert_eq!(history.capacity(), 7);
        assert_eq!(history.min_qualifying(), 3);
        assert_eq!(history.policy(), AdmissionPolicy::SlidingWindow);
    }
}
