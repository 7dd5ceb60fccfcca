pub mod detection;
pub mod report;

// Re-export commonly used types
pub use detection::{
    Category, Detection, ImageResult, InfestationType, InvalidDetection, InvalidReason,
};
pub use report::{CropEntry, InfestationEntry, SeverityReport};

// Bumped whenever the serialized report layout changes
pub const SCHEMA_VERSION: &str = "0.1.0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_version_constant() {
        assert_eq!(SCHEMA_VERSION, "0.1.0");
    }

    #[test]
    fn json_schema_generates() {
        let schema = schemars::schema_for!(SeverityReport);
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("SeverityReport"));
        assert!(json.contains("infestation_breakdown"));
    }
}
