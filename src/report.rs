use crate::aggregate::aggregate;
use crate::history::History;
use crate::schema::{CropEntry, InfestationEntry, SCHEMA_VERSION, SeverityReport};
use crate::severity::{Assessment, SeverityThresholds, assess};

pub const DEFAULT_CSV_FILE_NAME: &str = "crop_infestation_report.csv";

impl SeverityReport {
    /// Assemble a report, marking exactly the major infestation (if any).
    pub fn from_assessment(assessment: Assessment) -> Self {
        let major = assessment.major_infestation.clone();
        let infestation_breakdown = assessment
            .infestations
            .into_iter()
            .map(|i| InfestationEntry {
                is_major: major.as_deref() == Some(i.label.as_str()),
                label: i.label,
                kind: i.kind,
                count: i.count,
                prevalence_pct: i.prevalence_pct,
                avg_confidence_pct: i.avg_confidence_pct,
                severity: i.bucket,
            })
            .collect();
        let crops = assessment
            .crops
            .into_iter()
            .map(|c| CropEntry {
                label: c.label,
                count: c.count,
                avg_confidence: c.avg_confidence,
            })
            .collect();

        Self {
            version: SCHEMA_VERSION.to_string(),
            total_images: assessment.total_images,
            final_crop: assessment.final_crop,
            major_infestation: major,
            infestation_breakdown,
            crops,
            overall_damage_pct: assessment.overall_damage_pct,
        }
    }

    /// Three-section table: crop tracking, infestation tracking, final results.
    pub fn to_csv(&self) -> String {
        let mut rows: Vec<Vec<String>> = Vec::new();

        rows.push(vec!["Crop Tracking".into()]);
        rows.push(vec![
            "Crop Label".into(),
            "Count".into(),
            "Average Confidence".into(),
        ]);
        for crop in &self.crops {
            rows.push(vec![
                crop.label.clone(),
                crop.count.to_string(),
                fixed(crop.avg_confidence, 3),
            ]);
        }

        rows.push(Vec::new());
        rows.push(vec!["Infestation Tracking".into()]);
        rows.push(vec![
            "Infestation Label".into(),
            "Severity (%)".into(),
            "Avg Confidence (%)".into(),
            "Is Major".into(),
        ]);
        for entry in &self.infestation_breakdown {
            rows.push(vec![
                entry.label.clone(),
                fixed(Some(entry.prevalence_pct), 1),
                fixed(entry.avg_confidence_pct, 1),
                if entry.is_major { "Yes" } else { "No" }.into(),
            ]);
        }

        rows.push(Vec::new());
        rows.push(vec!["Final Results".into()]);
        rows.push(vec![
            "Final Crop".into(),
            self.final_crop.clone().unwrap_or_default(),
        ]);
        rows.push(vec![
            "Major Infestation".into(),
            self.major_infestation.clone().unwrap_or_default(),
        ]);
        rows.push(vec![
            "Estimated Crop Damage (%)".into(),
            fixed(self.overall_damage_pct, 1),
        ]);

        join_rows(&rows)
    }

    /// Compact per-infestation presence table.
    pub fn to_presence_csv(&self) -> String {
        let mut rows: Vec<Vec<String>> = vec![vec![
            "Label".into(),
            "Count".into(),
            "Percent Presence".into(),
            "Severity".into(),
        ]];
        for entry in &self.infestation_breakdown {
            rows.push(vec![
                entry.label.clone(),
                entry.count.to_string(),
                format!("{:.1}%", entry.prevalence_pct),
                entry.severity.to_string(),
            ]);
        }
        join_rows(&rows)
    }
}

/// Report for the current history, or `None` while it is not ready.
pub fn generate(history: &History, thresholds: &SeverityThresholds) -> Option<SeverityReport> {
    if !history.is_ready() {
        return None;
    }
    let aggregate = aggregate(history.aggregation_input());
    Some(SeverityReport::from_assessment(assess(&aggregate, thresholds)))
}

fn fixed(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => String::new(),
    }
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn join_rows(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in rows {
        let fields: Vec<String> = row.iter().map(|f| escape_field(f)).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}
