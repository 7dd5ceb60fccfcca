use crate::schema::{Category, InfestationType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Catalog key for a raw class name: trimmed, lowercased, inner whitespace
/// collapsed to a single space.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One catalog row as it appears in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelEntry {
    pub label: String,
    pub category: Category,
    #[serde(rename = "type", default)]
    pub kind: InfestationType,
}

/// Classification of known model class names.
///
/// Consulted when the inference service reports a detection without a usable
/// category. Entries are keyed by [`normalize_label`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelCatalog {
    entries: HashMap<String, (Category, InfestationType)>,
}

const CROPS: &[&str] = &[
    "paddy", "chilli", "soyabean", "cotton", "maize", "ground", "rice",
];

// Misspellings are kept because deployed models emit them as class names.
const BIOTIC_INFESTATIONS: &[&str] = &[
    "armywarm",
    "armyworm",
    "arymworm",
    "rice stem borer",
    "rice stem borar",
    "brown planthopper",
    "brown spot",
    "blast",
    "bacterial leaf blight",
    "bacterial leaf strike",
    "bakana disease",
    "rice tungro disease",
    "rice gall midge",
    "gall midge (orseolia oryzae)",
    "green leafhopper (nephotettix virescens)",
    "green leaf hoper",
    "rice gundhi bug (leptocorisa acuta)",
    "rice hispa (dicladispa armigera)",
    "rice root-knot nematode (meloidogyne graminicola)",
    "sheath blight (rhizoctonia solani)",
    "grassy stunt virus",
    "weed",
    "echinochloa crus-galli (barnyard grass)",
    "leptochloa chinensis (sprangletop)",
    "monochoria vaginalis (pickerelweed)",
];

impl LabelCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in rice/field-crop catalog.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for label in CROPS {
            catalog.insert(label, Category::Crop, InfestationType::Unknown);
        }
        for label in BIOTIC_INFESTATIONS {
            catalog.insert(label, Category::Infestation, InfestationType::Biotic);
        }
        catalog
    }

    pub fn insert(&mut self, label: &str, category: Category, kind: InfestationType) {
        self.entries
            .insert(normalize_label(label), (category, kind));
    }

    pub fn with_entries<'a>(mut self, entries: impl IntoIterator<Item = &'a LabelEntry>) -> Self {
        for entry in entries {
            self.insert(&entry.label, entry.category, entry.kind);
        }
        self
    }

    pub fn lookup(&self, label: &str) -> Option<(Category, InfestationType)> {
        self.entries.get(&normalize_label(label)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by category, then label.
    pub fn entries(&self) -> Vec<LabelEntry> {
        let mut out: Vec<LabelEntry> = self
            .entries
            .iter()
            .map(|(label, (category, kind))| LabelEntry {
                label: label.clone(),
                category: *category,
                kind: *kind,
            })
            .collect();
        out.sort_by(|a, b| {
            a.category
                .as_str()
                .cmp(b.category.as_str())
                .then_with(|| a.label.cmp(&b.label))
        });
        out
    }
}
