//! Domain Mappings
//!
//! Static code ↔ label tables for every categorical value a model consumes
//! or emits. Codes are dense and start at 0, so a table is just an ordered
//! slice of labels; the reverse direction is built once on first use.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Immutable code → label table with a case-insensitive reverse lookup.
#[derive(Debug)]
pub struct DomainMapping {
    name: &'static str,
    labels: &'static [&'static str],
    reverse: Lazy<HashMap<String, usize>, fn() -> HashMap<String, usize>>,
}

impl DomainMapping {
    /// Mapping name, used in placeholder labels ("Unknown crop ...").
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Highest valid code.
    pub fn max_code(&self) -> i64 {
        self.labels.len() as i64 - 1
    }

    /// Canonical label for a code, if the code is in the table.
    pub fn label(&self, code: i64) -> Option<&'static str> {
        usize::try_from(code)
            .ok()
            .and_then(|i| self.labels.get(i))
            .copied()
    }

    /// Label for a code, or `"Unknown <name> (index: <code>)"` when the model
    /// emits a code the table does not know.
    pub fn label_or_placeholder(&self, code: i64) -> String {
        self.label(code)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unknown {} (index: {})", self.name, code))
    }

    /// Case-insensitive label → code.
    pub fn code_of(&self, label: &str) -> Option<usize> {
        self.reverse.get(&label.to_lowercase()).copied()
    }

    pub fn labels(&self) -> &'static [&'static str] {
        self.labels
    }

    /// Accepted labels joined for error messages.
    pub fn valid_labels(&self) -> String {
        self.labels.join(", ")
    }
}

fn reverse_of(labels: &'static [&'static str]) -> HashMap<String, usize> {
    labels
        .iter()
        .enumerate()
        .map(|(code, label)| (label.to_lowercase(), code))
        .collect()
}

macro_rules! domain_mapping {
    ($ident:ident, $name:expr, $labels:ident) => {
        pub static $ident: DomainMapping = DomainMapping {
            name: $name,
            labels: $labels,
            reverse: Lazy::new(|| reverse_of($labels)),
        };
    };
}

const CROP_LABELS: &[&str] = &[
    "apple",
    "banana",
    "blackgram",
    "chickpea",
    "coconut",
    "coffee",
    "cotton",
    "grapes",
    "jute",
    "kidneybeans",
    "lentil",
    "maize",
    "mango",
    "mothbeans",
    "mungbean",
    "muskmelon",
    "orange",
    "papaya",
    "pigeonpeas",
    "pomegranate",
    "rice",
    "watermelon",
];

const SOIL_TYPE_LABELS: &[&str] = &["Sandy", "Loamy", "Black", "Red", "Clayey"];

const CROP_TYPE_LABELS: &[&str] = &[
    "Maize",
    "Sugarcane",
    "Cotton",
    "Tobacco",
    "Paddy",
    "Barley",
    "Wheat",
    "Millets",
    "Oil seeds",
    "Pulses",
    "Ground Nuts",
];

const FERTILIZER_LABELS: &[&str] = &[
    "10-26-26", "14-35-14", "17-17-17", "20-20", "28-28", "DAP", "Urea",
];

/// PlantVillage classes, in the order the classifier was trained on.
/// Format: "Plant___Disease" or "Plant___healthy"
const DISEASE_LABELS: &[&str] = &[
    "Apple___Apple_scab",
    "Apple___Black_rot",
    "Apple___Cedar_apple_rust",
    "Apple___healthy",
    "Blueberry___healthy",
    "Cherry_(including_sour)___Powdery_mildew",
    "Cherry_(including_sour)___healthy",
    "Corn_(maize)___Cercospora_leaf_spot Gray_leaf_spot",
    "Corn_(maize)___Common_rust_",
    "Corn_(maize)___Northern_Leaf_Blight",
    "Corn_(maize)___healthy",
    "Grape___Black_rot",
    "Grape___Esca_(Black_Measles)",
    "Grape___Leaf_blight_(Isariopsis_Leaf_Spot)",
    "Grape___healthy",
    "Orange___Haunglongbing_(Citrus_greening)",
    "Peach___Bacterial_spot",
    "Peach___healthy",
    "Pepper,_bell___Bacterial_spot",
    "Pepper,_bell___healthy",
    "Potato___Early_blight",
    "Potato___Late_blight",
    "Potato___healthy",
    "Raspberry___healthy",
    "Soybean___healthy",
    "Squash___Powdery_mildew",
    "Strawberry___Leaf_scorch",
    "Strawberry___healthy",
    "Tomato___Bacterial_spot",
    "Tomato___Early_blight",
    "Tomato___Late_blight",
    "Tomato___Leaf_Mold",
    "Tomato___Septoria_leaf_spot",
    "Tomato___Spider_mites Two-spotted_spider_mite",
    "Tomato___Target_Spot",
    "Tomato___Tomato_Yellow_Leaf_Curl_Virus",
    "Tomato___Tomato_mosaic_virus",
    "Tomato___healthy",
];

domain_mapping!(CROPS, "crop", CROP_LABELS);
domain_mapping!(SOIL_TYPES, "soil_type", SOIL_TYPE_LABELS);
domain_mapping!(CROP_TYPES, "crop_type", CROP_TYPE_LABELS);
domain_mapping!(FERTILIZERS, "fertilizer", FERTILIZER_LABELS);
domain_mapping!(DISEASES, "disease", DISEASE_LABELS);

/// Human-facing form of a raw class label: `___` becomes `" - "`, then any
/// remaining `_` becomes a space.
pub fn display_label(raw: &str) -> String {
    raw.replace("___", " - ").replace('_', " ")
}

/// Healthy classes carry "healthy" in their label.
pub fn is_healthy_label(raw: &str) -> bool {
    raw.to_lowercase().contains("healthy")
}
