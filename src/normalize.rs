//! Input Normalizer/Validator
//!
//! Turns loosely-typed JSON payloads into the fixed numeric layout each
//! model expects. Payloads are only ever borrowed; every normalized value
//! lives in a fresh features struct.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ValidationError;
use crate::mappings::{DomainMapping, CROP_TYPES, SOIL_TYPES};

type Result<T> = std::result::Result<T, ValidationError>;

/// Crop model fields, in feature-vector order.
pub const CROP_FIELDS: [&str; 7] = ["n", "p", "k", "temp", "humidity", "ph", "rainfall"];

/// Fertilizer model fields, in feature-vector order.
pub const FERTILIZER_FIELDS: [&str; 8] = [
    "temp",
    "humidity",
    "moisture",
    "soil_type",
    "crop_type",
    "nitrogen",
    "potassium",
    "phosphorus",
];

/// Accepted nutrient ranges for the fertilizer model (inclusive).
pub const NITROGEN_RANGE: (i64, i64) = (4, 42);
pub const POTASSIUM_RANGE: (i64, i64) = (0, 19);
pub const PHOSPHORUS_RANGE: (i64, i64) = (0, 42);

/// Normalized crop recommendation input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropFeatures {
    pub n: f32,
    pub p: f32,
    pub k: f32,
    pub temp: f32,
    pub humidity: f32,
    pub ph: f32,
    pub rainfall: f32,
}

impl CropFeatures {
    /// `[n, p, k, temp, humidity, ph, rainfall]`
    pub fn to_vector(&self) -> [f32; 7] {
        [
            self.n,
            self.p,
            self.k,
            self.temp,
            self.humidity,
            self.ph,
            self.rainfall,
        ]
    }
}

/// Normalized fertilizer recommendation input. Categorical fields are
/// always canonical codes here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FertilizerFeatures {
    pub temp: f32,
    pub humidity: f32,
    pub moisture: f32,
    pub soil_type: usize,
    pub crop_type: usize,
    pub nitrogen: i64,
    pub potassium: i64,
    pub phosphorus: i64,
}

impl FertilizerFeatures {
    /// `[temp, humidity, moisture, soil_type, crop_type, nitrogen, potassium, phosphorus]`
    pub fn to_vector(&self) -> [f32; 8] {
        [
            self.temp,
            self.humidity,
            self.moisture,
            self.soil_type as f32,
            self.crop_type as f32,
            self.nitrogen as f32,
            self.potassium as f32,
            self.phosphorus as f32,
        ]
    }

    /// The normalized copy rendered back as a JSON object, with label
    /// strings replaced by their codes.
    pub fn normalized_payload(&self) -> Value {
        serde_json::json!({
            "temp": self.temp,
            "humidity": self.humidity,
            "moisture": self.moisture,
            "soil_type": self.soil_type,
            "crop_type": self.crop_type,
            "nitrogen": self.nitrogen,
            "potassium": self.potassium,
            "phosphorus": self.phosphorus,
        })
    }
}

/// A categorical field as the client sent it: a label or a code.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoricalInput {
    Label(String),
    Code(i64),
}

impl CategoricalInput {
    pub fn from_json(field: &str, value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(CategoricalInput::Label(s.clone())),
            Value::Number(n) => {
                if let Some(code) = n.as_i64() {
                    Ok(CategoricalInput::Code(code))
                } else {
                    match n.as_f64() {
                        Some(f) if f.is_finite() => Ok(CategoricalInput::Code(f.trunc() as i64)),
                        _ => Err(ValidationError::InvalidValue {
                            field: field.to_string(),
                        }),
                    }
                }
            }
            _ => Err(ValidationError::InvalidValue {
                field: field.to_string(),
            }),
        }
    }
}

/// Resolve a categorical input to its canonical code. Labels match
/// case-insensitively; codes must fall inside the table.
pub fn resolve_categorical(
    field: &str,
    input: &CategoricalInput,
    mapping: &DomainMapping,
) -> Result<usize> {
    match input {
        CategoricalInput::Label(label) => {
            mapping
                .code_of(label)
                .ok_or_else(|| ValidationError::UnknownLabel {
                    field: field.to_string(),
                    value: label.clone(),
                    valid: mapping.valid_labels(),
                })
        }
        CategoricalInput::Code(code) => {
            if (0..=mapping.max_code()).contains(code) {
                Ok(*code as usize)
            } else {
                Err(ValidationError::OutOfRange {
                    field: field.to_string(),
                    min: 0,
                    max: mapping.max_code(),
                })
            }
        }
    }
}

/// Fails on the first field in `fields` that is absent or null.
pub fn require_fields<'a>(payload: &'a Value, fields: &[&str]) -> Result<&'a Map<String, Value>> {
    let object = payload.as_object().ok_or(ValidationError::NotAnObject)?;
    for field in fields {
        match object.get(*field) {
            None | Some(Value::Null) => {
                debug!(field = %field, "Rejecting payload with missing field");
                return Err(ValidationError::MissingField(field.to_string()));
            }
            Some(_) => {}
        }
    }
    Ok(object)
}

fn float_field(object: &Map<String, Value>, field: &str) -> Result<f32> {
    let invalid = || ValidationError::InvalidNumber {
        field: field.to_string(),
    };
    let value = match object.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    // Finite f64 values can still overflow f32
    match value.map(|v| v as f32) {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(invalid()),
    }
}

fn int_field(object: &Map<String, Value>, field: &str) -> Result<i64> {
    let value = match object.get(field) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    value.ok_or_else(|| ValidationError::InvalidNumber {
        field: field.to_string(),
    })
}

fn check_range(field: &str, value: i64, (min, max): (i64, i64)) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        })
    }
}

/// Validate a crop recommendation payload.
///
/// Only presence and numeric type are checked; agronomic plausibility of
/// the values is left to the caller.
pub fn validate_crop_input(payload: &Value) -> Result<CropFeatures> {
    let object = require_fields(payload, &CROP_FIELDS)?;

    Ok(CropFeatures {
        n: float_field(object, "n")?,
        p: float_field(object, "p")?,
        k: float_field(object, "k")?,
        temp: float_field(object, "temp")?,
        humidity: float_field(object, "humidity")?,
        ph: float_field(object, "ph")?,
        rainfall: float_field(object, "rainfall")?,
    })
}

/// Validate and normalize a fertilizer recommendation payload.
///
/// `soil_type` and `crop_type` take either a label (any case) or a code.
/// Nutrients are coerced to integers and range-checked.
pub fn validate_fertilizer_input(payload: &Value) -> Result<FertilizerFeatures> {
    let object = require_fields(payload, &FERTILIZER_FIELDS)?;

    let soil_type = resolve_categorical(
        "soil_type",
        &CategoricalInput::from_json("soil_type", &object["soil_type"])?,
        &SOIL_TYPES,
    )?;
    let crop_type = resolve_categorical(
        "crop_type",
        &CategoricalInput::from_json("crop_type", &object["crop_type"])?,
        &CROP_TYPES,
    )?;

    let nitrogen = int_field(object, "nitrogen")?;
    let potassium = int_field(object, "potassium")?;
    let phosphorus = int_field(object, "phosphorus")?;
    check_range("nitrogen", nitrogen, NITROGEN_RANGE)?;
    check_range("potassium", potassium, POTASSIUM_RANGE)?;
    check_range("phosphorus", phosphorus, PHOSPHORUS_RANGE)?;

    Ok(FertilizerFeatures {
        temp: float_field(object, "temp")?,
        humidity: float_field(object, "humidity")?,
        moisture: float_field(object, "moisture")?,
        soil_type,
        crop_type,
        nitrogen,
        potassium,
        phosphorus,
    })
}
