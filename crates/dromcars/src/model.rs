//! The boundary between the listing form and an externally trained price model.
//!
//! Categorical labels are turned into the integer codes the model was trained on through an
//! [`EncodingTable`]; numeric fields arrive as text and are coerced here. Any failure is a
//! recoverable [`PredictError`] so the caller can show [`INVALID_INPUT_MESSAGE`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Code used for labels the encoding table does not know.
pub const FALLBACK_CODE: i64 = 1;

pub const INVALID_INPUT_MESSAGE: &str = "Invalid input: check the hints for each field.";

/// Categorical columns in the order they appear in the model input.
pub const CATEGORIES: [&str; 6] = [
    "brand",
    "model",
    "fuel",
    "transmission",
    "drive_unit",
    "location",
];

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Asset not found: {}", .0.display())]
    MissingAsset(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed asset: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictError {
    #[error("Field '{0}' is empty")]
    EmptyField(&'static str),
    #[error("Field '{field}' is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("Model returned an unusable estimate: {0}")]
    InvalidEstimate(f64),
}

fn read_asset(path: &Path) -> Result<String, ModelError> {
    if !path.exists() {
        return Err(ModelError::MissingAsset(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Label-to-code maps per category, plus the models offered for each brand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodingTable {
    pub categories: BTreeMap<String, BTreeMap<String, i64>>,
    #[serde(default)]
    pub models_by_brand: BTreeMap<String, Vec<String>>,
}

impl EncodingTable {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let table: Self = serde_json::from_str(&read_asset(path)?)?;
        log::info!(
            "Loaded encoding table with {} categories from {}",
            table.categories.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn encode(&self, category: &str, label: &str) -> i64 {
        self.categories
            .get(category)
            .and_then(|codes| codes.get(label.trim()))
            .copied()
            .unwrap_or_else(|| {
                log::debug!("Unknown {} '{}', using fallback code", category, label);
                FALLBACK_CODE
            })
    }

    /// Valid labels of a category ordered by code, for populating a selector.
    pub fn values(&self, category: &str) -> Vec<&str> {
        let Some(codes) = self.categories.get(category) else {
            return Vec::new();
        };
        let mut values: Vec<_> = codes.iter().collect();
        values.sort_by(|(la, ca), (lb, cb)| ca.cmp(cb).then_with(|| la.cmp(lb)));
        values.into_iter().map(|(label, _)| label.as_str()).collect()
    }

    pub fn models_for(&self, brand: &str) -> &[String] {
        self.models_by_brand
            .get(brand)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// The listing form as typed by a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionForm {
    pub brand: String,
    pub model: String,
    pub year: String,
    pub engine_capacity: String,
    pub horse_power: String,
    pub fuel: String,
    pub transmission: String,
    pub drive_unit: String,
    pub mileage: String,
    pub location: String,
}

/// Feature vector in model order:
/// brand, model, year, engine_capacity, horse_power, fuel, transmission, drive_unit, mileage, location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelInput {
    pub features: [f64; 10],
}

fn coerce_number(field: &'static str, value: &str) -> Result<f64, PredictError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PredictError::EmptyField(field));
    }
    value
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| PredictError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

fn coerce_integer(field: &'static str, value: &str) -> Result<f64, PredictError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PredictError::EmptyField(field));
    }
    value
        .parse::<i64>()
        .map(|n| n as f64)
        .map_err(|_| PredictError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

impl PredictionForm {
    pub fn encode(&self, table: &EncodingTable) -> Result<ModelInput, PredictError> {
        let code = |category: &str, label: &str| table.encode(category, label) as f64;
        Ok(ModelInput {
            features: [
                code("brand", &self.brand),
                code("model", &self.model),
                coerce_integer("year", &self.year)?,
                coerce_number("engine_capacity", &self.engine_capacity)?,
                coerce_number("horse_power", &self.horse_power)?,
                code("fuel", &self.fuel),
                code("transmission", &self.transmission),
                code("drive_unit", &self.drive_unit),
                coerce_number("mileage", &self.mileage)?,
                code("location", &self.location),
            ],
        })
    }
}

/// A trained regressor that estimates price in thousands of currency units.
pub trait PriceModel {
    fn predict(&self, input: &ModelInput) -> Result<f64, PredictError>;
}

/// A serialized linear regressor: `intercept + Σ weights[i] * features[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPriceModel {
    pub intercept: f64,
    pub weights: [f64; 10],
}

impl LinearPriceModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let model = serde_json::from_str(&read_asset(path)?)?;
        log::info!("Loaded price model from {}", path.display());
        Ok(model)
    }
}

impl PriceModel for LinearPriceModel {
    fn predict(&self, input: &ModelInput) -> Result<f64, PredictError> {
        Ok(self
            .weights
            .iter()
            .zip(input.features.iter())
            .fold(self.intercept, |acc, (w, x)| acc + w * x))
    }
}

/// Encodes the form, runs the model and converts the estimate to whole currency units.
pub fn estimate_price<M: PriceModel + ?Sized>(
    model: &M,
    table: &EncodingTable,
    form: &PredictionForm,
) -> Result<u64, PredictError> {
    let input = form.encode(table)?;
    let estimate = model.predict(&input)?;
    if !estimate.is_finite() || estimate < 0.0 {
        return Err(PredictError::InvalidEstimate(estimate));
    }
    Ok((estimate * 1_000.0).round() as u64)
}
