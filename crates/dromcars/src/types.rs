use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Column order of the raw dataset file.
pub const RAW_COLUMNS: [&str; 10] = [
    "name",
    "year",
    "engine_capacity",
    "horse_power",
    "fuel",
    "transmission",
    "drive_unit",
    "mileage",
    "location",
    "price",
];

/// Column order of the cleaned dataset.
pub const NORMALIZED_COLUMNS: [&str; 11] = [
    "brand",
    "model",
    "year",
    "engine_capacity",
    "horse_power",
    "fuel",
    "transmission",
    "drive_unit",
    "mileage",
    "location",
    "price",
];

/// Text fragments of one listing card, aligned by position on the index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingCard {
    pub name_year: String,
    pub engine_info: String,
    pub price_text: String,
    pub location_text: String,
}

/// One scraped row as persisted by the writer. Any cell may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListingRecord {
    pub name: Option<String>,
    pub year: Option<String>,
    #[serde(alias = "engin_capacity")]
    pub engine_capacity: Option<String>,
    pub horse_power: Option<String>,
    pub fuel: Option<String>,
    pub transmission: Option<String>,
    pub drive_unit: Option<String>,
    #[serde(alias = "millage")]
    pub mileage: Option<String>,
    pub location: Option<String>,
    pub price: Option<String>,
}

impl RawListingRecord {
    pub fn to_csv_record(&self) -> [&str; 10] {
        [
            &self.name,
            &self.year,
            &self.engine_capacity,
            &self.horse_power,
            &self.fuel,
            &self.transmission,
            &self.drive_unit,
            &self.mileage,
            &self.location,
            &self.price,
        ]
        .map(|cell| cell.as_deref().unwrap_or(""))
    }
}

impl Display for RawListingRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cell = |v: &Option<String>| v.clone().unwrap_or_else(|| "—".to_string());
        write!(
            f,
            "{}, {} — {}",
            cell(&self.name),
            cell(&self.year),
            cell(&self.price)
        )
    }
}

/// A cleaned, typed row. `price` and `mileage` are in thousands.
///
/// Categorical columns that were missing in the raw data hold the literal `"0"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedListingRecord {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub engine_capacity: f64,
    pub horse_power: f64,
    pub fuel: String,
    pub transmission: String,
    pub drive_unit: String,
    pub mileage: f64,
    pub location: String,
    pub price: f64,
}

impl NormalizedListingRecord {
    /// `brand model`, trimmed. Reconstructs the compound name the row was split from.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.brand, self.model).trim().to_string()
    }
}

impl Display for NormalizedListingRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) {} л, {} л.с., {}, {}, {}, {} тыс. км, {} — {} тыс. ₽",
            self.full_name(),
            self.year,
            self.engine_capacity,
            self.horse_power,
            self.fuel,
            self.transmission,
            self.drive_unit,
            self.mileage,
            self.location,
            self.price
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_csv_cells_follow_column_order() {
        let record = RawListingRecord {
            name: Some("Toyota Camry".to_string()),
            year: Some("2015".to_string()),
            engine_capacity: None,
            price: Some("1200000".to_string()),
            ..Default::default()
        };

        let cells = record.to_csv_record();
        assert_eq!(cells.len(), RAW_COLUMNS.len());
        assert_eq!(cells[0], "Toyota Camry");
        assert_eq!(cells[1], "2015");
        assert_eq!(cells[2], "");
        assert_eq!(cells[9], "1200000");
    }

    #[test]
    fn test_full_name_without_model() {
        let record = NormalizedListingRecord {
            brand: "Haval".to_string(),
            model: String::new(),
            year: 2021,
            engine_capacity: 1.5,
            horse_power: 150.0,
            fuel: "бензин".to_string(),
            transmission: "РКП".to_string(),
            drive_unit: "передний".to_string(),
            mileage: 30.0,
            location: "Москва".to_string(),
            price: 1800.0,
        };
        assert_eq!(record.full_name(), "Haval");
    }
}
