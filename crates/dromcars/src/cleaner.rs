//! Batch normalization of the raw dataset.
//!
//! Every stage takes its rows by value and returns new rows; the stages run in a fixed
//! order because each relies on the shape the previous one produced.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::parser::clean_price;
use crate::types::{NormalizedListingRecord, RawListingRecord};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CleanError {
    #[error("Row {row}: column '{column}' is not a number: {value:?}")]
    InvalidNumber {
        row: usize,
        column: &'static str,
        value: String,
    },
}

/// Transmission labels that show up in `fuel` when the card columns shifted.
const FUEL_BLEED: [&str; 2] = ["автомат", "механика"];

/// Drive-unit labels that show up in `transmission` when the card columns shifted.
const TRANSMISSION_BLEED: [&str; 2] = ["4WD", "передний"];

const TRANSMISSION_LABELS: [(&str, &str); 4] = [
    ("механика", "МКПП"),
    ("автомат", "АКПП"),
    ("робот", "РКП"),
    ("вариатор", "CVT"),
];

const MISSING: &str = "0";

const SCALE: f64 = 1_000.0;

static RE_MILEAGE_SHAPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d[\d\s]*км\.?$").expect("invalid regex: mileage-shaped drive unit")
});

/// A raw row after the missing-value fill: every cell present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledRecord {
    pub name: String,
    pub year: String,
    pub engine_capacity: String,
    pub horse_power: String,
    pub fuel: String,
    pub transmission: String,
    pub drive_unit: String,
    pub mileage: String,
    pub location: String,
    pub price: String,
}

/// A filled row with numeric columns typed and `price`/`mileage` in thousands.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledRecord {
    pub name: String,
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

/// Runs all five stages over a raw dataset.
pub fn clean(raw: &[RawListingRecord]) -> Result<Vec<NormalizedListingRecord>, CleanError> {
    let rows = drop_corrupted(raw.to_vec());
    let rows = canonicalize_transmission(rows);
    let rows = fill_missing(rows);
    let rows = normalize_price(rows)?;
    let rows = split_name(rows);
    log::info!(
        "Cleaned dataset: {} of {} rows kept",
        rows.len(),
        raw.len()
    );
    Ok(rows)
}

fn is_one_of(cell: &Option<String>, labels: &[&str]) -> bool {
    cell.as_deref().is_some_and(|v| labels.contains(&v))
}

pub fn is_mileage_shaped(value: &str) -> bool {
    RE_MILEAGE_SHAPED.is_match(value.trim())
}

/// Stage 1: removes rows whose columns bled into each other during the scrape.
pub fn drop_corrupted(rows: Vec<RawListingRecord>) -> Vec<RawListingRecord> {
    let predicates: [fn(&RawListingRecord) -> bool; 3] = [
        |r| is_one_of(&r.fuel, &FUEL_BLEED),
        |r| is_one_of(&r.transmission, &TRANSMISSION_BLEED),
        |r| r.drive_unit.as_deref().is_some_and(is_mileage_shaped),
    ];

    let doomed: BTreeSet<usize> = predicates
        .iter()
        .flat_map(|pred| {
            rows.iter()
                .enumerate()
                .filter(move |&(_, row)| pred(row))
                .map(|(i, _)| i)
        })
        .collect();

    if !doomed.is_empty() {
        log::debug!("Dropping {} structurally corrupted rows", doomed.len());
    }

    rows.into_iter()
        .enumerate()
        .filter(|(i, _)| !doomed.contains(i))
        .map(|(_, row)| row)
        .collect()
}

pub fn canonical_transmission(label: &str) -> &str {
    TRANSMISSION_LABELS
        .iter()
        .find(|(raw, _)| *raw == label)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(label)
}

/// Stage 2: maps transmission labels to their abbreviations; unknown labels pass through.
pub fn canonicalize_transmission(rows: Vec<RawListingRecord>) -> Vec<RawListingRecord> {
    rows.into_iter()
        .map(|mut row| {
            row.transmission = row
                .transmission
                .map(|t| canonical_transmission(&t).to_string());
            row
        })
        .collect()
}

/// Stage 3: every absent cell becomes `"0"`, categorical columns included.
pub fn fill_missing(rows: Vec<RawListingRecord>) -> Vec<FilledRecord> {
    let fill = |cell: Option<String>| cell.unwrap_or_else(|| MISSING.to_string());
    rows.into_iter()
        .map(|row| FilledRecord {
            name: fill(row.name),
            year: fill(row.year),
            engine_capacity: fill(row.engine_capacity),
            horse_power: fill(row.horse_power),
            fuel: fill(row.fuel),
            transmission: fill(row.transmission),
            drive_unit: fill(row.drive_unit),
            mileage: fill(row.mileage),
            location: fill(row.location),
            price: fill(row.price),
        })
        .collect()
}

fn parse_number<T: FromStr>(row: usize, column: &'static str, value: &str) -> Result<T, CleanError> {
    value.trim().parse().map_err(|_| CleanError::InvalidNumber {
        row,
        column,
        value: value.to_string(),
    })
}

/// Stage 4: final price cleanup, numeric typing, and rescaling of `price` and `mileage`
/// to thousands. Row numbers in errors are positions in the already-filtered dataset.
pub fn normalize_price(rows: Vec<FilledRecord>) -> Result<Vec<ScaledRecord>, CleanError> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            let price: i64 = parse_number(i, "price", &clean_price(&row.price))?;
            let mileage: f64 = parse_number(i, "mileage", &row.mileage)?;
            Ok(ScaledRecord {
                year: parse_number(i, "year", &row.year)?,
                engine_capacity: parse_number(i, "engine_capacity", &row.engine_capacity)?,
                horse_power: parse_number(i, "horse_power", &row.horse_power)?,
                mileage: mileage / SCALE,
                price: price as f64 / SCALE,
                name: row.name,
                fuel: row.fuel,
                transmission: row.transmission,
                drive_unit: row.drive_unit,
                location: row.location,
            })
        })
        .collect()
}

/// Stage 5: splits the compound name into brand and model.
pub fn split_name(rows: Vec<ScaledRecord>) -> Vec<NormalizedListingRecord> {
    rows.into_iter()
        .map(|row| {
            let mut tokens = row.name.split_whitespace();
            let brand = tokens.next().unwrap_or_default().to_string();
            let model = tokens.collect::<Vec<_>>().join(" ");
            NormalizedListingRecord {
                brand,
                model,
                year: row.year,
                engine_capacity: row.engine_capacity,
                horse_power: row.horse_power,
                fuel: row.fuel,
                transmission: row.transmission,
                drive_unit: row.drive_unit,
                mileage: row.mileage,
                location: row.location,
                price: row.price,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_card;
    use crate::types::ListingCard;

    fn raw(
        name: &str,
        fuel: &str,
        transmission: &str,
        drive_unit: &str,
        mileage: &str,
        price: &str,
    ) -> RawListingRecord {
        RawListingRecord {
            name: Some(name.to_string()),
            year: Some("2015".to_string()),
            engine_capacity: Some("2.0".to_string()),
            horse_power: Some("150".to_string()),
            fuel: Some(fuel.to_string()),
            transmission: Some(transmission.to_string()),
            drive_unit: Some(drive_unit.to_string()),
            mileage: Some(mileage.to_string()),
            location: Some("Москва".to_string()),
            price: Some(price.to_string()),
        }
    }

    fn to_raw(row: &NormalizedListingRecord) -> RawListingRecord {
        RawListingRecord {
            name: Some(row.full_name()),
            year: Some(row.year.to_string()),
            engine_capacity: Some(row.engine_capacity.to_string()),
            horse_power: Some(row.horse_power.to_string()),
            fuel: Some(row.fuel.clone()),
            transmission: Some(row.transmission.clone()),
            drive_unit: Some(row.drive_unit.clone()),
            mileage: Some(row.mileage.to_string()),
            location: Some(row.location.clone()),
            price: Some((row.price as i64).to_string()),
        }
    }

    #[test]
    fn test_scenario_card_to_clean_row() {
        let record = parse_card(&ListingCard {
            name_year: "Toyota Camry, 2015".to_string(),
            engine_info: "2.5, Бензин, автомат, передний, 45 000 км".to_string(),
            price_text: "1\u{a0}200\u{a0}000₽".to_string(),
            location_text: "Москва".to_string(),
        })
        .expect("Card should parse");

        let rows = clean(&[record]).expect("Clean should succeed");
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.brand, "Toyota");
        assert_eq!(row.model, "Camry");
        assert_eq!(row.year, 2015);
        assert_eq!(row.engine_capacity, 2.5);
        assert_eq!(row.fuel, "Бензин");
        assert_eq!(row.transmission, "АКПП");
        assert_eq!(row.drive_unit, "передний");
        assert_eq!(row.mileage, 45.0);
        assert_eq!(row.price, 1200.0);
    }

    #[test]
    fn test_fuel_bleed_row_is_dropped_whatever_else_it_holds() {
        let rows = vec![
            raw("Kia Rio", "автомат", "АКПП", "передний", "30000", "1000000"),
            raw("Kia Rio", "бензин", "автомат", "передний", "30000", "1000000"),
        ];
        let kept = drop_corrupted(rows);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].fuel.as_deref(), Some("бензин"));
    }

    #[test]
    fn test_drop_corrupted_removes_every_bleed_pattern_once() {
        let rows = vec![
            raw("A a", "механика", "4WD", "передний", "1", "1"),
            raw("B b", "бензин", "передний", "4WD", "1", "1"),
            raw("C c", "бензин", "механика", "108 058 км", "0", "1"),
            raw("D d", "дизель", "механика", "задний", "1", "1"),
            raw("E e", "бензин", "4WD", "108\u{a0}058 км", "0", "1"),
        ];

        let kept = drop_corrupted(rows);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name.as_deref(), Some("D d"));
        for row in &kept {
            assert!(!is_one_of(&row.fuel, &FUEL_BLEED));
            assert!(!is_one_of(&row.transmission, &TRANSMISSION_BLEED));
            assert!(!row.drive_unit.as_deref().is_some_and(is_mileage_shaped));
        }
    }

    #[test]
    fn test_mileage_shape() {
        assert!(is_mileage_shaped("108 058 км"));
        assert!(is_mileage_shaped("45000 км"));
        assert!(!is_mileage_shaped("передний"));
        assert!(!is_mileage_shaped("4WD"));
    }

    #[test]
    fn test_canonicalize_transmission_is_idempotent() {
        let rows = vec![
            raw("A a", "бензин", "механика", "передний", "1", "1"),
            raw("B b", "бензин", "робот", "передний", "1", "1"),
            raw("C c", "бензин", "вариатор", "передний", "1", "1"),
            raw("D d", "бензин", "автомат", "передний", "1", "1"),
            raw("E e", "бензин", "гибрид", "передний", "1", "1"),
        ];

        let once = canonicalize_transmission(rows);
        let twice = canonicalize_transmission(once.clone());

        assert_eq!(once, twice);
        let labels: Vec<_> = once
            .iter()
            .map(|r| r.transmission.as_deref().unwrap())
            .collect();
        assert_eq!(labels, ["МКПП", "РКП", "CVT", "АКПП", "гибрид"]);
    }

    #[test]
    fn test_missing_categorical_cells_become_literal_zero() {
        let mut row = raw("Kia Rio", "бензин", "АКПП", "передний", "30000", "1000000");
        row.fuel = None;
        row.location = None;
        row.engine_capacity = None;

        let rows = clean(&[row]).expect("Clean should succeed");

        // The sentinel for a missing label is "0", not an empty string.
        assert_eq!(rows[0].fuel, "0");
        assert_eq!(rows[0].location, "0");
        assert_eq!(rows[0].engine_capacity, 0.0);
    }

    #[test]
    fn test_four_segment_card_has_zero_mileage_after_rescale() {
        let record = parse_card(&ListingCard {
            name_year: "Lada Granta, 2023".to_string(),
            engine_info: "1.6 л (90 л.с.), бензин, механика, передний".to_string(),
            price_text: "900 000 ₽".to_string(),
            location_text: "Тольятти".to_string(),
        })
        .expect("Card should parse");
        assert_eq!(record.mileage.as_deref(), Some("0"));

        let rows = clean(&[record]).expect("Clean should succeed");
        assert_eq!(rows[0].mileage, 0.0);
        assert_eq!(rows[0].transmission, "МКПП");
    }

    #[test]
    fn test_price_and_mileage_are_scaled_to_thousands() {
        let rows = vec![
            raw("A a", "бензин", "АКПП", "передний", "123456", "1\u{a0}250\u{a0}500₽"),
            raw("B b", "дизель", "МКПП", "4WD", "0", "999"),
        ];

        let scaled = normalize_price(fill_missing(rows)).expect("Should scale");

        assert_eq!(scaled[0].price, 1250.5);
        assert_eq!(scaled[0].mileage, 123.456);
        assert_eq!(scaled[1].price, 0.999);
        assert_eq!(scaled[1].mileage, 0.0);
    }

    #[test]
    fn test_unparseable_price_reports_row_and_column() {
        let rows = vec![
            raw("A a", "бензин", "АКПП", "передний", "1", "1000"),
            raw("B b", "бензин", "АКПП", "передний", "1", "договорная"),
        ];

        let err = normalize_price(fill_missing(rows)).unwrap_err();
        assert_eq!(
            err,
            CleanError::InvalidNumber {
                row: 1,
                column: "price",
                value: "договорная".to_string(),
            }
        );
    }

    #[test]
    fn test_name_split_is_lossless() {
        let rows = vec![
            raw("Mercedes-Benz GLE Coupe", "бензин", "АКПП", "4WD", "1", "1"),
            raw("Haval", "бензин", "РКП", "передний", "1", "1"),
            raw("Lada  2107", "бензин", "МКПП", "задний", "1", "1"),
        ];

        let split = split_name(normalize_price(fill_missing(rows)).unwrap());

        assert_eq!(split[0].brand, "Mercedes-Benz");
        assert_eq!(split[0].model, "GLE Coupe");
        assert_eq!(split[0].full_name(), "Mercedes-Benz GLE Coupe");
        assert_eq!(split[1].brand, "Haval");
        assert!(split[1].model.is_empty());
        assert_eq!(split[2].model, "2107");
    }

    #[test]
    fn test_clean_rerun_on_own_output_drops_nothing() {
        let rows = vec![
            raw("Toyota Camry", "бензин", "автомат", "передний", "45000", "1200000"),
            raw("Kia Rio", "механика", "АКПП", "передний", "30000", "1000000"),
            raw("Lada Vesta", "бензин", "механика", "передний", "10000", "1100000"),
            raw("Subaru Forester", "бензин", "вариатор", "4WD", "80000", "2100000"),
        ];

        let first = clean(&rows).unwrap();
        assert_eq!(first.len(), 3);

        let replay: Vec<_> = first.iter().map(to_raw).collect();
        let second = clean(&replay).unwrap();

        assert_eq!(second.len(), first.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.brand, b.brand);
            assert_eq!(a.model, b.model);
            assert_eq!(a.transmission, b.transmission);
            assert_eq!(a.fuel, b.fuel);
            assert_eq!(a.drive_unit, b.drive_unit);
        }
    }
}
