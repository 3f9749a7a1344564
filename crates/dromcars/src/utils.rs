use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::NormalizedListingRecord;

fn unique<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    for value in values {
        if !seen.iter().any(|s| s == value) {
            seen.push(value.to_string());
        }
    }
    seen
}

/// Distinct labels per categorical column, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryOptions {
    pub brands: Vec<String>,
    pub models: Vec<String>,
    pub fuels: Vec<String>,
    pub transmissions: Vec<String>,
    pub drive_units: Vec<String>,
    pub locations: Vec<String>,
}

impl CategoryOptions {
    pub fn from_rows(rows: &[NormalizedListingRecord]) -> Self {
        Self {
            brands: unique(rows.iter().map(|r| r.brand.as_str())),
            models: unique(rows.iter().map(|r| r.model.as_str())),
            fuels: unique(rows.iter().map(|r| r.fuel.as_str())),
            transmissions: unique(rows.iter().map(|r| r.transmission.as_str())),
            drive_units: unique(rows.iter().map(|r| r.drive_unit.as_str())),
            locations: unique(rows.iter().map(|r| r.location.as_str())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DatasetStats {
    pub raw_rows: usize,
    pub clean_rows: usize,
    pub mean_price: Option<f64>,
    pub median_price: Option<f64>,
    pub by_transmission: BTreeMap<String, usize>,
    pub by_fuel: BTreeMap<String, usize>,
}

impl DatasetStats {
    pub fn from_rows(raw_rows: usize, rows: &[NormalizedListingRecord]) -> Self {
        let mut prices: Vec<f64> = rows.iter().map(|r| r.price).collect();
        prices.sort_by(f64::total_cmp);

        let mean_price =
            (!prices.is_empty()).then(|| prices.iter().sum::<f64>() / prices.len() as f64);
        let median_price = match prices.len() {
            0 => None,
            n if n % 2 == 1 => Some(prices[n / 2]),
            n => Some((prices[n / 2 - 1] + prices[n / 2]) / 2.0),
        };

        let mut by_transmission = BTreeMap::new();
        let mut by_fuel = BTreeMap::new();
        for row in rows {
            *by_transmission.entry(row.transmission.clone()).or_insert(0) += 1;
            *by_fuel.entry(row.fuel.clone()).or_insert(0) += 1;
        }

        DatasetStats {
            raw_rows,
            clean_rows: rows.len(),
            mean_price,
            median_price,
            by_transmission,
            by_fuel,
        }
    }
}

impl std::fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nStatistics:")?;
        writeln!(f, "  Raw rows:      {}", self.raw_rows)?;
        writeln!(
            f,
            "  Clean rows:    {} ({} dropped)",
            self.clean_rows,
            self.raw_rows.saturating_sub(self.clean_rows)
        )?;
        if let (Some(mean), Some(median)) = (self.mean_price, self.median_price) {
            writeln!(f, "  Mean price:    {:.1} тыс. ₽", mean)?;
            writeln!(f, "  Median price:  {:.1} тыс. ₽", median)?;
        }
        writeln!(f, "  Transmissions:")?;
        for (label, count) in &self.by_transmission {
            writeln!(f, "    {:<12} {}", label, count)?;
        }
        writeln!(f, "  Fuels:")?;
        for (label, count) in &self.by_fuel {
            writeln!(f, "    {:<12} {}", label, count)?;
        }
        Ok(())
    }
}
