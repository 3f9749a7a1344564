use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::types::{ListingCard, RawListingRecord};

/// Why a card was left out of the dataset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("Title has no ', ' separator between name and year: {0:?}")]
    MissingNameYearSeparator(String),
    #[error("Title splits into {parts} parts instead of name and year: {text:?}")]
    MalformedNameYear { parts: usize, text: String },
    #[error("Title has an empty vehicle name: {0:?}")]
    EmptyName(String),
    #[error("Engine info has {segments} segments, expected 4 or 5: {text:?}")]
    UnsupportedEngineInfo { segments: usize, text: String },
    #[error("Price is empty after stripping currency markers: {0:?}")]
    MissingPrice(String),
    #[error("Price is not a whole number of rubles: {0:?}")]
    InvalidPrice(String),
}

pub type CardOutcome = Result<RawListingRecord, SkipReason>;

static SEL_TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span[data-ftid='bull_title']").expect("invalid selector: title")
});

static SEL_ENGINE_INFO: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.css-1fe6w6s.e162wx9x0").expect("invalid selector: engine info")
});

static SEL_PRICE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.css-1dv8s3l.eyvqki91").expect("invalid selector: price")
});

static SEL_LOCATION: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span[data-ftid='bull_location']").expect("invalid selector: location")
});

static RE_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+").expect("invalid regex: decimal"));

static RE_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("invalid regex: integer"));

static RE_MILEAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("invalid regex: mileage"));

const SEGMENT_SEPARATOR: &str = ", ";
const CURRENCY_GLYPH: char = '₽';
const NO_MILEAGE: &str = "0";

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Locates the four card collections on an index page and zips them by position.
///
/// Collections of unequal length are truncated to the shortest one.
pub fn parse_listing_page(html: &str) -> Vec<ListingCard> {
    let document = Html::parse_document(html);

    let titles: Vec<_> = document.select(&SEL_TITLE).collect();
    let infos: Vec<_> = document.select(&SEL_ENGINE_INFO).collect();
    let prices: Vec<_> = document.select(&SEL_PRICE).collect();
    let locations: Vec<_> = document.select(&SEL_LOCATION).collect();

    let lengths = [titles.len(), infos.len(), prices.len(), locations.len()];
    if lengths.iter().any(|&len| len != lengths[0]) {
        log::debug!(
            "Card collections are misaligned (titles {}, engine info {}, prices {}, locations {}), truncating",
            lengths[0],
            lengths[1],
            lengths[2],
            lengths[3]
        );
    }

    titles
        .into_iter()
        .zip(infos)
        .zip(prices)
        .zip(locations)
        .map(|(((title, info), price), location)| ListingCard {
            name_year: normalize_whitespace(&elem_text(title)),
            engine_info: normalize_whitespace(&elem_text(info)),
            price_text: elem_text(price).trim().to_string(),
            location_text: normalize_whitespace(&elem_text(location)),
        })
        .collect()
}

/// Decodes one card into a raw record, or says why it has to be skipped.
pub fn parse_card(card: &ListingCard) -> CardOutcome {
    let (name, year) = split_name_year(&card.name_year)?;
    let info = split_engine_info(&card.engine_info)?;

    let price = clean_price(&card.price_text);
    if price.is_empty() {
        return Err(SkipReason::MissingPrice(card.price_text.clone()));
    }
    if !price.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SkipReason::InvalidPrice(card.price_text.clone()));
    }

    let location = card.location_text.trim();

    Ok(RawListingRecord {
        name: Some(name),
        year: Some(year),
        engine_capacity: info.engine_capacity,
        horse_power: info.horse_power,
        fuel: Some(info.fuel),
        transmission: Some(info.transmission),
        drive_unit: Some(info.drive_unit),
        mileage: Some(info.mileage),
        location: (!location.is_empty()).then(|| location.to_string()),
        price: Some(price),
    })
}

fn split_name_year(text: &str) -> Result<(String, String), SkipReason> {
    if !text.contains(SEGMENT_SEPARATOR) {
        return Err(SkipReason::MissingNameYearSeparator(text.to_string()));
    }

    let parts: Vec<&str> = text.split(SEGMENT_SEPARATOR).collect();
    if parts.len() != 2 {
        return Err(SkipReason::MalformedNameYear {
            parts: parts.len(),
            text: text.to_string(),
        });
    }

    let name = parts[0].trim();
    if name.is_empty() {
        return Err(SkipReason::EmptyName(text.to_string()));
    }

    Ok((name.to_string(), parts[1].trim().to_string()))
}

#[derive(Debug, PartialEq, Eq)]
struct EngineInfo {
    engine_capacity: Option<String>,
    horse_power: Option<String>,
    fuel: String,
    transmission: String,
    drive_unit: String,
    mileage: String,
}

fn split_engine_info(text: &str) -> Result<EngineInfo, SkipReason> {
    let segments: Vec<&str> = text.split(SEGMENT_SEPARATOR).map(str::trim).collect();

    let (engine_hp, fuel, transmission, drive_unit, mileage) = match segments.as_slice() {
        [engine_hp, fuel, transmission, drive_unit, mileage] => (
            *engine_hp,
            *fuel,
            *transmission,
            *drive_unit,
            parse_mileage(mileage),
        ),
        [engine_hp, fuel, transmission, drive_unit] => (
            *engine_hp,
            *fuel,
            *transmission,
            *drive_unit,
            NO_MILEAGE.to_string(),
        ),
        _ => {
            return Err(SkipReason::UnsupportedEngineInfo {
                segments: segments.len(),
                text: text.to_string(),
            });
        }
    };

    let (engine_capacity, horse_power) = parse_engine_power(engine_hp);

    Ok(EngineInfo {
        engine_capacity,
        horse_power,
        fuel: fuel.to_string(),
        transmission: transmission.to_string(),
        drive_unit: drive_unit.to_string(),
        mileage,
    })
}

/// Splits "2.5 л (181 л.с.)" into capacity and horsepower.
///
/// Without a decimal token (electric cars) the capacity is absent and the first integer
/// is taken as horsepower.
fn parse_engine_power(text: &str) -> (Option<String>, Option<String>) {
    match RE_DECIMAL.find(text) {
        Some(capacity) => {
            let horse_power = RE_INTEGER
                .find(&text[capacity.end()..])
                .map(|m| m.as_str().to_string());
            (Some(capacity.as_str().to_string()), horse_power)
        }
        None => (
            None,
            RE_INTEGER.find(text).map(|m| m.as_str().to_string()),
        ),
    }
}

fn parse_mileage(text: &str) -> String {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    RE_MILEAGE
        .find(&compact)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| NO_MILEAGE.to_string())
}

/// Drops every whitespace character (non-breaking spaces included) and the currency glyph.
pub fn clean_price(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != CURRENCY_GLYPH)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn card(name_year: &str, engine_info: &str, price: &str, location: &str) -> ListingCard {
        ListingCard {
            name_year: name_year.to_string(),
            engine_info: engine_info.to_string(),
            price_text: price.to_string(),
            location_text: location.to_string(),
        }
    }

    #[test]
    fn test_parse_listing_page_from_fixture() {
        let html =
            fs::read_to_string("fixtures/listing_page.html").expect("Failed to read fixture");

        let cards = parse_listing_page(&html);

        assert_eq!(cards.len(), 4, "Extra title without a price must be truncated");
        assert_eq!(cards[0].name_year, "Toyota Camry, 2015");
        assert_eq!(
            cards[0].engine_info,
            "2.5 л (181 л.с.), бензин, автомат, передний, 45 000 км"
        );
        assert_eq!(cards[0].location_text, "Новосибирск");
        assert!(cards[0].price_text.contains('₽'));
    }

    #[test]
    fn test_parse_fixture_cards_skip_only_the_malformed_one() {
        let html =
            fs::read_to_string("fixtures/listing_page.html").expect("Failed to read fixture");

        let outcomes: Vec<CardOutcome> = parse_listing_page(&html).iter().map(parse_card).collect();

        let parsed: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
        let skipped: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().err()).collect();

        assert_eq!(parsed.len(), 3);
        assert_eq!(skipped.len(), 1);
        assert!(matches!(
            skipped[0],
            SkipReason::MissingNameYearSeparator(_)
        ));
    }

    #[test]
    fn test_parse_card_five_segments() {
        let record = parse_card(&card(
            "Toyota Camry, 2015",
            "2.5 л (181 л.с.), бензин, автомат, передний, 45 000 км",
            "1\u{a0}200\u{a0}000₽",
            "Москва",
        ))
        .expect("Card should parse");

        assert_eq!(record.name.as_deref(), Some("Toyota Camry"));
        assert_eq!(record.year.as_deref(), Some("2015"));
        assert_eq!(record.engine_capacity.as_deref(), Some("2.5"));
        assert_eq!(record.horse_power.as_deref(), Some("181"));
        assert_eq!(record.fuel.as_deref(), Some("бензин"));
        assert_eq!(record.transmission.as_deref(), Some("автомат"));
        assert_eq!(record.drive_unit.as_deref(), Some("передний"));
        assert_eq!(record.mileage.as_deref(), Some("45000"));
        assert_eq!(record.location.as_deref(), Some("Москва"));
        assert_eq!(record.price.as_deref(), Some("1200000"));
    }

    #[test]
    fn test_parse_card_four_segments_defaults_mileage() {
        let record = parse_card(&card(
            "Lada Granta, 2023",
            "1.6 л (90 л.с.), бензин, механика, передний",
            "900 000 ₽",
            "Тольятти",
        ))
        .expect("Card should parse");

        assert_eq!(record.mileage.as_deref(), Some("0"));
        assert_eq!(record.drive_unit.as_deref(), Some("передний"));
    }

    #[test]
    fn test_parse_card_electric_has_no_capacity() {
        let record = parse_card(&card(
            "Nissan Leaf, 2018",
            "150 л.с., электро, автомат, передний, 60 000 км",
            "1 100 000 ₽",
            "Владивосток",
        ))
        .expect("Card should parse");

        assert_eq!(record.engine_capacity, None);
        assert_eq!(record.horse_power.as_deref(), Some("150"));
    }

    #[test]
    fn test_parse_card_rejects_title_without_separator() {
        let outcome = parse_card(&card(
            "Toyota Camry 2015",
            "2.5 л (181 л.с.), бензин, автомат, передний, 45 000 км",
            "1 200 000 ₽",
            "Москва",
        ));
        assert_eq!(
            outcome,
            Err(SkipReason::MissingNameYearSeparator(
                "Toyota Camry 2015".to_string()
            ))
        );
    }

    #[test]
    fn test_parse_card_rejects_unknown_segment_counts() {
        for info in ["бензин, автомат, передний", "2.0 л, бензин, АКПП, 4WD, 10 км, лишнее"] {
            let outcome = parse_card(&card("BMW X5, 2010", info, "2 000 000 ₽", "Омск"));
            assert!(
                matches!(outcome, Err(SkipReason::UnsupportedEngineInfo { .. })),
                "Expected skip for {info:?}, got {outcome:?}"
            );
        }
    }

    #[test]
    fn test_parse_card_requires_price() {
        let outcome = parse_card(&card(
            "BMW X5, 2010",
            "3.0 л (249 л.с.), дизель, автомат, 4WD, 200 000 км",
            " ₽ ",
            "Омск",
        ));
        assert!(matches!(outcome, Err(SkipReason::MissingPrice(_))));
    }

    #[test]
    fn test_parse_card_rejects_non_numeric_price() {
        for price in ["по запросу", "договорная", "1 200 000,5 ₽"] {
            let outcome = parse_card(&card(
                "BMW X5, 2010",
                "3.0 л (249 л.с.), дизель, автомат, 4WD, 200 000 км",
                price,
                "Омск",
            ));
            assert_eq!(
                outcome,
                Err(SkipReason::InvalidPrice(price.to_string())),
                "Expected skip for {price:?}"
            );
        }
    }

    #[test]
    fn test_parse_mileage_without_digits() {
        assert_eq!(parse_mileage("новый"), "0");
        assert_eq!(parse_mileage("108\u{a0}058 км"), "108058");
    }

    #[test]
    fn test_parse_engine_power_capacity_only() {
        assert_eq!(parse_engine_power("2.5"), (Some("2.5".to_string()), None));
        assert_eq!(parse_engine_power("электро"), (None, None));
    }

    #[test]
    fn test_clean_price() {
        assert_eq!(clean_price("1\u{a0}200\u{a0}000₽"), "1200000");
        assert_eq!(clean_price(" 350 000 ₽"), "350000");
    }
}
