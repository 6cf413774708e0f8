use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

use super::validate::{check_date, ValidationRules};
use crate::source::RawRecord;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Outcome of parsing a sale date cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleDate {
    Missing,
    Malformed,
    /// Parsed, but the year falls outside the accepted window.
    OutOfRange(NaiveDate),
    Valid(NaiveDate),
}

impl SaleDate {
    pub fn is_valid(&self) -> bool {
        matches!(self, SaleDate::Valid(_))
    }

    /// The calendar date whenever the text parsed, in or out of range.
    pub fn parsed(&self) -> Option<NaiveDate> {
        match self {
            SaleDate::Valid(d) | SaleDate::OutOfRange(d) => Some(*d),
            SaleDate::Missing | SaleDate::Malformed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub raw: RawRecord,
    pub price: Option<Decimal>,
    pub sale_date: SaleDate,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

/// Largest magnitude a `DECIMAL(15,2)` column holds: 13 integer digits.
const PRICE_LIMIT: i64 = 10_000_000_000_000;

/// Parse `€1,234.50` style text into a 2 dp decimal.
///
/// Only the euro sign and comma thousands separators are stripped; anything
/// else that is not a plain decimal literal yields `None`, as does a value
/// with more than 13 integer digits.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^\s*€?\s*(-?\s*€?\s*[0-9][0-9,]*(?:\.[0-9]+)?)\s*$").unwrap()
    });
    let caps = re.captures(raw)?;
    let digits: String = caps
        .get(1)?
        .as_str()
        .chars()
        .filter(|c| !matches!(c, ',' | '€') && !c.is_whitespace())
        .collect();
    let value = Decimal::from_str(&digits)
        .ok()?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    (value.abs() < Decimal::from(PRICE_LIMIT)).then_some(value)
}

pub fn parse_sale_date(raw: Option<&str>, rules: &ValidationRules) -> SaleDate {
    match raw.map(str::trim) {
        None | Some("") => SaleDate::Missing,
        Some(text) => check_date(text, rules),
    }
}

/// Non-finite values are treated like null; zero is a value.
pub fn parse_coordinate(raw: Option<f64>) -> Option<f64> {
    raw.filter(|v| v.is_finite())
}

pub fn normalize(raw: RawRecord, rules: &ValidationRules) -> NormalizedRecord {
    let price = raw.price.as_deref().and_then(parse_price);
    let sale_date = parse_sale_date(raw.date.as_deref(), rules);
    let longitude = parse_coordinate(raw.longitude);
    let latitude = parse_coordinate(raw.latitude);
    NormalizedRecord {
        raw,
        price,
        sale_date,
        longitude,
        latitude,
    }
}

#[cfg(feature = "rayon")]
pub fn normalize_all(records: Vec<RawRecord>, rules: &ValidationRules) -> Vec<NormalizedRecord> {
    records
        .into_par_iter()
        .map(|r| normalize(r, rules))
        .collect()
}

#[cfg(not(feature = "rayon"))]
pub fn normalize_all(records: Vec<RawRecord>, rules: &ValidationRules) -> Vec<NormalizedRecord> {
    records.into_iter().map(|r| normalize(r, rules)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn price_strips_symbol_and_separators() {
        assert_eq!(parse_price("€250,000.00"), Some(dec("250000.00")));
        assert_eq!(parse_price("€1,234,567.891"), Some(dec("1234567.89")));
        assert_eq!(parse_price("  €95,000 "), Some(dec("95000")));
        assert_eq!(parse_price("180500.5"), Some(dec("180500.50")));
    }

    #[test]
    fn price_rounds_half_away_from_zero() {
        assert_eq!(parse_price("€0.125"), Some(dec("0.13")));
        assert_eq!(parse_price("€10.005"), Some(dec("10.01")));
    }

    #[test]
    fn zero_price_is_a_value_not_a_failure() {
        assert_eq!(parse_price("€0.00"), Some(Decimal::ZERO));
        assert_eq!(parse_price("-€5.00"), Decimal::from_i32(-5));
    }

    #[test]
    fn malformed_price_is_absent() {
        assert_eq!(parse_price("not available"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("€"), None);
        assert_eq!(parse_price("£100"), None);
        assert_eq!(parse_price("1.2.3"), None);
    }

    #[test]
    fn price_is_limited_to_thirteen_integer_digits() {
        assert_eq!(
            parse_price("€9,999,999,999,999.99"),
            Some(dec("9999999999999.99"))
        );
        assert_eq!(parse_price("€10,000,000,000,000.00"), None);
        assert_eq!(parse_price("-€10,000,000,000,000"), None);
        assert_eq!(parse_price("12345678901234567890123456"), None);
    }

    #[test]
    fn sale_date_tri_state() {
        let rules = ValidationRules::default();
        let d = NaiveDate::from_ymd_opt(2022, 3, 15).unwrap();
        assert_eq!(parse_sale_date(Some("15/03/2022"), &rules), SaleDate::Valid(d));
        assert_eq!(parse_sale_date(None, &rules), SaleDate::Missing);
        assert_eq!(parse_sale_date(Some("  "), &rules), SaleDate::Missing);
        assert_eq!(parse_sale_date(Some("2022-03-15"), &rules), SaleDate::Malformed);
        assert_eq!(parse_sale_date(Some("31/02/2031"), &rules), SaleDate::Malformed);
        let old = NaiveDate::from_ymd_opt(2009, 12, 12).unwrap();
        assert_eq!(
            parse_sale_date(Some("12/12/2009"), &rules),
            SaleDate::OutOfRange(old)
        );
    }

    #[test]
    fn coordinates_distinguish_null_from_zero() {
        assert_eq!(parse_coordinate(None), None);
        assert_eq!(parse_coordinate(Some(f64::NAN)), None);
        assert_eq!(parse_coordinate(Some(f64::INFINITY)), None);
        assert_eq!(parse_coordinate(Some(0.0)), Some(0.0));
        assert_eq!(parse_coordinate(Some(-6.25)), Some(-6.25));
    }

    #[test]
    fn normalize_all_preserves_order() {
        let rules = ValidationRules::default();
        let rows: Vec<RawRecord> = (0..50)
            .map(|i| RawRecord {
                line: i + 2,
                price: Some(format!("€{},000.00", i + 1)),
                ..Default::default()
            })
            .collect();
        let out = normalize_all(rows, &rules);
        let lines: Vec<u64> = out.iter().map(|r| r.raw.line).collect();
        assert_eq!(lines, (2..52).collect::<Vec<_>>());
        assert_eq!(out[0].price, Some(dec("1000.00")));
        assert_eq!(out[0].sale_date, SaleDate::Missing);
    }
}
