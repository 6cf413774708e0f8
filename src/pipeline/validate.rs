//! Inclusion predicates and the validation summary.
//!
//! Every record is evaluated exactly once by [`evaluate`]; the accepted
//! partition and the [`ValidationSummary`] are both folded from those
//! verdicts, so the filter and the reported counts cannot disagree.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::normalize::{NormalizedRecord, SaleDate};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Default for BoundingBox {
    /// Approximate extent of the island of Ireland.
    fn default() -> Self {
        BoundingBox {
            min_lon: -10.5,
            max_lon: -5.5,
            min_lat: 51.4,
            max_lat: 55.4,
        }
    }
}

impl BoundingBox {
    /// Inclusive on every edge.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.min_lon..=self.max_lon).contains(&lon) && (self.min_lat..=self.max_lat).contains(&lat)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    pub bbox: BoundingBox,
    /// chrono format string for the sale date column.
    pub date_format: String,
    pub min_year: i32,
    pub max_year: i32,
    /// Reporting-only: dates with a later year are counted in the summary.
    pub cutoff_year: i32,
}

impl Default for ValidationRules {
    fn default() -> Self {
        ValidationRules {
            bbox: BoundingBox::default(),
            date_format: "%d/%m/%Y".to_string(),
            min_year: 2010,
            max_year: 2030,
            cutoff_year: 2025,
        }
    }
}

/// The single date rule, shared by normalization and the post-write audit.
pub fn check_date(text: &str, rules: &ValidationRules) -> SaleDate {
    match NaiveDate::parse_from_str(text.trim(), &rules.date_format) {
        Ok(d) if (rules.min_year..=rules.max_year).contains(&d.year()) => SaleDate::Valid(d),
        Ok(d) => SaleDate::OutOfRange(d),
        Err(_) => SaleDate::Malformed,
    }
}

pub fn coordinates_ok(lon: Option<f64>, lat: Option<f64>, rules: &ValidationRules) -> bool {
    match (lon, lat) {
        (Some(lon), Some(lat)) => rules.bbox.contains(lon, lat),
        _ => false,
    }
}

pub fn price_ok(price: Option<Decimal>) -> bool {
    price.is_some_and(|p| p > Decimal::ZERO)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub coordinates: bool,
    pub date: bool,
    pub price: bool,
}

impl Verdict {
    pub fn accepted(&self) -> bool {
        self.coordinates && self.date && self.price
    }
}

pub fn evaluate(record: &NormalizedRecord, rules: &ValidationRules) -> Verdict {
    Verdict {
        coordinates: coordinates_ok(record.longitude, record.latitude, rules),
        date: record.sale_date.is_valid(),
        price: price_ok(record.price),
    }
}

/// Aggregate counts over every source row, accepted or not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    pub total: usize,
    pub accepted: usize,
    pub invalid_dates: usize,
    /// Lexicographic min/max of the raw date text.
    pub min_date: Option<String>,
    pub max_date: Option<String>,
    /// Rows whose date parses and whose year exceeds the cutoff.
    pub past_cutoff: usize,
    pub rejected_coordinates: usize,
    pub rejected_prices: usize,
}

impl ValidationSummary {
    fn record(&mut self, record: &NormalizedRecord, verdict: Verdict, rules: &ValidationRules) {
        self.total += 1;
        if verdict.accepted() {
            self.accepted += 1;
        }
        if !verdict.date {
            self.invalid_dates += 1;
        }
        if !verdict.coordinates {
            self.rejected_coordinates += 1;
        }
        if !verdict.price {
            self.rejected_prices += 1;
        }
        if record
            .sale_date
            .parsed()
            .is_some_and(|d| d.year() > rules.cutoff_year)
        {
            self.past_cutoff += 1;
        }
        if let Some(raw) = record.raw.date.as_deref() {
            if self.min_date.as_deref().map_or(true, |m| raw < m) {
                self.min_date = Some(raw.to_string());
            }
            if self.max_date.as_deref().map_or(true, |m| raw > m) {
                self.max_date = Some(raw.to_string());
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Validated {
    /// Accepted records, still in source order.
    pub accepted: Vec<NormalizedRecord>,
    pub summary: ValidationSummary,
}

pub fn partition(records: Vec<NormalizedRecord>, rules: &ValidationRules) -> Validated {
    let mut summary = ValidationSummary::default();
    let mut accepted = Vec::with_capacity(records.len());
    for record in records {
        let verdict = evaluate(&record, rules);
        summary.record(&record, verdict, rules);
        if verdict.accepted() {
            accepted.push(record);
        } else {
            debug!(line = record.raw.line, ?verdict, "row rejected");
        }
    }
    info!(
        total = summary.total,
        accepted = summary.accepted,
        invalid_dates = summary.invalid_dates,
        "validation complete"
    );
    Validated { accepted, summary }
}
