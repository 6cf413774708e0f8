//! Post-write audit of a serialized feature collection.
//!
//! Runs after the document is already on disk, so findings are warnings
//! only. Which checks run is decided by [`AuditScope`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::features::FeatureCollection;
use super::normalize::SaleDate;
use super::validate::{check_date, price_ok, ValidationRules};

pub const UNKNOWN_COUNTY: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditScope {
    pub dates: bool,
    pub coordinates: bool,
    pub prices: bool,
}

impl Default for AuditScope {
    fn default() -> Self {
        AuditScope {
            dates: true,
            coordinates: false,
            prices: false,
        }
    }
}

impl AuditScope {
    pub fn all() -> Self {
        AuditScope {
            dates: true,
            coordinates: true,
            prices: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub scope: AuditScope,
    /// How many issues are listed before the rest are summarised as a count.
    pub max_listed: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            scope: AuditScope::default(),
            max_listed: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IssueKind {
    MissingDate,
    MalformedDate(String),
    DateOutOfRange { date: String, year: i32 },
    CoordinatesOutOfBounds { lon: f64, lat: f64 },
    NonPositivePrice,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditIssue {
    pub index: usize,
    pub kind: IssueKind,
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Feature {}: ", self.index)?;
        match &self.kind {
            IssueKind::MissingDate => write!(f, "Missing date"),
            IssueKind::MalformedDate(d) => write!(f, "Invalid date format - {}", d),
            IssueKind::DateOutOfRange { date, year } => {
                write!(f, "Date out of range - {} (year: {})", date, year)
            }
            IssueKind::CoordinatesOutOfBounds { lon, lat } => {
                write!(f, "Coordinates out of bounds - [{}, {}]", lon, lat)
            }
            IssueKind::NonPositivePrice => write!(f, "Missing or non-positive price"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditReport {
    pub total: usize,
    pub issues: Vec<AuditIssue>,
    pub by_county: BTreeMap<String, usize>,
    pub by_year: BTreeMap<i32, usize>,
    /// Features whose date did not parse; keeps `by_year` summing to `total`.
    pub undated: usize,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// First `max` issues plus the number left unlisted.
    pub fn listed(&self, max: usize) -> (&[AuditIssue], usize) {
        let shown = self.issues.len().min(max);
        (&self.issues[..shown], self.issues.len() - shown)
    }
}

pub fn audit(
    collection: &FeatureCollection,
    rules: &ValidationRules,
    scope: &AuditScope,
) -> AuditReport {
    let mut report = AuditReport {
        total: collection.len(),
        ..Default::default()
    };

    for (index, feature) in collection.features.iter().enumerate() {
        let props = &feature.properties;
        let county = props.county.as_deref().unwrap_or(UNKNOWN_COUNTY);
        *report.by_county.entry(county.to_string()).or_default() += 1;

        let sale_date = match props.date.as_deref() {
            Some(d) if !d.trim().is_empty() => check_date(d, rules),
            _ => SaleDate::Missing,
        };
        match sale_date.parsed() {
            Some(d) => *report.by_year.entry(d.year()).or_default() += 1,
            None => report.undated += 1,
        }

        if scope.dates {
            let kind = match sale_date {
                SaleDate::Valid(_) => None,
                SaleDate::Missing => Some(IssueKind::MissingDate),
                SaleDate::Malformed => Some(IssueKind::MalformedDate(
                    props.date.clone().unwrap_or_default(),
                )),
                SaleDate::OutOfRange(d) => Some(IssueKind::DateOutOfRange {
                    date: props.date.clone().unwrap_or_default(),
                    year: d.year(),
                }),
            };
            if let Some(kind) = kind {
                report.issues.push(AuditIssue { index, kind });
            }
        }

        if scope.coordinates {
            let [lon, lat] = feature.geometry.coordinates;
            if !rules.bbox.contains(lon, lat) {
                report.issues.push(AuditIssue {
                    index,
                    kind: IssueKind::CoordinatesOutOfBounds { lon, lat },
                });
            }
        }

        if scope.prices && !price_ok(props.price) {
            report.issues.push(AuditIssue {
                index,
                kind: IssueKind::NonPositivePrice,
            });
        }
    }

    report
}

/// One summary event; the issue listing itself is printed by `report`.
pub fn log_report(report: &AuditReport) {
    if report.is_clean() {
        info!(features = report.total, "audit passed");
    } else {
        warn!(issues = report.issues.len(), features = report.total, "audit found issues");
    }
}
