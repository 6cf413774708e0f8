//! GeoJSON point features built from accepted records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::normalize::NormalizedRecord;

const COORDINATE_SCALE: f64 = 1e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionType {
    FeatureCollection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureType {
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: CollectionType,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        FeatureCollection {
            kind: CollectionType::FeatureCollection,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: FeatureType,
    pub geometry: Point,
    pub properties: SaleProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(rename = "type")]
    pub kind: GeometryType,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

/// Property bag carried by every feature. Field order is the output order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleProperties {
    pub county: Option<String>,
    /// Sale date as it appeared in the source (`dd/mm/yyyy`).
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub property_type: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    pub size: Option<String>,
    pub address: Option<String>,
}

/// Round to 6 decimal places (about 0.11 m at the equator).
pub fn round_coordinate(value: f64) -> f64 {
    (value * COORDINATE_SCALE).round() / COORDINATE_SCALE
}

/// `None` when the record lacks coordinates; callers only pass accepted records.
pub fn build_feature(record: &NormalizedRecord) -> Option<Feature> {
    let lon = record.longitude?;
    let lat = record.latitude?;
    let raw = &record.raw;
    Some(Feature {
        kind: FeatureType::Feature,
        geometry: Point {
            kind: GeometryType::Point,
            coordinates: [round_coordinate(lon), round_coordinate(lat)],
        },
        properties: SaleProperties {
            county: raw.county.clone(),
            date: raw.date.clone(),
            property_type: raw.property_type.clone(),
            price: record.price,
            size: raw.size.clone(),
            address: raw.address.clone(),
        },
    })
}

/// Order by parsed sale date. `sort_by_key` is stable, so rows sold on the
/// same day keep their source order.
pub fn build_collection(mut accepted: Vec<NormalizedRecord>) -> FeatureCollection {
    accepted.sort_by_key(|r| r.sale_date.parsed());
    FeatureCollection::new(accepted.iter().filter_map(build_feature).collect())
}
