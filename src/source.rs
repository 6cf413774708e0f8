//! Loader for the property-sales source table.
//!
//! The upstream producer ships Parquet; a CSV export with the same headers is
//! also accepted. Column names are a hard contract: a missing column aborts
//! the run before any row is read.

use std::fs::File;
use std::path::Path;

use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use serde::Deserialize;
use tracing::info;

use crate::error::ConvertError;

pub const COL_PRICE: &str = "Price (€)";
pub const COL_DATE: &str = "Date of Sale (dd/mm/yyyy)";
pub const COL_LONGITUDE: &str = "Longitude";
pub const COL_LATITUDE: &str = "Latitude";
pub const COL_COUNTY: &str = "County";
pub const COL_PROPERTY_TYPE: &str = "Description of Property";
pub const COL_SIZE: &str = "Property Size Description";
pub const COL_ADDRESS: &str = "formatted_address";

const REQUIRED_COLUMNS: [&str; 8] = [
    COL_PRICE,
    COL_DATE,
    COL_LONGITUDE,
    COL_LATITUDE,
    COL_COUNTY,
    COL_PROPERTY_TYPE,
    COL_SIZE,
    COL_ADDRESS,
];

/// One source row. Text cells are kept verbatim; coordinates are nullable
/// doubles. Empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRecord {
    /// CSV line number, or 1-based row number for Parquet.
    #[serde(skip)]
    pub line: u64,
    #[serde(rename = "Price (€)")]
    pub price: Option<String>,
    #[serde(rename = "Date of Sale (dd/mm/yyyy)")]
    pub date: Option<String>,
    #[serde(rename = "Longitude", default, deserialize_with = "csv::invalid_option")]
    pub longitude: Option<f64>,
    #[serde(rename = "Latitude", default, deserialize_with = "csv::invalid_option")]
    pub latitude: Option<f64>,
    #[serde(rename = "County")]
    pub county: Option<String>,
    #[serde(rename = "Description of Property")]
    pub property_type: Option<String>,
    #[serde(rename = "Property Size Description")]
    pub size: Option<String>,
    #[serde(rename = "formatted_address")]
    pub address: Option<String>,
}

fn is_parquet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("parquet"))
}

/// Read every row of the table at `path`, in source order. `.parquet` files
/// go through the Parquet reader, anything else is read as CSV.
pub fn load_records(path: &Path) -> Result<Vec<RawRecord>, ConvertError> {
    let records = if is_parquet(path) {
        load_parquet(path)?
    } else {
        let file = File::open(path).map_err(|e| ConvertError::SourceOpen {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        read_records(file)?
    };
    info!("Loaded {} rows from {:?}", records.len(), path);
    Ok(records)
}

pub fn load_parquet(path: &Path) -> Result<Vec<RawRecord>, ConvertError> {
    let parquet_err = |source: parquet::errors::ParquetError| ConvertError::Parquet {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|e| parquet_err(e.into()))?;
    let reader = SerializedFileReader::new(file).map_err(parquet_err)?;

    let schema = reader.metadata().file_metadata().schema_descr();
    let fields = schema.root_schema().get_fields();
    for col in REQUIRED_COLUMNS {
        if !fields.iter().any(|f| f.name() == col) {
            return Err(ConvertError::MissingColumn(col));
        }
    }

    let mut out = Vec::new();
    for (idx, row) in reader.get_row_iter(None).map_err(parquet_err)?.enumerate() {
        let row = row.map_err(parquet_err)?;
        let mut record = RawRecord {
            line: idx as u64 + 1,
            ..Default::default()
        };
        for (name, field) in row.get_column_iter() {
            match name.as_str() {
                COL_PRICE => record.price = text_cell(field),
                COL_DATE => record.date = text_cell(field),
                COL_LONGITUDE => record.longitude = double_cell(field),
                COL_LATITUDE => record.latitude = double_cell(field),
                COL_COUNTY => record.county = text_cell(field),
                COL_PROPERTY_TYPE => record.property_type = text_cell(field),
                COL_SIZE => record.size = text_cell(field),
                COL_ADDRESS => record.address = text_cell(field),
                _ => {}
            }
        }
        out.push(record);
    }
    Ok(out)
}

fn text_cell(field: &Field) -> Option<String> {
    let text = match field {
        Field::Null => return None,
        Field::Str(s) => s.trim().to_string(),
        Field::Bytes(b) => b.as_utf8().ok()?.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Non-numeric cells read as null, the same as the CSV path.
fn double_cell(field: &Field) -> Option<f64> {
    match field {
        Field::Double(v) => Some(*v),
        Field::Float(v) => Some(f64::from(*v)),
        Field::Int(v) => Some(f64::from(*v)),
        Field::Long(v) => Some(*v as f64),
        Field::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn read_records<R: std::io::Read>(rdr: R) -> Result<Vec<RawRecord>, ConvertError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(rdr);

    let headers = reader
        .headers()
        .map_err(|e| ConvertError::SourceRow { line: 1, source: e })?
        .clone();
    for col in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == col) {
            return Err(ConvertError::MissingColumn(col));
        }
    }

    let mut out = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or_default();
            ConvertError::SourceRow { line, source: e }
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let mut row: RawRecord = record
            .deserialize(Some(&headers))
            .map_err(|e| ConvertError::SourceRow { line, source: e })?;
        row.line = line;
        out.push(row);
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parquet::basic::{ConvertedType, Repetition, Type as PhysicalType};
    use parquet::column::writer::ColumnWriter;
    use parquet::data_type::ByteArray;
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::types::Type;
    use std::sync::Arc;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// Write `rows` as a single row group with the upstream column layout:
    /// nullable UTF8 text columns and nullable DOUBLE coordinates.
    pub fn write_parquet(path: &Path, rows: &[RawRecord]) -> TestResult {
        let text: Vec<(&str, Vec<Option<String>>)> = vec![
            (COL_DATE, rows.iter().map(|r| r.date.clone()).collect()),
            (COL_COUNTY, rows.iter().map(|r| r.county.clone()).collect()),
            (COL_PRICE, rows.iter().map(|r| r.price.clone()).collect()),
            (COL_PROPERTY_TYPE, rows.iter().map(|r| r.property_type.clone()).collect()),
            (COL_SIZE, rows.iter().map(|r| r.size.clone()).collect()),
            (COL_ADDRESS, rows.iter().map(|r| r.address.clone()).collect()),
        ];
        let doubles: Vec<(&str, Vec<Option<f64>>)> = vec![
            (COL_LONGITUDE, rows.iter().map(|r| r.longitude).collect()),
            (COL_LATITUDE, rows.iter().map(|r| r.latitude).collect()),
        ];

        let mut fields = Vec::new();
        for (name, _) in &text {
            fields.push(Arc::new(
                Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
                    .with_repetition(Repetition::OPTIONAL)
                    .with_converted_type(ConvertedType::UTF8)
                    .build()?,
            ));
        }
        for (name, _) in &doubles {
            fields.push(Arc::new(
                Type::primitive_type_builder(name, PhysicalType::DOUBLE)
                    .with_repetition(Repetition::OPTIONAL)
                    .build()?,
            ));
        }
        let schema = Arc::new(Type::group_type_builder("schema").with_fields(fields).build()?);

        let file = File::create(path)?;
        let props = Arc::new(WriterProperties::builder().build());
        let mut writer = SerializedFileWriter::new(file, schema, props)?;
        let mut group = writer.next_row_group()?;
        let mut text_cols = text.iter();
        let mut double_cols = doubles.iter();
        while let Some(mut col) = group.next_column()? {
            match col.untyped() {
                ColumnWriter::ByteArrayColumnWriter(typed) => {
                    let (_, cells) = text_cols.next().ok_or("too many text columns")?;
                    let values: Vec<ByteArray> =
                        cells.iter().flatten().map(|s| ByteArray::from(s.as_str())).collect();
                    let defs: Vec<i16> = cells.iter().map(|c| i16::from(c.is_some())).collect();
                    typed.write_batch(&values, Some(&defs), None)?;
                }
                ColumnWriter::DoubleColumnWriter(typed) => {
                    let (_, cells) = double_cols.next().ok_or("too many double columns")?;
                    let values: Vec<f64> = cells.iter().flatten().copied().collect();
                    let defs: Vec<i16> = cells.iter().map(|c| i16::from(c.is_some())).collect();
                    typed.write_batch(&values, Some(&defs), None)?;
                }
                _ => return Err("unexpected column writer type".into()),
            }
            col.close()?;
        }
        group.close()?;
        writer.close()?;
        Ok(())
    }
}
