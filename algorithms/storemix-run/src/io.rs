//! Loading a store table from CSV
//!
//! The header must start with `store_id,temperature_band`, every other column holds a numeric
//! feature. Empty cells are missing values.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use storemix::{StoreRecord, StoreTable};

use crate::error::{Result, RunError};

const STORE_ID: &str = "store_id";
const TEMPERATURE_BAND: &str = "temperature_band";

/// Read a store table, columns named in `profile_columns` become profile attributes and the
/// others product-mix values
pub fn read_store_table<R: Read>(reader: R, profile_columns: &[&str]) -> Result<StoreTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| RunError::MissingColumn(name.to_string()))
    };
    let id_col = position(STORE_ID)?;
    let band_col = position(TEMPERATURE_BAND)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let store_id = row.get(id_col).unwrap_or_default();
        let band = row.get(band_col).unwrap_or_default();
        let mut record = StoreRecord::new(store_id, band);

        for (col, (name, cell)) in headers.iter().zip(row.iter()).enumerate() {
            if col == id_col || col == band_col || cell.is_empty() {
                continue;
            }
            let value = cell.parse::<f64>().map_err(|_| RunError::InvalidValue {
                store: store_id.to_string(),
                column: name.to_string(),
                value: cell.to_string(),
            })?;
            record = if profile_columns.contains(&name) {
                record.with_attribute(name, value)
            } else {
                record.with_feature(name, value)
            };
        }
        records.push(record);
    }

    Ok(StoreTable::new(records)?)
}

/// Read a store table from a CSV file, see [`read_store_table`]
pub fn load_store_table<P: AsRef<Path>>(path: P, profile_columns: &[&str]) -> Result<StoreTable> {
    let file = File::open(path)?;
    read_store_table(file, profile_columns)
}
