use std::collections::HashSet;

use log::info;
use serde_json::Value;

use crate::data::dataset::Record;
use crate::data::error::{GeocoderError, Phase};
use crate::data::ident::TableRef;
use crate::data::schema::KEY_COLUMN;
use crate::data::store::StagingStore;

/// Width of the `full_address varchar(100)` key.
pub const MAX_ADDRESS_LEN: usize = 100;

/// Loads addresses into the staging table. Addresses already present, or
/// repeated in `addresses`, are skipped, so re-running with overlapping
/// input is harmless. Returns the number of new rows.
pub fn ingest<S: StagingStore>(
    store: &S,
    table: &TableRef,
    addresses: &[String],
) -> Result<usize, GeocoderError> {
    let mut seen = HashSet::with_capacity(addresses.len());
    let mut distinct = Vec::with_capacity(addresses.len());
    for address in addresses {
        if address.chars().count() > MAX_ADDRESS_LEN {
            return Err(GeocoderError::SchemaMismatch(format!(
                "{} values must be at most {} characters: {:?}",
                KEY_COLUMN, MAX_ADDRESS_LEN, address
            )));
        }
        if seen.insert(address.as_str()) {
            distinct.push(address.clone());
        }
    }

    let inserted = store
        .insert_addresses(table, &distinct)
        .map_err(|err| GeocoderError::query(Phase::Ingest, err))?;
    info!(
        "Ingested {} new addresses into {} ({} already present)",
        inserted,
        table,
        distinct.len() - inserted
    );
    Ok(inserted)
}

/// Pulls the `full_address` column out of staging-shaped records.
///
/// Every record must carry exactly that one column; anything else is
/// rejected before the database is touched.
pub fn addresses_from_records(records: &[Record]) -> Result<Vec<String>, GeocoderError> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            if record.len() != 1 {
                let columns = record.keys().cloned().collect::<Vec<String>>();
                return Err(GeocoderError::SchemaMismatch(format!(
                    "record {} has columns {:?}, expected only {:?}",
                    i, columns, KEY_COLUMN
                )));
            }
            match record.get(KEY_COLUMN) {
                Some(Value::String(address)) => Ok(address.clone()),
                Some(other) => Err(GeocoderError::SchemaMismatch(format!(
                    "record {} has a non-text {}: {}",
                    i, KEY_COLUMN, other
                ))),
                None => Err(GeocoderError::SchemaMismatch(format!(
                    "record {} has no {} column",
                    i, KEY_COLUMN
                ))),
            }
        })
        .collect()
}
