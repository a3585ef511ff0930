use chrono::Utc;
use log::info;
use serde::Serialize;
use serde_json::Value;

use crate::data::batch::{
    BatchOperation, BatchReport, BatchRunner, DEFAULT_BATCH_SIZE, DEFAULT_RATING_THRESHOLD,
};
use crate::data::dataset::{merge_geocoded, GeocodeSummary, Record};
use crate::data::error::GeocoderError;
use crate::data::ident::{Ident, TableRef, DEFAULT_SCHEMA};
use crate::data::ingest::{addresses_from_records, ingest};
use crate::data::results::read_geocoded;
use crate::data::schema::{ensure_staging_schema, TableKind, KEY_COLUMN};
use crate::data::store::StagingStore;

#[derive(Debug, Clone)]
pub struct GeocodeOptions {
    pub kind: TableKind,
    pub schema: Ident,
    /// Defaults to the layout's standard table name.
    pub table: Option<Ident>,
    pub batch_size: i64,
    pub rating_threshold: i32,
    pub show_progress: bool,
}

impl Default for GeocodeOptions {
    fn default() -> Self {
        GeocodeOptions {
            kind: TableKind::Normalized,
            schema: Ident::from_static(DEFAULT_SCHEMA),
            table: None,
            batch_size: DEFAULT_BATCH_SIZE,
            rating_threshold: DEFAULT_RATING_THRESHOLD,
            show_progress: true,
        }
    }
}

impl GeocodeOptions {
    pub fn table_ref(&self) -> TableRef {
        let table = self
            .table
            .clone()
            .unwrap_or_else(|| Ident::from_static(self.kind.default_table_name()));
        TableRef::new(self.schema.clone(), table)
    }
}

#[derive(Debug, Serialize)]
pub struct GeocodedDataset {
    pub summary: GeocodeSummary,
    pub records: Vec<Record>,
}

/// Prepares the staging table, loads `addresses`, then runs the parse
/// phase and the geocode phase over everything still pending.
pub fn ingest_and_geocode<S: StagingStore>(
    store: &S,
    addresses: &[String],
    options: &GeocodeOptions,
) -> Result<Vec<BatchReport>, GeocoderError> {
    let table = options.table_ref();
    let runner = BatchRunner::new(store, options.batch_size)?.show_progress(options.show_progress);

    ensure_staging_schema(store, &table, options.kind)?;
    ingest(store, &table, addresses)?;

    let parse = runner.run(&table, BatchOperation::parse_phase(options.kind))?;
    let geocode = runner.run(
        &table,
        BatchOperation::Geocode { source: options.kind, rating_threshold: options.rating_threshold },
    )?;
    Ok(vec![parse, geocode])
}

/// Loads staging-shaped records, each holding only `full_address`, without
/// running any phase. The shape is checked before the table is touched.
pub fn ingest_records<S: StagingStore>(
    store: &S,
    records: &[Record],
    options: &GeocodeOptions,
) -> Result<usize, GeocoderError> {
    let addresses = addresses_from_records(records)?;
    let table = options.table_ref();
    ensure_staging_schema(store, &table, options.kind)?;
    ingest(store, &table, &addresses)
}

/// Gives each record a `full_address`, copied from `address_column` when
/// missing, and returns the addresses to ingest.
fn derive_full_addresses(
    records: &mut [Record],
    address_column: &str,
) -> Result<Vec<String>, GeocoderError> {
    let mut addresses = Vec::with_capacity(records.len());
    for (i, record) in records.iter_mut().enumerate() {
        if !record.contains_key(KEY_COLUMN) {
            let value = record.get(address_column).cloned().ok_or_else(|| {
                GeocoderError::SchemaMismatch(format!(
                    "record {} has neither {:?} nor {:?}",
                    i, KEY_COLUMN, address_column
                ))
            })?;
            record.insert(KEY_COLUMN.to_string(), value);
        }
        match &record[KEY_COLUMN] {
            Value::Null => {}
            Value::String(address) => addresses.push(address.clone()),
            other => addresses.push(other.to_string()),
        }
    }
    // Non-text keys are stored as their text form so the join finds them.
    for record in records.iter_mut() {
        if let Some(value) = record.get_mut(KEY_COLUMN) {
            if !value.is_null() && !value.is_string() {
                *value = Value::String(value.to_string());
            }
        }
    }
    Ok(addresses)
}

/// Geocodes a caller's dataset end to end and left-joins the results back
/// onto it. Unmatched records come back with null geocoder columns.
pub fn geocode_records<S: StagingStore>(
    store: &S,
    mut records: Vec<Record>,
    address_column: &str,
    options: &GeocodeOptions,
) -> Result<GeocodedDataset, GeocoderError> {
    let started_at = Utc::now();
    let addresses = derive_full_addresses(&mut records, address_column)?;

    ingest_and_geocode(store, &addresses, options)?;
    let geocoded = read_geocoded(store, &options.table_ref())?;

    let records = merge_geocoded(records, &geocoded);
    let summary = GeocodeSummary::new(&records, started_at);
    info!("Total rows in original dataset: {:>8}", summary.total_rows);
    info!(
        "Rows with a geocoding result:   {:>8} ({}% of total)",
        summary.rows_with_geometry, summary.percent_geocoded
    );
    Ok(GeocodedDataset { summary, records })
}
