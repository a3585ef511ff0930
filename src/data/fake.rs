//! In-memory stand-in for a PostGIS/TIGER database, used by tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use diesel::result::Error as DieselError;

use crate::data::batch::{BatchOperation, NO_MATCH_RATING};
use crate::data::schema::TableKind;
use crate::data::error::StoreError;
use crate::data::ident::{Ident, TableRef};
use crate::data::schema::{ColumnDef, GEOCODE_SRID, KEY_COLUMN};
use crate::data::store::{ColumnInfo, GeocodedRow, StagingStore, SweepOutcome};

/// What the stub `geocode()` returns for an address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub rating: i32,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeRow {
    pub streetname: Option<String>,
    pub name: Option<String>,
    pub rating: Option<i32>,
    pub norm_address: Option<String>,
    pub point: Option<(f64, f64)>,
}

type Normalizer = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;
type Geocoder = Arc<dyn Fn(&str) -> Option<Candidate> + Send + Sync>;

#[derive(Default)]
struct FakeTable {
    columns: Vec<(String, &'static str)>,
    rows: BTreeMap<String, FakeRow>,
}

struct Inner {
    schemas: BTreeSet<String>,
    tables: HashMap<String, FakeTable>,
    normalizer: Normalizer,
    geocoder: Geocoder,
    sweeps: usize,
    fail_on_sweep: Option<usize>,
    fail_ddl: bool,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

fn failure(message: &str) -> StoreError {
    StoreError::Query(DieselError::QueryBuilderError(message.to_owned().into()))
}

/// Hex EWKB of a point, as `geometry::text` would print it.
pub fn point_hex(lon: f64, lat: f64, srid: i32) -> String {
    let mut bytes = vec![1u8];
    bytes.extend_from_slice(&0x2000_0001u32.to_le_bytes());
    bytes.extend_from_slice(&(srid as u32).to_le_bytes());
    bytes.extend_from_slice(&lon.to_le_bytes());
    bytes.extend_from_slice(&lat.to_le_bytes());
    hex::encode(bytes)
}

fn is_pending(row: &FakeRow, operation: &BatchOperation) -> bool {
    match operation {
        BatchOperation::Normalize => row.streetname.is_none(),
        BatchOperation::Standardize => row.name.is_none(),
        BatchOperation::Geocode { source, .. } => {
            let parsed = match source {
                TableKind::Normalized => row.streetname.is_some(),
                TableKind::Standardized => row.name.is_some(),
            };
            row.rating.is_none() && parsed
        }
    }
}

fn udt_name(sql_type: &str) -> &'static str {
    if sql_type.starts_with("geometry") {
        return "geometry";
    }
    match sql_type {
        "integer" => "int4",
        "boolean" => "bool",
        "text" => "text",
        _ => "varchar",
    }
}

impl MemoryStore {
    /// A store whose normalizer parses every address and whose geocoder
    /// never finds a match.
    pub fn new() -> MemoryStore {
        MemoryStore {
            inner: Arc::new(Mutex::new(Inner {
                schemas: BTreeSet::new(),
                tables: HashMap::new(),
                normalizer: Arc::new(|address: &str| {
                    address.split_whitespace().nth(1).map(|s| s.to_uppercase())
                }),
                geocoder: Arc::new(|_: &str| -> Option<Candidate> { None }),
                sweeps: 0,
                fail_on_sweep: None,
                fail_ddl: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_normalizer<F>(&self, normalizer: F)
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lock().normalizer = Arc::new(normalizer);
    }

    pub fn set_geocoder<F>(&self, geocoder: F)
    where
        F: Fn(&str) -> Option<Candidate> + Send + Sync + 'static,
    {
        self.lock().geocoder = Arc::new(geocoder);
    }

    /// Makes the `n`th sweep from now fail, once.
    pub fn fail_sweep(&self, n: usize) {
        let mut inner = self.lock();
        inner.fail_on_sweep = Some(inner.sweeps + n);
    }

    pub fn fail_ddl(&self) {
        self.lock().fail_ddl = true;
    }

    pub fn sweep_count(&self) -> usize {
        self.lock().sweeps
    }

    pub fn columns(&self, table: &TableRef) -> Vec<String> {
        self.lock()
            .tables
            .get(&table.to_string())
            .map(|t| t.columns.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn row(&self, full_address: &str) -> FakeRow {
        self.lock()
            .tables
            .values()
            .find_map(|t| t.rows.get(full_address).cloned())
            .unwrap_or_default()
    }

    pub fn rows(&self) -> Vec<(String, FakeRow)> {
        let inner = self.lock();
        let mut rows = inner
            .tables
            .values()
            .flat_map(|t| t.rows.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }
}

impl StagingStore for MemoryStore {
    fn create_schema(&self, schema: &Ident) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_ddl {
            return Err(failure("permission denied for database"));
        }
        inner.schemas.insert(schema.to_string());
        Ok(())
    }

    fn create_table(&self, table: &TableRef) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.schemas.contains(table.schema.as_str()) {
            return Err(failure("schema does not exist"));
        }
        inner.tables.entry(table.to_string()).or_insert_with(|| FakeTable {
            columns: vec![(KEY_COLUMN.to_string(), "varchar(100)")],
            rows: BTreeMap::new(),
        });
        Ok(())
    }

    fn add_columns(&self, table: &TableRef, columns: &[ColumnDef]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let fake = inner
            .tables
            .get_mut(&table.to_string())
            .ok_or_else(|| failure("relation does not exist"))?;
        for column in columns {
            if !fake.columns.iter().any(|(name, _)| name == column.name) {
                fake.columns.push((column.name.to_string(), column.sql_type));
            }
        }
        Ok(())
    }

    fn insert_addresses(&self, table: &TableRef, addresses: &[String]) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        let fake = inner
            .tables
            .get_mut(&table.to_string())
            .ok_or_else(|| failure("relation does not exist"))?;
        let mut inserted = 0;
        for address in addresses {
            if !fake.rows.contains_key(address) {
                fake.rows.insert(address.clone(), FakeRow::default());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn count_unprocessed(&self, table: &TableRef, operation: &BatchOperation) -> Result<i64, StoreError> {
        let inner = self.lock();
        let fake = inner
            .tables
            .get(&table.to_string())
            .ok_or_else(|| failure("relation does not exist"))?;
        let count = fake.rows.values().filter(|row| is_pending(row, operation)).count();
        Ok(count as i64)
    }

    fn run_sweep(
        &self,
        table: &TableRef,
        operation: &BatchOperation,
        batch_size: i64,
        after: Option<&str>,
    ) -> Result<SweepOutcome, StoreError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.sweeps += 1;
        if inner.fail_on_sweep == Some(inner.sweeps) {
            inner.fail_on_sweep = None;
            return Err(failure("geocode() raised an exception"));
        }

        let normalizer = inner.normalizer.clone();
        let geocoder = inner.geocoder.clone();
        let fake = inner
            .tables
            .get_mut(&table.to_string())
            .ok_or_else(|| failure("relation does not exist"))?;

        let mut outcome = SweepOutcome::default();
        for (address, row) in fake.rows.iter_mut() {
            if outcome.rows_updated as i64 >= batch_size {
                break;
            }
            if after.map_or(false, |after| address.as_str() <= after) || !is_pending(row, operation) {
                continue;
            }
            match operation {
                BatchOperation::Normalize => {
                    row.streetname = normalizer(address.as_str());
                }
                BatchOperation::Standardize => {
                    row.name = normalizer(address.as_str());
                }
                BatchOperation::Geocode { rating_threshold, .. } => {
                    match geocoder(address.as_str()) {
                        Some(candidate) if candidate.rating < *rating_threshold => {
                            row.rating = Some(candidate.rating);
                            row.norm_address = Some(address.to_uppercase());
                            row.point = Some((candidate.lon, candidate.lat));
                        }
                        _ => {
                            row.rating = Some(NO_MATCH_RATING);
                            row.norm_address = None;
                            row.point = None;
                        }
                    }
                }
            }
            outcome.rows_updated += 1;
            outcome.last_key = Some(address.clone());
        }
        Ok(outcome)
    }

    fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>, StoreError> {
        let inner = self.lock();
        let columns = inner
            .tables
            .get(&table.to_string())
            .map(|t| {
                t.columns
                    .iter()
                    .enumerate()
                    .map(|(i, (name, sql_type))| ColumnInfo {
                        name: name.clone(),
                        udt_name: udt_name(sql_type).to_string(),
                        data_type: sql_type.to_string(),
                        is_nullable: name != KEY_COLUMN,
                        ordinal_position: i as i32 + 1,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(columns)
    }

    fn find_srid(&self, table: &TableRef, column: &Ident) -> Result<i32, StoreError> {
        let inner = self.lock();
        let fake = inner
            .tables
            .get(&table.to_string())
            .ok_or_else(|| failure("relation does not exist"))?;
        if fake.columns.iter().any(|(name, _)| name == column.as_str()) {
            Ok(GEOCODE_SRID)
        } else {
            Err(failure("column not found in geometry_columns table"))
        }
    }

    fn load_geocoded(&self, table: &TableRef, srid: i32) -> Result<Vec<GeocodedRow>, StoreError> {
        let inner = self.lock();
        let fake = inner
            .tables
            .get(&table.to_string())
            .ok_or_else(|| failure("relation does not exist"))?;
        Ok(fake
            .rows
            .iter()
            .map(|(address, row)| GeocodedRow {
                full_address: address.clone(),
                rating: row.rating,
                norm_address: row.norm_address.clone(),
                longitude: row.point.map(|(lon, _)| lon),
                latitude: row.point.map(|(_, lat)| lat),
                geometry: row.point.map(|(lon, lat)| point_hex(lon, lat, srid)),
            })
            .collect())
    }
}
