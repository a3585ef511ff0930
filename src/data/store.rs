use serde::Serialize;

use crate::data::batch::BatchOperation;
use crate::data::error::StoreError;
use crate::data::ident::{Ident, TableRef};
use crate::data::schema::ColumnDef;

/// One row of `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub udt_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub ordinal_position: i32,
}

/// A staging row as read back, geometry still hex encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedRow {
    pub full_address: String,
    pub rating: Option<i32>,
    pub norm_address: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub geometry: Option<String>,
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub rows_updated: usize,
    /// Greatest key the sweep touched, `None` when it touched nothing.
    pub last_key: Option<String>,
}

/// The database operations the batch pipeline is driven through.
///
/// Every call is its own statement and commits on its own: nothing here
/// assumes a transaction spanning several calls.
pub trait StagingStore {
    fn create_schema(&self, schema: &Ident) -> Result<(), StoreError>;

    fn create_table(&self, table: &TableRef) -> Result<(), StoreError>;

    fn add_columns(&self, table: &TableRef, columns: &[ColumnDef]) -> Result<(), StoreError>;

    /// Inserts addresses, skipping any already present. Returns how many
    /// rows were actually added.
    fn insert_addresses(&self, table: &TableRef, addresses: &[String]) -> Result<usize, StoreError>;

    /// Rows still pending for `operation`.
    fn count_unprocessed(&self, table: &TableRef, operation: &BatchOperation) -> Result<i64, StoreError>;

    /// Runs one sweep of `operation` over at most `batch_size` pending rows,
    /// taken in key order from just past `after`.
    fn run_sweep(
        &self,
        table: &TableRef,
        operation: &BatchOperation,
        batch_size: i64,
        after: Option<&str>,
    ) -> Result<SweepOutcome, StoreError>;

    fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>, StoreError>;

    fn find_srid(&self, table: &TableRef, column: &Ident) -> Result<i32, StoreError>;

    /// Reads every staging row with its geometry reprojected to `srid`.
    fn load_geocoded(&self, table: &TableRef, srid: i32) -> Result<Vec<GeocodedRow>, StoreError>;
}
