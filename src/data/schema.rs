use log::info;
use serde::Deserialize;

use crate::data::error::GeocoderError;
use crate::data::ident::{Ident, TableRef};
use crate::data::store::StagingStore;

pub const KEY_COLUMN: &str = "full_address";
pub const GEOMETRY_COLUMN: &str = "geomout";
/// SRID of the points `geocode()` produces (NAD 83).
pub const GEOCODE_SRID: i32 = 4269;

/// A nullable column added to a staging table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
}

const fn col(name: &'static str, sql_type: &'static str) -> ColumnDef {
    ColumnDef { name, sql_type }
}

/// Fields of a TIGER `norm_addy`, in composite order.
pub const NORMALIZATION_COLUMNS: &[ColumnDef] = &[
    col("address", "integer"),
    col("predirabbrev", "varchar"),
    col("streetname", "varchar"),
    col("streettypeabbrev", "varchar"),
    col("postdirabbrev", "varchar"),
    col("internal", "varchar"),
    col("location", "varchar"),
    col("stateabbrev", "varchar"),
    col("zip", "varchar"),
    col("parsed", "boolean"),
    col("zip4", "varchar"),
    col("address_alphanumeric", "varchar"),
];

/// Fields of a PAGC `stdaddr`.
pub const STANDARDIZATION_COLUMNS: &[ColumnDef] = &[
    col("building", "text"),
    col("house_num", "text"),
    col("predir", "text"),
    col("qual", "text"),
    col("pretype", "text"),
    col("name", "text"),
    col("suftype", "text"),
    col("sufdir", "text"),
    col("ruralroute", "text"),
    col("extra", "text"),
    col("city", "text"),
    col("state", "text"),
    col("country", "text"),
    col("postcode", "text"),
    col("box", "text"),
    col("unit", "text"),
];

pub const GEOCODE_OUTPUT_COLUMNS: &[ColumnDef] = &[
    col("rating", "integer"),
    col("norm_address", "varchar"),
    col(GEOMETRY_COLUMN, "geometry(POINT,4269)"),
];

/// The two staging layouts, one per pipeline variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// `normalize_address` then `geocode`.
    Normalized,
    /// `standardize_address` then `geocode`.
    Standardized,
}

impl Default for TableKind {
    fn default() -> Self {
        TableKind::Normalized
    }
}

impl TableKind {
    pub fn default_table_name(self) -> &'static str {
        match self {
            TableKind::Normalized => "address_table",
            TableKind::Standardized => "std_address_table",
        }
    }

    pub fn parse_columns(self) -> &'static [ColumnDef] {
        match self {
            TableKind::Normalized => NORMALIZATION_COLUMNS,
            TableKind::Standardized => STANDARDIZATION_COLUMNS,
        }
    }

    /// The column whose NULL marks a row the first phase has not reached.
    pub fn parse_sentinel(self) -> &'static str {
        match self {
            TableKind::Normalized => "streetname",
            TableKind::Standardized => "name",
        }
    }
}

pub fn create_schema_sql(schema: &Ident) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", schema)
}

pub fn create_table_sql(table: &TableRef) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({} varchar(100) PRIMARY KEY)",
        table, KEY_COLUMN
    )
}

pub fn add_columns_sql(table: &TableRef, columns: &[ColumnDef]) -> String {
    let additions = columns
        .iter()
        .map(|c| format!("ADD COLUMN IF NOT EXISTS {} {} DEFAULT NULL", c.name, c.sql_type))
        .collect::<Vec<String>>()
        .join(", ");
    format!("ALTER TABLE {} {}", table, additions)
}

/// Creates the schema, the staging table and every column `kind` needs.
/// Safe to call repeatedly; existing columns are never touched.
pub fn ensure_staging_schema<S: StagingStore>(
    store: &S,
    table: &TableRef,
    kind: TableKind,
) -> Result<(), GeocoderError> {
    store
        .create_schema(&table.schema)
        .map_err(|err| GeocoderError::schema(&table.schema, err))?;
    store
        .create_table(table)
        .map_err(|err| GeocoderError::schema(table, err))?;
    store
        .add_columns(table, kind.parse_columns())
        .map_err(|err| GeocoderError::schema(table, err))?;
    store
        .add_columns(table, GEOCODE_OUTPUT_COLUMNS)
        .map_err(|err| GeocoderError::schema(table, err))?;

    info!("Staging table {} ready ({:?} layout)", table, kind);
    Ok(())
}
