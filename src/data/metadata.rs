use crate::data::error::{GeocoderError, Phase};
use crate::data::ident::{Ident, TableRef};
use crate::data::store::{ColumnInfo, StagingStore};

/// `udt_name`s treated as spatial columns.
pub const GEOMETRY_TYPES: &[&str] = &[
    "geography",
    "geometry",
    "point",
    "lseg",
    "path",
    "box",
    "polygon",
    "line",
    "circle",
];

pub fn is_geometry_column(column: &ColumnInfo) -> bool {
    let udt = column.udt_name.to_lowercase();
    GEOMETRY_TYPES.iter().any(|t| *t == udt)
}

pub fn geometry_columns(columns: &[ColumnInfo]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| is_geometry_column(c))
        .map(|c| c.name.clone())
        .collect()
}

/// Resolves the SRID of `column`, refusing columns that are not spatial.
pub fn find_geometry_srid<S: StagingStore>(
    store: &S,
    table: &TableRef,
    column: &Ident,
) -> Result<i32, GeocoderError> {
    let columns = store
        .list_columns(table)
        .map_err(|err| GeocoderError::query(Phase::Catalog, err))?;
    let geometric = geometry_columns(&columns);
    if !geometric.iter().any(|name| name == column.as_str()) {
        return Err(GeocoderError::Metadata {
            table: table.to_string(),
            column: column.to_string(),
            geometry_columns: geometric,
        });
    }

    store
        .find_srid(table, column)
        .map_err(|err| GeocoderError::query(Phase::Catalog, err))
}
