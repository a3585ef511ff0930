use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Bool, Integer, Text};
use serde::Serialize;

use crate::data::ident::{Ident, TableRef};
use crate::data::metadata::geometry_columns;
use crate::data::store::ColumnInfo;

#[derive(QueryableByName)]
struct ColumnRow {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    udt_name: String,
    #[diesel(sql_type = Text)]
    data_type: String,
    #[diesel(sql_type = Bool)]
    is_nullable: bool,
    #[diesel(sql_type = Integer)]
    ordinal_position: i32,
}

#[derive(QueryableByName)]
struct Name {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct Srid {
    #[diesel(sql_type = Integer)]
    srid: i32,
}

#[derive(QueryableByName)]
struct Present {
    #[diesel(sql_type = Bool)]
    present: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub is_geo: bool,
}

pub fn list_columns(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnInfo>, diesel::result::Error> {
    let rows = diesel::sql_query(
        "SELECT column_name::text AS name, udt_name::text AS udt_name, \
         data_type::text AS data_type, (is_nullable = 'YES') AS is_nullable, \
         ordinal_position::integer AS ordinal_position \
         FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = $2 \
         ORDER BY ordinal_position",
    )
    .bind::<Text, _>(schema)
    .bind::<Text, _>(table)
    .load::<ColumnRow>(conn)?;

    Ok(rows
        .into_iter()
        .map(|row| ColumnInfo {
            name: row.name,
            udt_name: row.udt_name,
            data_type: row.data_type,
            is_nullable: row.is_nullable,
            ordinal_position: row.ordinal_position,
        })
        .collect())
}

pub fn find_srid(
    conn: &mut PgConnection,
    table: &TableRef,
    column: &Ident,
) -> Result<i32, diesel::result::Error> {
    diesel::sql_query("SELECT Find_SRID($1::varchar, $2::varchar, $3::varchar) AS srid")
        .bind::<Text, _>(table.schema.as_str())
        .bind::<Text, _>(table.table.as_str())
        .bind::<Text, _>(column.as_str())
        .get_result::<Srid>(conn)
        .map(|s| s.srid)
}

pub fn list_schemas(conn: &mut PgConnection) -> Result<Vec<String>, diesel::result::Error> {
    diesel::sql_query(
        "SELECT schema_name::text AS name FROM information_schema.schemata ORDER BY schema_name",
    )
    .load::<Name>(conn)
    .map(|names| names.into_iter().map(|n| n.name).collect())
}

pub fn has_schema(conn: &mut PgConnection, schema: &Ident) -> Result<bool, diesel::result::Error> {
    diesel::sql_query(
        "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1) AS present",
    )
    .bind::<Text, _>(schema.as_str())
    .get_result::<Present>(conn)
    .map(|p| p.present)
}

pub fn list_tables(conn: &mut PgConnection, schema: &Ident) -> Result<Vec<String>, diesel::result::Error> {
    diesel::sql_query(
        "SELECT table_name::text AS name FROM information_schema.tables \
         WHERE table_schema = $1 ORDER BY table_name",
    )
    .bind::<Text, _>(schema.as_str())
    .load::<Name>(conn)
    .map(|names| names.into_iter().map(|n| n.name).collect())
}

/// Whether any column of the table has a spatial type.
pub fn is_geo_table(
    conn: &mut PgConnection,
    schema: &Ident,
    table: &str,
) -> Result<bool, diesel::result::Error> {
    let columns = list_columns(conn, schema.as_str(), table)?;
    Ok(!geometry_columns(&columns).is_empty())
}

/// Tables of `schema` with their spatial flag, or `None` when the schema
/// does not exist.
pub fn describe_tables(
    conn: &mut PgConnection,
    schema: &Ident,
) -> Result<Option<Vec<TableSummary>>, diesel::result::Error> {
    if !has_schema(conn, schema)? {
        return Ok(None);
    }

    let mut summaries = Vec::new();
    for name in list_tables(conn, schema)? {
        let is_geo = is_geo_table(conn, schema, &name)?;
        summaries.push(TableSummary { name, is_geo });
    }
    Ok(Some(summaries))
}
