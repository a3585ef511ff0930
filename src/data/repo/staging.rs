use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Array, BigInt, Double, Integer, Nullable, Text};

use crate::data::batch::BatchOperation;
use crate::data::ident::TableRef;
use crate::data::schema::KEY_COLUMN;
use crate::data::store::{GeocodedRow, SweepOutcome};

const INSERT_CHUNK_SIZE: usize = 2500;

#[derive(QueryableByName)]
struct Count {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(QueryableByName)]
struct Swept {
    #[diesel(sql_type = BigInt)]
    count: i64,
    #[diesel(sql_type = Nullable<Text>)]
    last_key: Option<String>,
}

#[derive(QueryableByName)]
struct StagingRow {
    #[diesel(sql_type = Text)]
    full_address: String,
    #[diesel(sql_type = Nullable<Integer>)]
    rating: Option<i32>,
    #[diesel(sql_type = Nullable<Text>)]
    norm_address: Option<String>,
    #[diesel(sql_type = Nullable<Double>)]
    longitude: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    latitude: Option<f64>,
    #[diesel(sql_type = Nullable<Text>)]
    geometry: Option<String>,
}

impl From<StagingRow> for GeocodedRow {
    fn from(row: StagingRow) -> Self {
        GeocodedRow {
            full_address: row.full_address,
            rating: row.rating,
            norm_address: row.norm_address,
            longitude: row.longitude,
            latitude: row.latitude,
            geometry: row.geometry,
        }
    }
}

pub fn execute_ddl(conn: &mut PgConnection, sql: &str) -> Result<usize, diesel::result::Error> {
    diesel::sql_query(sql).execute(conn)
}

pub fn insert_addresses(
    conn: &mut PgConnection,
    table: &TableRef,
    addresses: &[String],
) -> Result<usize, diesel::result::Error> {
    let sql = format!(
        "INSERT INTO {t} ({key}) SELECT unnest($1::varchar[]) ON CONFLICT ({key}) DO NOTHING",
        t = table,
        key = KEY_COLUMN,
    );

    let mut inserted = 0;
    for chunk in addresses.chunks(INSERT_CHUNK_SIZE) {
        inserted += diesel::sql_query(sql.as_str())
            .bind::<Array<Text>, _>(chunk.to_vec())
            .execute(conn)?;
    }
    Ok(inserted)
}

pub fn count_pending(
    conn: &mut PgConnection,
    table: &TableRef,
    operation: &BatchOperation,
) -> Result<i64, diesel::result::Error> {
    let sql = format!("SELECT COUNT(*) AS count FROM {} WHERE {}", table, operation.pending_filter());
    diesel::sql_query(sql)
        .get_result::<Count>(conn)
        .map(|c| c.count)
}

pub fn run_sweep(
    conn: &mut PgConnection,
    table: &TableRef,
    operation: &BatchOperation,
    batch_size: i64,
    after: Option<&str>,
) -> Result<SweepOutcome, diesel::result::Error> {
    let query = diesel::sql_query(operation.sql(table))
        .bind::<BigInt, _>(batch_size)
        .bind::<Nullable<Text>, _>(after);
    let swept = match operation {
        BatchOperation::Geocode { rating_threshold, .. } => query
            .bind::<Integer, _>(*rating_threshold)
            .get_result::<Swept>(conn)?,
        BatchOperation::Normalize | BatchOperation::Standardize => query.get_result::<Swept>(conn)?,
    };
    Ok(SweepOutcome {
        rows_updated: swept.count as usize,
        last_key: swept.last_key,
    })
}

pub fn load_geocoded(
    conn: &mut PgConnection,
    table: &TableRef,
    srid: i32,
) -> Result<Vec<GeocodedRow>, diesel::result::Error> {
    let sql = format!(
        "SELECT at.{key}::text AS full_address, at.rating, at.norm_address::text AS norm_address, \
         ST_X(ST_Transform(at.geomout, $1)) AS longitude, \
         ST_Y(ST_Transform(at.geomout, $1)) AS latitude, \
         ST_Transform(at.geomout, $1)::text AS geometry \
         FROM {t} AS at",
        key = KEY_COLUMN,
        t = table,
    );
    let rows = diesel::sql_query(sql)
        .bind::<Integer, _>(srid)
        .load::<StagingRow>(conn)?;
    Ok(rows.into_iter().map(GeocodedRow::from).collect())
}
