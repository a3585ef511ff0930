use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;

use crate::config::DbConfig;
use crate::data::batch::BatchOperation;
use crate::data::error::StoreError;
use crate::data::ident::{Ident, TableRef};
use crate::data::repo::{metadata, staging};
use crate::data::schema::{add_columns_sql, create_schema_sql, create_table_sql, ColumnDef};
use crate::data::store::{ColumnInfo, GeocodedRow, StagingStore, SweepOutcome};

pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub fn init_connection_pool(config: &DbConfig) -> Result<Pool, r2d2::Error> {
    let manager = ConnectionManager::<PgConnection>::new(config.database_url.as_str());
    r2d2::Pool::builder()
        .max_size(config.pool_size)
        .build(manager)
}

#[cfg(test)]
pub fn init_test_connection_pool() -> Pool {
    dotenv::dotenv().ok();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set");
    init_connection_pool(&DbConfig { database_url, pool_size: 2 })
        .expect("Failed to create test db pool")
}

/// The staging store backed by a PostgreSQL connection pool. Every call
/// checks out its own connection and runs in autocommit.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> PgStore {
        PgStore { pool }
    }
}

impl StagingStore for PgStore {
    fn create_schema(&self, schema: &Ident) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        staging::execute_ddl(&mut conn, &create_schema_sql(schema))?;
        Ok(())
    }

    fn create_table(&self, table: &TableRef) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        staging::execute_ddl(&mut conn, &create_table_sql(table))?;
        Ok(())
    }

    fn add_columns(&self, table: &TableRef, columns: &[ColumnDef]) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        staging::execute_ddl(&mut conn, &add_columns_sql(table, columns))?;
        Ok(())
    }

    fn insert_addresses(&self, table: &TableRef, addresses: &[String]) -> Result<usize, StoreError> {
        let mut conn = self.pool.get()?;
        Ok(staging::insert_addresses(&mut conn, table, addresses)?)
    }

    fn count_unprocessed(&self, table: &TableRef, operation: &BatchOperation) -> Result<i64, StoreError> {
        let mut conn = self.pool.get()?;
        Ok(staging::count_pending(&mut conn, table, operation)?)
    }

    fn run_sweep(
        &self,
        table: &TableRef,
        operation: &BatchOperation,
        batch_size: i64,
        after: Option<&str>,
    ) -> Result<SweepOutcome, StoreError> {
        let mut conn = self.pool.get()?;
        Ok(staging::run_sweep(&mut conn, table, operation, batch_size, after)?)
    }

    fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>, StoreError> {
        let mut conn = self.pool.get()?;
        Ok(metadata::list_columns(&mut conn, table.schema.as_str(), table.table.as_str())?)
    }

    fn find_srid(&self, table: &TableRef, column: &Ident) -> Result<i32, StoreError> {
        let mut conn = self.pool.get()?;
        Ok(metadata::find_srid(&mut conn, table, column)?)
    }

    fn load_geocoded(&self, table: &TableRef, srid: i32) -> Result<Vec<GeocodedRow>, StoreError> {
        let mut conn = self.pool.get()?;
        Ok(staging::load_geocoded(&mut conn, table, srid)?)
    }
}
