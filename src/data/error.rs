use std::fmt::{self, Formatter};

use thiserror::Error;

use crate::data::wkb::WkbError;

/// The step of a run an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ingest,
    Count,
    Normalize,
    Standardize,
    Geocode,
    ReadBack,
    ReverseGeocode,
    Catalog,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match self {
            Phase::Ingest => "ingest",
            Phase::Count => "count",
            Phase::Normalize => "normalize",
            Phase::Standardize => "standardize",
            Phase::Geocode => "geocode",
            Phase::ReadBack => "read-back",
            Phase::ReverseGeocode => "reverse-geocode",
            Phase::Catalog => "catalog",
        };
        write!(f, "{}", name)
    }
}

/// Failures coming out of the database client itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("could not check out a connection: {0}")]
    Pool(#[from] r2d2::Error),
}

#[derive(Debug, Error)]
pub enum GeocoderError {
    /// Caller input does not have the shape the staging table expects.
    #[error("input does not match the staging layout: {0}")]
    SchemaMismatch(String),
    #[error("could not prepare staging table {table}: {source}")]
    Schema {
        table: String,
        #[source]
        source: StoreError,
    },
    #[error("{phase} failed: {source}")]
    Query {
        phase: Phase,
        #[source]
        source: StoreError,
    },
    #[error(
        "column {column} of {table} is not a geometry column (geometry columns: {geometry_columns:?})"
    )]
    Metadata {
        table: String,
        column: String,
        geometry_columns: Vec<String>,
    },
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("could not decode geometry: {0}")]
    Geometry(#[from] WkbError),
}

impl GeocoderError {
    pub fn query<E: Into<StoreError>>(phase: Phase, error: E) -> Self {
        GeocoderError::Query { phase, source: error.into() }
    }

    pub fn schema<E: Into<StoreError>>(table: &impl fmt::Display, error: E) -> Self {
        GeocoderError::Schema { table: table.to_string(), source: error.into() }
    }

    /// Whether the caller, rather than the database, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GeocoderError::SchemaMismatch(_)
                | GeocoderError::InvalidIdentifier(_)
                | GeocoderError::InvalidOption(_)
        )
    }
}
