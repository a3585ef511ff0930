pub mod batch;
pub mod dataset;
pub mod error;
#[cfg(test)]
pub mod fake;
pub mod ident;
pub mod ingest;
pub mod metadata;
pub mod pipeline;
pub mod results;
pub mod schema;
pub mod store;
pub mod wkb;

pub mod repo {
    pub mod metadata;
    pub mod staging;
    pub mod tiger;
}
