use actix_web::error::BlockingError;
use actix_web::{web, HttpResponse};
use log::error;
use serde::Serialize;

use crate::data::error::GeocoderError;
use crate::data::store::StagingStore;

pub mod catalog;
pub mod geocode;
pub mod lookup;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn bad_request(message: String) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorBody { error: message })
}

/// Caller mistakes become a 400 with the reason, anything else a bare 500.
pub fn error_response(context: &str, err: &GeocoderError) -> HttpResponse {
    if err.is_client_error() {
        bad_request(err.to_string())
    } else {
        error!("Error while {}: {}", context, err);
        HttpResponse::InternalServerError().finish()
    }
}

pub fn respond<T: Serialize>(
    context: &str,
    result: Result<Result<T, GeocoderError>, BlockingError>,
) -> HttpResponse {
    match result {
        Ok(Ok(value)) => HttpResponse::Ok().json(value),
        Ok(Err(err)) => error_response(context, &err),
        Err(err) => {
            error!("Error while {}: {}", context, err);
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Batch endpoints, generic over the store so tests can swap it out.
pub fn geocode_routes<S>(cfg: &mut web::ServiceConfig)
where
    S: StagingStore + Send + Sync + 'static,
{
    cfg.route("/geocode", web::post().to(geocode::geocode::<S>))
        .route("/geocode/csv", web::post().to(geocode::geocode_csv::<S>))
        .route("/ingest", web::post().to(geocode::ingest::<S>));
}

/// Single-call endpoints, served straight from the pool.
pub fn lookup_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/geocode/address", web::get().to(lookup::geocode_address))
        .route("/geocode/addresses", web::post().to(lookup::geocode_addresses))
        .route("/standardize", web::post().to(lookup::standardize))
        .route("/reverse", web::get().to(lookup::reverse))
        .route("/settings", web::get().to(catalog::settings))
        .route("/schemas", web::get().to(catalog::schemas))
        .route("/schemas/{schema}/tables", web::get().to(catalog::tables));
}
