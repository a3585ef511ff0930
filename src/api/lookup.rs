use actix_web::{web, Error, HttpResponse};
use serde::Deserialize;

use crate::api::respond;
use crate::data::repo::tiger;
use crate::data::schema::GEOCODE_SRID;
use crate::db::Pool;

const DEFAULT_MAX_RESULTS: i32 = 10;

#[derive(Deserialize)]
pub struct AddressQuery {
    address: String,
    max_results: Option<i32>,
    /// (E)WKT area the candidates must fall in.
    restrict_geom: Option<String>,
}

pub async fn geocode_address(
    query: web::Query<AddressQuery>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, Error> {
    let result = web::block(move || {
        tiger::geocode_address(
            &pool,
            &query.address,
            query.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            query.restrict_geom.as_deref(),
        )
    })
    .await;

    Ok(respond("geocoding address", result))
}

#[derive(Deserialize)]
pub struct AddressListRequest {
    addresses: Vec<String>,
    max_results: Option<i32>,
    restrict_geom: Option<String>,
}

pub async fn geocode_addresses(
    request: web::Json<AddressListRequest>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, Error> {
    let request = request.into_inner();
    let result = web::block(move || {
        tiger::geocode_addresses(
            &pool,
            &request.addresses,
            request.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            request.restrict_geom.as_deref(),
        )
    })
    .await;

    Ok(respond("geocoding address list", result))
}

#[derive(Deserialize)]
pub struct StandardizeRequest {
    addresses: Vec<String>,
}

pub async fn standardize(
    request: web::Json<StandardizeRequest>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, Error> {
    let addresses = request.into_inner().addresses;
    let result = web::block(move || tiger::standardize_addresses(&pool, &addresses)).await;

    Ok(respond("standardizing addresses", result))
}

#[derive(Deserialize)]
pub struct ReverseQuery {
    lat: f64,
    lon: f64,
    srid: Option<i32>,
}

pub async fn reverse(
    query: web::Query<ReverseQuery>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, Error> {
    let result = web::block(move || {
        tiger::reverse_geocode(&pool, query.lat, query.lon, query.srid.unwrap_or(GEOCODE_SRID))
    })
    .await;

    Ok(respond("reverse geocoding", result))
}
