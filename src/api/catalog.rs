use actix_web::{web, Error, HttpResponse};
use log::error;

use crate::api::{error_response, respond};
use crate::data::error::{GeocoderError, Phase};
use crate::data::ident::Ident;
use crate::data::repo::{metadata, tiger};
use crate::db::Pool;

pub async fn settings(pool: web::Data<Pool>) -> Result<HttpResponse, Error> {
    let result = web::block(move || tiger::geocode_settings(&pool)).await;
    Ok(respond("reading geocode settings", result))
}

pub async fn schemas(pool: web::Data<Pool>) -> Result<HttpResponse, Error> {
    let result = web::block(move || -> Result<_, GeocoderError> {
        let mut conn = pool
            .get()
            .map_err(|err| GeocoderError::query(Phase::Catalog, err))?;
        metadata::list_schemas(&mut conn).map_err(|err| GeocoderError::query(Phase::Catalog, err))
    })
    .await;

    Ok(respond("listing schemas", result))
}

pub async fn tables(path: web::Path<String>, pool: web::Data<Pool>) -> Result<HttpResponse, Error> {
    let schema = match Ident::new(&path.into_inner()) {
        Ok(schema) => schema,
        Err(err) => return Ok(error_response("listing tables", &err)),
    };

    let result = web::block(move || -> Result<_, GeocoderError> {
        let mut conn = pool
            .get()
            .map_err(|err| GeocoderError::query(Phase::Catalog, err))?;
        metadata::describe_tables(&mut conn, &schema)
            .map_err(|err| GeocoderError::query(Phase::Catalog, err))
    })
    .await;

    match result {
        Ok(Ok(Some(tables))) => Ok(HttpResponse::Ok().json(tables)),
        Ok(Ok(None)) => Ok(HttpResponse::NotFound().finish()),
        Ok(Err(err)) => Ok(error_response("listing tables", &err)),
        Err(err) => {
            error!("Error while listing tables: {}", err);
            Ok(HttpResponse::InternalServerError().finish())
        }
    }
}
