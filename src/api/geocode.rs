use actix_web::{web, Error, HttpResponse};
use log::error;
use serde::{Deserialize, Serialize};

use crate::api::{bad_request, error_response, respond};
use crate::data::dataset::{records_from_csv, records_to_csv, Record};
use crate::data::ident::Ident;
use crate::data::pipeline::{geocode_records, ingest_records, GeocodeOptions};
use crate::data::schema::{TableKind, KEY_COLUMN};
use crate::data::store::StagingStore;

fn default_address_column() -> String {
    KEY_COLUMN.to_string()
}

/// Server-wide settings for the batch endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchSettings {
    pub show_progress: bool,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeParams {
    #[serde(default = "default_address_column")]
    address_column: String,
    #[serde(default)]
    kind: TableKind,
    schema: Option<Ident>,
    table: Option<Ident>,
    batch_size: Option<i64>,
    rating_threshold: Option<i32>,
}

impl GeocodeParams {
    fn options(&self, settings: &BatchSettings) -> GeocodeOptions {
        let defaults = GeocodeOptions::default();
        GeocodeOptions {
            kind: self.kind,
            schema: self.schema.clone().unwrap_or(defaults.schema),
            table: self.table.clone(),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            rating_threshold: self.rating_threshold.unwrap_or(defaults.rating_threshold),
            show_progress: settings.show_progress,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GeocodeRequest {
    records: Vec<Record>,
    #[serde(flatten)]
    params: GeocodeParams,
}

pub async fn geocode<S>(
    request: web::Json<GeocodeRequest>,
    store: web::Data<S>,
    settings: web::Data<BatchSettings>,
) -> Result<HttpResponse, Error>
where
    S: StagingStore + Send + Sync + 'static,
{
    let GeocodeRequest { records, params } = request.into_inner();
    let result = web::block(move || {
        let options = params.options(&settings);
        geocode_records(store.get_ref(), records, &params.address_column, &options)
    })
    .await;

    Ok(respond("geocoding records", result))
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    inserted: usize,
}

/// Loads records into the staging table without geocoding them.
pub async fn ingest<S>(
    request: web::Json<GeocodeRequest>,
    store: web::Data<S>,
    settings: web::Data<BatchSettings>,
) -> Result<HttpResponse, Error>
where
    S: StagingStore + Send + Sync + 'static,
{
    let GeocodeRequest { records, params } = request.into_inner();
    let result = web::block(move || {
        ingest_records(store.get_ref(), &records, &params.options(&settings))
            .map(|inserted| IngestResponse { inserted })
    })
    .await;

    Ok(respond("ingesting records", result))
}

pub async fn geocode_csv<S>(
    params: web::Query<GeocodeParams>,
    body: web::Bytes,
    store: web::Data<S>,
    settings: web::Data<BatchSettings>,
) -> Result<HttpResponse, Error>
where
    S: StagingStore + Send + Sync + 'static,
{
    let records = match records_from_csv(&body[..]) {
        Ok(records) => records,
        Err(err) => return Ok(bad_request(format!("invalid csv: {}", err))),
    };

    let params = params.into_inner();
    let result = web::block(move || {
        let options = params.options(&settings);
        geocode_records(store.get_ref(), records, &params.address_column, &options)
    })
    .await;

    let dataset = match result {
        Ok(Ok(dataset)) => dataset,
        Ok(Err(err)) => return Ok(error_response("geocoding csv", &err)),
        Err(err) => {
            error!("Error while geocoding csv: {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    match records_to_csv(&dataset.records) {
        Ok(csv) => Ok(HttpResponse::Ok().content_type("text/csv").body(csv)),
        Err(err) => {
            error!("Error while writing csv: {}", err);
            Ok(HttpResponse::InternalServerError().finish())
        }
    }
}
