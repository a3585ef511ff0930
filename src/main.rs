#[macro_use]
extern crate diesel;

use std::io;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::{error, info};

use crate::api::geocode::BatchSettings;
use crate::config::ServerConfig;
use crate::db::{init_connection_pool, PgStore};

mod api;
mod config;
mod data;
mod db;

const JSON_LIMIT_BYTES: usize = 16_777_216; // 16MB
const CSV_LIMIT_BYTES: usize = 16_777_216;

#[actix_rt::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env().map_err(|err| {
        error!("Invalid configuration: {}", err);
        io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
    })?;

    let pool = init_connection_pool(&config.db).map_err(|err| {
        error!("Could not create db pool: {}", err);
        io::Error::new(io::ErrorKind::Other, err.to_string())
    })?;

    let pool_data = web::Data::new(pool.clone());
    let store_data = web::Data::new(PgStore::new(pool));
    let settings_data = web::Data::new(BatchSettings { show_progress: config.show_progress });

    info!("Listening on {}", config.bind_address);
    HttpServer::new(move || {
        App::new()
            .app_data(pool_data.clone())
            .app_data(store_data.clone())
            .app_data(settings_data.clone())
            .app_data(web::JsonConfig::default().limit(JSON_LIMIT_BYTES))
            .app_data(web::PayloadConfig::new(CSV_LIMIT_BYTES))
            .wrap(Logger::default())
            .configure(api::geocode_routes::<PgStore>)
            .configure(api::lookup_routes)
    })
    .bind(config.bind_address.as_str())?
    .run()
    .await
}
