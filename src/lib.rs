#[macro_use]
extern crate rocket;

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod telemetry;
pub mod upload;
pub mod validation;
#[cfg(test)]
mod test;

use rocket::data::{Limits, ToByteUnit};
use rocket::fs::FileServer;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use auth::TokenKeys;
use config::AppConfig;
use error::AppError;
use telemetry::TelemetryFairing;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Config(#[from] config::ConfigError),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

/// Builds the Rocket instance with all API routes, catchers and managed state.
///
/// The pool must already point at a migrated database; the server never
/// changes the schema itself.
pub fn init_rocket(pool: SqlitePool, config: AppConfig) -> Rocket<Build> {
    info!(port = config.port, "Starting ham roll-call logger");

    let limits = Limits::default()
        .limit("file", 32.mebibytes())
        .limit("data-form", 40.mebibytes())
        .limit("json", 2.mebibytes());

    let figment = rocket::Config::figment()
        .merge(("port", config.port))
        .merge(("address", config.address.clone()))
        .merge(("limits", limits))
        .merge(("log_level", rocket::config::LogLevel::Critical));

    let keys = TokenKeys::new(&config.jwt_secret);
    let frontend_dir = config.frontend_dir.clone();

    let mut rocket = rocket::custom(figment)
        .manage(pool)
        .manage(keys)
        .manage(config)
        .mount("/api", api::routes())
        .register("/api", api::catchers())
        .attach(TelemetryFairing);

    if frontend_dir.join("index.html").is_file() {
        info!(path = %frontend_dir.display(), "Serving frontend build");
        rocket = rocket
            .mount("/", FileServer::from(&frontend_dir))
            .mount("/", api::frontend::routes());
    }

    rocket
}
