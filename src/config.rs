use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_DATABASE_PATH: &str = "data/ham_rollcall.db";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_FRONTEND_DIR: &str = "frontend/dist";
pub const DEFAULT_ADMIN_PASSWORD: &str = "password123";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Failed to load environment file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: dotenvy::Error,
    },
}

/// Runtime settings, read once at startup and kept in Rocket managed state.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub address: String,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    pub frontend_dir: PathBuf,
    pub admin_default_password: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match dotenvy::var("PORT") {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                reason: e.to_string(),
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let jwt_secret = dotenvy::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(Self {
            port,
            address: var_or("ADDRESS", DEFAULT_ADDRESS),
            database_path: PathBuf::from(var_or("DATABASE_PATH", DEFAULT_DATABASE_PATH)),
            jwt_secret,
            upload_dir: PathBuf::from(var_or("UPLOAD_DIR", DEFAULT_UPLOAD_DIR)),
            frontend_dir: PathBuf::from(var_or("FRONTEND_DIR", DEFAULT_FRONTEND_DIR)),
            admin_default_password: var_or("ADMIN_DEFAULT_PASSWORD", DEFAULT_ADMIN_PASSWORD),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    dotenvy::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn load_environment() -> Result<(), ConfigError> {
    let profile = dotenvy::var("ROLLCALL_PROFILE").unwrap_or("development".to_string());

    let env_files = if profile == "production" {
        vec!["config/common.env", "config/production.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/development.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), ConfigError> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path).map_err(|source| ConfigError::EnvFile {
        path: path.to_string(),
        source,
    })?;
    info!("Loaded environment from: {}", path);
    Ok(())
}
