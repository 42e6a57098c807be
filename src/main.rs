use ham_rollcall::config::{AppConfig, load_environment};
use ham_rollcall::database::{connect_pool, ensure_schema_current};
use ham_rollcall::telemetry::init_tracing;
use ham_rollcall::{Error, init_rocket};
use tracing::{error, info};

#[rocket::main]
async fn main() -> Result<(), Error> {
    // Env files may carry RUST_LOG and the OTLP endpoint, so they load first.
    let env_result = load_environment();
    let _telemetry = init_tracing();

    if let Err(e) = env_result {
        error!("Failed to load environment files: {}", e);
    }

    let config = AppConfig::from_env()?;

    let pool = connect_pool(&config.database_path).await?;

    info!("Checking database schema...");
    if let Err(e) = ensure_schema_current(&pool).await {
        error!("Database schema check failed: {}", e);
        return Err(e.into());
    }

    let _rocket = init_rocket(pool, config).launch().await?;

    Ok(())
}
