use clap::Parser;
use ham_rollcall::config::{DEFAULT_DATABASE_PATH, load_environment};
use ham_rollcall::database::{
    CURRENT_SCHEMA, DeclarativeMigrator, SchemaChanges, connect_pool,
};
use ham_rollcall::telemetry::init_tracing;
use std::path::PathBuf;
use std::process::ExitCode;

/// Brings the SQLite schema up to date. Only additive changes are applied;
/// dropping tables, columns or indices is always refused.
#[derive(clap::Parser, Debug)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Report pending changes and exit 1 if there are any.
    #[arg(long)]
    check: bool,

    /// Database file.
    #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH)]
    database: PathBuf,
}

impl Cli {
    async fn run(&self) -> anyhow::Result<SchemaChanges> {
        let pool = connect_pool(&self.database).await?;
        let migrator = DeclarativeMigrator::new(pool, CURRENT_SCHEMA);

        let changes = if self.check {
            migrator.plan().await?
        } else {
            migrator.migrate().await?
        };

        Ok(changes)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Env files first, so `DATABASE_PATH` from them reaches the parser.
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }
    let cli = Cli::parse();
    let _telemetry = init_tracing();

    match cli.run().await {
        Ok(changes) if cli.check && !changes.is_empty() => {
            println!("Pending schema changes:\n{}", changes);
            ExitCode::from(1)
        }
        Ok(changes) => {
            print!("{}", changes);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Migration failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
