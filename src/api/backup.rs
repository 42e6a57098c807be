use rocket::State;
use rocket::fs::NamedFile;
use rocket::http::{ContentType, Header};
use sqlx::{Pool, Sqlite};
use tracing::{error, info};

use super::download::attachment;
use crate::auth::AuthUser;
use crate::auth::policy::{self, Action};
use crate::config::AppConfig;
use crate::database::checkpoint_wal;
use crate::error::AppError;

pub const BACKUP_FILENAME: &str = "ham_rollcall.db";

#[derive(Responder)]
pub struct BackupFile {
    inner: NamedFile,
    content_type: ContentType,
    disposition: Header<'static>,
}

/// Streams the raw SQLite file.
#[get("/backup/download")]
pub async fn api_backup_download(
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<BackupFile, AppError> {
    policy::authorize(&user, Action::DownloadBackup)?;

    let path = &config.database_path;
    if !path.is_file() {
        return Err(AppError::NotFound("Database file not found".to_string()));
    }

    checkpoint_wal(db).await?;
    let file = NamedFile::open(path).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to open database for backup");
        AppError::Io(e)
    })?;
    info!(user_id = user.id, "Serving database backup");

    Ok(BackupFile {
        inner: file,
        content_type: ContentType::Binary,
        disposition: attachment(BACKUP_FILENAME),
    })
}

#[post("/backup/restore")]
pub async fn api_backup_restore(user: AuthUser) -> Result<(), AppError> {
    policy::authorize(&user, Action::RestoreBackup)?;
    Err(AppError::NotImplemented(
        "Database restore functionality not fully implemented".to_string(),
    ))
}
