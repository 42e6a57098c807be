use std::path::{Path, PathBuf};

use chrono::Utc;
use rocket::fs::TempFile;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;

/// An uploaded file copied into the upload directory. The copy is deleted
/// when this value is dropped, whichever way the request ends.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
}

impl StagedUpload {
    /// Rejects a missing or empty upload with a validation error.
    pub async fn stage(file: Option<&mut TempFile<'_>>, upload_dir: &Path) -> Result<Self, AppError> {
        let file = match file {
            Some(file) if file.len() > 0 => file,
            _ => return Err(AppError::Validation("No file uploaded".to_string())),
        };

        tokio::fs::create_dir_all(upload_dir).await?;
        let name = format!(
            "{}-{}.upload",
            Utc::now().format("%Y%m%d%H%M%S"),
            Uuid::new_v4().simple()
        );
        let staged = Self {
            path: upload_dir.join(name),
        };

        file.copy_to(&staged.path).await?;
        debug!(path = %staged.path.display(), bytes = file.len(), "Staged upload");
        Ok(staged)
    }

    pub async fn read(&self) -> Result<Vec<u8>, AppError> {
        Ok(tokio::fs::read(&self.path).await?)
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed staged upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload"),
        }
    }
}
