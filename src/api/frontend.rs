use std::path::PathBuf;

use rocket::fs::NamedFile;
use rocket::{Route, State};

use crate::config::AppConfig;

/// Hands `index.html` to any path the static file server did not match, so
/// client-side routes survive a reload. API paths are never answered here.
#[get("/<path..>", rank = 20)]
pub async fn spa_fallback(path: PathBuf, config: &State<AppConfig>) -> Option<NamedFile> {
    if path.starts_with("api") {
        return None;
    }
    NamedFile::open(config.frontend_dir.join("index.html")).await.ok()
}

pub fn routes() -> Vec<Route> {
    routes![spa_fallback]
}
