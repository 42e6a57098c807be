use chrono::Utc;
use rocket::State;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::info;

use super::download::Download;
use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::db::{get_session, import_logs, insert_qth_entries, list_sessions, user_refs};
use crate::error::AppError;
use crate::export::adif::session_adif;
use crate::export::spreadsheet::{
    all_sessions_workbook, parse_log_rows, parse_qth_rows, read_rows, session_list_workbook,
    session_logs_workbook,
};
use crate::export::templates::{
    IMPORT_TEMPLATE_FILENAME, QTH_TEMPLATE_FILENAME, import_template, qth_template,
};
use crate::export::{OperatorDirectory, safe_file_stem};
use crate::upload::StagedUpload;

async fn operator_directory(db: &Pool<Sqlite>) -> Result<OperatorDirectory, AppError> {
    Ok(OperatorDirectory::new(user_refs(db).await?))
}

fn dated_filename(prefix: &str) -> String {
    format!("{}_{}.xlsx", prefix, Utc::now().format("%Y-%m-%d"))
}

#[get("/sessions/export/excel")]
pub async fn api_export_session_list(
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Download, AppError> {
    let sessions = list_sessions(db).await?;
    let body = session_list_workbook(&sessions)?;
    Ok(Download::xlsx(dated_filename("活动列表"), body))
}

#[get("/sessions/<id>/export/excel")]
pub async fn api_export_session_excel(
    id: i64,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Download, AppError> {
    let detail = get_session(db, id).await?;
    let body = session_logs_workbook(&detail, &operator_directory(db).await?)?;

    Ok(Download::xlsx(
        format!("{}_export.xlsx", safe_file_stem(&detail.session.title)),
        body,
    ))
}

#[get("/sessions/<id>/export/adif")]
pub async fn api_export_session_adif(
    id: i64,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Download, AppError> {
    let detail = get_session(db, id).await?;
    let body = session_adif(&detail, &operator_directory(db).await?);

    Ok(Download::text(
        format!("{}_export.adif", safe_file_stem(&detail.session.title)),
        body,
    ))
}

#[get("/all_sessions/export/excel")]
pub async fn api_export_all_sessions(
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Download, AppError> {
    let sessions = list_sessions(db).await?;
    let body = all_sessions_workbook(&sessions, &operator_directory(db).await?)?;
    Ok(Download::xlsx(dated_filename("所有活动记录"), body))
}

#[get("/import_template")]
pub fn api_import_template(_user: AuthUser) -> Result<Download, AppError> {
    Ok(Download::xlsx(IMPORT_TEMPLATE_FILENAME, import_template()?))
}

#[get("/qth/export")]
pub fn api_qth_template(_user: AuthUser) -> Result<Download, AppError> {
    Ok(Download::xlsx(QTH_TEMPLATE_FILENAME, qth_template()?))
}

#[derive(FromForm)]
pub struct LogImportForm<'r> {
    file: Option<TempFile<'r>>,
    session_id: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LogImportResponse {
    pub message: String,
    pub count: usize,
    pub skipped: usize,
    pub persisted: bool,
    pub session_id: Option<i64>,
}

/// Parses a log history file. Rows are stored only when a target session is given.
#[post("/import_logs", data = "<form>")]
pub async fn api_import_logs(
    user: AuthUser,
    mut form: Form<LogImportForm<'_>>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<LogImportResponse>, AppError> {
    let staged = StagedUpload::stage(form.file.as_mut(), &config.upload_dir).await?;
    let rows = read_rows(&staged.read().await?)?;
    let parsed = parse_log_rows(&rows);

    let response = match form.session_id {
        Some(session_id) => {
            let count = import_logs(db, session_id, user.id, &parsed.logs).await?;
            info!(session_id, count, skipped = parsed.skipped, "Imported log history");
            LogImportResponse {
                message: "Logs imported successfully".to_string(),
                count,
                skipped: parsed.skipped,
                persisted: true,
                session_id: Some(session_id),
            }
        }
        None => LogImportResponse {
            message: "File parsed. No session_id was given, so nothing was stored".to_string(),
            count: parsed.logs.len() + parsed.skipped,
            skipped: parsed.skipped,
            persisted: false,
            session_id: None,
        },
    };

    Ok(Json(response))
}

#[derive(FromForm)]
pub struct QthImportForm<'r> {
    file: Option<TempFile<'r>>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct QthImportResponse {
    pub message: String,
    pub count: usize,
    pub inserted: u64,
}

#[post("/qth/import", data = "<form>")]
pub async fn api_import_qth(
    _user: AuthUser,
    mut form: Form<QthImportForm<'_>>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<QthImportResponse>, AppError> {
    let staged = StagedUpload::stage(form.file.as_mut(), &config.upload_dir).await?;
    let entries = parse_qth_rows(&read_rows(&staged.read().await?)?);
    let inserted = insert_qth_entries(db, &entries).await?;

    Ok(Json(QthImportResponse {
        message: "QTH data imported successfully".to_string(),
        count: entries.len(),
        inserted,
    }))
}
