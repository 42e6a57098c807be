use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};
use sqlx::{Pool, Sqlite};

use crate::auth::AuthUser;
use crate::db::{create_log, delete_log, last_by_callsign, search_qth, update_log};
use crate::error::AppError;
use crate::models::{Log, LogUpdate, NewLog, QthEntry};
use crate::validation::JsonValidateExt;

#[post("/sessions/<id>/logs", data = "<log>")]
pub async fn api_create_log(
    id: i64,
    user: AuthUser,
    log: Json<NewLog>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Log>>, AppError> {
    let log = log.validate_custom()?;
    let created = create_log(db, id, user.id, &log).await?;

    Ok(Custom(Status::Created, Json(created)))
}

#[put("/sessions/<id>/logs/<log_id>", data = "<changes>")]
pub async fn api_update_log(
    id: i64,
    log_id: i64,
    _user: AuthUser,
    changes: Json<LogUpdate>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Log>, AppError> {
    let changes = changes.validate_custom()?;
    Ok(Json(update_log(db, id, log_id, changes).await?))
}

#[delete("/sessions/<id>/logs/<log_id>")]
pub async fn api_delete_log(
    id: i64,
    log_id: i64,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Value>, AppError> {
    delete_log(db, id, log_id).await?;
    Ok(Json(json!({ "message": "Log deleted successfully" })))
}

/// Equipment and location last logged for a callsign, or `{}`.
#[get("/last_by_callsign/<callsign>")]
pub async fn api_last_by_callsign(
    callsign: &str,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Value>, AppError> {
    let details = match last_by_callsign(db, callsign).await? {
        Some(details) => serde_json::to_value(details)
            .map_err(|e| AppError::Internal(format!("Failed to encode station details: {}", e)))?,
        None => json!({}),
    };
    Ok(Json(details))
}

#[get("/qth/search?<query>")]
pub async fn api_qth_search(
    query: Option<&str>,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<QthEntry>>, AppError> {
    Ok(Json(search_qth(db, query.unwrap_or_default()).await?))
}
