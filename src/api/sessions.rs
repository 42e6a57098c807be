use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::auth::AuthUser;
use crate::auth::policy::{self, Action};
use crate::db::{
    create_control, create_session, delete_session, get_session, list_sessions, update_session,
};
use crate::error::AppError;
use crate::models::{Control, NewControl, NewSession, SessionDetail, SessionUpdate};
use crate::validation::JsonValidateExt;

#[post("/sessions", data = "<session>")]
pub async fn api_create_session(
    user: AuthUser,
    session: Json<NewSession>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<SessionDetail>>, AppError> {
    let session = session.validate_custom()?;
    let id = create_session(db, user.id, &session).await?;
    info!(session_id = id, created_by = user.id, "Created session");

    Ok(Custom(Status::Created, Json(get_session(db, id).await?)))
}

#[get("/sessions")]
pub async fn api_list_sessions(
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<SessionDetail>>, AppError> {
    Ok(Json(list_sessions(db).await?))
}

#[get("/sessions/<id>")]
pub async fn api_get_session(
    id: i64,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SessionDetail>, AppError> {
    Ok(Json(get_session(db, id).await?))
}

#[put("/sessions/<id>", data = "<changes>")]
pub async fn api_update_session(
    id: i64,
    _user: AuthUser,
    changes: Json<SessionUpdate>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SessionDetail>, AppError> {
    let changes = changes.validate_custom()?;
    Ok(Json(update_session(db, id, &changes).await?))
}

#[delete("/sessions/<id>")]
pub async fn api_delete_session(
    id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Value>, AppError> {
    policy::authorize(&user, Action::DeleteSession)?;
    delete_session(db, id).await?;
    info!(session_id = id, deleted_by = user.id, "Deleted session");

    Ok(Json(json!({ "message": "Session deleted successfully" })))
}

#[post("/sessions/<id>/controls", data = "<control>")]
pub async fn api_create_control(
    id: i64,
    user: AuthUser,
    control: Json<NewControl>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Control>>, AppError> {
    let control = control.validate_custom()?;
    let created = create_control(db, id, user.id, &control).await?;

    Ok(Custom(Status::Created, Json(created)))
}
