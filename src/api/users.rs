use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::auth::policy::{self, Action, TargetUser};
use crate::auth::{AuthUser, Role, User};
use crate::db::{create_user, delete_user, get_user, list_users, update_user};
use crate::error::AppError;
use crate::models::UserUpdate;
use crate::validation::{JsonValidateExt, non_blank};

#[get("/users")]
pub async fn api_list_users(
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<User>>, AppError> {
    policy::authorize(&user, Action::ListUsers)?;
    let users = list_users(db, policy::user_list_scope(user.role)).await?;
    Ok(Json(users))
}

#[derive(Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, message = "username is required"))]
    username: String,
    #[validate(length(min = 1, message = "password is required"))]
    password: String,
    callsign: Option<String>,
    role: Option<Role>,
}

#[post("/users", data = "<new_user>")]
pub async fn api_create_user(
    user: AuthUser,
    new_user: Json<CreateUserRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<User>>, AppError> {
    let new_user = new_user.validate_custom()?;
    let role = new_user.role.unwrap_or(Role::Operator);
    policy::authorize(&user, Action::CreateUser { role })?;

    let callsign = non_blank(new_user.callsign.as_deref());
    let id = create_user(
        db,
        new_user.username.trim(),
        &new_user.password,
        callsign.as_deref(),
        role,
    )
    .await?;
    info!(created_by = user.id, user_id = id, role = %role, "Created user");

    Ok(Custom(Status::Created, Json(get_user(db, id).await?)))
}

#[put("/users/<id>", data = "<changes>")]
pub async fn api_update_user(
    id: i64,
    user: AuthUser,
    changes: Json<UserUpdate>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<User>, AppError> {
    let changes = changes.validate_custom()?;
    let target = get_user(db, id).await?;

    policy::authorize(
        &user,
        Action::UpdateUser {
            target: TargetUser {
                id: target.id,
                role: target.role,
            },
            new_role: changes.role,
        },
    )?;

    Ok(Json(update_user(db, id, &changes).await?))
}

#[delete("/users/<id>")]
pub async fn api_delete_user(
    id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Value>, AppError> {
    let target = get_user(db, id).await?;
    policy::authorize(
        &user,
        Action::DeleteUser {
            target: TargetUser {
                id: target.id,
                role: target.role,
            },
        },
    )?;

    delete_user(db, id).await?;
    info!(deleted_by = user.id, user_id = id, "Deleted user");
    Ok(Json(json!({ "message": "User deleted successfully" })))
}
