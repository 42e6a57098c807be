use chrono::Utc;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};
use validator::Validate;

use crate::auth::{AuthUser, Role, TokenKeys};
use crate::config::AppConfig;
use crate::db::{BOOTSTRAP_ADMIN, authenticate_user, create_user, ensure_bootstrap_admin, get_user};
use crate::error::AppError;
use crate::validation::{JsonValidateExt, non_blank};

#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "username is required"))]
    username: String,
    #[validate(length(min = 1, message = "password is required"))]
    password: String,
    callsign: Option<String>,
}

/// Self-service sign-up. The account is always an operator.
#[post("/register", data = "<register>")]
pub async fn api_register(
    register: Json<RegisterRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Value>>, AppError> {
    let register = register.validate_custom()?;
    let callsign = non_blank(register.callsign.as_deref());

    let id = create_user(
        db,
        register.username.trim(),
        &register.password,
        callsign.as_deref(),
        Role::Operator,
    )
    .await?;
    info!(user_id = id, "Registered new operator");

    Ok(Custom(
        Status::Created,
        Json(json!({ "message": "User created successfully", "id": id })),
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub user: LoginUser,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    db: &State<Pool<Sqlite>>,
    keys: &State<TokenKeys>,
    config: &State<AppConfig>,
) -> Result<Json<LoginResponse>, AppError> {
    if login.username == BOOTSTRAP_ADMIN {
        ensure_bootstrap_admin(db, &config.admin_default_password).await?;
    }

    let Some(user) = authenticate_user(db, &login.username, &login.password).await? else {
        warn!(username = %login.username, "Failed login attempt");
        return Err(AppError::Authentication("Invalid credentials".to_string()));
    };

    let token = keys.issue(user.id, &user.username, user.role, Utc::now().timestamp())?;
    info!(user_id = user.id, role = %user.role, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: LoginUser {
            id: user.id,
            username: user.username,
            role: user.role,
        },
    }))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub callsign: Option<String>,
}

#[get("/me")]
pub async fn api_me(user: AuthUser, db: &State<Pool<Sqlite>>) -> Result<Json<MeResponse>, AppError> {
    let stored = get_user(db, user.id).await?;

    Ok(Json(MeResponse {
        id: stored.id,
        username: stored.username,
        role: stored.role,
        callsign: stored.callsign,
    }))
}
