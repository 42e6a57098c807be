use chrono::Utc;
use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};

use super::{AuthUser, TokenKeys};
use crate::error::AppError;

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AppError> {
    let header = header
        .ok_or_else(|| AppError::Authentication("Authorization header required".to_string()))?;

    match header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AppError::Authentication(
            "Invalid authorization format".to_string(),
        )),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AppError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("user_auth_guard");
        let _guard = auth_span.enter();

        let keys = match request.rocket().state::<TokenKeys>() {
            Some(keys) => keys,
            _ => {
                tracing::error!("Token keys not found in managed state");
                return Outcome::Error((
                    Status::InternalServerError,
                    AppError::Internal("Token keys missing".to_string()),
                ));
            }
        };

        let token = match bearer_token(request.headers().get_one("Authorization")) {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(error = %err, "Rejected request without usable bearer token");
                return Outcome::Error((Status::Unauthorized, err));
            }
        };

        match keys.verify(token, Utc::now().timestamp()) {
            Ok(claims) => {
                let user = AuthUser::from(claims);
                tracing::debug!(username = %user.username, role = %user.role, "User authenticated via bearer token");
                Outcome::Success(user)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Invalid bearer token");
                Outcome::Error((Status::Unauthorized, err))
            }
        }
    }
}

fn error_body(status: Status, message: &str) -> Custom<Json<Value>> {
    Custom(status, Json(json!({ "error": message })))
}

#[catch(400)]
pub fn bad_request_api(_req: &Request) -> Custom<Json<Value>> {
    error_body(Status::BadRequest, "Bad request")
}

#[catch(401)]
pub fn unauthorized_api(req: &Request) -> Custom<Json<Value>> {
    tracing::warn!(uri = %req.uri(), "Unauthorized access attempt");
    error_body(Status::Unauthorized, "Authentication failed")
}

#[catch(403)]
pub fn forbidden_api(req: &Request) -> Custom<Json<Value>> {
    tracing::warn!(uri = %req.uri(), "Forbidden access attempt");
    error_body(Status::Forbidden, "Access denied")
}

#[catch(404)]
pub fn not_found_api(_req: &Request) -> Custom<Json<Value>> {
    error_body(Status::NotFound, "Not found")
}

#[catch(422)]
pub fn unprocessable_api(_req: &Request) -> Custom<Json<Value>> {
    error_body(Status::UnprocessableEntity, "Malformed request body")
}

#[catch(500)]
pub fn internal_error_api(_req: &Request) -> Custom<Json<Value>> {
    error_body(Status::InternalServerError, "Internal server error")
}
