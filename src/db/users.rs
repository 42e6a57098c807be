use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use crate::auth::policy::UserListScope;
use crate::auth::{DbUser, Role, User};
use crate::error::AppError;
use crate::models::{UserRef, UserUpdate};

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

/// Username that is created on first login when it does not exist yet.
pub const BOOTSTRAP_ADMIN: &str = "admin";

const USER_COLUMNS: &str = "id, username, callsign, role, created_at";

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE id = ?",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => User::try_from(user),
        _ => Err(AppError::NotFound(format!("User with id {} not found", id))),
    }
}

/// Rows written on behalf of a token must point at an account that still
/// exists. Tokens outlive deleted accounts, so this runs inside the write.
pub(crate) async fn ensure_active_user(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<(), AppError> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(conn)
        .await?;

    if exists == 0 {
        warn!(user_id = id, "Write attempted by a deleted account");
        return Err(AppError::Authentication(
            "User account no longer exists".to_string(),
        ));
    }
    Ok(())
}

#[instrument]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE username = ?",
        USER_COLUMNS
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;

    row.map(User::try_from).transpose()
}

#[instrument]
pub async fn list_users(pool: &Pool<Sqlite>, scope: UserListScope) -> Result<Vec<User>, AppError> {
    info!(?scope, "Listing users");
    let query = match scope {
        UserListScope::All => format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS),
        UserListScope::OperatorsOnly => format!(
            "SELECT {} FROM users WHERE role = 'operator' ORDER BY id",
            USER_COLUMNS
        ),
    };

    let rows = sqlx::query_as::<_, DbUser>(&query).fetch_all(pool).await?;
    rows.into_iter().map(User::try_from).collect()
}

#[instrument(skip_all, fields(username, role = %role))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    callsign: Option<&str>,
    role: Role,
) -> Result<i64, AppError> {
    info!("Creating new user");
    let hashed_password = bcrypt::hash(password, HASH_COST)?;

    let res = sqlx::query(
        "INSERT INTO users (username, password_hash, callsign, role) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(hashed_password)
    .bind(callsign)
    .bind(role.as_str())
    .execute(pool)
    .await
    .map_err(|e| AppError::from_write(e, "Username already exists"))?;

    Ok(res.last_insert_rowid())
}

/// Applies the present fields of `changes`; absent fields keep their value.
#[instrument(skip(pool, changes), fields(user_id = id))]
pub async fn update_user(
    pool: &Pool<Sqlite>,
    id: i64,
    changes: &UserUpdate,
) -> Result<User, AppError> {
    info!("Updating user");
    let current = get_user(pool, id).await?;

    let username = changes.username.as_deref().unwrap_or(&current.username);
    let callsign = changes.callsign.as_deref().or(current.callsign.as_deref());
    let role = changes.role.unwrap_or(current.role);

    sqlx::query(
        "UPDATE users SET username = ?, callsign = ?, role = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(username)
    .bind(callsign)
    .bind(role.as_str())
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| AppError::from_write(e, "Username already exists"))?;

    if let Some(password) = &changes.password {
        let hashed_password = bcrypt::hash(password, HASH_COST)?;
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(hashed_password)
            .bind(id)
            .execute(pool)
            .await?;
    }

    get_user(pool, id).await
}

/// Removes the user row only. Sessions, logs and controls that reference the
/// user are left in place.
#[instrument]
pub async fn delete_user(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting user");
    let res = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User with id {} not found", id)));
    }
    Ok(())
}

/// Returns the user when the password matches, `None` otherwise.
#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");

    #[derive(sqlx::FromRow)]
    struct Credentials {
        id: i64,
        password_hash: String,
    }

    let row = sqlx::query_as::<_, Credentials>(
        "SELECT id, password_hash FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    match bcrypt::verify(password, &row.password_hash) {
        Ok(true) => Ok(Some(get_user(pool, row.id).await?)),
        Ok(false) => Ok(None),
        Err(e) => {
            warn!(error = %e, "Stored password hash could not be verified");
            Ok(None)
        }
    }
}

/// Makes sure the `admin` account exists and is a super admin.
#[instrument(skip_all)]
pub async fn ensure_bootstrap_admin(
    pool: &Pool<Sqlite>,
    default_password: &str,
) -> Result<(), AppError> {
    match find_user_by_username(pool, BOOTSTRAP_ADMIN).await? {
        None => {
            info!("Creating bootstrap admin account");
            create_user(
                pool,
                BOOTSTRAP_ADMIN,
                default_password,
                Some(BOOTSTRAP_ADMIN),
                Role::SuperAdmin,
            )
            .await?;
        }
        Some(user) if user.role != Role::SuperAdmin => {
            warn!(previous_role = %user.role, "Restoring super admin role on bootstrap admin");
            sqlx::query(
                "UPDATE users SET role = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            )
            .bind(Role::SuperAdmin.as_str())
            .bind(user.id)
            .execute(pool)
            .await?;
        }
        Some(_) => {}
    }
    Ok(())
}

/// Id, username and callsign of every user, for labelling exported rows.
#[instrument(skip(pool))]
pub async fn user_refs(pool: &Pool<Sqlite>) -> Result<Vec<UserRef>, AppError> {
    let rows = sqlx::query_as::<_, UserRef>("SELECT id, username, callsign FROM users")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
