use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use super::sessions::{LOG_COLUMNS, fetch_net_session};
use super::users::ensure_active_user;
use crate::error::AppError;
use crate::models::{Log, LogUpdate, NewLog, StationDetails};

fn log_not_found(session_id: i64, log_id: i64) -> AppError {
    AppError::NotFound(format!(
        "Log {} not found in session {}",
        log_id, session_id
    ))
}

async fn insert_log(
    conn: &mut SqliteConnection,
    session_id: i64,
    operator_user_id: i64,
    log: &NewLog,
) -> Result<i64, AppError> {
    let station = &log.station;
    let res = sqlx::query(
        "INSERT INTO logs
         (session_id, operator_user_id, participant_callsign, rst_rcvd, rst_sent, radio, antenna,
          power, qth_text, qth_province, qth_city, qth_district, timestamp)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(session_id)
    .bind(operator_user_id)
    .bind(&log.participant_callsign)
    .bind(&log.rst_rcvd)
    .bind(&log.rst_sent)
    .bind(&station.radio)
    .bind(&station.antenna)
    .bind(&station.power)
    .bind(&station.qth_text)
    .bind(&station.qth_province)
    .bind(&station.qth_city)
    .bind(&station.qth_district)
    .bind(log.timestamp.unwrap_or_else(Utc::now))
    .execute(conn)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, log), fields(participant = %log.participant_callsign))]
pub async fn create_log(
    pool: &Pool<Sqlite>,
    session_id: i64,
    operator_user_id: i64,
    log: &NewLog,
) -> Result<Log, AppError> {
    info!("Recording log entry");
    let mut tx = pool.begin().await?;
    fetch_net_session(&mut tx, session_id).await?;
    ensure_active_user(&mut tx, operator_user_id).await?;

    let log_id = insert_log(&mut tx, session_id, operator_user_id, log).await?;
    tx.commit().await?;

    get_log(pool, session_id, log_id).await
}

#[instrument(skip(pool))]
pub async fn get_log(pool: &Pool<Sqlite>, session_id: i64, log_id: i64) -> Result<Log, AppError> {
    sqlx::query_as::<_, Log>(&format!(
        "SELECT {} FROM logs WHERE id = ? AND session_id = ?",
        LOG_COLUMNS
    ))
    .bind(log_id)
    .bind(session_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| log_not_found(session_id, log_id))
}

#[instrument(skip(pool, changes))]
pub async fn update_log(
    pool: &Pool<Sqlite>,
    session_id: i64,
    log_id: i64,
    changes: LogUpdate,
) -> Result<Log, AppError> {
    info!("Updating log entry");
    let current = get_log(pool, session_id, log_id).await?;
    let station = current.station.merged(changes.station);

    sqlx::query(
        "UPDATE logs
         SET participant_callsign = ?, rst_rcvd = ?, rst_sent = ?, radio = ?, antenna = ?,
             power = ?, qth_text = ?, qth_province = ?, qth_city = ?, qth_district = ?,
             timestamp = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ? AND session_id = ?",
    )
    .bind(changes.participant_callsign.unwrap_or(current.participant_callsign))
    .bind(changes.rst_rcvd.unwrap_or(current.rst_rcvd))
    .bind(changes.rst_sent.unwrap_or(current.rst_sent))
    .bind(station.radio)
    .bind(station.antenna)
    .bind(station.power)
    .bind(station.qth_text)
    .bind(station.qth_province)
    .bind(station.qth_city)
    .bind(station.qth_district)
    .bind(changes.timestamp.unwrap_or(current.timestamp))
    .bind(log_id)
    .bind(session_id)
    .execute(pool)
    .await?;

    get_log(pool, session_id, log_id).await
}

#[instrument(skip(pool))]
pub async fn delete_log(pool: &Pool<Sqlite>, session_id: i64, log_id: i64) -> Result<(), AppError> {
    info!("Deleting log entry");
    let res = sqlx::query("DELETE FROM logs WHERE id = ? AND session_id = ?")
        .bind(log_id)
        .bind(session_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(log_not_found(session_id, log_id));
    }
    Ok(())
}

/// Station details from the most recent log of `callsign` in any session.
#[instrument(skip(pool))]
pub async fn last_by_callsign(
    pool: &Pool<Sqlite>,
    callsign: &str,
) -> Result<Option<StationDetails>, AppError> {
    let details = sqlx::query_as::<_, StationDetails>(
        "SELECT radio, antenna, power, qth_text, qth_province, qth_city, qth_district
         FROM logs
         WHERE participant_callsign = ?
         ORDER BY timestamp DESC, id DESC
         LIMIT 1",
    )
    .bind(callsign)
    .fetch_optional(pool)
    .await?;

    Ok(details)
}

/// Stores imported rows as logs of one session. Either every row is stored or
/// none is.
#[instrument(skip(pool, rows), fields(rows = rows.len()))]
pub async fn import_logs(
    pool: &Pool<Sqlite>,
    session_id: i64,
    operator_user_id: i64,
    rows: &[NewLog],
) -> Result<usize, AppError> {
    info!("Importing log history");
    let mut tx = pool.begin().await?;
    fetch_net_session(&mut tx, session_id).await?;
    ensure_active_user(&mut tx, operator_user_id).await?;

    for row in rows {
        insert_log(&mut tx, session_id, operator_user_id, row).await?;
    }

    tx.commit().await?;
    Ok(rows.len())
}
