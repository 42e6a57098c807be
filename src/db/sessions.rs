use std::collections::HashMap;

use chrono::NaiveDateTime;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use super::users::ensure_active_user;
use crate::error::AppError;
use crate::models::{
    Control, Log, NetSession, NewControl, NewSession, SessionDetail, SessionOperator,
    SessionOperatorView, SessionUpdate, UserRef,
};

const SESSION_COLUMNS: &str = "id, external_id, title, date, net_callsign, tx_freq, rx_freq, \
     mode, band, created_by, created_at, updated_at";

pub(crate) const CONTROL_COLUMNS: &str = "id, session_id, callsign, radio, antenna, power, \
     qth_text, qth_province, qth_city, qth_district, operator_user_id, created_at, updated_at";

pub(crate) const LOG_COLUMNS: &str = "id, session_id, operator_user_id, participant_callsign, \
     rst_rcvd, rst_sent, radio, antenna, power, qth_text, qth_province, qth_city, qth_district, \
     timestamp, created_at, updated_at";

const DUPLICATE_EXTERNAL_ID: &str = "A session with this external_id already exists";

#[derive(sqlx::FromRow)]
struct DbOperatorRow {
    id: i64,
    session_id: i64,
    user_id: i64,
    callsign: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    user_username: Option<String>,
    user_callsign: Option<String>,
}

impl From<DbOperatorRow> for SessionOperatorView {
    fn from(row: DbOperatorRow) -> Self {
        let user = row.user_username.map(|username| UserRef {
            id: row.user_id,
            username,
            callsign: row.user_callsign,
        });

        Self {
            operator: SessionOperator {
                id: row.id,
                session_id: row.session_id,
                user_id: row.user_id,
                callsign: row.callsign,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            user,
        }
    }
}

/// Looks up roster usernames. Unknown names are dropped, duplicates collapse,
/// and the order of `usernames` is kept.
async fn resolve_roster(
    conn: &mut SqliteConnection,
    usernames: &[String],
) -> Result<Vec<UserRef>, AppError> {
    if usernames.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id, username, callsign FROM users WHERE username IN (",
    );
    let mut separated = qb.separated(", ");
    for username in usernames {
        separated.push_bind(username);
    }
    separated.push_unseparated(")");

    let found: HashMap<String, UserRef> = qb
        .build_query_as::<UserRef>()
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|user| (user.username.clone(), user))
        .collect();

    let mut roster: Vec<UserRef> = Vec::with_capacity(found.len());
    for username in usernames {
        match found.get(username) {
            Some(user) if !roster.iter().any(|r| r.id == user.id) => roster.push(user.clone()),
            Some(_) => {}
            None => warn!(username = %username, "Skipping unknown roster username"),
        }
    }
    Ok(roster)
}

async fn insert_roster(
    conn: &mut SqliteConnection,
    session_id: i64,
    roster: &[UserRef],
) -> Result<(), AppError> {
    if roster.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "INSERT INTO session_operators (session_id, user_id, callsign) ",
    );
    qb.push_values(roster, |mut row, user| {
        let callsign = match user.callsign.as_deref() {
            Some(callsign) if !callsign.is_empty() => callsign.to_string(),
            _ => user.username.clone(),
        };
        row.push_bind(session_id).push_bind(user.id).push_bind(callsign);
    });
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

#[instrument(skip(pool, new_session), fields(external_id = %new_session.external_id))]
pub async fn create_session(
    pool: &Pool<Sqlite>,
    created_by: i64,
    new_session: &NewSession,
) -> Result<i64, AppError> {
    info!("Creating session");
    let mut tx = pool.begin().await?;
    ensure_active_user(&mut tx, created_by).await?;

    let res = sqlx::query(
        "INSERT INTO net_sessions
         (external_id, title, date, net_callsign, tx_freq, rx_freq, mode, band, created_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&new_session.external_id)
    .bind(&new_session.title)
    .bind(new_session.date)
    .bind(&new_session.net_callsign)
    .bind(&new_session.tx_freq)
    .bind(&new_session.rx_freq)
    .bind(&new_session.mode)
    .bind(&new_session.band)
    .bind(created_by)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, DUPLICATE_EXTERNAL_ID))?;
    let session_id = res.last_insert_rowid();

    if let Some(usernames) = &new_session.operators {
        let roster = resolve_roster(&mut tx, usernames).await?;
        insert_roster(&mut tx, session_id, &roster).await?;
    }

    tx.commit().await?;
    Ok(session_id)
}

pub(crate) async fn fetch_net_session(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<NetSession, AppError> {
    sqlx::query_as::<_, NetSession>(&format!(
        "SELECT {} FROM net_sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Session with id {} not found", id)))
}

/// The session row alone, without controls, logs or roster.
#[instrument]
pub async fn get_net_session(pool: &Pool<Sqlite>, id: i64) -> Result<NetSession, AppError> {
    let mut conn = pool.acquire().await?;
    fetch_net_session(&mut conn, id).await
}

async fn load_details(
    pool: &Pool<Sqlite>,
    sessions: Vec<NetSession>,
) -> Result<Vec<SessionDetail>, AppError> {
    if sessions.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = sessions.iter().map(|s| s.id).collect();

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM controls WHERE session_id IN (",
        CONTROL_COLUMNS
    ));
    push_id_list(&mut qb, &ids);
    qb.push(" ORDER BY id");
    let mut controls = group_by_session(
        qb.build_query_as::<Control>().fetch_all(pool).await?,
        |c| c.session_id,
    );

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM logs WHERE session_id IN (",
        LOG_COLUMNS
    ));
    push_id_list(&mut qb, &ids);
    qb.push(" ORDER BY timestamp, id");
    let mut logs = group_by_session(
        qb.build_query_as::<Log>().fetch_all(pool).await?,
        |l| l.session_id,
    );

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT so.id, so.session_id, so.user_id, so.callsign, so.created_at, so.updated_at,
                u.username AS user_username, u.callsign AS user_callsign
         FROM session_operators so
         LEFT JOIN users u ON u.id = so.user_id
         WHERE so.session_id IN (",
    );
    push_id_list(&mut qb, &ids);
    qb.push(" ORDER BY so.id");
    let mut operators = group_by_session(
        qb.build_query_as::<DbOperatorRow>()
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(SessionOperatorView::from)
            .collect(),
        |o| o.operator.session_id,
    );

    Ok(sessions
        .into_iter()
        .map(|session| SessionDetail {
            controls: controls.remove(&session.id).unwrap_or_default(),
            logs: logs.remove(&session.id).unwrap_or_default(),
            operators: operators.remove(&session.id).unwrap_or_default(),
            session,
        })
        .collect())
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

fn group_by_session<T>(rows: Vec<T>, key: impl Fn(&T) -> i64) -> HashMap<i64, Vec<T>> {
    let mut grouped: HashMap<i64, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(key(&row)).or_default().push(row);
    }
    grouped
}

/// Every session, newest first, with controls, logs and roster.
#[instrument(skip(pool))]
pub async fn list_sessions(pool: &Pool<Sqlite>) -> Result<Vec<SessionDetail>, AppError> {
    info!("Listing sessions");
    let sessions = sqlx::query_as::<_, NetSession>(&format!(
        "SELECT {} FROM net_sessions ORDER BY date DESC, id DESC",
        SESSION_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    load_details(pool, sessions).await
}

#[instrument(skip(pool))]
pub async fn get_session(pool: &Pool<Sqlite>, id: i64) -> Result<SessionDetail, AppError> {
    let session = get_net_session(pool, id).await?;
    load_details(pool, vec![session])
        .await?
        .pop()
        .ok_or_else(|| AppError::NotFound(format!("Session with id {} not found", id)))
}

/// Merges `changes` onto the stored session. A present roster replaces the
/// existing one; both happen in the same transaction.
#[instrument(skip(pool, changes))]
pub async fn update_session(
    pool: &Pool<Sqlite>,
    id: i64,
    changes: &SessionUpdate,
) -> Result<SessionDetail, AppError> {
    info!("Updating session");
    let mut tx = pool.begin().await?;
    let current = fetch_net_session(&mut tx, id).await?;

    sqlx::query(
        "UPDATE net_sessions
         SET external_id = ?, title = ?, date = ?, net_callsign = ?, tx_freq = ?, rx_freq = ?,
             mode = ?, band = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(changes.external_id.as_ref().unwrap_or(&current.external_id))
    .bind(changes.title.as_ref().unwrap_or(&current.title))
    .bind(changes.date.unwrap_or(current.date))
    .bind(changes.net_callsign.as_ref().unwrap_or(&current.net_callsign))
    .bind(changes.tx_freq.as_ref().unwrap_or(&current.tx_freq))
    .bind(changes.rx_freq.as_ref().unwrap_or(&current.rx_freq))
    .bind(changes.mode.as_ref().unwrap_or(&current.mode))
    .bind(changes.band.as_ref().unwrap_or(&current.band))
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, DUPLICATE_EXTERNAL_ID))?;

    if let Some(usernames) = &changes.operators {
        sqlx::query("DELETE FROM session_operators WHERE session_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let roster = resolve_roster(&mut tx, usernames).await?;
        insert_roster(&mut tx, id, &roster).await?;
        info!(operators = roster.len(), "Replaced session roster");
    }

    tx.commit().await?;
    get_session(pool, id).await
}

/// Deletes the session together with its controls, logs and roster.
#[instrument(skip(pool))]
pub async fn delete_session(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting session");
    let mut tx = pool.begin().await?;
    fetch_net_session(&mut tx, id).await?;

    for table in ["controls", "logs", "session_operators"] {
        sqlx::query(&format!("DELETE FROM {} WHERE session_id = ?", table))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM net_sessions WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool, control), fields(callsign = %control.callsign))]
pub async fn create_control(
    pool: &Pool<Sqlite>,
    session_id: i64,
    operator_user_id: i64,
    control: &NewControl,
) -> Result<Control, AppError> {
    info!("Recording control station");
    let mut tx = pool.begin().await?;
    fetch_net_session(&mut tx, session_id).await?;
    ensure_active_user(&mut tx, operator_user_id).await?;

    let station = &control.station;
    let res = sqlx::query(
        "INSERT INTO controls
         (session_id, callsign, radio, antenna, power, qth_text, qth_province, qth_city,
          qth_district, operator_user_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(session_id)
    .bind(&control.callsign)
    .bind(&station.radio)
    .bind(&station.antenna)
    .bind(&station.power)
    .bind(&station.qth_text)
    .bind(&station.qth_province)
    .bind(&station.qth_city)
    .bind(&station.qth_district)
    .bind(operator_user_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let control = sqlx::query_as::<_, Control>(&format!(
        "SELECT {} FROM controls WHERE id = ?",
        CONTROL_COLUMNS
    ))
    .bind(res.last_insert_rowid())
    .fetch_one(pool)
    .await?;
    Ok(control)
}
