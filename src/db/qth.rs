use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{NewQthEntry, QthEntry};

pub const QTH_SEARCH_LIMIT: i64 = 10;

// Four bound columns per row keeps each chunk well under SQLite's variable cap.
const INSERT_CHUNK: usize = 200;

/// Escapes `\`, `%` and `_` so the input only matches literally inside LIKE.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[instrument(skip(pool))]
pub async fn search_qth(pool: &Pool<Sqlite>, query: &str) -> Result<Vec<QthEntry>, AppError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let pattern = format!("%{}%", escape_like(query));
    let rows = sqlx::query_as::<_, QthEntry>(
        r"SELECT id, text, province, city, district
          FROM qth_entries
          WHERE text LIKE ? ESCAPE '\'
             OR province LIKE ? ESCAPE '\'
             OR city LIKE ? ESCAPE '\'
             OR district LIKE ? ESCAPE '\'
          ORDER BY id
          LIMIT ?",
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(QTH_SEARCH_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Inserts entries, ignoring ones already present. Returns how many were new.
#[instrument(skip_all, fields(entries = entries.len()))]
pub async fn insert_qth_entries(
    pool: &Pool<Sqlite>,
    entries: &[NewQthEntry],
) -> Result<u64, AppError> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for chunk in entries.chunks(INSERT_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT OR IGNORE INTO qth_entries (text, province, city, district) ",
        );
        qb.push_values(chunk, |mut row, entry| {
            row.push_bind(&entry.text)
                .push_bind(&entry.province)
                .push_bind(&entry.city)
                .push_bind(&entry.district);
        });
        inserted += qb.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    info!(inserted, "Imported QTH entries");
    Ok(inserted)
}
