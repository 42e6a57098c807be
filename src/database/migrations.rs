//! Declarative schema migration.
//!
//! The target schema is loaded into a pristine in-memory database and compared
//! with the live one through `sqlite_master` and `pragma_table_info`. Additive
//! differences (new tables, new columns, new or changed indices) are applied in
//! one transaction. Anything that would drop or rewrite stored data is reported
//! and refused.

use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{info, instrument, warn};

use crate::error::AppError;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static AROUND_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*([(),])\s*").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
}

impl ColumnInfo {
    /// Column definition usable in `ALTER TABLE ... ADD COLUMN`, if SQLite allows one.
    fn add_column_definition(&self) -> Result<String, String> {
        let mut definition = format!("{} {}", self.name, self.column_type);

        match (&self.default_value, self.not_null) {
            (Some(default), _) if !is_constant_default(default) => {
                return Err(format!("non-constant default {}", default));
            }
            (Some(default), true) => definition.push_str(&format!(" NOT NULL DEFAULT {}", default)),
            (Some(default), false) => definition.push_str(&format!(" DEFAULT {}", default)),
            (None, true) => return Err("NOT NULL without a default".to_string()),
            (None, false) => {}
        }

        Ok(definition)
    }
}

fn is_constant_default(default: &str) -> bool {
    let upper = default.trim().to_uppercase();
    !(upper.starts_with("CURRENT_") || upper.starts_with('('))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchemaChanges {
    pub new_tables: Vec<String>,
    pub new_columns: Vec<(String, String)>,
    pub new_indices: Vec<String>,
    pub changed_indices: Vec<String>,

    pub removed_tables: Vec<String>,
    pub removed_columns: Vec<TableColumn>,
    pub altered_columns: Vec<TableColumn>,
    pub removed_indices: Vec<String>,
    /// Columns that exist only in the target but cannot be added in place.
    pub unaddable_columns: Vec<(TableColumn, String)>,
}

impl SchemaChanges {
    pub fn is_empty(&self) -> bool {
        !self.has_additive_changes() && !self.has_destructive_changes()
    }

    pub fn has_additive_changes(&self) -> bool {
        !self.new_tables.is_empty()
            || !self.new_columns.is_empty()
            || !self.new_indices.is_empty()
            || !self.changed_indices.is_empty()
    }

    pub fn has_destructive_changes(&self) -> bool {
        !self.removed_tables.is_empty()
            || !self.removed_columns.is_empty()
            || !self.altered_columns.is_empty()
            || !self.removed_indices.is_empty()
            || !self.unaddable_columns.is_empty()
    }
}

impl fmt::Display for SchemaChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "Schema is up to date");
        }
        for table in &self.new_tables {
            writeln!(f, "    + table {}", table)?;
        }
        for (table, definition) in &self.new_columns {
            writeln!(f, "    + column {}.{}", table, definition)?;
        }
        for index in &self.new_indices {
            writeln!(f, "    + index {}", index)?;
        }
        for index in &self.changed_indices {
            writeln!(f, "    ~ index {}", index)?;
        }
        for table in &self.removed_tables {
            writeln!(f, "    - table {} (refused)", table)?;
        }
        for c in &self.removed_columns {
            writeln!(f, "    - column {}.{} (refused)", c.table, c.column)?;
        }
        for c in &self.altered_columns {
            writeln!(f, "    ~ column {}.{} definition changed (refused)", c.table, c.column)?;
        }
        for index in &self.removed_indices {
            writeln!(f, "    - index {} (refused)", index)?;
        }
        for (c, reason) in &self.unaddable_columns {
            writeln!(f, "    + column {}.{} cannot be added in place: {} (refused)", c.table, c.column, reason)?;
        }
        Ok(())
    }
}

pub struct DeclarativeMigrator {
    pool: Pool<Sqlite>,
    target_schema: String,
}

impl DeclarativeMigrator {
    pub fn new(pool: Pool<Sqlite>, target_schema: &str) -> Self {
        Self {
            pool,
            target_schema: target_schema.to_string(),
        }
    }

    async fn pristine_pool(&self) -> Result<SqlitePool, AppError> {
        let pristine = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        if !self.target_schema.trim().is_empty() {
            sqlx::raw_sql(&self.target_schema)
                .execute(&pristine)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create pristine schema: {}", e)))?;
        }

        Ok(pristine)
    }

    /// Computes the difference between the live and target schema without touching the live database.
    #[instrument(skip(self))]
    pub async fn plan(&self) -> Result<SchemaChanges, AppError> {
        let pristine = self.pristine_pool().await?;
        let mut live = self.pool.acquire().await?;
        let mut target = pristine.acquire().await?;

        analyze_changes(&mut live, &mut target).await
    }

    /// Applies every additive change. Fails without applying anything when a
    /// destructive change is pending.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<SchemaChanges, AppError> {
        info!("Starting declarative database migration");

        let pristine = self.pristine_pool().await?;
        let mut target = pristine.acquire().await?;

        let mut tx = self.pool.begin().await?;
        let changes = analyze_changes(&mut tx, &mut target).await?;

        if changes.has_destructive_changes() {
            tx.rollback().await?;
            return Err(AppError::Internal(format!(
                "Migration requires destructive changes, refusing to apply:\n{}",
                changes
            )));
        }

        if !changes.has_additive_changes() {
            tx.commit().await?;
            info!("No schema changes needed");
            return Ok(changes);
        }

        let target_tables = table_sql(&mut target).await?;
        for table in &changes.new_tables {
            if let Some(sql) = target_tables.get(table) {
                execute_schema_change(&format!("Create table {}", table), sql, &mut tx).await?;
            }
        }

        for (table, definition) in &changes.new_columns {
            let sql = format!("ALTER TABLE {} ADD COLUMN {}", table, definition);
            execute_schema_change(&format!("Add column to {}", table), &sql, &mut tx).await?;
        }

        let target_indices = index_sql(&mut target).await?;
        for index in &changes.changed_indices {
            let sql = format!("DROP INDEX {}", index);
            execute_schema_change(&format!("Drop changed index {}", index), &sql, &mut tx).await?;
        }
        for index in changes.new_indices.iter().chain(&changes.changed_indices) {
            if let Some(sql) = target_indices.get(index) {
                execute_schema_change(&format!("Create index {}", index), sql, &mut tx).await?;
            }
        }

        tx.commit().await?;
        info!("Migration completed:\n{}", changes);

        Ok(changes)
    }
}

async fn execute_schema_change(
    description: &str,
    sql: &str,
    conn: &mut SqliteConnection,
) -> Result<(), AppError> {
    info!(change = %description, "Applying schema change");
    sqlx::query(sql).execute(&mut *conn).await.map_err(|e| {
        AppError::Internal(format!("Schema change '{}' failed: {}", description, e))
    })?;
    Ok(())
}

async fn analyze_changes(
    live: &mut SqliteConnection,
    target: &mut SqliteConnection,
) -> Result<SchemaChanges, AppError> {
    let mut changes = SchemaChanges::default();

    let live_tables = table_sql(live).await?;
    let target_tables = table_sql(target).await?;

    for name in target_tables.keys() {
        if !live_tables.contains_key(name) {
            changes.new_tables.push(name.clone());
        }
    }

    for name in live_tables.keys() {
        if !target_tables.contains_key(name) {
            changes.removed_tables.push(name.clone());
            continue;
        }

        let live_columns = table_columns(live, name).await?;
        let target_columns = table_columns(target, name).await?;

        let live_names: HashSet<&str> = live_columns.iter().map(|c| c.name.as_str()).collect();
        let target_names: HashSet<&str> = target_columns.iter().map(|c| c.name.as_str()).collect();

        for column in &live_columns {
            if !target_names.contains(column.name.as_str()) {
                changes.removed_columns.push(TableColumn {
                    table: name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        for column in &target_columns {
            if live_names.contains(column.name.as_str()) {
                let live_column = live_columns.iter().find(|c| c.name == column.name);
                if live_column.is_some_and(|c| !same_definition(c, column)) {
                    changes.altered_columns.push(TableColumn {
                        table: name.clone(),
                        column: column.name.clone(),
                    });
                }
                continue;
            }

            match column.add_column_definition() {
                Ok(definition) => changes.new_columns.push((name.clone(), definition)),
                Err(reason) => changes.unaddable_columns.push((
                    TableColumn {
                        table: name.clone(),
                        column: column.name.clone(),
                    },
                    reason,
                )),
            }
        }
    }

    let live_indices = index_sql(live).await?;
    let target_indices = index_sql(target).await?;

    for (name, sql) in &target_indices {
        match live_indices.get(name) {
            None => changes.new_indices.push(name.clone()),
            Some(live_sql) if normalize_sql(live_sql) != normalize_sql(sql) => {
                changes.changed_indices.push(name.clone())
            }
            Some(_) => {}
        }
    }

    for name in live_indices.keys() {
        if !target_indices.contains_key(name) {
            changes.removed_indices.push(name.clone());
        }
    }

    if changes.has_destructive_changes() {
        warn!("Destructive schema differences detected:\n{}", changes);
    }

    Ok(changes)
}

fn same_definition(live: &ColumnInfo, target: &ColumnInfo) -> bool {
    live.column_type.eq_ignore_ascii_case(&target.column_type) && live.not_null == target.not_null
}

async fn table_sql(conn: &mut SqliteConnection) -> Result<BTreeMap<String, String>, AppError> {
    let rows = sqlx::query(
        "SELECT name, sql FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>("name"), row.get::<String, _>("sql")))
        .collect())
}

// Automatic indices (UNIQUE / PRIMARY KEY) have no SQL and are owned by their table.
async fn index_sql(conn: &mut SqliteConnection) -> Result<BTreeMap<String, String>, AppError> {
    let rows = sqlx::query(
        "SELECT name, sql FROM sqlite_master WHERE type = 'index' AND sql IS NOT NULL",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>("name"), row.get::<String, _>("sql")))
        .collect())
}

async fn table_columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<ColumnInfo>, AppError> {
    let rows = sqlx::query(
        "SELECT name, type, \"notnull\" AS not_null, dflt_value FROM pragma_table_info(?)",
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ColumnInfo {
            name: row.get("name"),
            column_type: row.get("type"),
            not_null: row.get::<i64, _>("not_null") != 0,
            default_value: row.get("dflt_value"),
        })
        .collect())
}

/// Collapses whitespace and case so cosmetic SQL differences are not reported as changes.
pub fn normalize_sql(sql: &str) -> String {
    let collapsed = WHITESPACE.replace_all(sql.trim(), " ");
    AROUND_PUNCT
        .replace_all(&collapsed, "$1")
        .to_lowercase()
        .replace("if not exists ", "")
}
