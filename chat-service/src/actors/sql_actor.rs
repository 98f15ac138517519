//! Read-only access to the relational dataset.
//!
//! Queries reaching this actor have already passed the keyword gate. The
//! connection is opened read-only and every statement is checked with
//! `sqlite3_stmt_readonly`, so a gate bypass still cannot write.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::data_schema::UNICORNS_TABLE_NAME;
use crate::error::SqlExecutionError;
use crate::protocol::{QueryResult, SqlMsg};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ReadOnlySqlActor {
    rx: mpsc::Receiver<SqlMsg>,
    db_path: PathBuf,
    max_rows: usize,
}

impl ReadOnlySqlActor {
    pub fn new(rx: mpsc::Receiver<SqlMsg>, db_path: PathBuf, max_rows: usize) -> Self {
        Self {
            rx,
            db_path,
            max_rows,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(path = ?self.db_path, "read-only SQL actor started");

        while let Some(msg) = self.rx.recv().await {
            let db_path = self.db_path.clone();
            let max_rows = self.max_rows;

            tokio::spawn(async move {
                match msg {
                    SqlMsg::ExecuteSql { sql, respond_to } => {
                        let result = tokio::task::spawn_blocking(move || {
                            execute_read_query_sync(&db_path, &sql, max_rows)
                        })
                        .await
                        .unwrap_or_else(|e| {
                            Err(SqlExecutionError::Unavailable(format!(
                                "SQL execution task panicked: {}",
                                e
                            )))
                        });
                        let _ = respond_to.send(result);
                    }
                }
            });
        }

        tracing::info!("read-only SQL actor stopped");
    }
}

fn execute_read_query_sync(
    db_path: &Path,
    sql: &str,
    max_rows: usize,
) -> Result<QueryResult, SqlExecutionError> {
    // SQLite would create an empty file here; treat it as an unprovisioned schema instead
    if !db_path.exists() {
        return Err(SqlExecutionError::MissingTable(
            UNICORNS_TABLE_NAME.to_string(),
        ));
    }

    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| SqlExecutionError::Unavailable(e.to_string()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| SqlExecutionError::Unavailable(e.to_string()))?;

    let mut stmt = conn.prepare(sql).map_err(classify)?;
    if !stmt.readonly() {
        return Err(SqlExecutionError::Execution(
            "statement would modify the database".to_string(),
        ));
    }

    let columns = result_keys(&stmt.column_names());
    let mut rows_iter = stmt.query([]).map_err(classify)?;
    let mut rows = Vec::new();

    while let Some(row) = rows_iter.next().map_err(classify)? {
        if rows.len() == max_rows {
            tracing::debug!(max_rows, "query result truncated");
            break;
        }
        let mut record = Map::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            let value = row.get_ref(idx).map_err(classify)?;
            record.insert(column.clone(), sqlite_value_to_json(value));
        }
        rows.push(record);
    }

    tracing::debug!(rows = rows.len(), "read query executed");
    Ok(QueryResult { rows })
}

/// Row keys for the statement's output columns.
///
/// A repeated name gets its 1-based position appended (`company_2`) so no
/// column is lost when rows become JSON objects.
fn result_keys(names: &[&str]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(names.len());
    for (idx, name) in names.iter().enumerate() {
        let key = if keys.iter().any(|k| k == name) {
            let renamed = format!("{}_{}", name, idx + 1);
            tracing::debug!(column = %name, key = %renamed, "duplicate result column renamed");
            renamed
        } else {
            name.to_string()
        };
        keys.push(key);
    }
    keys
}

fn classify(err: rusqlite::Error) -> SqlExecutionError {
    let message = err.to_string();
    match message.split_once("no such table:") {
        Some((_, table)) => SqlExecutionError::MissingTable(table.trim().to_string()),
        None => SqlExecutionError::Execution(message),
    }
}

fn sqlite_value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}
