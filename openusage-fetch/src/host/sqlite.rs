//! Local SQLite access, scoped to one database file per call.
//!
//! Editors in the VS Code family keep their auth state in a `state.vscdb`
//! file with a single `ItemTable (key TEXT, value BLOB)`. Besides generic
//! read-only JSON queries this client reads and writes items of that table.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::SqliteError;

/// How long to wait on a locked database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// SQLite host API.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteClient;

impl SqliteClient {
    /// Creates a client.
    pub fn new() -> Self {
        Self
    }

    /// Runs a read-only query and returns each row as a JSON object keyed
    /// by column name.
    pub async fn query(&self, path: &Path, sql: &str) -> Result<Vec<Map<String, Value>>, SqliteError> {
        reject_dot_command(sql)?;
        let path = path.to_path_buf();
        let sql = sql.to_string();
        run_blocking(move || {
            let conn = open(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
            query_rows(&conn, &sql)
        })
        .await
    }

    /// Reads `ItemTable.value` for `key`.
    pub async fn get_item(&self, path: &Path, key: &str) -> Result<Option<String>, SqliteError> {
        let path = path.to_path_buf();
        let key = key.to_string();
        run_blocking(move || {
            let conn = open(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
            let value = conn
                .query_row("SELECT value FROM ItemTable WHERE key = ?1", [&key], |row| {
                    Ok(text_of(row.get_ref(0)?))
                })
                .optional()?
                .flatten();
            debug!(key = %key, found = value.is_some(), "ItemTable lookup");
            Ok(value)
        })
        .await
    }

    /// Inserts or replaces `ItemTable.value` for `key`.
    pub async fn set_item(&self, path: &Path, key: &str, value: &str) -> Result<(), SqliteError> {
        let path = path.to_path_buf();
        let key = key.to_string();
        let value = value.to_string();
        run_blocking(move || {
            let conn = open(&path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
            conn.execute(
                "INSERT OR REPLACE INTO ItemTable (key, value) VALUES (?1, ?2)",
                [&key, &value],
            )?;
            debug!(key = %key, "ItemTable updated");
            Ok(())
        })
        .await
    }
}

fn reject_dot_command(sql: &str) -> Result<(), SqliteError> {
    if sql.trim_start().starts_with('.') {
        Err(SqliteError::DotCommand)
    } else {
        Ok(())
    }
}

fn open(path: &PathBuf, flags: OpenFlags) -> Result<Connection, SqliteError> {
    if !path.exists() {
        return Err(SqliteError::NotFound(path.clone()));
    }
    let conn = Connection::open_with_flags(path, flags | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn query_rows(conn: &Connection, sql: &str) -> Result<Vec<Map<String, Value>>, SqliteError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut obj = Map::new();
        for (idx, name) in columns.iter().enumerate() {
            obj.insert(name.clone(), json_of(row.get_ref(idx)?));
        }
        out.push(obj);
    }
    Ok(out)
}

fn json_of(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

fn text_of(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Null => None,
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, SqliteError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SqliteError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SqliteError::Worker(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_db() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.vscdb");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE ItemTable (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);
             INSERT INTO ItemTable VALUES ('cursorAuth/accessToken', 'tok');
             INSERT INTO ItemTable VALUES ('count', 3);",
        )
        .unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_get_and_set_item() {
        let (_dir, path) = state_db();
        let client = SqliteClient::new();

        assert_eq!(
            client.get_item(&path, "cursorAuth/accessToken").await.unwrap().as_deref(),
            Some("tok")
        );
        assert_eq!(client.get_item(&path, "missing").await.unwrap(), None);

        client.set_item(&path, "cursorAuth/accessToken", "tok2").await.unwrap();
        assert_eq!(
            client.get_item(&path, "cursorAuth/accessToken").await.unwrap().as_deref(),
            Some("tok2")
        );
    }

    #[tokio::test]
    async fn test_query_returns_json_rows() {
        let (_dir, path) = state_db();
        let rows = SqliteClient::new()
            .query(&path, "SELECT key, value FROM ItemTable ORDER BY key")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["key"], "count");
        assert_eq!(rows[0]["value"], 3);
    }

    #[tokio::test]
    async fn test_query_is_read_only() {
        let (_dir, path) = state_db();
        let result = SqliteClient::new().query(&path, "DELETE FROM ItemTable").await;
        assert!(matches!(result, Err(SqliteError::Sqlite(_))));
    }

    #[tokio::test]
    async fn test_rejects_dot_commands() {
        let (_dir, path) = state_db();
        let result = SqliteClient::new().query(&path, "  .tables").await;
        assert!(matches!(result, Err(SqliteError::DotCommand)));
    }

    #[tokio::test]
    async fn test_missing_database() {
        let result = SqliteClient::new()
            .get_item(Path::new("/nonexistent/state.vscdb"), "k")
            .await;
        assert!(matches!(result, Err(SqliteError::NotFound(_))));
    }
}
