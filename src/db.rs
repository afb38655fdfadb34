use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Result};

use crate::error::AppError;
use crate::models::{now_rfc3339, Task, TodoRecord};

pub type DbPool = Arc<Mutex<Connection>>;

pub fn init_db(path: &str) -> Result<DbPool> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            todo_list TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated TEXT NOT NULL
        );
        ",
    )?;

    Ok(Arc::new(Mutex::new(conn)))
}

pub fn get_record(pool: &DbPool, id: &str) -> Result<Option<TodoRecord>, AppError> {
    let conn = pool.lock().unwrap();
    get_record_internal(&conn, id)
}

/// Replaces the subject's whole list. `created_at` survives overwrites,
/// `updated` is refreshed on every write.
pub fn put_record(pool: &DbPool, id: &str, todo_list: &[Task]) -> Result<TodoRecord, AppError> {
    let conn = pool.lock().unwrap();
    let now = now_rfc3339();
    let blob = serde_json::to_string(todo_list)?;

    conn.execute(
        "INSERT INTO records (id, todo_list, created_at, updated) VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(id) DO UPDATE SET todo_list = excluded.todo_list, updated = excluded.updated",
        (id, &blob, &now),
    )?;

    get_record_internal(&conn, id)?
        .ok_or_else(|| AppError::Database("record missing after save".to_string()))
}

fn get_record_internal(conn: &Connection, id: &str) -> Result<Option<TodoRecord>, AppError> {
    let mut stmt =
        conn.prepare("SELECT id, todo_list, created_at, updated FROM records WHERE id = ?1")?;
    let mut rows = stmt.query([id])?;

    if let Some(row) = rows.next()? {
        let blob: String = row.get(1)?;
        Ok(Some(TodoRecord {
            id: row.get(0)?,
            todo_list: serde_json::from_str(&blob)?,
            created_at: row.get(2)?,
            updated: row.get(3)?,
        }))
    } else {
        Ok(None)
    }
}
