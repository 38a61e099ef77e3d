//! SQLite table used as a key/value map.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

use super::KeyValueStore;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS kvstore (
    key   TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
)";

pub struct DatabaseStore {
    conn: Mutex<Connection>,
}

impl DatabaseStore {
    /// Open a database file, or an in-memory database for `:memory:`.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path.is_empty() || path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            let conn = Connection::open(path)?;
            let _mode: String =
                conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            conn
        };
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for DatabaseStore {
    fn add(&self, key: &str, value: &[u8]) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO kvstore (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let value: Option<Vec<u8>> = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM kvstore WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match value {
            Some(v) => Ok(v),
            None => Err(rusqlite::Error::QueryReturnedNoRows.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM kvstore WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key FROM kvstore")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn driver(&self) -> &'static str {
        "sqlite3"
    }
}
