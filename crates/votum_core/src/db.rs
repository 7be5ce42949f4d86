use crate::error::StoreError;
use crate::store::{KeyValueStore, RawTransaction};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a writer waits for another connection's transaction to finish.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// File-backed key/value store: one SQLite table, one row per key.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

pub fn open(db_path: impl AsRef<Path>) -> Result<SqliteStore> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    init(&conn)?;
    Ok(SqliteStore {
        conn: Mutex::new(conn),
    })
}

pub fn open_in_memory() -> Result<SqliteStore> {
    let conn = Connection::open_in_memory()?;
    init(&conn)?;
    Ok(SqliteStore {
        conn: Mutex::new(conn),
    })
}

fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL,
          updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );
        "#,
    )?;
    Ok(())
}

const SELECT: &str = "SELECT value FROM kv WHERE key = ?1";

const UPSERT: &str = r#"
    INSERT INTO kv (key, value)
    VALUES (?1, ?2)
    ON CONFLICT(key) DO UPDATE SET
      value=excluded.value,
      updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now')
"#;

fn select(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let value = conn
        .prepare_cached(SELECT)?
        .query_row(params![key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

fn upsert(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.prepare_cached(UPSERT)?.execute(params![key, value])?;
    Ok(())
}

impl SqliteStore {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

struct SqliteTransaction<'a> {
    conn: &'a Connection,
}

impl RawTransaction for SqliteTransaction<'_> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        select(self.conn, key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        upsert(self.conn, key, value)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        select(&*self.conn()?, key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        upsert(&*self.conn()?, key, value)
    }

    /// IMMEDIATE takes the database write lock up front, so read-modify-write
    /// units from other connections and processes queue behind this one.
    fn transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn RawTransaction) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // dropping `tx` on error rolls back
        body(&mut SqliteTransaction { conn: &*tx })?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votum.db");

        let store = open(&path).unwrap();
        store.set("user.id", "user-abc").unwrap();
        store.set("user.id", "user-def").unwrap();
        drop(store);

        let store = open(&path).unwrap();
        assert_eq!(store.get("user.id").unwrap().as_deref(), Some("user-def"));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let store = open_in_memory().unwrap();
        store.set("a", "1").unwrap();

        let result = store.transaction(&mut |tx: &mut dyn RawTransaction| {
            tx.set("a", "2")?;
            tx.set("b", "2")?;
            Err(StoreError::Aborted)
        });
        assert!(matches!(result, Err(StoreError::Aborted)));
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn transactions_from_separate_connections_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votum.db");
        let stores: Vec<Arc<SqliteStore>> =
            (0..4).map(|_| Arc::new(open(&path).unwrap())).collect();

        let handles: Vec<_> = stores
            .iter()
            .cloned()
            .map(|store| {
                thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .transaction(&mut |tx: &mut dyn RawTransaction| {
                                let count: u32 = tx
                                    .get("counter")?
                                    .and_then(|raw| raw.parse().ok())
                                    .unwrap_or(0);
                                tx.set("counter", &(count + 1).to_string())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stores[0].get("counter").unwrap().as_deref(), Some("100"));
    }
}
