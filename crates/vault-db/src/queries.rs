use crate::Database;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;

impl Database {
    // -- Raw items --

    pub fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| query_item(conn, key))
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| write_item(conn, key, value))
    }

    pub fn remove_item(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
            Ok(())
        })
    }

    // -- JSON documents --

    /// Read and decode a JSON document. A missing key is `None`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_item(key)? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt JSON under key '{}'", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_item(key, &raw)
    }

    /// Read-modify-write a JSON document inside one transaction.
    ///
    /// `f` starts from `T::default()` when the key is absent. The new value is
    /// written only if `f` returns `Ok`; its extra output is passed back.
    pub fn update_json<T, R, F>(&self, key: &str, f: F) -> Result<R>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> Result<R>,
    {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let mut value: T = match query_item(&tx, key)? {
                Some(raw) => serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt JSON under key '{}'", key))?,
                None => T::default(),
            };

            let out = f(&mut value)?;

            let raw = serde_json::to_string(&value)?;
            write_item(&tx, key, &raw)?;
            tx.commit()?;
            Ok(out)
        })
    }
}

fn query_item(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(value)
}

fn write_item(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
        (key, value),
    )?;
    Ok(())
}
