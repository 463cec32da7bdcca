use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use gridstage_core::{field_value::FieldValue, Patch, Record, RecordId};

use crate::error::{GatewayError, StorageError};
use crate::traits::{CollectionGateway, KeyValueStore};

fn open_conn(path: &str) -> Result<Connection, StorageError> {
    let conn = Connection::open(path)?;
    crate::schema::init_schema(&conn)?;
    Ok(conn)
}

fn open_conn_in_memory() -> Result<Connection, StorageError> {
    let conn = Connection::open_in_memory()?;
    crate::schema::init_schema(&conn)?;
    Ok(conn)
}

fn encode_fields(fields: &BTreeMap<String, FieldValue>) -> Result<Vec<u8>, StorageError> {
    rmp_serde::to_vec(fields).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_fields(bytes: &[u8]) -> Result<BTreeMap<String, FieldValue>, StorageError> {
    rmp_serde::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

// ============================================================================
// Key-value store
// ============================================================================

pub struct SqliteKeyValueStore {
    conn: Connection,
}

impl SqliteKeyValueStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Ok(Self {
            conn: open_conn(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            conn: open_conn_in_memory()?,
        })
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }
}

// ============================================================================
// Record collection
// ============================================================================

/// A record collection kept in SQLite, usable wherever a remote
/// `CollectionGateway` is expected (offline grids, fixtures).
pub struct SqliteCollection {
    conn: Connection,
    collection: String,
}

impl SqliteCollection {
    pub fn open(path: &str, collection: &str) -> Result<Self, StorageError> {
        Ok(Self {
            conn: open_conn(path)?,
            collection: collection.to_string(),
        })
    }

    pub fn open_in_memory(collection: &str) -> Result<Self, StorageError> {
        Ok(Self {
            conn: open_conn_in_memory()?,
            collection: collection.to_string(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Insert or replace a record. New records are appended to the fetch order.
    pub fn insert(&mut self, record: &Record) -> Result<(), StorageError> {
        let fields = encode_fields(&record.fields)?;
        self.conn.execute(
            "INSERT INTO records (collection, record_id, position, fields)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(position), -1) + 1 FROM records WHERE collection = ?1), ?3)
             ON CONFLICT(collection, record_id) DO UPDATE SET
               fields = excluded.fields,
               updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)",
            rusqlite::params![self.collection, record.id.get(), fields],
        )?;
        Ok(())
    }

    pub fn get(&self, id: RecordId) -> Result<Option<Record>, StorageError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT fields FROM records WHERE collection = ?1 AND record_id = ?2",
                rusqlite::params![self.collection, id.get()],
                |row| row.get(0),
            )
            .optional()?;
        match bytes {
            Some(bytes) => Ok(Some(Record {
                id,
                fields: decode_fields(&bytes)?,
            })),
            None => Ok(None),
        }
    }

    pub fn list(&self) -> Result<Vec<Record>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT record_id, fields FROM records WHERE collection = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map([&self.collection], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, bytes)| {
                Ok(Record {
                    id: RecordId::new(id),
                    fields: decode_fields(&bytes)?,
                })
            })
            .collect()
    }

    pub fn remove(&mut self, id: RecordId) -> Result<bool, StorageError> {
        let changed = self.conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND record_id = ?2",
            rusqlite::params![self.collection, id.get()],
        )?;
        Ok(changed > 0)
    }

    pub fn len(&self) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            [&self.collection],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl CollectionGateway for SqliteCollection {
    fn fetch_all(&mut self) -> Result<Vec<Record>, GatewayError> {
        Ok(self.list()?)
    }

    fn fetch_by_id(&mut self, id: RecordId) -> Result<Record, GatewayError> {
        self.get(id)?.ok_or(GatewayError::NotFound(id))
    }

    fn update_by_id(&mut self, id: RecordId, patch: &Patch) -> Result<Record, GatewayError> {
        let mut record = self.get(id)?.ok_or(GatewayError::NotFound(id))?;
        record.apply_patch(patch);
        self.insert(&record)?;
        debug!(collection = %self.collection, record = %id, fields = patch.len(), "record updated");
        Ok(record)
    }

    fn delete_by_id(&mut self, id: RecordId) -> Result<(), GatewayError> {
        if self.remove(id)? {
            Ok(())
        } else {
            Err(GatewayError::NotFound(id))
        }
    }
}
