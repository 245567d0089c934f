//! SQLite-backed durable queue store.

use std::path::Path;

use hashbrown::HashMap;
use rusqlite::{Connection, params};
use tracing::warn;

use crate::{
    op::{BlobPayload, OpPayload, Provenance, QueuedOp},
    types::{LocalId, Method},
};

use super::{QueueStore, StoreResult};

/// SQLite implementation of [`QueueStore`].
///
/// One row per queued operation, discrete columns per field; the payload of
/// an object operation is stored as JSON text, a blob operation as raw bytes
/// plus mime type and member name.
pub struct SqliteQueueStore {
    conn: Connection,
}

impl SqliteQueueStore {
    /// Opens or creates a store at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }
}

struct RawRow {
    local_id: i64,
    ts_ms: i64,
    method: String,
    object_json: Option<String>,
    object_blobs: Option<String>,
    target_uri: String,
    blob_size: Option<i64>,
    blob: Option<Vec<u8>>,
    mime_type: Option<String>,
    member_name: Option<String>,
    session_id: String,
    user_guid: String,
    attempts: i64,
    dead: i64,
}

impl QueueStore for SqliteQueueStore {
    fn load_all(&self) -> StoreResult<Vec<QueuedOp>> {
        let mut stmt = self.conn.prepare(
            "SELECT local_id, ts_ms, method, object_json, object_blobs, target_uri, \
             blob_size, blob, mime_type, member_name, session_id, user_guid, attempts, dead \
             FROM operations ORDER BY local_id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(RawRow {
                local_id: row.get(0)?,
                ts_ms: row.get(1)?,
                method: row.get(2)?,
                object_json: row.get(3)?,
                object_blobs: row.get(4)?,
                target_uri: row.get(5)?,
                blob_size: row.get(6)?,
                blob: row.get(7)?,
                mime_type: row.get(8)?,
                member_name: row.get(9)?,
                session_id: row.get(10)?,
                user_guid: row.get(11)?,
                attempts: row.get(12)?,
                dead: row.get(13)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            let raw = row?;
            let local_id = raw.local_id;
            match decode_row(raw) {
                Ok(op) => out.push(op),
                Err(reason) => {
                    warn!(local_id, %reason, "skipping malformed queued operation row");
                }
            }
        }
        Ok(out)
    }

    fn append(&mut self, op: &QueuedOp) -> StoreResult<LocalId> {
        let (object_json, object_blobs, blob_size, blob, mime_type, member_name) =
            match &op.payload {
                OpPayload::Object { body, attached } => {
                    let blobs = if attached.is_empty() {
                        None
                    } else {
                        Some(serde_json::to_string(attached)?)
                    };
                    (Some(serde_json::to_string(body)?), blobs, None, None, None, None)
                }
                OpPayload::Blob(blob) => (
                    None,
                    None,
                    Some(blob.bytes.len() as i64),
                    Some(blob.bytes.clone()),
                    Some(blob.mime_type.clone()),
                    Some(blob.member_name.clone()),
                ),
            };

        self.conn.execute(
            "INSERT INTO operations(ts_ms, method, object_json, object_blobs, target_uri, \
             blob_size, blob, mime_type, member_name, session_id, user_guid, attempts, dead) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                op.ts_ms as i64,
                op.method.as_str(),
                object_json,
                object_blobs,
                op.target_uri,
                blob_size,
                blob,
                mime_type,
                member_name,
                op.provenance.session_id,
                op.provenance.user_guid,
                op.attempts as i64,
                op.dead as i64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn remove(&mut self, id: LocalId) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM operations WHERE local_id = ?1", params![id])?;
        Ok(())
    }

    fn update_replay_state(&mut self, id: LocalId, attempts: u32, dead: bool) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE operations SET attempts = ?2, dead = ?3 WHERE local_id = ?1",
            params![id, attempts as i64, dead as i64],
        )?;
        Ok(())
    }

    fn wipe(&mut self) -> StoreResult<()> {
        self.conn.execute("DELETE FROM operations", [])?;
        Ok(())
    }
}

fn decode_row(raw: RawRow) -> Result<QueuedOp, String> {
    let Some(method) = Method::parse(&raw.method) else {
        return Err(format!("unknown method {:?}", raw.method));
    };

    let payload = match method {
        Method::UpdateBlob => {
            let bytes = raw.blob.ok_or("missing blob bytes")?;
            let size = raw.blob_size.ok_or("missing blob size")?;
            if size as usize != bytes.len() {
                return Err(format!(
                    "blob truncated: expected {size} bytes, found {}",
                    bytes.len()
                ));
            }
            OpPayload::Blob(BlobPayload {
                bytes,
                mime_type: raw.mime_type.ok_or("missing mime type")?,
                member_name: raw.member_name.ok_or("missing member name")?,
            })
        }
        _ => {
            let body_text = raw.object_json.ok_or("missing object payload")?;
            let body =
                serde_json::from_str(&body_text).map_err(|e| format!("object payload: {e}"))?;
            let attached: HashMap<_, _> = match raw.object_blobs {
                Some(text) => {
                    serde_json::from_str(&text).map_err(|e| format!("object blobs: {e}"))?
                }
                None => HashMap::new(),
            };
            OpPayload::Object { body, attached }
        }
    };

    Ok(QueuedOp {
        local_id: Some(raw.local_id),
        ts_ms: raw.ts_ms as u64,
        method,
        target_uri: raw.target_uri,
        payload,
        provenance: Provenance {
            user_guid: raw.user_guid,
            session_id: raw.session_id,
        },
        attempts: raw.attempts as u32,
        dead: raw.dead != 0,
        result_meta: None,
    })
}
