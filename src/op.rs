//! Queued operation model and backend metadata types.

use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{LocalId, Method, SessionId, UserGuid};

/// One blob attached to an object payload, keyed by member name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobPart {
    /// Raw blob bytes.
    pub bytes: Vec<u8>,
    /// Mime type of the bytes.
    pub mime_type: String,
}

/// Payload of a standalone blob upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobPayload {
    /// Raw blob bytes.
    pub bytes: Vec<u8>,
    /// Mime type of the bytes.
    pub mime_type: String,
    /// Member name the blob replaces (eg `imageData`).
    pub member_name: String,
}

/// Payload of a queued operation; exactly one shape per operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpPayload {
    /// Serialized object, plus any companion blobs keyed by member name.
    Object {
        /// Serialized object representation.
        body: Value,
        /// Companion blobs replayed after the object call; may be empty.
        attached: HashMap<String, BlobPart>,
    },
    /// A single blob replacing one member of an existing object.
    Blob(BlobPayload),
}

impl OpPayload {
    /// Plain object payload with no companion blobs.
    pub fn object(body: Value) -> Self {
        OpPayload::Object {
            body,
            attached: HashMap::new(),
        }
    }
}

/// Identity captured at enqueue time and replayed unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Guid of the user who issued the operation.
    pub user_guid: UserGuid,
    /// Session under which the operation was issued.
    pub session_id: SessionId,
}

/// Backend-issued metadata about a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceMeta {
    /// Url of the object relative to the backend base url; `None` for
    /// objects that only exist locally.
    pub url: Option<String>,
    /// Backend guid of the object.
    pub guid: Option<String>,
    /// Collection the object lives in.
    pub collection: Option<String>,
    /// Object version; created at 1, incremented on every update.
    pub version: Option<u64>,
    /// Guid of the creating user.
    pub created_by: Option<String>,
    /// Creation timestamp in milliseconds, backend clock.
    pub created_at_ms: Option<u64>,
    /// Guid of the last updating user.
    pub updated_by: Option<String>,
    /// Last-update timestamp in milliseconds, backend clock.
    pub updated_at_ms: Option<u64>,
}

/// A serialized object paired with its backend metadata.
///
/// Update, delete, and blob-update admission derive their target uri from
/// the metadata url, so the object must have round-tripped through the
/// backend at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Backend metadata; `meta.url` is the replay target.
    pub meta: ResourceMeta,
    /// Serialized object representation.
    pub body: Value,
}

impl RemoteObject {
    /// Target uri for mutations of this object, if it has one yet.
    pub fn target_uri(&self) -> Option<&str> {
        self.meta.url.as_deref()
    }
}

/// Immutable deferred backend call awaiting replay.
///
/// Constructed as pure data; the runtime assigns [`QueuedOp::local_id`] at
/// persistence time, bumps [`QueuedOp::attempts`] on rejected replays, and
/// attaches [`QueuedOp::result_meta`] after the one successful dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOp {
    /// Durable row id; `None` until persisted. Dequeue key.
    pub local_id: Option<LocalId>,
    /// Enqueue timestamp in milliseconds since epoch.
    pub ts_ms: u64,
    /// The deferred call kind.
    pub method: Method,
    /// Resource path relative to the backend base url.
    pub target_uri: String,
    /// Object or blob payload.
    pub payload: OpPayload,
    /// Identity captured at enqueue time.
    pub provenance: Provenance,
    /// Number of rejected dispatch attempts so far.
    pub attempts: u32,
    /// True once the rejected-attempt budget is exhausted; dead operations
    /// are excluded from drains until explicitly dequeued.
    pub dead: bool,
    /// Metadata from the successful dispatch; `None` before that.
    pub result_meta: Option<ResourceMeta>,
}

impl QueuedOp {
    /// Builds a non-blob operation from a serialized object and target uri.
    pub fn object(
        method: Method,
        body: Value,
        uri: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self::with_payload(method, OpPayload::object(body), uri, provenance)
    }

    /// Builds a non-blob operation whose object carries companion blobs.
    pub fn object_with_blobs(
        method: Method,
        body: Value,
        attached: HashMap<String, BlobPart>,
        uri: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self::with_payload(method, OpPayload::Object { body, attached }, uri, provenance)
    }

    /// Builds a blob-upload operation from raw bytes, mime type, and the
    /// member name the bytes replace.
    pub fn blob(
        uri: impl Into<String>,
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        member_name: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self::with_payload(
            Method::UpdateBlob,
            OpPayload::Blob(BlobPayload {
                bytes,
                mime_type: mime_type.into(),
                member_name: member_name.into(),
            }),
            uri,
            provenance,
        )
    }

    fn with_payload(
        method: Method,
        payload: OpPayload,
        uri: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            local_id: None,
            ts_ms: now_ms(),
            method,
            target_uri: uri.into(),
            payload,
            provenance,
            attempts: 0,
            dead: false,
            result_meta: None,
        }
    }

    /// Whether two handles refer to the same queued operation: by local id
    /// once both are assigned, by full value identity before that.
    pub fn same_op(&self, other: &QueuedOp) -> bool {
        match (self.local_id, other.local_id) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
