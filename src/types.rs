//! Shared primitive IDs and queue-related enums.

use serde::{Deserialize, Serialize};

/// Row id assigned by the durable store; unique among resident operations.
pub type LocalId = i64;
/// Guid of the user an operation was issued under.
pub type UserGuid = String;
/// Session id an operation was issued under.
pub type SessionId = String;

/// Kind of deferred backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Create a new object at a collection uri.
    Create,
    /// Update an existing object.
    Update,
    /// Delete an existing object.
    Delete,
    /// Replace one blob member of an existing object.
    UpdateBlob,
    /// POST a payload to a server extension.
    PostToExtension,
}

impl Method {
    /// Stable text encoding used by the durable store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Create => "create",
            Method::Update => "update",
            Method::Delete => "delete",
            Method::UpdateBlob => "update_blob",
            Method::PostToExtension => "post_extension",
        }
    }

    /// Parses the text encoding; `None` for unknown input.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Method::Create),
            "update" => Some(Method::Update),
            "delete" => Some(Method::Delete),
            "update_blob" => Some(Method::UpdateBlob),
            "post_extension" => Some(Method::PostToExtension),
            _ => None,
        }
    }
}

/// Reachability of the backend as reported by a connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reachability {
    /// The backend is believed reachable.
    Reachable,
    /// The backend is known unreachable; drains short-circuit.
    Unreachable,
    /// No information; drains proceed and let dispatch decide.
    Unknown,
}
