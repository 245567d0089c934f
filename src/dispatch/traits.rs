//! Trait seams between the queue and its external collaborators.
//!
//! The queue never talks to a wire protocol directly: replay goes through
//! [`Dispatcher`], which the default implementation maps onto the narrower
//! [`BackendClient`] network primitives. Reachability and identity are read
//! through [`ConnectivityProbe`] and [`IdentitySource`].

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::{
    op::{Provenance, QueuedOp, ResourceMeta},
    types::Reachability,
};

/// Failure of one network primitive call.
///
/// The split matters: `Unreachable` means the backend was never reached and
/// the call is worth retrying verbatim; `Rejected` means the backend saw the
/// payload and refused it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The backend could not be reached (DNS, connect, timeout).
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    /// The backend actively refused the request.
    #[error("backend rejected request ({status}): {message}")]
    Rejected {
        /// HTTP-style status code; 0 for client-side refusals.
        status: u16,
        /// Human-readable refusal detail.
        message: String,
    },
}

/// Failure of one queued-operation dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The network was unreachable; the drain pass stops and the operation
    /// stays queued for a later pass.
    #[error("connectivity failure: {0}")]
    Connectivity(String),
    /// The backend refused the payload; the pass still stops, but the
    /// failure is reported distinctly and counts against the rejected
    /// replay budget.
    #[error("rejected by backend ({status}): {message}")]
    Rejected {
        /// HTTP-style status code; 0 for client-side refusals.
        status: u16,
        /// Human-readable refusal detail.
        message: String,
    },
}

impl From<NetworkError> for DispatchError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Unreachable(detail) => DispatchError::Connectivity(detail),
            NetworkError::Rejected { status, message } => {
                DispatchError::Rejected { status, message }
            }
        }
    }
}

/// Network primitives of the backend, implemented by the surrounding SDK.
///
/// Every call receives the provenance captured at enqueue time, not the
/// currently active session, so replays land under the identity that
/// originally issued them.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Creates an object at a collection uri.
    async fn create_resource(
        &self,
        uri: &str,
        body: &Value,
        auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError>;

    /// Replaces an existing object.
    async fn update_resource(
        &self,
        uri: &str,
        body: &Value,
        auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError>;

    /// Deletes an existing object.
    async fn delete_resource(
        &self,
        uri: &str,
        auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError>;

    /// Replaces one blob member of an existing object.
    async fn upload_blob(
        &self,
        uri: &str,
        member_name: &str,
        bytes: &[u8],
        mime_type: &str,
        auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError>;

    /// POSTs a payload to a server extension.
    async fn post_extension(
        &self,
        uri: &str,
        body: &Value,
        auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError>;
}

/// Translates one queued operation into the corresponding network call.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Performs the deferred call; `Ok` carries the backend metadata that
    /// becomes the operation's result.
    async fn dispatch(&self, op: &QueuedOp) -> Result<ResourceMeta, DispatchError>;
}

/// Read-only view of current backend reachability.
pub trait ConnectivityProbe: Send + Sync {
    /// Current reachability; drains short-circuit on
    /// [`Reachability::Unreachable`].
    fn reachability(&self) -> Reachability;
}

/// Read-only access to the active user and session, consulted once per
/// enqueue to stamp provenance.
pub trait IdentitySource: Send + Sync {
    /// The identity to record on operations enqueued right now.
    fn current(&self) -> Provenance;
}
