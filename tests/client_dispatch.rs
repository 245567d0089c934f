use std::sync::Mutex;

use async_trait::async_trait;
use hashbrown::HashMap;
use serde_json::{Value, json};

use replayq::{
    dispatch::{
        client::ClientDispatcher,
        traits::{BackendClient, DispatchError, Dispatcher, NetworkError},
    },
    op::{BlobPart, OpPayload, Provenance, QueuedOp, ResourceMeta},
    types::Method,
};

fn provenance() -> Provenance {
    Provenance {
        user_guid: "queued-user".to_string(),
        session_id: "queued-session".to_string(),
    }
}

/// Records every primitive call; creates answer with a fresh resource url.
#[derive(Default)]
struct RecordingClient {
    log: Mutex<Vec<String>>,
}

impl RecordingClient {
    fn log(&self) -> Vec<String> {
        self.log.lock().expect("lock").clone()
    }

    fn record(&self, line: String) {
        self.log.lock().expect("lock").push(line);
    }
}

#[async_trait]
impl BackendClient for RecordingClient {
    async fn create_resource(
        &self,
        uri: &str,
        _body: &Value,
        auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError> {
        self.record(format!("create {uri} as {}", auth.user_guid));
        Ok(ResourceMeta {
            url: Some(format!("{uri}/new-1")),
            version: Some(1),
            ..ResourceMeta::default()
        })
    }

    async fn update_resource(
        &self,
        uri: &str,
        _body: &Value,
        auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError> {
        self.record(format!("update {uri} as {}", auth.user_guid));
        Ok(ResourceMeta {
            url: Some(uri.to_string()),
            version: Some(2),
            ..ResourceMeta::default()
        })
    }

    async fn delete_resource(
        &self,
        uri: &str,
        auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError> {
        self.record(format!("delete {uri} as {}", auth.user_guid));
        Ok(ResourceMeta::default())
    }

    async fn upload_blob(
        &self,
        uri: &str,
        member_name: &str,
        bytes: &[u8],
        mime_type: &str,
        auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError> {
        self.record(format!(
            "blob {uri} {member_name} {mime_type} {}b as {}",
            bytes.len(),
            auth.user_guid
        ));
        Ok(ResourceMeta {
            url: Some(uri.to_string()),
            ..ResourceMeta::default()
        })
    }

    async fn post_extension(
        &self,
        uri: &str,
        _body: &Value,
        auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError> {
        self.record(format!("post {uri} as {}", auth.user_guid));
        Ok(ResourceMeta::default())
    }
}

#[tokio::test]
async fn create_maps_to_create_resource_under_queued_identity() {
    let dispatcher = ClientDispatcher::new(RecordingClient::default());
    let op = QueuedOp::object(Method::Create, json!({ "n": 1 }), "/widgets", provenance());

    let meta = dispatcher.dispatch(&op).await.expect("dispatch");
    assert_eq!(meta.url.as_deref(), Some("/widgets/new-1"));
    assert_eq!(
        dispatcher_log(&dispatcher),
        vec!["create /widgets as queued-user"]
    );
}

#[tokio::test]
async fn create_with_attached_blobs_uploads_to_the_created_resource() {
    let dispatcher = ClientDispatcher::new(RecordingClient::default());
    let mut attached = HashMap::new();
    attached.insert(
        "photo".to_string(),
        BlobPart {
            bytes: vec![1, 2, 3, 4],
            mime_type: "image/png".to_string(),
        },
    );
    let op = QueuedOp::object_with_blobs(
        Method::Create,
        json!({ "name": "kettle" }),
        attached,
        "/products",
        provenance(),
    );

    dispatcher.dispatch(&op).await.expect("dispatch");
    assert_eq!(
        dispatcher_log(&dispatcher),
        vec![
            "create /products as queued-user",
            "blob /products/new-1 photo image/png 4b as queued-user",
        ]
    );
}

#[tokio::test]
async fn update_delete_blob_and_post_map_to_their_primitives() {
    let dispatcher = ClientDispatcher::new(RecordingClient::default());

    let ops = vec![
        QueuedOp::object(Method::Update, json!({ "n": 2 }), "/widgets/9", provenance()),
        QueuedOp::object(Method::Delete, json!({}), "/widgets/9", provenance()),
        QueuedOp::blob("/widgets/9", vec![5, 6], "image/gif", "icon", provenance()),
        QueuedOp::object(
            Method::PostToExtension,
            json!({ "cmd": "reindex" }),
            "/ff/ext/reindex",
            provenance(),
        ),
    ];
    for op in &ops {
        dispatcher.dispatch(op).await.expect("dispatch");
    }

    assert_eq!(
        dispatcher_log(&dispatcher),
        vec![
            "update /widgets/9 as queued-user",
            "delete /widgets/9 as queued-user",
            "blob /widgets/9 icon image/gif 2b as queued-user",
            "post /ff/ext/reindex as queued-user",
        ]
    );
}

#[tokio::test]
async fn mismatched_payload_shape_is_a_client_side_rejection() {
    let dispatcher = ClientDispatcher::new(RecordingClient::default());
    let mut op = QueuedOp::blob("/widgets/9", vec![1], "image/png", "icon", provenance());
    op.method = Method::Update;

    let err = dispatcher.dispatch(&op).await.expect_err("must refuse");
    match err {
        DispatchError::Rejected { status, .. } => assert_eq!(status, 0),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(dispatcher_log(&dispatcher).is_empty());
}

/// Client that fails every call one way, for error-mapping checks.
struct FailingClient {
    err: NetworkError,
}

#[async_trait]
impl BackendClient for FailingClient {
    async fn create_resource(
        &self,
        _uri: &str,
        _body: &Value,
        _auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError> {
        Err(self.err.clone())
    }

    async fn update_resource(
        &self,
        _uri: &str,
        _body: &Value,
        _auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError> {
        Err(self.err.clone())
    }

    async fn delete_resource(
        &self,
        _uri: &str,
        _auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError> {
        Err(self.err.clone())
    }

    async fn upload_blob(
        &self,
        _uri: &str,
        _member_name: &str,
        _bytes: &[u8],
        _mime_type: &str,
        _auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError> {
        Err(self.err.clone())
    }

    async fn post_extension(
        &self,
        _uri: &str,
        _body: &Value,
        _auth: &Provenance,
    ) -> Result<ResourceMeta, NetworkError> {
        Err(self.err.clone())
    }
}

#[tokio::test]
async fn unreachable_maps_to_connectivity_and_refusal_to_rejected() {
    let op = QueuedOp::object(Method::Create, json!({}), "/widgets", provenance());

    let unreachable = ClientDispatcher::new(FailingClient {
        err: NetworkError::Unreachable("connect timed out".to_string()),
    });
    match unreachable.dispatch(&op).await.expect_err("must fail") {
        DispatchError::Connectivity(detail) => assert_eq!(detail, "connect timed out"),
        other => panic!("expected connectivity, got {other:?}"),
    }

    let refused = ClientDispatcher::new(FailingClient {
        err: NetworkError::Rejected {
            status: 409,
            message: "version conflict".to_string(),
        },
    });
    match refused.dispatch(&op).await.expect_err("must fail") {
        DispatchError::Rejected { status, message } => {
            assert_eq!(status, 409);
            assert_eq!(message, "version conflict");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn blob_op_round_trips_payload_fields() {
    let op = QueuedOp::blob("/m/1", vec![1, 2, 3], "video/mp4", "clip", provenance());
    match &op.payload {
        OpPayload::Blob(blob) => {
            assert_eq!(blob.member_name, "clip");
            assert_eq!(blob.mime_type, "video/mp4");
        }
        other => panic!("expected blob payload, got {other:?}"),
    }
    assert_eq!(op.method, Method::UpdateBlob);
}

fn dispatcher_log(dispatcher: &ClientDispatcher<RecordingClient>) -> Vec<String> {
    dispatcher.client().log()
}
