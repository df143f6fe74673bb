//! Test helpers: loopback signing and storage services for session tests.
//!
//! Run from workspace root: `cargo test -p nosup-client`. Both services bind
//! an ephemeral 127.0.0.1 port and record every request they see, so tests
//! can assert on the exact wire traffic a session produced.

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nosup_client::{compute_digest, HashOutcome, UploadEvent};
use nosup_core::models::ContentDigest;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// One request captured by the storage mock.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub object: String,
    pub query: String,
    pub body: Vec<u8>,
    pub token: Option<String>,
}

impl RecordedRequest {
    pub fn query_has(&self, fragment: &str) -> bool {
        self.query.contains(fragment)
    }
}

/// Mutable behavior and capture log of the storage mock.
#[derive(Default)]
pub struct StorageState {
    /// Offset returned by the probe endpoint.
    pub probe_offset: u64,
    /// Chunk requests (index order) that should stall instead of answering.
    pub stall_from_chunk: Option<usize>,
    /// Verbatim body to return for every chunk request, overriding the JSON
    /// acknowledgment.
    pub raw_chunk_response: Option<String>,
    /// Status code to return for every chunk request, overriding 200.
    pub chunk_status: Option<StatusCode>,
    pub probes: Vec<RecordedRequest>,
    pub chunks: Vec<RecordedRequest>,
    pub forms: Vec<RecordedRequest>,
    /// Chunk bodies concatenated in arrival order.
    pub received: Vec<u8>,
}

pub struct MockStorage {
    pub url: String,
    pub state: Arc<Mutex<StorageState>>,
    _server: tokio::task::JoinHandle<()>,
}

/// Spawn the storage mock: offset probes on GET, chunk uploads on POST,
/// form uploads on POST to the root.
pub async fn spawn_storage(state: StorageState) -> MockStorage {
    let state = Arc::new(Mutex::new(state));
    let router = Router::new()
        .route("/", post(handle_form))
        .route("/{bucket}/{object}", get(handle_probe).post(handle_chunk))
        .with_state(state.clone());
    let (url, server) = serve(router).await;
    MockStorage {
        url,
        state,
        _server: server,
    }
}

async fn handle_probe(
    State(state): State<Arc<Mutex<StorageState>>>,
    Path((_bucket, object)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Json<Value> {
    let mut state = state.lock().await;
    state.probes.push(RecordedRequest {
        object,
        query: query.unwrap_or_default(),
        body: Vec::new(),
        token: header_value(&headers, "x-nos-token"),
    });
    Json(json!({ "offset": state.probe_offset }))
}

async fn handle_chunk(
    State(state): State<Arc<Mutex<StorageState>>>,
    Path((_bucket, object)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (index, stall, raw, status, request_offset) = {
        let mut state = state.lock().await;
        let query = query.unwrap_or_default();
        let request_offset = query_param(&query, "offset")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let index = state.chunks.len();
        state.chunks.push(RecordedRequest {
            object,
            query,
            body: body.to_vec(),
            token: header_value(&headers, "x-nos-token"),
        });
        state.received.extend_from_slice(&body);
        (
            index,
            state.stall_from_chunk,
            state.raw_chunk_response.clone(),
            state.chunk_status,
            request_offset,
        )
    };

    if stall.is_some_and(|from| index >= from) {
        // Hold the request open; the test aborts the session meanwhile.
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
    if let Some(status) = status {
        return status.into_response();
    }
    if let Some(raw) = raw {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            raw,
        )
            .into_response();
    }
    Json(json!({
        "offset": request_offset + body.len() as u64,
        "context": format!("ctx-{index}"),
    }))
    .into_response()
}

async fn handle_form(
    State(state): State<Arc<Mutex<StorageState>>>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> StatusCode {
    let mut state = state.lock().await;
    state.forms.push(RecordedRequest {
        object: String::new(),
        query: query.unwrap_or_default(),
        body: body.to_vec(),
        token: None,
    });
    StatusCode::OK
}

pub struct MockSigner {
    pub url: String,
    pub requests: Arc<Mutex<Vec<Value>>>,
    _server: tokio::task::JoinHandle<()>,
}

/// Spawn the signing mock, answering every POST with `envelope`.
pub async fn spawn_signer(envelope: Value) -> MockSigner {
    let requests: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();
    let router = Router::new().route(
        "/sign",
        post(move |Json(body): Json<Value>| {
            let log = log.clone();
            let envelope = envelope.clone();
            async move {
                log.lock().await.push(body);
                Json(envelope)
            }
        }),
    );
    let (url, server) = serve(router).await;
    MockSigner {
        url: format!("{url}/sign"),
        requests,
        _server: server,
    }
}

/// Spawn a signing mock that records the request and then never answers.
pub async fn spawn_stalling_signer() -> MockSigner {
    let requests: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();
    let router = Router::new().route(
        "/sign",
        post(move |Json(body): Json<Value>| {
            let log = log.clone();
            async move {
                log.lock().await.push(body);
                tokio::time::sleep(Duration::from_secs(60)).await;
                Json(json!({ "code": 200 }))
            }
        }),
    );
    let (url, server) = serve(router).await;
    MockSigner {
        url: format!("{url}/sign"),
        requests,
        _server: server,
    }
}

/// A signing envelope granting a chunked upload.
pub fn grant_envelope(token: &str, bucket: &str, object: &str) -> Value {
    json!({
        "code": 200,
        "result": { "token": token, "bucket": bucket, "object": object },
    })
}

async fn serve(router: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve mock");
    });
    (format!("http://{addr}"), server)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Write `content` to a temp file with the given suffix (validation rejects
/// extensionless names).
pub fn temp_upload_file(content: &[u8], suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(content).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

/// Content digest of a file, as the session would compute it.
pub async fn digest_of(path: &std::path::Path) -> ContentDigest {
    match compute_digest(path, 1 << 20, |_| {}, || false)
        .await
        .expect("hash temp file")
    {
        HashOutcome::Complete(digest) => digest,
        HashOutcome::Aborted => unreachable!("no abort requested"),
    }
}

/// Collect every event until the channel closes.
pub async fn drain_events(mut events: mpsc::UnboundedReceiver<UploadEvent>) -> Vec<UploadEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        collected.push(event);
    }
    collected
}

/// The single terminal event of a drained session.
pub fn terminal_event(events: &[UploadEvent]) -> &UploadEvent {
    let terminals: Vec<&UploadEvent> = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                UploadEvent::Completed(_) | UploadEvent::Failed { .. } | UploadEvent::Aborted
            )
        })
        .collect();
    assert_eq!(terminals.len(), 1, "expected exactly one terminal event");
    assert!(
        matches!(
            events.last(),
            Some(UploadEvent::Completed(_) | UploadEvent::Failed { .. } | UploadEvent::Aborted)
        ),
        "terminal event must be last"
    );
    terminals[0]
}
