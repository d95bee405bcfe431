//! In-process stand-in for the text-generation backend, used by tests.

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures::StreamExt;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum TagsReply {
    Models(Vec<String>),
    Status(u16),
    Malformed,
}

impl TagsReply {
    pub(crate) fn models(names: &[&str]) -> Self {
        TagsReply::Models(names.iter().map(|name| name.to_string()).collect())
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ChatReply {
    /// One JSON document.
    Json(Value),
    /// Body chunks, each sent after its delay.
    Stream(Vec<(Duration, String)>),
    Status(u16, String),
    Empty,
}

impl ChatReply {
    pub(crate) fn stream(chunks: Vec<String>) -> Self {
        ChatReply::Stream(chunks.into_iter().map(|chunk| (Duration::ZERO, chunk)).collect())
    }
}

/// One newline-terminated line per record.
pub(crate) fn ndjson(records: &[Value]) -> Vec<String> {
    records.iter().map(|record| format!("{record}\n")).collect()
}

struct MockState {
    tags: TagsReply,
    chat: ChatReply,
    chat_requests: Mutex<Vec<Value>>,
    bodies_dropped: AtomicUsize,
}

/// Counts a streamed body as dropped once hyper lets go of it, which happens
/// when the body ends or the client goes away.
struct BodyGuard(Arc<MockState>);

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.0.bodies_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockBackend {
    pub(crate) base_url: String,
    state: Arc<MockState>,
}

impl MockBackend {
    pub(crate) async fn start(tags: TagsReply, chat: ChatReply) -> Self {
        let state = Arc::new(MockState {
            tags,
            chat,
            chat_requests: Mutex::new(Vec::new()),
            bodies_dropped: AtomicUsize::new(0),
        });

        let app = axum::Router::new()
            .route("/api/tags", get(tags_handler))
            .route("/api/chat", post(chat_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api"),
            state,
        }
    }

    /// Bodies of every chat request received so far.
    pub(crate) fn chat_requests(&self) -> Vec<Value> {
        self.state.chat_requests.lock().unwrap().clone()
    }

    /// Waits up to `within` for a streamed chat body to be released by the
    /// server. Returns false if it is still being held.
    pub(crate) async fn wait_body_dropped(&self, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while self.state.bodies_dropped.load(Ordering::SeqCst) == 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        true
    }
}

/// Base URL of a server that accepts connections and never answers.
pub(crate) async fn silent_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}/api")
}

/// Base URL of a port nothing listens on.
pub(crate) async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/api")
}

async fn tags_handler(State(state): State<Arc<MockState>>) -> Response {
    match &state.tags {
        TagsReply::Models(names) => {
            let models: Vec<Value> = names
                .iter()
                .map(|name| json!({"name": name, "size": 1024, "digest": "sha256:0"}))
                .collect();
            Json(json!({ "models": models })).into_response()
        }
        TagsReply::Status(code) => status(*code).into_response(),
        TagsReply::Malformed => "{\"models\": [".into_response(),
    }
}

async fn chat_handler(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.chat_requests.lock().unwrap().push(body);

    match state.chat.clone() {
        ChatReply::Json(value) => Json(value).into_response(),
        ChatReply::Stream(chunks) => {
            let guard = BodyGuard(state.clone());
            let body = futures::stream::iter(chunks).then(move |(delay, chunk)| {
                let _held = &guard;
                async move {
                    tokio::time::sleep(delay).await;
                    Ok::<_, Infallible>(chunk)
                }
            });
            Response::new(Body::from_stream(body))
        }
        ChatReply::Status(code, message) => (status(code), message).into_response(),
        ChatReply::Empty => StatusCode::OK.into_response(),
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
