//! Fake row API + change feed for HTTP client tests
//!
//! Serves the same endpoints as the hosted backend on an ephemeral local
//! port: PostgREST-style rows under `/rest/v1/feedback` and an SSE change
//! feed under `/realtime/v1/feedback/changes`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use fbk_common::config::BackendConfig;
use fbk_common::{EnrichmentState, Record, RecordId, UserId};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

pub const API_KEY: &str = "test-anon-key";

#[derive(Debug, Deserialize)]
struct InsertBody {
    title: String,
    description: String,
    user_id: UserId,
    status: String,
}

/// Headers seen on the last insert
#[derive(Debug, Clone, Default)]
pub struct SeenHeaders {
    pub apikey: Option<String>,
    pub authorization: Option<String>,
    pub prefer: Option<String>,
}

#[derive(Clone)]
pub struct FakeBackend {
    rows: Arc<Mutex<Vec<Record>>>,
    feed: Arc<Mutex<broadcast::Sender<&'static str>>>,
    failing_reads: Arc<AtomicU32>,
    last_insert_headers: Arc<Mutex<SeenHeaders>>,
    pub addr: SocketAddr,
}

impl FakeBackend {
    /// Bind to an ephemeral port and serve in the background
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake backend");
        let addr = listener.local_addr().expect("local addr");
        let (tx, _) = broadcast::channel(32);

        let backend = Self {
            rows: Arc::new(Mutex::new(Vec::new())),
            feed: Arc::new(Mutex::new(tx)),
            failing_reads: Arc::new(AtomicU32::new(0)),
            last_insert_headers: Arc::new(Mutex::new(SeenHeaders::default())),
            addr,
        };

        let router = Router::new()
            .route("/rest/v1/feedback", get(list_rows).post(insert_row))
            .route("/rest/v1/broken", get(broken_rows))
            .route("/realtime/v1/feedback/changes", get(change_feed))
            .with_state(backend.clone());

        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("fake backend serve");
        });
        backend
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client config pointing at this backend
    pub fn config(&self) -> BackendConfig {
        BackendConfig {
            base_url: self.base_url(),
            api_key: Some(API_KEY.to_string()),
            ..BackendConfig::default()
        }
    }

    pub fn seed(&self, record: Record) {
        self.rows.lock().unwrap().push(record);
    }

    /// Mark a row enriched and announce the update
    pub fn enrich(&self, id: RecordId, category: &str, priority: &str) {
        {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.iter_mut().find(|r| r.id == id).expect("row exists");
            row.category = Some(category.to_string());
            row.priority = Some(priority.to_string());
            row.status = EnrichmentState::Enriched("Processed".to_string());
        }
        self.announce("UPDATE");
    }

    pub fn announce(&self, event: &'static str) {
        let _ = self.feed.lock().unwrap().send(event);
    }

    /// End every open change feed response
    pub fn close_feeds(&self) {
        let (tx, _) = broadcast::channel(32);
        *self.feed.lock().unwrap() = tx;
    }

    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn last_insert_headers(&self) -> SeenHeaders {
        self.last_insert_headers.lock().unwrap().clone()
    }

    fn take_read_failure(&self) -> bool {
        self.failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(API_KEY)
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn list_rows(
    State(backend): State<FakeBackend>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing api key").into_response();
    }
    if backend.take_read_failure() {
        return (StatusCode::SERVICE_UNAVAILABLE, "try again later").into_response();
    }

    let mut rows = backend.rows.lock().unwrap().clone();
    if let Some(filter) = params.get("id") {
        let wanted = filter.trim_start_matches("eq.");
        rows.retain(|r| r.id.to_string() == wanted);
    }
    if params.get("order").map(String::as_str) == Some("created_at.desc") {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
    Json(rows).into_response()
}

async fn insert_row(
    State(backend): State<FakeBackend>,
    headers: HeaderMap,
    Json(body): Json<InsertBody>,
) -> Response {
    *backend.last_insert_headers.lock().unwrap() = SeenHeaders {
        apikey: header_string(&headers, "apikey"),
        authorization: header_string(&headers, "authorization"),
        prefer: header_string(&headers, "prefer"),
    };
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing api key").into_response();
    }

    let row = Record {
        id: RecordId::new_v4(),
        title: body.title,
        description: body.description,
        category: None,
        priority: None,
        status: EnrichmentState::from(body.status),
        created_at: Utc::now(),
        user_id: Some(body.user_id),
    };
    backend.rows.lock().unwrap().push(row.clone());
    backend.announce("INSERT");
    (StatusCode::CREATED, Json(vec![row])).into_response()
}

async fn broken_rows() -> &'static str {
    "<html>not json</html>"
}

async fn change_feed(State(backend): State<FakeBackend>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing api key").into_response();
    }

    let rx = backend.feed.lock().unwrap().subscribe();
    let greeting = stream::once(async {
        Ok::<_, Infallible>(Event::default().event("ConnectionStatus").data("connected"))
    });
    let changes = BroadcastStream::new(rx).filter_map(|result| async move {
        result
            .ok()
            .map(|kind| Ok::<_, Infallible>(Event::default().event(kind).data("{}")))
    });

    Sse::new(greeting.chain(changes))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}
