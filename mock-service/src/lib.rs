//! Target server for exercising Volley against real HTTP exchanges.
use axum::{
    debug_handler,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Statuses returned by `/cycle`, in order.
pub const CYCLE: [u16; 5] = [200, 500, 200, 404, 204];

/// Per-server state; every spawned server starts from scratch.
#[derive(Clone, Default)]
pub struct MockState {
    cycle: Arc<AtomicUsize>,
    hits: Arc<AtomicU64>,
}

impl MockState {
    fn hit(&self) {
        counter!("mock-service.requests").increment(1);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/delay/ms/:delay_ms", get(delay))
        .route("/status/:code", get(status))
        .route("/cycle", get(cycle))
        .route("/echo", post(echo))
        .route("/header/:name", get(header))
        .route("/hits", get(hits))
        .with_state(MockState::default())
        .layer(TraceLayer::new_for_http())
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app()).await?;
    Ok(())
}

/// Serves a fresh mock on an ephemeral localhost port and returns its address.
pub async fn spawn() -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app()).await });
    debug!("Mock service listening on {addr}");
    Ok(addr)
}

#[debug_handler]
async fn delay(State(state): State<MockState>, Path(delay_ms): Path<u64>) -> &'static str {
    state.hit();
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    "ok"
}

async fn status(State(state): State<MockState>, Path(code): Path<u16>) -> StatusCode {
    state.hit();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn cycle(State(state): State<MockState>) -> StatusCode {
    state.hit();
    let idx = state.cycle.fetch_add(1, Ordering::SeqCst) % CYCLE.len();
    StatusCode::from_u16(CYCLE[idx]).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn echo(State(state): State<MockState>, Json(body): Json<Value>) -> Json<Value> {
    state.hit();
    Json(body)
}

/// 200 with the header's value if the request carries header `name`, 400 otherwise.
async fn header(
    State(state): State<MockState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<String, StatusCode> {
    state.hit();
    headers
        .get(name.as_str())
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or(StatusCode::BAD_REQUEST)
}

/// Requests served so far, not counting this one.
async fn hits(State(state): State<MockState>) -> String {
    state.hits.load(Ordering::Relaxed).to_string()
}
