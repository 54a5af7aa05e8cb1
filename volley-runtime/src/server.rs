use crate::queue::Queue;
use crate::store::{RunStore, StoreError};
use crate::submit::{Ack, SubmitError, Submitter};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{macros::format_description, Date, OffsetDateTime};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, error, info, instrument};
use volley_core::{RunId, RunRecord, SubmitRequest};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Address Parsing Error")]
    AddrParseError(#[from] std::net::AddrParseError),

    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Handles shared by every request.
pub struct ApiState<Q, S> {
    pub submitter: Submitter<Q>,
    pub store: S,
}

impl<Q, S> ApiState<Q, S> {
    pub fn new(submitter: Submitter<Q>, store: S) -> Self {
        Self { submitter, store }
    }
}

/// The `/load-test` API.
pub fn router<Q, S>(state: Arc<ApiState<Q, S>>) -> Router
where
    Q: Queue + Sync + 'static,
    S: RunStore + Sync + 'static,
{
    Router::new()
        .route("/load-test", post(submit::<Q, S>).get(list::<Q, S>))
        .route("/load-test/test/:id", get(by_id::<Q, S>))
        .route("/load-test/by-date", get(by_date::<Q, S>))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

pub(crate) async fn server_task<Q, S>(
    port: u16,
    state: Arc<ApiState<Q, S>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError>
where
    Q: Queue + Sync + 'static,
    S: RunStore + Sync + 'static,
{
    let socket_addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    info!("API server listening on {socket_addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    debug!("API server stopped");
    Ok(())
}

#[derive(Error, Debug)]
enum HandlerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Load test not found")]
    NotFound,

    #[error("{0}")]
    Submit(#[from] SubmitError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<JsonRejection> for HandlerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        use HandlerError::*;
        let status = match &self {
            BadRequest(_) | Submit(SubmitError::Invalid(_)) => StatusCode::BAD_REQUEST,
            NotFound => StatusCode::NOT_FOUND,
            Submit(_) | Store(_) => {
                error!("Request failed: {self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[instrument(skip_all)]
async fn submit<Q, S>(
    State(state): State<Arc<ApiState<Q, S>>>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Ack>), HandlerError>
where
    Q: Queue + Sync,
    S: RunStore + Sync,
{
    let Json(request) = body?;
    let ack = state.submitter.submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

async fn list<Q, S>(
    State(state): State<Arc<ApiState<Q, S>>>,
) -> Result<Json<Vec<RunRecord>>, HandlerError>
where
    Q: Queue + Sync,
    S: RunStore + Sync,
{
    Ok(Json(state.store.list().await?))
}

async fn by_id<Q, S>(
    State(state): State<Arc<ApiState<Q, S>>>,
    Path(id): Path<String>,
) -> Result<Json<RunRecord>, HandlerError>
where
    Q: Queue + Sync,
    S: RunStore + Sync,
{
    state
        .store
        .get(&RunId::new(id))
        .await?
        .map(Json)
        .ok_or(HandlerError::NotFound)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateRange {
    start_date: Option<String>,
    end_date: Option<String>,
}

async fn by_date<Q, S>(
    State(state): State<Arc<ApiState<Q, S>>>,
    Query(range): Query<DateRange>,
) -> Result<Json<Vec<RunRecord>>, HandlerError>
where
    Q: Queue + Sync,
    S: RunStore + Sync,
{
    let (Some(start), Some(end)) = (range.start_date, range.end_date) else {
        return Err(HandlerError::BadRequest(
            "Both startDate and endDate are required".to_string(),
        ));
    };

    let start = parse_date(&start)?;
    let end = parse_date(&end)?;
    Ok(Json(state.store.created_between(start, end).await?))
}

/// Accepts RFC 3339 timestamps, or plain `YYYY-MM-DD` dates meaning midnight UTC.
fn parse_date(value: &str) -> Result<OffsetDateTime, HandlerError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .or_else(|_| {
            Date::parse(value, format_description!("[year]-[month]-[day]"))
                .map(|date| date.midnight().assume_utc())
        })
        .map_err(|_| HandlerError::BadRequest(format!("Invalid date `{value}`")))
}
