use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::collection::Collection;
use crate::error::CatalogError;
use crate::persist::ResultSet;
use crate::schema::{Entity, RecordKind};

#[derive(Deserialize)]
pub struct SearchRequest {
    pub entity: String,
    #[serde(default)]
    pub term: String,
    #[serde(default)]
    pub facets: HashMap<String, String>,
    #[serde(default)]
    pub owned_only: bool,
}

#[derive(Deserialize)]
pub struct RelatedRequest {
    pub source: String,
    pub target: String,
    pub id: i64,
}

#[derive(Deserialize)]
pub struct RecordRequest {
    pub kind: String,
    pub id: i64,
}

#[derive(Deserialize)]
pub struct OwnRequest {
    pub entity: String,
    pub id: i64,
    #[serde(default = "owned_by_default")]
    pub owned: bool,
}

fn owned_by_default() -> bool {
    true
}

/// A missing or null `tag` clears the tag.
#[derive(Deserialize)]
pub struct TagRequest {
    pub entity: String,
    pub id: i64,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Serialize)]
pub struct Response {
    pub status: String,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

type Reply = (StatusCode, Json<Response>);

fn status_of(error: &CatalogError) -> StatusCode {
    if error.is_caller_error() {
        StatusCode::BAD_REQUEST
    } else if matches!(error, CatalogError::Busy) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn reply<T: Serialize>(route: &str, started: Instant, outcome: Result<(T, Option<usize>), CatalogError>) -> Reply {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match outcome.and_then(|(body, rows)| {
        serde_json::to_value(body)
            .map(|value| (value, rows))
            .map_err(|e| CatalogError::Store(e.to_string()))
    }) {
        Ok((result, row_count)) => {
            info!(route, ms = elapsed_ms, rows = ?row_count, "request complete");
            let body = Response { status: "ok".into(), elapsed_ms, row_count, result: Some(result), error: None };
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            let status = status_of(&e);
            let msg = e.to_string();
            warn!(route, %msg, code = %status.as_u16(), "request error");
            let body = Response { status: "error".into(), elapsed_ms, row_count: None, result: None, error: Some(msg) };
            (status, Json(body))
        }
    }
}

fn rows(result: Result<ResultSet, CatalogError>) -> Result<(ResultSet, Option<usize>), CatalogError> {
    result.map(|set| {
        let count = set.len();
        (set, Some(count))
    })
}

// The store is synchronous, so every call runs on a blocking thread.
async fn blocking<T, F>(route: &'static str, work: F) -> Reply
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Result<(T, Option<usize>), CatalogError> + Send + 'static,
{
    let started = Instant::now();
    let outcome = match tokio::task::spawn_blocking(work).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, route, "join error");
            Err(CatalogError::Store(format!("join error: {e}")))
        }
    };
    reply(route, started, outcome)
}

pub fn router(collection: Arc<Collection>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::POST])
        .allow_headers(Any);
    let search = Arc::clone(&collection);
    let related = Arc::clone(&collection);
    let record = Arc::clone(&collection);
    let own = Arc::clone(&collection);
    let tag = Arc::clone(&collection);
    let refresh = collection;
    Router::new()
        .route("/v1/search", post(move |Json(req): Json<SearchRequest>| {
            let c = Arc::clone(&search);
            blocking("search", move || {
                let entity: Entity = req.entity.parse()?;
                rows(c.search(entity, &req.term, &req.facets, req.owned_only))
            })
        }))
        .route("/v1/related", post(move |Json(req): Json<RelatedRequest>| {
            let c = Arc::clone(&related);
            blocking("related", move || rows(c.related(&req.source, &req.target, req.id)))
        }))
        .route("/v1/record", post(move |Json(req): Json<RecordRequest>| {
            let c = Arc::clone(&record);
            blocking("record", move || rows(c.record(RecordKind::parse(&req.kind)?, req.id)))
        }))
        .route("/v1/own", post(move |Json(req): Json<OwnRequest>| {
            let c = Arc::clone(&own);
            blocking("own", move || {
                let entity: Entity = req.entity.parse()?;
                Ok((c.set_owned(entity, req.id, req.owned)?, None))
            })
        }))
        .route("/v1/tag", post(move |Json(req): Json<TagRequest>| {
            let c = Arc::clone(&tag);
            blocking("tag", move || {
                let entity: Entity = req.entity.parse()?;
                Ok((c.set_tag(entity, req.id, req.tag.as_deref())?, None))
            })
        }))
        .route("/v1/refresh", post(move || {
            let c = Arc::clone(&refresh);
            async move {
                let (status, Json(mut body)) =
                    blocking("refresh", move || Ok((c.refresh(), None))).await;
                let code = match body.result.as_ref().and_then(|r| r.get("status")).and_then(Value::as_str) {
                    Some("fatal") | Some("failed") => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => status,
                };
                if code != status {
                    body.status = "error".into();
                }
                (code, Json(body))
            }
        }))
        .layer(cors)
}

