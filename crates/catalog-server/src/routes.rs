//! Router and request handlers
//!
//! Every collection gets the same five routes:
//!
//! - `GET /<collection>` → `{"<collection>": [...]}`
//! - `GET /<collection>/:id` → `{"<singular>": {...}}`
//! - `POST /<collection>` → confirmation text
//! - `PUT /<collection>` → confirmation text
//! - `DELETE /<collection>/:id` → confirmation text
//!
//! plus `GET /all` for the whole catalog document.

use crate::error::{ApiError, ApiResult};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    routing::get,
};
use catalog_registry::{
    Catalog, ChatSession, Device, Error, Medication, Patient, Record, RecordId, Registry, Service,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// The registry behind every route
    pub registry: Arc<Registry>,
}

impl AppState {
    /// Create handler state
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

/// Create the catalog router
pub fn create_router(state: AppState) -> Router {
    let router = Router::new().route("/all", get(full_catalog));
    let router = collection_routes::<Device>(router);
    let router = collection_routes::<Service>(router);
    let router = collection_routes::<Patient>(router);
    let router = collection_routes::<Medication>(router);
    let router = collection_routes::<ChatSession>(router);

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn collection_routes<R: Record>(router: Router<AppState>) -> Router<AppState> {
    let base = format!("/{}", R::COLLECTION);
    router
        .route(
            &base,
            get(list_records::<R>)
                .post(create_record::<R>)
                .put(update_record::<R>),
        )
        .route(
            &format!("{}/:id", base),
            get(get_record::<R>).delete(delete_record::<R>),
        )
}

async fn full_catalog(State(state): State<AppState>) -> Json<Catalog> {
    Json(state.registry.catalog().await)
}

async fn list_records<R: Record>(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let records = state.registry.list::<R>().await;
    wrap(R::COLLECTION.as_str(), &records)
}

async fn get_record<R: Record>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = R::Id::parse(&id)?;
    let record = state.registry.get::<R>(&id).await?;
    wrap(R::COLLECTION.singular(), &record)
}

async fn create_record<R: Record>(State(state): State<AppState>, body: Bytes) -> ApiResult<String> {
    let record = R::from_json(parse_body(&body)?)?;
    Ok(state.registry.create(record).await?.message)
}

async fn update_record<R: Record>(State(state): State<AppState>, body: Bytes) -> ApiResult<String> {
    let record = R::from_json(parse_body(&body)?)?;
    Ok(state.registry.update(record).await?.message)
}

async fn delete_record<R: Record>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let id = R::Id::parse(&id)?;
    Ok(state.registry.delete::<R>(&id).await?.message)
}

fn parse_body(body: &[u8]) -> ApiResult<Value> {
    serde_json::from_slice(body).map_err(|e| ApiError::MalformedBody(e.to_string()))
}

/// Wrap a payload in a single-key JSON object
fn wrap<T: Serialize>(key: &str, payload: &T) -> ApiResult<Json<Value>> {
    let value = serde_json::to_value(payload).map_err(Error::from)?;
    let mut body = Map::new();
    body.insert(key.to_string(), value);
    Ok(Json(Value::Object(body)))
}
