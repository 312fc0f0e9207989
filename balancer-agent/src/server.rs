//! REST transport over the manager registry (spec.md section 6), built
//! the way `knhk-sidecar`'s own REST surface is: an `axum::Router` of
//! thin handlers that deserialize a request body, call into the core
//! crate, and serialize whatever it returns — no business logic lives
//! here.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use balancer_core::config::schema::{BalancerConfigPatch, RealUpdate};
use balancer_core::registry::ManagerRegistry;
use balancer_proto::envelope::RpcError;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ManagerRegistry>,
}

pub fn router(registry: Arc<ManagerRegistry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/managers", get(list_managers).post(create_manager))
        .route(
            "/managers/{name}",
            get(get_config).put(update_manager).delete(delete_manager),
        )
        .route("/managers/{name}/reals", post(update_reals))
        .route("/managers/{name}/resize", post(resize_session_table))
        .route("/managers/{name}/info", get(info))
        .route("/managers/{name}/sessions", get(sessions))
        .route("/managers/{name}/stats", get(stats))
        .route("/managers/{name}/graph", get(graph))
        .with_state(AppState { registry })
}

struct ApiError(RpcError);

impl From<balancer_core::error::BalancerError> for ApiError {
    fn from(e: balancer_core::error::BalancerError) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> AxumResponse {
        let status = match &self.0 {
            RpcError::NotFound(_) => StatusCode::NOT_FOUND,
            RpcError::Duplicate(_) => StatusCode::CONFLICT,
            RpcError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            RpcError::SessionTableOverflow
            | RpcError::NoRealsAvailable(_)
            | RpcError::ResizeInProgress => StatusCode::SERVICE_UNAVAILABLE,
            RpcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self.0)).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn list_managers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.list())
}

#[derive(Debug, Deserialize)]
struct CreateManagerRequest {
    name: String,
    config: BalancerConfigPatch,
}

async fn create_manager(
    State(state): State<AppState>,
    Json(req): Json<CreateManagerRequest>,
) -> Result<StatusCode, ApiError> {
    state.registry.create(&req.name, req.config)?;
    Ok(StatusCode::CREATED)
}

async fn get_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<balancer_core::config::schema::BalancerManagerConfig>, ApiError> {
    let manager = state.registry.get(&name)?;
    Ok(Json(manager.config()))
}

#[derive(Debug, Deserialize)]
struct UpdateManagerRequest {
    config: BalancerConfigPatch,
    now: u32,
}

async fn update_manager(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<UpdateManagerRequest>,
) -> Result<StatusCode, ApiError> {
    let manager = state.registry.get(&name)?;
    manager.update(req.config, req.now)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_manager(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.delete(&name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_reals(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(updates): Json<Vec<RealUpdate>>,
) -> Result<StatusCode, ApiError> {
    let manager = state.registry.get(&name)?;
    manager.update_reals(&updates)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ResizeRequest {
    new_capacity: u32,
    now: u32,
}

async fn resize_session_table(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ResizeRequest>,
) -> Result<StatusCode, ApiError> {
    let manager = state.registry.get(&name)?;
    manager.resize_session_table(req.new_capacity, req.now)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct NowQuery {
    now: u32,
}

async fn info(
    State(state): State<AppState>,
    Path(name): Path<String>,
    axum::extract::Query(q): axum::extract::Query<NowQuery>,
) -> Result<Json<balancer_core::query::BalancerInfo>, ApiError> {
    let manager = state.registry.get(&name)?;
    Ok(Json(manager.info(q.now)))
}

async fn sessions(
    State(state): State<AppState>,
    Path(name): Path<String>,
    axum::extract::Query(q): axum::extract::Query<NowQuery>,
) -> Result<
    Json<Vec<(balancer_core::query::SessionIdentifier, balancer_core::query::SessionInfo)>>,
    ApiError,
> {
    let manager = state.registry.get(&name)?;
    Ok(Json(manager.sessions(q.now)))
}

async fn stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<balancer_core::stats::CountersSnapshot>, ApiError> {
    let manager = state.registry.get(&name)?;
    Ok(Json(manager.stats()))
}

async fn graph(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<balancer_core::query::BalancerGraph>, ApiError> {
    let manager = state.registry.get(&name)?;
    Ok(Json(manager.graph()))
}
