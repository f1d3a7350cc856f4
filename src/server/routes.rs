//! HTTP routes for Note I/O

use axum::{extract::{Path, State}, http::StatusCode, response::IntoResponse, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::{EngineError, Note, SpawnRequest};
use crate::graph::Snapshot;
use crate::tools::{CapabilityInfo, ControlCommand};
use crate::Node;

#[derive(Clone)]
pub struct NodeState { pub node: Arc<Node>, pub app_name: String }

impl NodeState {
    pub fn new(node: Arc<Node>, app_name: impl Into<String>) -> Self {
        Self { node, app_name: app_name.into() }
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn reject(e: EngineError) -> (StatusCode, String) {
    let status = match e {
        EngineError::NoteNotFound(_) | EngineError::CapabilityNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Validation { .. } | EngineError::Serde(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

#[derive(Serialize)]
pub struct ListResponse { notes: Vec<Note>, count: usize }

#[derive(Serialize)]
pub struct SpawnResponse { id: String }

#[derive(Serialize)]
pub struct RunResponse { id: String, queued: bool }

#[derive(Deserialize)]
pub struct ControlRequest { command: String }

#[derive(Serialize)]
pub struct ControlResponse { command: &'static str, paused: bool }

pub fn create_router(node: Arc<Node>) -> Router { create_router_with_name(node, "notemind") }

pub fn create_router_with_name(node: Arc<Node>, app_name: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/notes", get(list_notes).post(spawn_note))
        .route("/notes/:id", get(read_note))
        .route("/notes/:id/run", post(run_note))
        .route("/control", post(control))
        .route("/snapshot", get(snapshot))
        .route("/capabilities", get(capabilities))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(NodeState::new(node, app_name))
}

async fn health(State(s): State<NodeState>) -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": s.app_name}))
}

async fn list_notes(State(s): State<NodeState>) -> ApiResult<ListResponse> {
    let notes = s.node.list().await.map_err(reject)?;
    Ok(Json(ListResponse { count: notes.len(), notes }))
}

async fn read_note(State(s): State<NodeState>, Path(id): Path<String>) -> ApiResult<Note> {
    s.node.get(&id).await.map(Json).map_err(reject)
}

async fn spawn_note(State(s): State<NodeState>, Json(body): Json<Value>) -> ApiResult<SpawnResponse> {
    let request = SpawnRequest::from_value(body).map_err(reject)?;
    let id = s.node.spawn(request).await.map_err(reject)?;
    Ok(Json(SpawnResponse { id }))
}

async fn run_note(State(s): State<NodeState>, Path(id): Path<String>) -> ApiResult<RunResponse> {
    s.node.run(&id).await.map_err(reject)?;
    Ok(Json(RunResponse { id, queued: true }))
}

async fn control(State(s): State<NodeState>, Json(payload): Json<ControlRequest>) -> ApiResult<ControlResponse> {
    let command = ControlCommand::from_str(&payload.command)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("unknown command: {}", payload.command)))?;
    let note = s.node.control(command).await.map_err(reject)?;
    Ok(Json(ControlResponse { command: command.as_str(), paused: note.is_paused() }))
}

async fn snapshot(State(s): State<NodeState>) -> ApiResult<Snapshot> {
    s.node.snapshot().await.map(Json).map_err(reject)
}

async fn capabilities(State(s): State<NodeState>) -> Json<Vec<CapabilityInfo>> {
    Json(s.node.capabilities())
}
