//! Interactive evaluation sessions (§4.15, §6). Every handler here locks
//! `sim` before `session`, matching the order documented in `state.rs`.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    agent_name: Option<String>,
}

pub async fn start(
    State(state): State<AppState>,
    Path(scenario_id): Path<String>,
    Query(q): Query<StartQuery>,
) -> ApiResult<Json<Value>> {
    let mut sim = state.sim.lock().await;
    let mut session = state.session.lock().await;
    let agent_name = q.agent_name.unwrap_or_else(|| "anonymous".to_string());
    let info = session.start(&mut sim, &scenario_id, &agent_name, None)?;
    Ok(Json(serde_json::to_value(info).unwrap()))
}

pub async fn step(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut sim = state.sim.lock().await;
    let mut session = state.session.lock().await;
    let result = session.step(&mut sim)?;
    Ok(Json(serde_json::to_value(result).unwrap()))
}

pub async fn end(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut sim = state.sim.lock().await;
    let mut session = state.session.lock().await;
    let result = session.end(&mut sim)?;
    Ok(Json(result.to_json()))
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let sim = state.sim.lock().await;
    let session = state.session.lock().await;
    Json(serde_json::to_value(session.get_status(&sim)).unwrap())
}
