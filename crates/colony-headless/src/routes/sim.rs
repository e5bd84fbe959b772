//! Clock control (§6, §5): manual ticking, the continuous background
//! worker, reset, and ad-hoc failure injection outside any scenario.

use axum::extract::{Query, State};
use axum::response::Json;
use colony_core::FacilityState;
use colony_sim::Simulator;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{invalid_request, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TickQuery {
    n: Option<u64>,
}

pub async fn tick(State(state): State<AppState>, Query(q): Query<TickQuery>) -> Json<Vec<FacilityState>> {
    let mut sim = state.sim.lock().await;
    Json(sim.tick(q.n.unwrap_or(1).max(1)))
}

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    tick_interval_s: Option<f64>,
}

pub async fn run(State(state): State<AppState>, Query(q): Query<RunQuery>) -> Json<Value> {
    let started = Simulator::start_continuous(state.sim.clone(), q.tick_interval_s.unwrap_or(1.0)).await;
    Json(serde_json::json!({"started": started}))
}

pub async fn pause(State(state): State<AppState>) -> Json<Value> {
    let stopped = Simulator::stop_continuous(state.sim.clone()).await;
    Json(serde_json::json!({"stopped": stopped}))
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let sim = state.sim.lock().await;
    Json(serde_json::json!({
        "running": sim.is_running(),
        "tick_count": sim.clock().tick_count,
        "current_time": sim.clock().current_time,
    }))
}

pub async fn reset(State(state): State<AppState>) -> Json<Value> {
    let mut sim = state.sim.lock().await;
    sim.reset();
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
pub struct InjectFailureRequest {
    #[serde(rename = "type")]
    failure_type: String,
    target: String,
    duration_s: Option<i64>,
}

pub async fn inject_failure(State(state): State<AppState>, Json(req): Json<InjectFailureRequest>) -> ApiResult<Json<Value>> {
    let mut sim = state.sim.lock().await;
    let created = sim.inject(&req.failure_type, &req.target, req.duration_s, "api");
    let failure = created.into_iter().next().ok_or_else(|| invalid_request("unknown failure type"))?;
    Ok(Json(serde_json::to_value(failure).unwrap()))
}
