//! Read-only substate queries (§6): the full `FacilityState` plus one
//! route per model, optionally narrowed to a single rack or server, the
//! workload lists, active failures, and the bounded telemetry/audit
//! history.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use colony_core::{FacilityState, Job};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{not_found, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LastN {
    last_n: Option<usize>,
}

/// `GET /status`. Ticks once if the simulator has never run, so a fresh
/// process answers its first request instead of 404ing on empty history.
pub async fn get_status(State(state): State<AppState>) -> ApiResult<Json<FacilityState>> {
    let mut sim = state.sim.lock().await;
    if sim.telemetry().is_empty() {
        sim.tick(1);
    }
    let latest = sim.telemetry().get_latest().cloned().expect("just ticked");
    Ok(Json(latest))
}

async fn latest(state: &AppState) -> ApiResult<FacilityState> {
    let sim = state.sim.lock().await;
    sim.telemetry().get_latest().cloned().ok_or_else(|| not_found("no state exists yet"))
}

pub async fn get_thermal(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let s = latest(&state).await?;
    Ok(Json(serde_json::to_value(s.thermal).unwrap()))
}

pub async fn get_thermal_rack(State(state): State<AppState>, Path(rack_id): Path<usize>) -> ApiResult<Json<Value>> {
    let s = latest(&state).await?;
    let rack = s.thermal.racks.into_iter().find(|r| r.rack_id == rack_id).ok_or_else(|| not_found("unknown rack_id"))?;
    Ok(Json(serde_json::to_value(rack).unwrap()))
}

pub async fn get_power(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let s = latest(&state).await?;
    Ok(Json(serde_json::to_value(s.power).unwrap()))
}

pub async fn get_power_rack(State(state): State<AppState>, Path(rack_id): Path<usize>) -> ApiResult<Json<Value>> {
    let s = latest(&state).await?;
    let rack = s.power.racks.into_iter().find(|r| r.rack_id == rack_id).ok_or_else(|| not_found("unknown rack_id"))?;
    Ok(Json(serde_json::to_value(rack).unwrap()))
}

pub async fn get_carbon(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let s = latest(&state).await?;
    Ok(Json(serde_json::to_value(s.carbon).unwrap()))
}

pub async fn get_gpu(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let s = latest(&state).await?;
    Ok(Json(serde_json::to_value(s.gpu).unwrap()))
}

pub async fn get_gpu_server(State(state): State<AppState>, Path(server_id): Path<String>) -> ApiResult<Json<Value>> {
    let s = latest(&state).await?;
    let server = s.gpu.servers.into_iter().find(|sv| sv.server_id == server_id).ok_or_else(|| not_found("unknown server_id"))?;
    Ok(Json(serde_json::to_value(server).unwrap()))
}

pub async fn get_network(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let s = latest(&state).await?;
    Ok(Json(serde_json::to_value(s.network).unwrap()))
}

pub async fn get_network_rack(State(state): State<AppState>, Path(rack_id): Path<usize>) -> ApiResult<Json<Value>> {
    let s = latest(&state).await?;
    let rack = s.network.racks.into_iter().find(|r| r.rack_id == rack_id).ok_or_else(|| not_found("unknown rack_id"))?;
    Ok(Json(serde_json::to_value(rack).unwrap()))
}

pub async fn get_storage(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let s = latest(&state).await?;
    Ok(Json(serde_json::to_value(s.storage).unwrap()))
}

pub async fn get_storage_rack(State(state): State<AppState>, Path(rack_id): Path<usize>) -> ApiResult<Json<Value>> {
    let s = latest(&state).await?;
    let rack = s.storage.racks.into_iter().find(|r| r.rack_id == rack_id).ok_or_else(|| not_found("unknown rack_id"))?;
    Ok(Json(serde_json::to_value(rack).unwrap()))
}

pub async fn get_cooling(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let s = latest(&state).await?;
    Ok(Json(serde_json::to_value(s.cooling).unwrap()))
}

pub async fn get_workload_queue(State(state): State<AppState>) -> Json<Vec<Job>> {
    let sim = state.sim.lock().await;
    Json(sim.facility().workload_queue.pending.clone())
}

pub async fn get_workload_running(State(state): State<AppState>) -> Json<Vec<Job>> {
    let sim = state.sim.lock().await;
    Json(sim.facility().workload_queue.running.clone())
}

pub async fn get_workload_completed(State(state): State<AppState>) -> Json<Vec<Job>> {
    let sim = state.sim.lock().await;
    Json(sim.facility().workload_queue.completed.clone())
}

pub async fn get_workload_sla_violations(State(state): State<AppState>) -> Json<Vec<Job>> {
    let sim = state.sim.lock().await;
    Json(sim.facility().workload_queue.get_sla_violations().into_iter().cloned().collect())
}

pub async fn get_failures_active(State(state): State<AppState>) -> Json<Value> {
    let sim = state.sim.lock().await;
    Json(serde_json::to_value(sim.failure_engine().get_active_failures()).unwrap())
}

pub async fn get_telemetry_history(State(state): State<AppState>, Query(q): Query<LastN>) -> Json<Value> {
    let sim = state.sim.lock().await;
    let n = q.last_n.unwrap_or(100);
    let history: Vec<&FacilityState> = sim.telemetry().get_last_n(n);
    Json(serde_json::to_value(history).unwrap())
}

pub async fn get_audit(State(state): State<AppState>, Query(q): Query<LastN>) -> Json<Value> {
    let sim = state.sim.lock().await;
    let n = q.last_n.unwrap_or(100);
    let entries = sim.audit().get_last_n(n);
    Json(serde_json::to_value(entries).unwrap())
}
