//! The five action endpoints (§6, §4.13). Each dispatches straight to the
//! matching `Simulator` handler, which always records an audit entry; a
//! `false`/"not found" outcome becomes `404`, never a thrown error.

use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{not_found, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MigrateWorkloadRequest {
    job_id: String,
    target_rack_id: usize,
}

pub async fn migrate_workload(State(state): State<AppState>, Json(req): Json<MigrateWorkloadRequest>) -> ApiResult<Json<Value>> {
    let mut sim = state.sim.lock().await;
    let ok = sim.migrate_workload(&req.job_id, req.target_rack_id, "api");
    if !ok {
        return Err(not_found("unknown job_id or job is not running"));
    }
    Ok(Json(serde_json::json!({"status": "ok"})))
}

#[derive(Debug, Deserialize)]
pub struct AdjustCoolingRequest {
    rack_id: usize,
    setpoint_c: f64,
}

pub async fn adjust_cooling(State(state): State<AppState>, Json(req): Json<AdjustCoolingRequest>) -> Json<Value> {
    let mut sim = state.sim.lock().await;
    sim.adjust_cooling(req.rack_id, req.setpoint_c, "api");
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
pub struct ThrottleGpuRequest {
    server_id: String,
    power_cap_pct: Option<f64>,
}

pub async fn throttle_gpu(State(state): State<AppState>, Json(req): Json<ThrottleGpuRequest>) -> Json<Value> {
    let mut sim = state.sim.lock().await;
    sim.throttle_gpu(&req.server_id, req.power_cap_pct, "api");
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
pub struct PreemptJobRequest {
    job_id: String,
}

pub async fn preempt_job(State(state): State<AppState>, Json(req): Json<PreemptJobRequest>) -> ApiResult<Json<Value>> {
    let mut sim = state.sim.lock().await;
    let ok = sim.preempt_job(&req.job_id, "api");
    if !ok {
        return Err(not_found("unknown job_id or job is not running"));
    }
    Ok(Json(serde_json::json!({"status": "ok"})))
}

#[derive(Debug, Deserialize)]
pub struct ResolveFailureRequest {
    failure_id: String,
}

pub async fn resolve_failure(State(state): State<AppState>, Json(req): Json<ResolveFailureRequest>) -> ApiResult<Json<Value>> {
    let mut sim = state.sim.lock().await;
    let ok = sim.resolve_failure(&req.failure_id, "api");
    if !ok {
        return Err(not_found("unknown failure_id"));
    }
    Ok(Json(serde_json::json!({"status": "ok"})))
}
