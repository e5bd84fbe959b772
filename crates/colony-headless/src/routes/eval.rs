//! Scenario registry, scoring, the agent/baseline runners, and the
//! leaderboard (§4.15, §4.16, §6, §10). Scenario runs and sessions share
//! one `Simulator`; a run in flight here and a session in flight are
//! mutually exclusive the same way a session is exclusive with the
//! continuous worker (`SessionManager::start` already refuses while a
//! session is active, and both paths lock `sim` for their whole duration).

use axum::extract::{Path, Query, State};
use axum::response::Json;
use colony_io::LeaderboardRecord;
use colony_sim::{all_scenarios, scenario_by_id, AgentRunner, Evaluator, FailureInjection, ScenarioDefinition};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{invalid_request, not_found, ApiError, ApiResult};
use crate::state::{build_agent, AppState, AVAILABLE_AGENTS};

pub async fn scenarios() -> Json<Value> {
    Json(serde_json::to_value(all_scenarios()).unwrap())
}

fn resolve_scenario(scenario_id: &str) -> ApiResult<ScenarioDefinition> {
    scenario_by_id(scenario_id).ok_or_else(|| not_found(&format!("unknown scenario: {scenario_id}")))
}

/// Applies the optional overrides `/eval/run-agent` and `/eval/run-baseline`
/// accept on top of a named scenario's defaults.
fn apply_overrides(mut scenario: ScenarioDefinition, overrides: &RunOverrides) -> ScenarioDefinition {
    if let Some(duration_ticks) = overrides.duration_ticks {
        scenario.duration_ticks = duration_ticks;
    }
    if let Some(rng_seed) = overrides.rng_seed {
        scenario.rng_seed = rng_seed;
    }
    if let Some(interval) = overrides.mean_job_arrival_interval_s {
        scenario.workload_overrides.mean_job_arrival_interval_s = interval;
    }
    if let Some(ref injections) = overrides.failure_injections {
        scenario.failure_injections = injections.clone();
    }
    scenario
}

#[derive(Debug, Deserialize, Default)]
pub struct RunOverrides {
    duration_ticks: Option<u64>,
    rng_seed: Option<u64>,
    mean_job_arrival_interval_s: Option<f64>,
    failure_injections: Option<Vec<FailureInjection>>,
}

#[derive(Debug, Deserialize)]
pub struct ModeQuery {
    mode: Option<String>,
}

pub async fn run_scenario_route(
    State(state): State<AppState>,
    Path(scenario_id): Path<String>,
    Query(q): Query<ModeQuery>,
) -> ApiResult<Json<Value>> {
    let scenario = resolve_scenario(&scenario_id)?;
    let mode = q.mode.unwrap_or_else(|| "baseline".to_string());
    let mut sim = state.sim.lock().await;

    let result = match mode.as_str() {
        "agent" => {
            let mut agent = build_agent("random").expect("random agent always available");
            let mut runner = AgentRunner::new(&mut sim);
            runner.run(&mut *agent, &scenario_id, false, Some(scenario), None)?
        }
        "baseline" => colony_sim::run_scenario(&mut sim, &scenario, None).to_json(),
        other => return Err(invalid_request(&format!("unknown mode: {other}"))),
    };
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct ScoreQuery {
    scenario_id: String,
}

/// Scores whatever the shared simulator has accumulated so far against a
/// named scenario's thresholds, without running or resetting anything —
/// a live-dashboard read, distinct from `/eval/run`.
pub async fn score(State(state): State<AppState>, Query(q): Query<ScoreQuery>) -> ApiResult<Json<Value>> {
    let scenario = resolve_scenario(&q.scenario_id)?;
    let sim = state.sim.lock().await;
    Ok(Json(Evaluator::new(&sim, &scenario).compute().to_json()))
}

pub async fn baseline(State(state): State<AppState>, Path(scenario_id): Path<String>) -> ApiResult<Json<Value>> {
    let scenario = resolve_scenario(&scenario_id)?;
    let mut sim = state.sim.lock().await;
    let result = colony_sim::run_scenario(&mut sim, &scenario, None);
    Ok(Json(result.to_json()))
}

pub async fn agents() -> Json<Value> {
    Json(serde_json::json!(AVAILABLE_AGENTS))
}

#[derive(Debug, Deserialize)]
pub struct RunAgentRequest {
    agent_name: String,
    scenario_id: String,
    #[serde(flatten)]
    overrides: RunOverrides,
}

pub async fn run_agent(State(state): State<AppState>, Json(req): Json<RunAgentRequest>) -> ApiResult<Json<Value>> {
    let base = resolve_scenario(&req.scenario_id)?;
    let scenario = apply_overrides(base, &req.overrides);
    let mut agent = build_agent(&req.agent_name).ok_or_else(|| not_found(&format!("unknown agent: {}", req.agent_name)))?;

    let mut sim = state.sim.lock().await;
    let mut runner = AgentRunner::new(&mut sim);
    let result = runner.run(&mut *agent, &req.scenario_id, true, Some(scenario), Some(&state.leaderboard))?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct RunBaselineRequest {
    scenario_id: String,
    #[serde(flatten)]
    overrides: RunOverrides,
}

pub async fn run_baseline(State(state): State<AppState>, Json(req): Json<RunBaselineRequest>) -> ApiResult<Json<Value>> {
    let base = resolve_scenario(&req.scenario_id)?;
    let scenario = apply_overrides(base, &req.overrides);

    let mut sim = state.sim.lock().await;
    let result = colony_sim::run_scenario(&mut sim, &scenario, None);
    let record = result.to_leaderboard_record("baseline", &req.scenario_id);
    if let Err(err) = state.leaderboard.record_result(&record) {
        tracing::warn!(error = %err, "failed to record baseline leaderboard result");
    }
    Ok(Json(result.to_json()))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    scenario_id: Option<String>,
}

pub async fn leaderboard(State(state): State<AppState>, Query(q): Query<LeaderboardQuery>) -> ApiResult<Json<Value>> {
    let entries = state
        .leaderboard
        .load_leaderboard(q.scenario_id.as_deref())
        .map_err(|e| ApiError(colony_core::CoreError::Internal(e.to_string())))?;
    Ok(Json(serde_json::json!(entries.into_iter().map(entry_to_json).collect::<Vec<_>>())))
}

pub async fn leaderboard_best(State(state): State<AppState>, Query(q): Query<LeaderboardQuery>) -> ApiResult<Json<Value>> {
    let entries = state
        .leaderboard
        .get_best_scores(q.scenario_id.as_deref())
        .map_err(|e| ApiError(colony_core::CoreError::Internal(e.to_string())))?;
    Ok(Json(serde_json::json!(entries.into_iter().map(entry_to_json).collect::<Vec<_>>())))
}

fn entry_to_json(entry: colony_io::LeaderboardEntry) -> Value {
    serde_json::json!({
        "run_id": entry.run_id,
        "timestamp": entry.timestamp,
        "agent_name": entry.agent_name,
        "scenario_id": entry.scenario_id,
        "composite_score": entry.composite_score,
        "dimension_scores": entry.dimension_scores,
        "duration_ticks": entry.duration_ticks,
        "total_sim_time_s": entry.total_sim_time_s,
    })
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    agent_name: String,
    scenario_id: String,
    composite_score: f64,
    dimension_scores: HashMap<String, f64>,
    duration_ticks: u64,
    total_sim_time_s: f64,
}

pub async fn leaderboard_submit(State(state): State<AppState>, Json(req): Json<SubmitRequest>) -> ApiResult<Json<Value>> {
    let record = LeaderboardRecord {
        agent_name: req.agent_name,
        scenario_id: req.scenario_id,
        composite_score: req.composite_score,
        dimension_scores: req.dimension_scores,
        duration_ticks: req.duration_ticks,
        total_sim_time_s: req.total_sim_time_s,
    };
    let run_id = state
        .leaderboard
        .record_result(&record)
        .map_err(|e| ApiError(colony_core::CoreError::Internal(e.to_string())))?;
    Ok(Json(serde_json::json!({"run_id": run_id})))
}
