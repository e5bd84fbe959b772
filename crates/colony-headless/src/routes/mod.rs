//! Route table (§6). Grouped by concern into sibling modules; this file
//! only wires paths to handlers.

mod actions;
mod eval;
mod session;
mod sim;
mod status;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status::get_status))
        .route("/thermal", get(status::get_thermal))
        .route("/thermal/:rack_id", get(status::get_thermal_rack))
        .route("/power", get(status::get_power))
        .route("/power/:rack_id", get(status::get_power_rack))
        .route("/carbon", get(status::get_carbon))
        .route("/gpu", get(status::get_gpu))
        .route("/gpu/:server_id", get(status::get_gpu_server))
        .route("/network", get(status::get_network))
        .route("/network/:rack_id", get(status::get_network_rack))
        .route("/storage", get(status::get_storage))
        .route("/storage/:rack_id", get(status::get_storage_rack))
        .route("/cooling", get(status::get_cooling))
        .route("/workload/queue", get(status::get_workload_queue))
        .route("/workload/running", get(status::get_workload_running))
        .route("/workload/completed", get(status::get_workload_completed))
        .route("/workload/sla_violations", get(status::get_workload_sla_violations))
        .route("/failures/active", get(status::get_failures_active))
        .route("/telemetry/history", get(status::get_telemetry_history))
        .route("/audit", get(status::get_audit))
        .route("/actions/migrate_workload", post(actions::migrate_workload))
        .route("/actions/adjust_cooling", post(actions::adjust_cooling))
        .route("/actions/throttle_gpu", post(actions::throttle_gpu))
        .route("/actions/preempt_job", post(actions::preempt_job))
        .route("/actions/resolve_failure", post(actions::resolve_failure))
        .route("/sim/tick", post(sim::tick))
        .route("/sim/run", post(sim::run))
        .route("/sim/pause", post(sim::pause))
        .route("/sim/status", get(sim::status))
        .route("/sim/reset", post(sim::reset))
        .route("/sim/inject_failure", post(sim::inject_failure))
        .route("/eval/scenarios", get(eval::scenarios))
        .route("/eval/run/:scenario_id", post(eval::run_scenario_route))
        .route("/eval/score", get(eval::score))
        .route("/eval/baseline/:scenario_id", get(eval::baseline))
        .route("/eval/agents", get(eval::agents))
        .route("/eval/run-agent", post(eval::run_agent))
        .route("/eval/run-baseline", post(eval::run_baseline))
        .route("/eval/leaderboard", get(eval::leaderboard))
        .route("/eval/leaderboard/best", get(eval::leaderboard_best))
        .route("/eval/leaderboard/submit", post(eval::leaderboard_submit))
        .route("/eval/session/start/:scenario_id", post(session::start))
        .route("/eval/session/step", post(session::step))
        .route("/eval/session/end", post(session::end))
        .route("/eval/session/status", get(session::status))
        .with_state(state)
}
