//! Free-function scenario runner plus the agent-driven session wrapper
//! (§4.16, §10 supplemented feature). Both share the action dispatch table
//! so "an agent issued this action" means the same thing everywhere.

use std::collections::HashMap;

use colony_core::CoreResult;
use colony_io::LeaderboardStore;
use serde_json::Value;

use crate::agent::{Agent, AgentAction};
use crate::evaluator::{EvaluationResult, Evaluator};
use crate::scenarios::{all_scenarios, scenario_config, FailureInjection, ScenarioDefinition};
use crate::session::{SessionManager, SessionStepResult};
use crate::simulator::Simulator;

/// The state handed to an agent is the tick's `FacilityState` enriched with
/// the running-job summaries and active failure list (§4.15), rather than
/// those living as siblings on the step result; merge them into the
/// serialized document here so `Agent::act` sees one self-contained value.
fn enrich_state_for_agent(step: &SessionStepResult) -> Value {
    let mut state_value = serde_json::to_value(&step.state).unwrap_or(Value::Null);
    if let Value::Object(ref mut map) = state_value {
        map.insert("failures".into(), serde_json::to_value(&step.active_failures).unwrap_or(Value::Null));
        map.insert("running_jobs".into(), serde_json::to_value(&step.running_jobs).unwrap_or(Value::Null));
    }
    state_value
}

/// Executes one agent action against the simulator, auditing it under
/// `source="agent"`. Returns `false` for an unrecognised action type or
/// malformed params; never panics on either.
pub fn execute_action(sim: &mut Simulator, action: &AgentAction) -> bool {
    let p = &action.params;
    match action.action_type.as_str() {
        "migrate_workload" => {
            let (Some(job_id), Some(target_rack_id)) =
                (p.get("job_id").and_then(|v| v.as_str()), p.get("target_rack_id").and_then(|v| v.as_u64()))
            else {
                return false;
            };
            sim.migrate_workload(job_id, target_rack_id as usize, "agent")
        }
        "adjust_cooling" => {
            let (Some(rack_id), Some(setpoint_c)) =
                (p.get("rack_id").and_then(|v| v.as_u64()), p.get("setpoint_c").and_then(|v| v.as_f64()))
            else {
                return false;
            };
            sim.adjust_cooling(rack_id as usize, setpoint_c, "agent");
            true
        }
        "throttle_gpu" => {
            let Some(server_id) = p.get("server_id").and_then(|v| v.as_str()) else { return false };
            let power_cap_pct = p.get("power_cap_pct").and_then(|v| v.as_f64());
            sim.throttle_gpu(server_id, power_cap_pct, "agent");
            true
        }
        "preempt_job" => {
            let Some(job_id) = p.get("job_id").and_then(|v| v.as_str()) else { return false };
            sim.preempt_job(job_id, "agent")
        }
        "resolve_failure" => {
            let Some(failure_id) = p.get("failure_id").and_then(|v| v.as_str()) else { return false };
            sim.resolve_failure(failure_id, "agent")
        }
        _ => false,
    }
}

/// Run a scenario start to finish without session bookkeeping: used for
/// `baseline` runs (no callback) and for non-interactive agent runs that
/// only need a per-tick observation hook rather than full action dispatch.
pub fn run_scenario(sim: &mut Simulator, scenario: &ScenarioDefinition, mut tick_callback: Option<&mut dyn FnMut(&colony_core::FacilityState)>) -> EvaluationResult {
    let original_config = sim.config().clone();
    let next_config = scenario_config(&original_config, scenario);
    sim.set_config(next_config);
    sim.reset();

    let mut injections_by_tick: HashMap<u64, Vec<FailureInjection>> = HashMap::new();
    for fi in &scenario.failure_injections {
        injections_by_tick.entry(fi.at_tick).or_default().push(fi.clone());
    }

    for tick_idx in 0..scenario.duration_ticks {
        if let Some(fis) = injections_by_tick.get(&tick_idx) {
            for fi in fis {
                sim.inject(&fi.failure_type, &fi.target, fi.duration_s, "scenario");
            }
        }
        let states = sim.tick(1);
        if let (Some(cb), Some(state)) = (tick_callback.as_deref_mut(), states.last()) {
            cb(state);
        }
    }

    let mut result = Evaluator::new(sim, scenario).compute();
    result.run_type = if tick_callback.is_some() { "agent".into() } else { "baseline".into() };

    sim.set_config(original_config);
    result
}

/// Drives a full, interactive `Agent` through a scenario via
/// `SessionManager`, recording the outcome to the leaderboard.
pub struct AgentRunner<'a> {
    sim: &'a mut Simulator,
}

impl<'a> AgentRunner<'a> {
    pub fn new(sim: &'a mut Simulator) -> Self {
        Self { sim }
    }

    pub fn run(
        &mut self,
        agent: &mut dyn Agent,
        scenario_id: &str,
        record: bool,
        scenario_override: Option<ScenarioDefinition>,
        leaderboard: Option<&LeaderboardStore>,
    ) -> CoreResult<Value> {
        let mut mgr = SessionManager::new();
        let info = mgr.start(self.sim, scenario_id, agent.name(), scenario_override)?;
        agent.on_session_start(&serde_json::to_value(&info).unwrap_or(Value::Null));

        loop {
            let step = mgr.step(self.sim)?;
            let state_value = enrich_state_for_agent(&step);
            for action in agent.act(&state_value) {
                execute_action(self.sim, &action);
            }
            if step.done {
                break;
            }
        }

        let result = mgr.end(self.sim)?;
        let result_json = result.to_json();
        agent.on_session_end(&result_json);

        if record {
            if let Some(store) = leaderboard {
                if let Err(err) = store.record_result(&result.to_leaderboard_record(agent.name(), scenario_id)) {
                    tracing::warn!(error = %err, "failed to record leaderboard result");
                }
            }
        }

        Ok(result_json)
    }

    pub fn run_all(&mut self, agent: &mut dyn Agent, record: bool, leaderboard: Option<&LeaderboardStore>) -> CoreResult<Vec<Value>> {
        let mut results = Vec::new();
        for scenario in all_scenarios() {
            results.push(self.run(agent, &scenario.scenario_id, record, None, leaderboard)?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random_agent::RandomAgent;
    use crate::scenarios::scenario_by_id;
    use colony_core::Config;

    #[test]
    fn baseline_run_scores_without_a_callback() {
        let mut sim = Simulator::new(Config::default());
        let scenario = scenario_by_id("steady_state").unwrap();
        let result = run_scenario(&mut sim, &scenario, None);
        assert_eq!(result.run_type, "baseline");
        assert_eq!(result.duration_ticks as u64, scenario.duration_ticks);
    }

    #[test]
    fn agent_runner_completes_a_full_scenario() {
        let mut sim = Simulator::new(Config::default());
        let mut agent = RandomAgent::new();
        let mut runner = AgentRunner::new(&mut sim);
        let result = runner.run(&mut agent, "overload", false, None, None).unwrap();
        assert_eq!(result["run_type"], "agent");
        assert_eq!(result["scenario_id"], "overload");
    }

    #[test]
    fn unknown_action_type_is_rejected_without_panicking() {
        let mut sim = Simulator::new(Config::default());
        let action = AgentAction::new("teleport_rack", serde_json::json!({}));
        assert!(!execute_action(&mut sim, &action));
    }

    #[test]
    fn enrich_state_for_agent_merges_failures_and_running_jobs_into_the_state() {
        let mut sim = Simulator::new(Config::default());
        let mut mgr = SessionManager::new();
        mgr.start(&mut sim, "cascade", "test-agent", None).unwrap();
        let step = mgr.step(&mut sim).unwrap();

        let merged = enrich_state_for_agent(&step);
        let obj = merged.as_object().expect("state merges into a JSON object");
        assert_eq!(obj["failures"], serde_json::to_value(&step.active_failures).unwrap());
        assert_eq!(obj["running_jobs"], serde_json::to_value(&step.running_jobs).unwrap());
        assert!(obj.contains_key("tick_count"), "base FacilityState fields must survive the merge");
    }
}
