//! A baseline agent that resolves every active failure, nudges a random
//! rack's CRAC setpoint toward its inlet temperature, and occasionally
//! preempts the lowest-priority running job under backlog. Exists mainly
//! as the `baseline` run type scored alongside real agents (§4.16).

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde_json::Value;

use crate::agent::{Agent, AgentAction};

const SEED: u64 = 42;

pub struct RandomAgent {
    rng: Pcg64,
}

impl RandomAgent {
    pub fn new() -> Self {
        Self { rng: Pcg64::seed_from_u64(SEED) }
    }
}

impl Default for RandomAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for RandomAgent {
    fn name(&self) -> &str {
        "random"
    }

    fn act(&mut self, state: &Value) -> Vec<AgentAction> {
        let mut actions = Vec::new();

        if let Some(failures) = state.get("failures").and_then(|v| v.as_array()) {
            for f in failures {
                if let Some(failure_id) = f.get("failure_id").and_then(|v| v.as_str()) {
                    actions.push(AgentAction::new("resolve_failure", serde_json::json!({"failure_id": failure_id})));
                }
            }
        }

        if let Some(racks) = state.get("thermal").and_then(|t| t.get("racks")).and_then(|v| v.as_array()) {
            if !racks.is_empty() {
                let idx = self.rng.gen_range(0..racks.len());
                let rack = &racks[idx];
                if let (Some(rack_id), Some(temp)) =
                    (rack.get("rack_id").and_then(|v| v.as_u64()), rack.get("inlet_temp_c").and_then(|v| v.as_f64()))
                {
                    let setpoint = if temp > 33.0 {
                        self.rng.gen_range(14.0..16.0)
                    } else if temp < 24.0 {
                        self.rng.gen_range(19.0..22.0)
                    } else {
                        self.rng.gen_range(16.0..20.0)
                    };
                    actions.push(AgentAction::new(
                        "adjust_cooling",
                        serde_json::json!({"rack_id": rack_id, "setpoint_c": (setpoint * 10.0).round() / 10.0}),
                    ));
                }
            }
        }

        let pending = state.get("workload_pending").and_then(|v| v.as_u64()).unwrap_or(0);
        let running = state.get("workload_running").and_then(|v| v.as_u64()).unwrap_or(0);
        if pending > 5 && running > 0 && self.rng.gen::<f64>() < 0.3 {
            if let Some(jobs) = state.get("running_jobs").and_then(|v| v.as_array()) {
                let lowest = jobs.iter().min_by_key(|j| j.get("priority").and_then(|v| v.as_i64()).unwrap_or(3));
                if let Some(job) = lowest {
                    if let Some(job_id) = job.get("job_id").and_then(|v| v.as_str()) {
                        actions.push(AgentAction::new("preempt_job", serde_json::json!({"job_id": job_id})));
                    }
                }
            }
        }

        actions
    }

    fn on_session_start(&mut self, _session_info: &Value) {
        self.rng = Pcg64::seed_from_u64(SEED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> Value {
        serde_json::json!({
            "failures": [{"failure_id": "f1", "type": "crac_failure", "target": "crac-0", "effect": "0% cooling capacity"}],
            "thermal": {"racks": [{"rack_id": 0, "inlet_temp_c": 36.0}], "ambient_temp_c": 22.0, "avg_humidity_pct": 45.0},
            "workload_pending": 8,
            "workload_running": 3,
            "running_jobs": [
                {"job_id": "a", "priority": 4},
                {"job_id": "b", "priority": 1},
            ],
        })
    }

    #[test]
    fn resolves_every_active_failure() {
        let mut agent = RandomAgent::new();
        let actions = agent.act(&sample_state());
        let resolve_count = actions.iter().filter(|a| a.action_type == "resolve_failure").count();
        assert_eq!(resolve_count, 1);
    }

    #[test]
    fn hot_rack_gets_a_cold_setpoint() {
        let mut agent = RandomAgent::new();
        let actions = agent.act(&sample_state());
        let cooling = actions.iter().find(|a| a.action_type == "adjust_cooling").unwrap();
        let setpoint = cooling.params["setpoint_c"].as_f64().unwrap();
        assert!(setpoint >= 14.0 && setpoint < 16.0);
    }

    #[test]
    fn on_session_start_resets_rng_to_seed() {
        let mut agent = RandomAgent::new();
        let first = agent.act(&sample_state());
        agent.on_session_start(&Value::Null);
        let second = agent.act(&sample_state());
        assert_eq!(first.len(), second.len());
        assert_eq!(first[1].params, second[1].params);
    }
}
