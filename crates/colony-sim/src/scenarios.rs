//! The five predefined evaluation scenarios (§4.15) and the config-swap
//! helper shared by `SessionManager::start` and `run_scenario`.

use colony_core::Config;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInjection {
    pub at_tick: u64,
    pub failure_type: String,
    pub target: String,
    pub duration_s: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioWorkloadOverrides {
    pub mean_job_arrival_interval_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub scenario_id: String,
    pub name: String,
    pub description: String,
    pub duration_ticks: u64,
    pub rng_seed: u64,
    pub failure_injections: Vec<FailureInjection>,
    pub workload_overrides: ScenarioWorkloadOverrides,
}

fn fi(at_tick: u64, failure_type: &str, target: &str, duration_s: Option<i64>) -> FailureInjection {
    FailureInjection { at_tick, failure_type: failure_type.to_string(), target: target.to_string(), duration_s }
}

fn overrides(mean_job_arrival_interval_s: f64) -> ScenarioWorkloadOverrides {
    ScenarioWorkloadOverrides { mean_job_arrival_interval_s }
}

fn steady_state() -> ScenarioDefinition {
    ScenarioDefinition {
        scenario_id: "steady_state".into(),
        name: "Steady State".into(),
        description: "Ordinary operation with no scripted failures; a baseline for every other scenario.".into(),
        duration_ticks: 240,
        rng_seed: 42,
        failure_injections: Vec::new(),
        workload_overrides: overrides(300.0),
    }
}

fn thermal_crisis() -> ScenarioDefinition {
    ScenarioDefinition {
        scenario_id: "thermal_crisis".into(),
        name: "Thermal Crisis".into(),
        description: "A CRAC unit fails early and stays down for most of the run, forcing thermal management under load.".into(),
        duration_ticks: 120,
        rng_seed: 123,
        failure_injections: vec![fi(30, "crac_failure", "crac-0", Some(2700))],
        workload_overrides: overrides(300.0),
    }
}

fn carbon_valley() -> ScenarioDefinition {
    ScenarioDefinition {
        scenario_id: "carbon_valley".into(),
        name: "Carbon Valley".into(),
        description: "A full day with no failures, rewarding agents that shift load toward low-carbon, low-price periods.".into(),
        duration_ticks: 1440,
        rng_seed: 77,
        failure_injections: Vec::new(),
        workload_overrides: overrides(300.0),
    }
}

fn overload() -> ScenarioDefinition {
    ScenarioDefinition {
        scenario_id: "overload".into(),
        name: "Overload".into(),
        description: "Arrival rate roughly tripled against the default; tests scheduling and SLA management under saturation.".into(),
        duration_ticks: 120,
        rng_seed: 55,
        failure_injections: Vec::new(),
        workload_overrides: overrides(100.0),
    }
}

fn cascade() -> ScenarioDefinition {
    ScenarioDefinition {
        scenario_id: "cascade".into(),
        name: "Cascade".into(),
        description: "Five failures of different kinds land in quick succession, testing whether an agent can keep up with overlapping incidents.".into(),
        duration_ticks: 120,
        rng_seed: 99,
        failure_injections: vec![
            fi(10, "pdu_spike", "rack-0", Some(300)),
            fi(25, "gpu_degraded", "rack-1-srv-0", None),
            fi(40, "crac_degraded", "crac-1", Some(900)),
            fi(60, "network_partition", "rack-2", Some(0)),
            fi(80, "crac_failure", "crac-0", Some(600)),
        ],
        workload_overrides: overrides(300.0),
    }
}

/// All five predefined scenarios, in their canonical display order.
pub fn all_scenarios() -> Vec<ScenarioDefinition> {
    vec![steady_state(), thermal_crisis(), carbon_valley(), overload(), cascade()]
}

pub fn scenario_by_id(scenario_id: &str) -> Option<ScenarioDefinition> {
    all_scenarios().into_iter().find(|s| s.scenario_id == scenario_id)
}

/// Build the config a scenario should run under: the caller's config with
/// the scenario's seed and arrival-interval override applied. Shared by
/// `SessionManager::start` and `run_scenario` so both swap config the same
/// way.
pub fn scenario_config(base: &Config, scenario: &ScenarioDefinition) -> Config {
    base.with_scenario_overrides(scenario.rng_seed, scenario.workload_overrides.mean_job_arrival_interval_s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_exactly_the_five_expected_ids() {
        let ids: Vec<String> = all_scenarios().into_iter().map(|s| s.scenario_id).collect();
        assert_eq!(ids, vec!["steady_state", "thermal_crisis", "carbon_valley", "overload", "cascade"]);
    }

    #[test]
    fn cascade_failures_are_ordered_by_tick() {
        let scenario = scenario_by_id("cascade").unwrap();
        let ticks: Vec<u64> = scenario.failure_injections.iter().map(|f| f.at_tick).collect();
        assert_eq!(ticks, vec![10, 25, 40, 60, 80]);
    }

    #[test]
    fn unknown_scenario_id_is_none() {
        assert!(scenario_by_id("does-not-exist").is_none());
    }

    #[test]
    fn scenario_config_overrides_seed_and_arrival_interval_only() {
        let base = Config::default();
        let scenario = scenario_by_id("overload").unwrap();
        let cfg = scenario_config(&base, &scenario);
        assert_eq!(cfg.rng_seed, 55);
        assert!((cfg.workload.mean_job_arrival_interval_s - 100.0).abs() < 1e-9);
        assert_eq!(cfg.facility, base.facility);
    }
}
