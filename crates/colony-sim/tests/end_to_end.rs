//! Cross-module end-to-end properties: a default-config bootstrap, relative
//! scoring across scenarios, and the scripted-failure audit trail a full
//! scenario run leaves behind.

use colony_core::Config;
use colony_sim::{run_scenario, scenario_by_id, Simulator};

#[test]
fn default_config_bootstrap_produces_one_consistent_tick() {
    let mut sim = Simulator::new(Config::default());
    sim.tick(1);

    assert_eq!(sim.telemetry().len(), 1);
    let state = sim.telemetry().get_latest().unwrap();

    assert_eq!(state.thermal.racks.len(), 8);
    let total_servers: usize = sim.config().facility.num_racks * sim.config().facility.servers_per_rack;
    assert_eq!(total_servers, 32);

    assert!(state.power.pue >= 1.4);
    assert!(state.carbon.cumulative_carbon_kg > 0.0);
    assert!(state.thermal.ambient_temp_c >= 18.0 && state.thermal.ambient_temp_c <= 26.0);
}

#[test]
fn thermal_crisis_scores_no_better_than_steady_state_on_thermal_safety() {
    let steady = scenario_by_id("steady_state").unwrap();
    let crisis = scenario_by_id("thermal_crisis").unwrap();

    let mut sim_steady = Simulator::new(Config::default());
    let steady_result = run_scenario(&mut sim_steady, &steady, None);

    let mut sim_crisis = Simulator::new(Config::default());
    let crisis_result = run_scenario(&mut sim_crisis, &crisis, None);

    let steady_thermal = steady_result.dimensions.iter().find(|d| d.name == "thermal_safety").unwrap();
    let crisis_thermal = crisis_result.dimensions.iter().find(|d| d.name == "thermal_safety").unwrap();
    assert!(crisis_thermal.score <= steady_thermal.score);
}

#[test]
fn cascade_scenario_audits_every_scripted_failure_injection() {
    let cascade = scenario_by_id("cascade").unwrap();
    let scripted_count = cascade.failure_injections.len();

    let mut sim = Simulator::new(Config::default());
    run_scenario(&mut sim, &cascade, None);

    let injected = sim
        .audit()
        .get_all()
        .iter()
        .filter(|e| e.action == "inject_failure" && e.source == "scenario" && e.result == "ok")
        .count();

    assert!(injected >= 4, "expected at least 4 of {scripted_count} scripted injections to land, got {injected}");
}
