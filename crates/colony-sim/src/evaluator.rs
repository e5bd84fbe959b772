//! Scores a completed run across seven weighted dimensions (§4.15).
//! `DimensionScore::score` and `EvaluationResult::composite_score` are kept
//! unrounded internally; only `to_json`'s serialized view rounds (dimension
//! scores to 2dp, composite to 2dp, metrics to 4dp). That asymmetry is
//! deliberate: keeping full precision internally means a caller comparing
//! two `EvaluationResult`s in memory doesn't see artificial ties.

use std::collections::HashMap;

use colony_core::{JobStatus};
use colony_io::LeaderboardRecord;
use serde_json::Value;

use crate::scenarios::ScenarioDefinition;
use crate::simulator::Simulator;
use crate::telemetry::AuditEntry;

const WEIGHT_SLA: f64 = 0.25;
const WEIGHT_ENERGY: f64 = 0.20;
const WEIGHT_CARBON: f64 = 0.15;
const WEIGHT_THERMAL: f64 = 0.15;
const WEIGHT_COST: f64 = 0.10;
const WEIGHT_INFRA: f64 = 0.10;
const WEIGHT_FAILURE_RESPONSE: f64 = 0.05;

fn clamp(v: f64) -> f64 {
    v.max(0.0).min(100.0)
}

fn norm(value: f64, target: f64, worst: f64) -> f64 {
    if (worst - target).abs() < 1e-9 {
        return if value <= target { 100.0 } else { 0.0 };
    }
    clamp(100.0 - 100.0 * (value - target) / (worst - target))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round4(x: f64) -> f64 {
    (x * 10000.0).round() / 10000.0
}

#[derive(Debug, Clone)]
pub struct DimensionScore {
    pub name: String,
    pub score: f64,
    pub weight: f64,
    pub metrics: HashMap<String, f64>,
    pub notes: String,
}

#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub scenario_id: String,
    pub run_type: String,
    pub composite_score: f64,
    pub dimensions: Vec<DimensionScore>,
    pub duration_ticks: u64,
    pub total_sim_time_s: f64,
    pub metadata: serde_json::Map<String, Value>,
}

impl EvaluationResult {
    pub fn to_json(&self) -> Value {
        let dimensions: Vec<Value> = self
            .dimensions
            .iter()
            .map(|d| {
                let metrics: serde_json::Map<String, Value> =
                    d.metrics.iter().map(|(k, v)| (k.clone(), Value::from(round4(*v)))).collect();
                serde_json::json!({
                    "name": d.name,
                    "score": round2(d.score),
                    "weight": d.weight,
                    "metrics": metrics,
                    "notes": d.notes,
                })
            })
            .collect();

        serde_json::json!({
            "scenario_id": self.scenario_id,
            "run_type": self.run_type,
            "composite_score": self.composite_score,
            "dimensions": dimensions,
            "duration_ticks": self.duration_ticks,
            "total_sim_time_s": self.total_sim_time_s,
            "metadata": self.metadata,
        })
    }

    pub fn to_leaderboard_record(&self, agent_name: &str, scenario_id: &str) -> LeaderboardRecord {
        let mut dimension_scores = HashMap::new();
        for d in &self.dimensions {
            dimension_scores.insert(d.name.clone(), d.score);
        }
        LeaderboardRecord {
            agent_name: agent_name.to_string(),
            scenario_id: scenario_id.to_string(),
            composite_score: self.composite_score,
            dimension_scores,
            duration_ticks: self.duration_ticks,
            total_sim_time_s: self.total_sim_time_s,
        }
    }
}

/// Reads whatever a `Simulator` has accumulated (telemetry, jobs, audit
/// log) and reduces it to a score. Borrows rather than consumes, so a
/// caller can still inspect the simulator afterward.
pub struct Evaluator<'a> {
    states: Vec<&'a colony_core::FacilityState>,
    jobs: Vec<&'a colony_core::Job>,
    audit: Vec<&'a AuditEntry>,
    scenario: &'a ScenarioDefinition,
    config: &'a colony_core::Config,
    sim_time: f64,
}

impl<'a> Evaluator<'a> {
    pub fn new(sim: &'a Simulator, scenario: &'a ScenarioDefinition) -> Self {
        let states: Vec<&colony_core::FacilityState> = sim.telemetry().iter().collect();
        let queue = &sim.facility().workload_queue;
        let jobs: Vec<&colony_core::Job> =
            queue.pending.iter().chain(queue.running.iter()).chain(queue.completed.iter()).collect();
        let audit = sim.audit().get_all();
        Self { states, jobs, audit, scenario, config: sim.config(), sim_time: sim.clock().current_time }
    }

    pub fn compute(&self) -> EvaluationResult {
        let dimensions = vec![
            self.score_sla(),
            self.score_energy(),
            self.score_carbon(),
            self.score_thermal(),
            self.score_cost(),
            self.score_infra(),
            self.score_failure_response(),
        ];
        let composite: f64 = dimensions.iter().map(|d| d.score * d.weight).sum();
        EvaluationResult {
            scenario_id: self.scenario.scenario_id.clone(),
            run_type: "agent".to_string(),
            composite_score: round2(composite),
            dimensions,
            duration_ticks: self.states.len() as u64,
            total_sim_time_s: self.sim_time,
            metadata: serde_json::Map::new(),
        }
    }

    fn score_sla(&self) -> DimensionScore {
        let total_submitted = self.jobs.len().max(1);
        let completed_ok: Vec<&&colony_core::Job> =
            self.jobs.iter().filter(|j| j.status == JobStatus::Completed).collect();
        let violated: Vec<&&colony_core::Job> = self.jobs.iter().filter(|j| j.sla_violated).collect();

        let violation_rate = violated.len() as f64 / total_submitted as f64;
        let sla_score = clamp(100.0 - violation_rate * 200.0);

        let completion_rate = completed_ok.len() as f64 / total_submitted as f64;
        let completion_score = completion_rate * 100.0;

        let wait_times: Vec<f64> =
            completed_ok.iter().filter_map(|j| j.started_at.map(|s| s - j.submitted_at)).collect();
        let avg_wait = if wait_times.is_empty() { 0.0 } else { wait_times.iter().sum::<f64>() / wait_times.len() as f64 };
        let wait_score = norm(avg_wait, 300.0, 3600.0);

        let score = 0.5 * sla_score + 0.3 * completion_score + 0.2 * wait_score;

        let mut metrics = HashMap::new();
        metrics.insert("violation_rate_pct".into(), violation_rate * 100.0);
        metrics.insert("completion_rate_pct".into(), completion_rate * 100.0);
        metrics.insert("avg_queue_wait_s".into(), avg_wait);
        metrics.insert("jobs_submitted".into(), self.jobs.len() as f64);
        metrics.insert("jobs_completed".into(), completed_ok.len() as f64);
        metrics.insert("jobs_violated".into(), violated.len() as f64);

        DimensionScore { name: "sla_quality".into(), score: clamp(score), weight: WEIGHT_SLA, metrics, notes: String::new() }
    }

    fn score_energy(&self) -> DimensionScore {
        if self.states.is_empty() {
            return DimensionScore {
                name: "energy_efficiency".into(),
                score: 50.0,
                weight: WEIGHT_ENERGY,
                metrics: HashMap::new(),
                notes: String::new(),
            };
        }
        let avg_pue = self.states.iter().map(|s| s.power.pue).sum::<f64>() / self.states.len() as f64;
        let pue_score = norm(avg_pue, 1.2, 2.0);

        let tick_s = self.config.clock.tick_interval_s;
        let total_kwh: f64 = self.states.iter().map(|s| s.power.total_power_kw * (tick_s / 3600.0)).sum();
        let completed_count = self.jobs.iter().filter(|j| j.status == JobStatus::Completed).count();
        let kwh_per_job = total_kwh / (completed_count.max(1) as f64);
        let kwh_score = norm(kwh_per_job, 5.0, 50.0);

        let avg_gpu_util = self.states.iter().map(|s| s.gpu.avg_sm_util_pct).sum::<f64>() / self.states.len() as f64;
        let gpu_util_score = clamp(avg_gpu_util);

        let score = 0.4 * pue_score + 0.3 * kwh_score + 0.3 * gpu_util_score;

        let mut metrics = HashMap::new();
        metrics.insert("avg_pue".into(), avg_pue);
        metrics.insert("total_kwh".into(), total_kwh);
        metrics.insert("kwh_per_job".into(), kwh_per_job);
        metrics.insert("avg_gpu_util_pct".into(), avg_gpu_util);

        DimensionScore { name: "energy_efficiency".into(), score: clamp(score), weight: WEIGHT_ENERGY, metrics, notes: String::new() }
    }

    fn score_carbon(&self) -> DimensionScore {
        if self.states.is_empty() {
            return DimensionScore {
                name: "carbon".into(),
                score: 50.0,
                weight: WEIGHT_CARBON,
                metrics: HashMap::new(),
                notes: String::new(),
            };
        }
        let last = self.states.last().unwrap();
        let total_carbon_kg = last.carbon.cumulative_carbon_kg;
        let tick_s = self.config.clock.tick_interval_s;
        let duration_h = self.scenario.duration_ticks as f64 * tick_s / 3600.0;
        let reference_carbon_kg = duration_h * 100.0 * 200.0 / 1000.0;
        let carbon_score = norm(total_carbon_kg, 0.0, reference_carbon_kg);

        let gpu_hours: f64 = self
            .states
            .iter()
            .map(|s| s.gpu.healthy_gpus as f64 * (s.gpu.avg_sm_util_pct / 100.0) * (tick_s / 3600.0))
            .sum();
        let carbon_per_gpu_h = (total_carbon_kg * 1000.0) / gpu_hours.max(0.001);
        let efficiency_score = norm(carbon_per_gpu_h, 500.0, 5000.0);

        let low_carbon: Vec<f64> =
            self.states.iter().filter(|s| s.carbon.carbon_intensity_gco2_kwh < 180.0).map(|s| s.gpu.avg_sm_util_pct).collect();
        let high_carbon: Vec<f64> =
            self.states.iter().filter(|s| s.carbon.carbon_intensity_gco2_kwh >= 250.0).map(|s| s.gpu.avg_sm_util_pct).collect();
        let (awareness_score, awareness_delta) = if !low_carbon.is_empty() && !high_carbon.is_empty() {
            let low_avg = low_carbon.iter().sum::<f64>() / low_carbon.len() as f64;
            let high_avg = high_carbon.iter().sum::<f64>() / high_carbon.len() as f64;
            let delta = (low_avg - high_avg) / 100.0;
            (clamp(50.0 + delta * 50.0), low_avg - high_avg)
        } else {
            (50.0, 0.0)
        };

        let score = 0.4 * carbon_score + 0.35 * efficiency_score + 0.25 * awareness_score;

        let mut metrics = HashMap::new();
        metrics.insert("total_carbon_kg".into(), total_carbon_kg);
        metrics.insert("reference_carbon_kg".into(), reference_carbon_kg);
        metrics.insert("carbon_per_gpu_hour_g".into(), carbon_per_gpu_h);
        metrics.insert("carbon_awareness_delta_pct".into(), awareness_delta);

        DimensionScore { name: "carbon".into(), score: clamp(score), weight: WEIGHT_CARBON, metrics, notes: String::new() }
    }

    fn score_thermal(&self) -> DimensionScore {
        if self.states.is_empty() {
            return DimensionScore {
                name: "thermal_safety".into(),
                score: 100.0,
                weight: WEIGHT_THERMAL,
                metrics: HashMap::new(),
                notes: String::new(),
            };
        }
        let num_racks = self.config.facility.num_racks.max(1);
        let total_rack_ticks = (num_racks * self.states.len()).max(1);
        let throttled_count: usize =
            self.states.iter().map(|s| s.thermal.racks.iter().filter(|r| r.throttled).count()).sum();
        let throttled_frac = throttled_count as f64 / total_rack_ticks as f64;
        let throttle_score = clamp(100.0 - throttled_frac * 500.0);

        let safe_temp = self.config.thermal.max_safe_inlet_temp_c;
        let crit_temp = self.config.thermal.critical_inlet_temp_c;
        let peak_inlet =
            self.states.iter().flat_map(|s| s.thermal.racks.iter().map(|r| r.inlet_temp_c)).fold(f64::MIN, f64::max);
        let peak_inlet = if peak_inlet.is_finite() { peak_inlet } else { safe_temp };
        let peak_score = if peak_inlet <= safe_temp {
            100.0
        } else if peak_inlet >= crit_temp {
            0.0
        } else {
            100.0 * (crit_temp - peak_inlet) / (crit_temp - safe_temp)
        };

        let thermal_event_ticks =
            self.states.iter().filter(|s| s.thermal.racks.iter().any(|r| r.inlet_temp_c > safe_temp)).count();
        let event_rate = thermal_event_ticks as f64 / self.states.len().max(1) as f64;
        let event_score = clamp(100.0 - event_rate * 300.0);

        let score = 0.4 * throttle_score + 0.35 * peak_score + 0.25 * event_score;

        let mut metrics = HashMap::new();
        metrics.insert("throttled_fraction_pct".into(), throttled_frac * 100.0);
        metrics.insert("peak_inlet_temp_c".into(), peak_inlet);
        metrics.insert("thermal_event_ticks".into(), thermal_event_ticks as f64);
        metrics.insert("thermal_event_rate_pct".into(), event_rate * 100.0);

        DimensionScore { name: "thermal_safety".into(), score: clamp(score), weight: WEIGHT_THERMAL, metrics, notes: String::new() }
    }

    fn score_cost(&self) -> DimensionScore {
        if self.states.is_empty() {
            return DimensionScore {
                name: "cost".into(),
                score: 50.0,
                weight: WEIGHT_COST,
                metrics: HashMap::new(),
                notes: String::new(),
            };
        }
        let last = self.states.last().unwrap();
        let total_cost = last.carbon.cumulative_cost_gbp;
        let tick_s = self.config.clock.tick_interval_s;
        let duration_h = self.scenario.duration_ticks as f64 * tick_s / 3600.0;
        let reference_cost = duration_h * 100.0 * 0.20;
        let cost_score = norm(total_cost, 0.0, reference_cost);

        let completed_count = self.jobs.iter().filter(|j| j.status == JobStatus::Completed).count();
        let cost_per_job = total_cost / (completed_count.max(1) as f64);
        let cpj_score = norm(cost_per_job, 0.50, 5.0);

        let cheap: Vec<f64> =
            self.states.iter().filter(|s| s.carbon.electricity_price_gbp_kwh < 0.12).map(|s| s.power.it_power_kw).collect();
        let expensive: Vec<f64> =
            self.states.iter().filter(|s| s.carbon.electricity_price_gbp_kwh > 0.20).map(|s| s.power.it_power_kw).collect();
        let (price_score, price_delta) = if !cheap.is_empty() && !expensive.is_empty() {
            let cheap_avg = cheap.iter().sum::<f64>() / cheap.len() as f64;
            let expensive_avg = expensive.iter().sum::<f64>() / expensive.len() as f64;
            let awareness = (cheap_avg - expensive_avg) / expensive_avg.max(1.0);
            (clamp(50.0 + awareness * 50.0), cheap_avg - expensive_avg)
        } else {
            (50.0, 0.0)
        };

        let score = 0.45 * cost_score + 0.30 * cpj_score + 0.25 * price_score;

        let mut metrics = HashMap::new();
        metrics.insert("total_cost_gbp".into(), total_cost);
        metrics.insert("reference_cost_gbp".into(), reference_cost);
        metrics.insert("cost_per_job_gbp".into(), cost_per_job);
        metrics.insert("price_awareness_delta_kw".into(), price_delta);

        DimensionScore { name: "cost".into(), score: clamp(score), weight: WEIGHT_COST, metrics, notes: String::new() }
    }

    fn score_infra(&self) -> DimensionScore {
        if self.states.is_empty() {
            return DimensionScore {
                name: "infra_health".into(),
                score: 100.0,
                weight: WEIGHT_INFRA,
                metrics: HashMap::new(),
                notes: String::new(),
            };
        }
        let avg_ecc = self.states.iter().map(|s| s.gpu.ecc_error_gpus as f64).sum::<f64>() / self.states.len() as f64;
        let ecc_score = clamp(100.0 - avg_ecc * 10.0);

        let avg_loss = self.states.iter().map(|s| s.network.total_packet_loss_pct).sum::<f64>() / self.states.len() as f64;
        let packet_score = clamp(100.0 - avg_loss * 1000.0);

        let avg_crc = self.states.iter().map(|s| s.network.total_crc_errors as f64).sum::<f64>() / self.states.len() as f64;
        let crc_score = clamp(100.0 - avg_crc * 5.0);

        let last = self.states.last().unwrap();
        let rack_healths: Vec<f64> = last.storage.racks.iter().map(|r| r.drive_health_pct).collect();
        let avg_health = if rack_healths.is_empty() { 100.0 } else { rack_healths.iter().sum::<f64>() / rack_healths.len() as f64 };
        let storage_score = clamp(avg_health);

        let score = 0.30 * ecc_score + 0.30 * packet_score + 0.20 * crc_score + 0.20 * storage_score;

        let mut metrics = HashMap::new();
        metrics.insert("avg_ecc_error_gpus".into(), avg_ecc);
        metrics.insert("avg_packet_loss_pct".into(), avg_loss);
        metrics.insert("avg_crc_errors".into(), avg_crc);
        metrics.insert("avg_drive_health_pct".into(), avg_health);

        DimensionScore { name: "infra_health".into(), score: clamp(score), weight: WEIGHT_INFRA, metrics, notes: String::new() }
    }

    fn score_failure_response(&self) -> DimensionScore {
        let scripted = &self.scenario.failure_injections;
        let tick_s = self.config.clock.tick_interval_s;

        if scripted.is_empty() {
            let mut metrics = HashMap::new();
            metrics.insert("scripted_failures".into(), 0.0);
            metrics.insert("mean_ttr_s".into(), 0.0);
            metrics.insert("unresolved".into(), 0.0);
            return DimensionScore {
                name: "failure_response".into(),
                score: 100.0,
                weight: WEIGHT_FAILURE_RESPONSE,
                metrics,
                notes: "No scripted failures in this scenario.".into(),
            };
        }

        let inject_entries: Vec<&&AuditEntry> =
            self.audit.iter().filter(|e| e.action == "inject_failure" && e.source == "scenario").collect();
        let resolve_entries: Vec<&&AuditEntry> = self.audit.iter().filter(|e| e.action == "resolve_failure").collect();

        let mut inject_map: HashMap<String, f64> = HashMap::new();
        for e in &inject_entries {
            if let Some(fid) = e.params.get("failure_id").and_then(|v| v.as_str()) {
                if !fid.is_empty() {
                    inject_map.insert(fid.to_string(), e.timestamp);
                }
            }
        }

        let mut response_times = Vec::new();
        let mut resolved_ids = std::collections::HashSet::new();
        for e in &resolve_entries {
            if e.result != "ok" {
                continue;
            }
            if let Some(fid) = e.params.get("failure_id").and_then(|v| v.as_str()) {
                if let Some(&injected_at) = inject_map.get(fid) {
                    if !resolved_ids.contains(fid) {
                        response_times.push(e.timestamp - injected_at);
                        resolved_ids.insert(fid.to_string());
                    }
                }
            }
        }

        let expected = scripted.len();
        let unresolved = expected.saturating_sub(response_times.len());

        let (mean_ttr, ttr_score_raw) = if !response_times.is_empty() {
            let mean = response_times.iter().sum::<f64>() / response_times.len() as f64;
            (mean, norm(mean, 300.0, 3600.0))
        } else {
            (0.0, if expected > 0 { 0.0 } else { 100.0 })
        };

        let unresolved_penalty = (unresolved as f64 / expected.max(1) as f64) * 50.0;
        let ttr_score = clamp(ttr_score_raw - unresolved_penalty);

        let mut violation_count = 0;
        for injection in scripted {
            let inject_time = injection.at_tick as f64 * tick_s;
            let dur = injection.duration_s.unwrap_or(3600) as f64;
            let end_time = inject_time + dur;
            for j in &self.jobs {
                if j.sla_violated && j.submitted_at >= inject_time && j.submitted_at <= end_time {
                    violation_count += 1;
                }
            }
        }

        let failure_sla_score = clamp(100.0 - violation_count as f64 * 20.0);
        let score = 0.7 * ttr_score + 0.3 * failure_sla_score;

        let mut metrics = HashMap::new();
        metrics.insert("scripted_failures".into(), expected as f64);
        metrics.insert("mean_ttr_s".into(), mean_ttr);
        metrics.insert("unresolved".into(), unresolved as f64);
        metrics.insert("violations_during_failures".into(), violation_count as f64);

        DimensionScore {
            name: "failure_response".into(),
            score: clamp(score),
            weight: WEIGHT_FAILURE_RESPONSE,
            metrics,
            notes: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::scenario_by_id;

    #[test]
    fn composite_score_is_weighted_sum_of_dimensions() {
        let config = colony_core::Config::default();
        let mut sim = Simulator::new(config);
        sim.tick(20);
        let scenario = scenario_by_id("steady_state").unwrap();
        let evaluator = Evaluator::new(&sim, &scenario);
        let result = evaluator.compute();

        let expected: f64 = result.dimensions.iter().map(|d| d.score * d.weight).sum();
        assert!((result.composite_score - round2(expected)).abs() < 1e-9);
        assert!(result.composite_score >= 0.0 && result.composite_score <= 100.0);
        assert_eq!(result.dimensions.len(), 7);
    }

    #[test]
    fn no_scripted_failures_scores_failure_response_at_ceiling() {
        let config = colony_core::Config::default();
        let mut sim = Simulator::new(config);
        sim.tick(5);
        let scenario = scenario_by_id("steady_state").unwrap();
        let evaluator = Evaluator::new(&sim, &scenario);
        let dim = evaluator.score_failure_response();
        assert_eq!(dim.score, 100.0);
    }

    #[test]
    fn empty_history_falls_back_to_documented_defaults() {
        let config = colony_core::Config::default();
        let sim = Simulator::new(config);
        let scenario = scenario_by_id("steady_state").unwrap();
        let evaluator = Evaluator::new(&sim, &scenario);
        assert_eq!(evaluator.score_energy().score, 50.0);
        assert_eq!(evaluator.score_carbon().score, 50.0);
        assert_eq!(evaluator.score_thermal().score, 100.0);
        assert_eq!(evaluator.score_cost().score, 50.0);
        assert_eq!(evaluator.score_infra().score, 100.0);
    }

    #[test]
    fn to_json_rounds_composite_and_dimensions_to_two_decimals_and_metrics_to_four() {
        let config = colony_core::Config::default();
        let mut sim = Simulator::new(config);
        sim.tick(10);
        let scenario = scenario_by_id("steady_state").unwrap();
        let result = Evaluator::new(&sim, &scenario).compute();
        let json = result.to_json();
        let dims = json["dimensions"].as_array().unwrap();
        assert_eq!(dims.len(), 7);
        for d in dims {
            let score = d["score"].as_f64().unwrap();
            assert!((score * 100.0).round() == score * 100.0 || (score * 100.0 - (score * 100.0).round()).abs() < 1e-6);
        }
    }
}
