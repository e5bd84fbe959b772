use std::collections::{HashMap, HashSet};

use rand::Rng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::rng::model_rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    CracDegraded,
    CracFailure,
    GpuDegraded,
    PduSpike,
    NetworkPartition,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::CracDegraded => "crac_degraded",
            FailureType::CracFailure => "crac_failure",
            FailureType::GpuDegraded => "gpu_degraded",
            FailureType::PduSpike => "pdu_spike",
            FailureType::NetworkPartition => "network_partition",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "crac_degraded" => Some(FailureType::CracDegraded),
            "crac_failure" => Some(FailureType::CracFailure),
            "gpu_degraded" => Some(FailureType::GpuDegraded),
            "pdu_spike" => Some(FailureType::PduSpike),
            "network_partition" => Some(FailureType::NetworkPartition),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveFailure {
    pub failure_id: String,
    pub failure_type: FailureType,
    pub target: String,
    pub started_at: f64,
    pub duration_s: Option<f64>,
    pub effect: String,
}

/// Probabilistic failure injection plus manual inject/resolve, queried by
/// the other models each tick for their degraded-capacity factors (§4.11).
/// Uses the bare configured seed with no per-model offset, matching the
/// original's unshifted RNG stream for this engine.
pub struct FailureEngine {
    num_racks: usize,
    crac_units: usize,
    rng: Pcg64,
    active: HashMap<String, ActiveFailure>,
    crac_racks: HashMap<usize, Vec<usize>>,
    current_time: f64,
}

impl FailureEngine {
    pub fn new(config: &Config) -> Self {
        let mut engine = Self {
            num_racks: config.facility.num_racks,
            crac_units: config.thermal.crac_units,
            rng: model_rng(config.rng_seed, 0),
            active: HashMap::new(),
            crac_racks: HashMap::new(),
            current_time: 0.0,
        };
        engine.crac_racks = engine.compute_crac_racks();
        engine
    }

    fn compute_crac_racks(&self) -> HashMap<usize, Vec<usize>> {
        let racks_per_crac = (self.num_racks / self.crac_units).max(1);
        let mut result = HashMap::new();
        for crac_id in 0..self.crac_units {
            let start = crac_id * racks_per_crac;
            let end = (start + racks_per_crac).min(self.num_racks);
            result.insert(crac_id, (start..end).collect());
        }
        result
    }

    pub fn set_current_time(&mut self, t: f64) {
        self.current_time = t;
    }

    /// Random injection for this tick. Expiry of failures that have already
    /// run their course (including instantaneous ones created this same
    /// tick) is deliberately deferred to `expire()`, called by `Simulator`
    /// only after it has read this tick's effect accessors — otherwise a
    /// `duration_s == 0` failure (e.g. `network_partition`) would vanish
    /// before anything ever observed it (§4.11: "still kept one tick").
    pub fn tick(&mut self, current_time: f64) -> Vec<ActiveFailure> {
        self.current_time = current_time;
        let mut newly_activated = Vec::new();
        let prob_per_rack = 0.005;

        if self.rng.gen::<f64>() < prob_per_rack * self.num_racks as f64 {
            let rack_id = self.rng.gen_range(0..self.num_racks);
            let choices = ["crac_degraded", "pdu_spike", "network_partition"];
            let pick = choices[self.rng.gen_range(0..choices.len())];

            let (target, duration) = match pick {
                "crac_degraded" => {
                    let crac_count = self.crac_racks.len().max(1);
                    let crac_id = (rack_id % crac_count).min(crac_count.saturating_sub(1));
                    (format!("crac-{crac_id}"), self.rng.gen_range(600..1800) as i64)
                }
                "pdu_spike" => (format!("rack-{rack_id}"), 300),
                _ => (format!("rack-{rack_id}"), 0),
            };

            let failures = self.inject(pick, &target, Some(duration));
            newly_activated.extend(failures);
        }

        newly_activated
    }

    /// Remove failures whose window has closed as of `current_time`. Called
    /// after the tick's effects have been read and applied, so an
    /// instantaneous (`duration_s == 0`) failure is visible for exactly the
    /// tick it was created or injected in.
    pub fn expire(&mut self, current_time: f64) {
        self.active.retain(|_, f| match f.duration_s {
            Some(duration_s) => current_time - f.started_at < duration_s,
            None => true,
        });
    }

    pub fn inject(&mut self, failure_type: &str, target: &str, duration_s: Option<i64>) -> Vec<ActiveFailure> {
        let Some(ftype) = FailureType::from_str(failure_type) else {
            return Vec::new();
        };
        let failure_id = Uuid::new_v4().to_string();
        let current_time = self.current_time;

        let f = match ftype {
            FailureType::CracDegraded => ActiveFailure {
                failure_id,
                failure_type: ftype,
                target: target.to_string(),
                started_at: current_time,
                duration_s: Some(duration_s.unwrap_or(1200) as f64),
                effect: "50% cooling capacity".to_string(),
            },
            FailureType::CracFailure => ActiveFailure {
                failure_id,
                failure_type: ftype,
                target: target.to_string(),
                started_at: current_time,
                duration_s: Some(duration_s.unwrap_or(600) as f64),
                effect: "0% cooling capacity".to_string(),
            },
            FailureType::GpuDegraded => ActiveFailure {
                failure_id,
                failure_type: ftype,
                target: target.to_string(),
                started_at: current_time,
                duration_s: None,
                effect: "GPU stuck at 30% max util".to_string(),
            },
            FailureType::PduSpike => ActiveFailure {
                failure_id,
                failure_type: ftype,
                target: target.to_string(),
                started_at: current_time,
                duration_s: Some(duration_s.unwrap_or(300) as f64),
                effect: "+20% power draw".to_string(),
            },
            FailureType::NetworkPartition => ActiveFailure {
                failure_id,
                failure_type: ftype,
                target: target.to_string(),
                started_at: current_time,
                duration_s: Some(0.0),
                effect: "Jobs on rack fail".to_string(),
            },
        };

        self.active.insert(f.failure_id.clone(), f.clone());
        vec![f]
    }

    pub fn get_cooling_capacity_factor(&self, rack_id: usize) -> f64 {
        let mut factor = 1.0;
        let racks_per_crac = (self.num_racks / self.crac_units).max(1);
        let crac_id = (rack_id / racks_per_crac).min(self.crac_units.saturating_sub(1));

        for f in self.active.values() {
            if f.failure_type == FailureType::CracFailure && f.target == format!("crac-{crac_id}") {
                factor = 0.0;
            } else if f.failure_type == FailureType::CracDegraded && f.target == format!("crac-{crac_id}") {
                factor = factor.min(0.5);
            }
        }
        factor
    }

    pub fn get_cooling_capacity_factors(&self) -> HashMap<usize, f64> {
        (0..self.num_racks).map(|r| (r, self.get_cooling_capacity_factor(r))).collect()
    }

    pub fn get_pdu_spike_factor(&self, rack_id: usize) -> f64 {
        let target = format!("rack-{rack_id}");
        for f in self.active.values() {
            if f.failure_type == FailureType::PduSpike && f.target == target {
                return 1.2;
            }
        }
        1.0
    }

    pub fn get_network_partition_racks(&self) -> HashSet<usize> {
        let mut result = HashSet::new();
        for f in self.active.values() {
            if f.failure_type == FailureType::NetworkPartition && f.target.starts_with("rack-") {
                if let Some(rack_id) = f.target.split('-').nth(1).and_then(|s| s.parse().ok()) {
                    result.insert(rack_id);
                }
            }
        }
        result
    }

    pub fn get_gpu_degraded_servers(&self) -> HashSet<String> {
        self.active
            .values()
            .filter(|f| f.failure_type == FailureType::GpuDegraded)
            .map(|f| f.target.clone())
            .collect()
    }

    /// CRAC unit ids currently down with a `crac_failure` (not
    /// `crac_degraded`), so the cooling model can flag them `operational:
    /// false` / `fault_code > 0` instead of just losing capacity in the
    /// thermal model's cooling factor.
    pub fn get_failed_crac_units(&self) -> HashSet<usize> {
        self.active
            .values()
            .filter(|f| f.failure_type == FailureType::CracFailure)
            .filter_map(|f| f.target.strip_prefix("crac-").and_then(|s| s.parse().ok()))
            .collect()
    }

    pub fn get_active_failures(&self) -> Vec<ActiveFailure> {
        self.active.values().cloned().collect()
    }

    pub fn resolve(&mut self, failure_id: &str) -> bool {
        self.active.remove(failure_id).is_some()
    }

    pub fn reset(&mut self, config: &Config) {
        self.num_racks = config.facility.num_racks;
        self.crac_units = config.thermal.crac_units;
        self.rng = model_rng(config.rng_seed, 0);
        self.active.clear();
        self.crac_racks = self.compute_crac_racks();
        self.current_time = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crac_failure_zeroes_cooling_factor_for_its_racks() {
        let config = Config::default();
        let mut engine = FailureEngine::new(&config);
        engine.inject("crac_failure", "crac-0", Some(600));
        let racks_per_crac = config.facility.num_racks / config.thermal.crac_units.max(1);
        for rack_id in 0..racks_per_crac.max(1) {
            assert_eq!(engine.get_cooling_capacity_factor(rack_id), 0.0);
        }
    }

    #[test]
    fn network_partition_is_reported_and_resolvable() {
        let config = Config::default();
        let mut engine = FailureEngine::new(&config);
        let created = engine.inject("network_partition", "rack-2", None);
        assert_eq!(created.len(), 1);
        assert!(engine.get_network_partition_racks().contains(&2));
        let fid = created[0].failure_id.clone();
        assert!(engine.resolve(&fid));
        assert!(engine.get_network_partition_racks().is_empty());
    }

    #[test]
    fn get_failed_crac_units_reports_only_crac_failure_not_degraded() {
        let config = Config::default();
        let mut engine = FailureEngine::new(&config);
        engine.inject("crac_failure", "crac-1", Some(600));
        engine.inject("crac_degraded", "crac-0", Some(600));
        let failed = engine.get_failed_crac_units();
        assert!(failed.contains(&1));
        assert!(!failed.contains(&0));
    }

    #[test]
    fn unknown_failure_type_is_rejected() {
        let config = Config::default();
        let mut engine = FailureEngine::new(&config);
        let created = engine.inject("not_a_real_failure", "rack-0", None);
        assert!(created.is_empty());
    }
}
