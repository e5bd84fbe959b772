use serde::{Deserialize, Serialize};

/// Facility layout (§3): rack/server/GPU counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacilityConfig {
    pub num_racks: usize,
    pub servers_per_rack: usize,
    pub gpus_per_server: usize,
}

impl Default for FacilityConfig {
    fn default() -> Self {
        Self {
            num_racks: 8,
            servers_per_rack: 4,
            gpus_per_server: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThermalConfig {
    pub ambient_temp_c: f64,
    pub crac_setpoint_c: f64,
    pub crac_cooling_capacity_kw: f64,
    pub thermal_mass_coefficient: f64,
    pub max_safe_inlet_temp_c: f64,
    pub critical_inlet_temp_c: f64,
    pub crac_units: usize,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            ambient_temp_c: 22.0,
            crac_setpoint_c: 18.0,
            crac_cooling_capacity_kw: 50.0,
            thermal_mass_coefficient: 0.3,
            max_safe_inlet_temp_c: 35.0,
            critical_inlet_temp_c: 40.0,
            crac_units: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PowerConfig {
    pub gpu_tdp_watts: f64,
    pub server_base_power_watts: f64,
    pub pdu_capacity_kw: f64,
    pub facility_power_cap_kw: f64,
    pub pue_overhead_factor: f64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            gpu_tdp_watts: 300.0,
            server_base_power_watts: 200.0,
            pdu_capacity_kw: 20.0,
            facility_power_cap_kw: 120.0,
            pue_overhead_factor: 1.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadConfig {
    pub mean_job_arrival_interval_s: f64,
    pub job_duration_range_s: (i64, i64),
    pub gpu_requirement_range: (i64, i64),
    pub job_priority_range: (i64, i64),
    pub sla_deadline_range_s: (f64, f64),
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            mean_job_arrival_interval_s: 300.0,
            job_duration_range_s: (600, 7200),
            gpu_requirement_range: (1, 8),
            job_priority_range: (1, 5),
            sla_deadline_range_s: (600.0, 3600.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClockConfig {
    pub tick_interval_s: f64,
    pub realtime_factor: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_interval_s: 60.0,
            realtime_factor: 0.0,
        }
    }
}

/// Immutable per-run tuneables (§4.2). Sessions clone-and-override, never
/// mutate a `Config` in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub facility: FacilityConfig,
    pub thermal: ThermalConfig,
    pub power: PowerConfig,
    pub workload: WorkloadConfig,
    pub clock: ClockConfig,
    pub rng_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            facility: FacilityConfig::default(),
            thermal: ThermalConfig::default(),
            power: PowerConfig::default(),
            workload: WorkloadConfig::default(),
            clock: ClockConfig::default(),
            rng_seed: 42,
        }
    }
}

impl Config {
    /// Load from `path`, writing a default file out if it doesn't exist yet.
    pub fn load(path: &str) -> anyhow::Result<Config> {
        if std::path::Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Clone with `rng_seed` and the workload arrival interval overridden,
    /// as done when a `SessionManager` swaps in a scenario's config.
    pub fn with_scenario_overrides(&self, rng_seed: u64, mean_job_arrival_interval_s: f64) -> Config {
        let mut next = self.clone();
        next.rng_seed = rng_seed;
        next.workload.mean_job_arrival_interval_s = mean_job_arrival_interval_s;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.facility.num_racks, 8);
        assert_eq!(cfg.facility.servers_per_rack, 4);
        assert_eq!(cfg.facility.gpus_per_server, 4);
        assert!((cfg.power.pue_overhead_factor - 1.4).abs() < 1e-9);
        assert_eq!(cfg.rng_seed, 42);
    }

    #[test]
    fn load_creates_default_file_when_missing() {
        let dir = std::env::temp_dir().join(format!("colony-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let path_str = path.to_str().unwrap();
        let loaded = Config::load(path_str).unwrap();
        assert_eq!(loaded, Config::default());
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn scenario_overrides_do_not_mutate_original() {
        let cfg = Config::default();
        let scenario_cfg = cfg.with_scenario_overrides(7, 45.0);
        assert_eq!(cfg.rng_seed, 42);
        assert_eq!(scenario_cfg.rng_seed, 7);
        assert!((scenario_cfg.workload.mean_job_arrival_interval_s - 45.0).abs() < 1e-9);
    }
}
