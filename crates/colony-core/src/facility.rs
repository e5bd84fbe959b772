use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::carbon::{CarbonModel, CarbonState};
use crate::clock::SimClock;
use crate::config::Config;
use crate::cooling::{CoolingModel, FacilityCoolingState};
use crate::gpu::{FacilityGpuState, GpuModel};
use crate::job::Job;
use crate::network::{FacilityNetworkState, NetworkModel};
use crate::power::{FacilityPowerState, PowerModel};
use crate::queue::WorkloadQueue;
use crate::storage::{FacilityStorageState, StorageModel};
use crate::thermal::{FacilityThermalState, ThermalModel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityState {
    pub current_time: f64,
    pub tick_count: u64,
    pub thermal: FacilityThermalState,
    pub power: FacilityPowerState,
    pub gpu: FacilityGpuState,
    pub network: FacilityNetworkState,
    pub storage: FacilityStorageState,
    pub cooling: FacilityCoolingState,
    pub carbon: CarbonState,
    pub workload_pending: usize,
    pub workload_running: usize,
    pub workload_completed: usize,
    pub sla_violations: usize,
}

/// Orchestrates the eight per-tick models in the fixed order workload →
/// power → thermal → gpu → network → storage → cooling → carbon (§4.12).
/// The power model consumes the *previous* tick's thermal throttle flags
/// and ambient temperature; the thermal model consumes *this* tick's rack
/// power. That one-tick feedback loop is deliberate.
pub struct Facility {
    config: Config,
    power_model: PowerModel,
    thermal_model: ThermalModel,
    gpu_model: GpuModel,
    network_model: NetworkModel,
    storage_model: StorageModel,
    cooling_model: CoolingModel,
    carbon_model: CarbonModel,
    pub workload_queue: WorkloadQueue,
    server_power_caps: HashMap<String, f64>,
    crac_setpoints: HashMap<usize, f64>,
    last_thermal: FacilityThermalState,
}

impl Facility {
    pub fn new(config: Config, workload_queue: Option<WorkloadQueue>) -> Self {
        let power_model = PowerModel::new(config.facility.clone(), config.power.clone());
        let thermal_model = ThermalModel::new(&config);
        let gpu_model = GpuModel::new(&config);
        let network_model = NetworkModel::new(&config);
        let storage_model = StorageModel::new(&config);
        let cooling_model = CoolingModel::new(&config);
        let carbon_model = CarbonModel::new(&config);
        let workload_queue = workload_queue.unwrap_or_else(|| WorkloadQueue::new(&config));

        Self {
            last_thermal: FacilityThermalState {
                racks: Vec::new(),
                ambient_temp_c: config.thermal.ambient_temp_c,
                avg_humidity_pct: 45.0,
            },
            config,
            power_model,
            thermal_model,
            gpu_model,
            network_model,
            storage_model,
            cooling_model,
            carbon_model,
            workload_queue,
            server_power_caps: HashMap::new(),
            crac_setpoints: HashMap::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        clock: &SimClock,
        cooling_capacity_factor: Option<HashMap<usize, f64>>,
        server_max_util_override: &HashMap<String, f64>,
        rack_power_multiplier: &HashMap<usize, f64>,
        network_partition_racks: &HashSet<usize>,
        crac_failed_units: &HashSet<usize>,
    ) -> FacilityState {
        let cooling_capacity_factor = cooling_capacity_factor
            .unwrap_or_else(|| (0..self.config.facility.num_racks).map(|r| (r, 1.0)).collect());

        let server_gpu_util = self.workload_queue.step(clock.current_time);
        // Read after scheduling so GPU/network/storage telemetry reflects this
        // tick's post-scheduling running set, not the one from before it.
        let running_jobs: Vec<Job> = self.workload_queue.running.clone();

        let throttled_racks: HashSet<usize> = self
            .last_thermal
            .racks
            .iter()
            .filter(|r| r.throttled)
            .map(|r| r.rack_id)
            .collect();
        let ambient_temp = self.last_thermal.ambient_temp_c;

        let power_state = self.power_model.compute(
            &server_gpu_util,
            &throttled_racks,
            &self.server_power_caps,
            server_max_util_override,
            rack_power_multiplier,
            ambient_temp,
        );

        let rack_power: HashMap<usize, f64> =
            power_state.racks.iter().map(|r| (r.rack_id, r.total_power_kw)).collect();
        let thermal_state = self.thermal_model.step(
            &rack_power,
            &cooling_capacity_factor,
            clock.tick_interval_s,
            clock.current_time,
        );
        self.last_thermal = thermal_state.clone();

        let thermal_inlets: HashMap<usize, f64> =
            thermal_state.racks.iter().map(|r| (r.rack_id, r.inlet_temp_c)).collect();
        let gpu_state = self.gpu_model.step(
            &server_gpu_util,
            &thermal_inlets,
            &throttled_racks,
            &running_jobs,
            clock.current_time,
        );

        let network_state = self.network_model.step(
            &server_gpu_util,
            &running_jobs,
            network_partition_racks,
            clock.current_time,
        );

        let storage_state = self.storage_model.step(&server_gpu_util, &running_jobs, clock.tick_interval_s);

        let cooling_state = self.cooling_model.step(
            power_state.it_power_kw,
            ambient_temp,
            &self.crac_setpoints,
            crac_failed_units,
            clock.current_time,
        );

        let carbon_state = self.carbon_model.step(clock.current_time, power_state.total_power_kw, clock.tick_interval_s);

        FacilityState {
            current_time: clock.current_time,
            tick_count: clock.tick_count,
            thermal: thermal_state,
            power: power_state,
            gpu: gpu_state,
            network: network_state,
            storage: storage_state,
            cooling: cooling_state,
            carbon: carbon_state,
            workload_pending: self.workload_queue.pending.len(),
            workload_running: self.workload_queue.running.len(),
            workload_completed: self.workload_queue.completed.len(),
            sla_violations: self.workload_queue.get_sla_violations().len(),
        }
    }

    pub fn set_server_power_cap(&mut self, server_id: &str, power_cap_pct: Option<f64>) {
        match power_cap_pct {
            Some(pct) => {
                self.server_power_caps.insert(server_id.to_string(), pct);
            }
            None => {
                self.server_power_caps.remove(server_id);
            }
        }
    }

    pub fn set_crac_setpoint(&mut self, unit_id: usize, setpoint_c: f64) {
        self.crac_setpoints.insert(unit_id, setpoint_c);
    }

    pub fn crac_setpoint(&self, rack_id: usize) -> Option<f64> {
        self.crac_setpoints.get(&rack_id).copied()
    }

    pub fn reset(&mut self, config: Config) {
        self.workload_queue.reset(&config);
        self.power_model = PowerModel::new(config.facility.clone(), config.power.clone());
        self.thermal_model.reset(&config);
        self.gpu_model.reset(&config);
        self.network_model.reset(&config);
        self.storage_model.reset(&config);
        self.cooling_model.reset(&config);
        self.carbon_model.reset(&config);
        self.server_power_caps.clear();
        self.crac_setpoints.clear();
        self.last_thermal = FacilityThermalState {
            racks: Vec::new(),
            ambient_temp_c: config.thermal.ambient_temp_c,
            avg_humidity_pct: 45.0,
        };
        self.config = config;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_produces_consistent_power_and_pue_invariant() {
        let config = Config::default();
        let mut facility = Facility::new(config.clone(), None);
        let clock = SimClock::new(config.clock.tick_interval_s, config.clock.realtime_factor);
        let state = facility.step(&clock, None, &HashMap::new(), &HashMap::new(), &HashSet::new(), &HashSet::new());
        assert!(state.power.pue >= config.power.pue_overhead_factor - 1e-9);
        assert!((state.power.total_power_kw - state.power.it_power_kw * state.power.pue).abs() < 0.5);
    }

    #[test]
    fn reset_clears_power_caps_and_last_thermal() {
        let config = Config::default();
        let mut facility = Facility::new(config.clone(), None);
        facility.set_server_power_cap("rack-0-srv-0", Some(50.0));
        facility.reset(config);
        assert!(facility.server_power_caps.is_empty());
        assert!(facility.last_thermal.racks.is_empty());
    }
}
