use std::collections::{HashMap, HashSet};

use rand::Rng;
use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::config::{Config, FacilityConfig};
use crate::job::Job;
use crate::rng::{model_rng, OFFSET_GPU};

pub const BASE_SM_CLOCK_MHZ: f64 = 1410.0;
pub const BOOST_SM_CLOCK_MHZ: f64 = 1980.0;
pub const BASE_MEM_CLOCK_MHZ: i64 = 1593;
pub const MEM_TOTAL_MIB: i64 = 81920;
pub const PCIE_MAX_GBPS: f64 = 64.0;
pub const NVLINK_MAX_GBPS: f64 = 450.0;

const AMBIENT_TO_IDLE_OFFSET: f64 = 13.0;
const TEMP_PER_UTIL_FACTOR: f64 = 0.55;
const MEM_TEMP_OFFSET: f64 = -5.0;
const THERMAL_THROTTLE_TEMP: f64 = 83.0;
const FAN_RAMP_THRESHOLD: f64 = 50.0;
const SBE_RATE_PER_TICK: f64 = 0.0005;
const DBE_RATE_PER_TICK: f64 = 0.00002;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuState {
    pub gpu_id: String,
    pub server_id: String,
    pub rack_id: usize,
    pub sm_utilisation_pct: f64,
    pub mem_utilisation_pct: f64,
    pub gpu_temp_c: f64,
    pub mem_temp_c: f64,
    pub power_draw_w: f64,
    pub sm_clock_mhz: i64,
    pub mem_clock_mhz: i64,
    pub mem_used_mib: i64,
    pub mem_total_mib: i64,
    pub ecc_sbe_count: u64,
    pub ecc_dbe_count: u64,
    pub pcie_tx_gbps: f64,
    pub pcie_rx_gbps: f64,
    pub nvlink_tx_gbps: f64,
    pub nvlink_rx_gbps: f64,
    pub fan_speed_pct: f64,
    pub thermal_throttle: bool,
    pub power_throttle: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerGpuState {
    pub server_id: String,
    pub rack_id: usize,
    pub gpus: Vec<GpuState>,
    pub total_gpu_power_w: f64,
    pub avg_gpu_temp_c: f64,
    pub total_mem_used_mib: i64,
    pub total_mem_total_mib: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityGpuState {
    pub servers: Vec<ServerGpuState>,
    pub total_gpus: usize,
    pub healthy_gpus: usize,
    pub throttled_gpus: usize,
    pub ecc_error_gpus: usize,
    pub avg_gpu_temp_c: f64,
    pub avg_sm_util_pct: f64,
    pub total_gpu_mem_used_mib: i64,
    pub total_gpu_mem_total_mib: i64,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Per-GPU telemetry derived from server-average utilisation, rack inlet
/// temperature, and running-job types (§4.6). Owns its own RNG stream and
/// persistent ECC counters, reset together on `reset()`.
pub struct GpuModel {
    facility: FacilityConfig,
    gpu_tdp_w: f64,
    rng: Pcg64,
    normal_small: Normal<f64>,
    normal_jitter: Normal<f64>,
    ecc_sbe: HashMap<String, u64>,
    ecc_dbe: HashMap<String, u64>,
}

impl GpuModel {
    pub fn new(config: &Config) -> Self {
        Self {
            facility: config.facility.clone(),
            gpu_tdp_w: config.power.gpu_tdp_watts,
            rng: model_rng(config.rng_seed, OFFSET_GPU),
            normal_small: Normal::new(0.0, 0.02).unwrap(),
            normal_jitter: Normal::new(0.0, 0.8).unwrap(),
            ecc_sbe: HashMap::new(),
            ecc_dbe: HashMap::new(),
        }
    }

    pub fn step(
        &mut self,
        server_gpu_utilisation: &HashMap<String, f64>,
        thermal_rack_inlets: &HashMap<usize, f64>,
        throttled_racks: &HashSet<usize>,
        running_jobs: &[Job],
        _sim_time: f64,
    ) -> FacilityGpuState {
        let mut server_job_types: HashMap<String, &'static str> = HashMap::new();
        for job in running_jobs {
            for srv in &job.assigned_servers {
                server_job_types.insert(srv.clone(), job.job_type.as_str());
            }
        }

        let mut servers = Vec::new();
        let mut all_temps = Vec::new();
        let mut all_utils = Vec::new();
        let mut total_mem_used = 0i64;
        let mut total_mem_total = 0i64;
        let mut total_gpus = 0usize;
        let mut healthy = 0usize;
        let mut throttled_count = 0usize;
        let mut ecc_error_count = 0usize;

        for rack_id in 0..self.facility.num_racks {
            let inlet_temp = *thermal_rack_inlets.get(&rack_id).unwrap_or(&22.0);
            let is_throttled_rack = throttled_racks.contains(&rack_id);

            for srv_idx in 0..self.facility.servers_per_rack {
                let server_id = format!("rack-{rack_id}-srv-{srv_idx}");
                let avg_util = *server_gpu_utilisation.get(&server_id).unwrap_or(&0.05);
                let job_type = server_job_types.get(&server_id).copied().unwrap_or("batch");

                let mut gpu_states = Vec::with_capacity(self.facility.gpus_per_server);
                let mut srv_total_power = 0.0;
                let mut srv_total_mem = 0i64;
                let mut srv_temps = Vec::with_capacity(self.facility.gpus_per_server);

                for gpu_idx in 0..self.facility.gpus_per_server {
                    let gpu_id = format!("{server_id}-gpu-{gpu_idx}");
                    total_gpus += 1;

                    let noise = self.normal_small.sample(&mut self.rng);
                    let gpu_util = (avg_util + noise).clamp(0.0, 1.0);
                    let mut sm_pct = gpu_util * 100.0;

                    let base_temp = inlet_temp + AMBIENT_TO_IDLE_OFFSET;
                    let heat_rise = TEMP_PER_UTIL_FACTOR * sm_pct + 0.003 * sm_pct.powf(1.5);
                    let jitter = self.normal_jitter.sample(&mut self.rng);
                    let gpu_temp = base_temp + heat_rise + jitter;

                    let mut mem_temp = gpu_temp + MEM_TEMP_OFFSET;
                    if job_type == "training" {
                        mem_temp += 3.0;
                    }

                    let thermal_thr = gpu_temp >= THERMAL_THROTTLE_TEMP;
                    let mut effective_util = gpu_util;
                    if thermal_thr || is_throttled_rack {
                        sm_pct = sm_pct.min(50.0);
                        effective_util = sm_pct / 100.0;
                        throttled_count += 1;
                    }

                    let idle_power = 0.05 * self.gpu_tdp_w;
                    let active_power =
                        (0.3 * effective_util + 0.7 * effective_util * effective_util) * self.gpu_tdp_w;
                    let mut gpu_power = idle_power + 0.95 * active_power;
                    let power_thr = gpu_power >= 0.95 * self.gpu_tdp_w;
                    if power_thr {
                        gpu_power = 0.95 * self.gpu_tdp_w;
                    }

                    let clock_frac = if gpu_temp < 70.0 {
                        1.0
                    } else if gpu_temp < THERMAL_THROTTLE_TEMP {
                        1.0 - (gpu_temp - 70.0) / (THERMAL_THROTTLE_TEMP - 70.0) * 0.15
                    } else {
                        0.7
                    };
                    let sm_clock = (BASE_SM_CLOCK_MHZ
                        + (BOOST_SM_CLOCK_MHZ - BASE_SM_CLOCK_MHZ) * clock_frac * effective_util)
                        as i64;
                    let mem_clock = BASE_MEM_CLOCK_MHZ;

                    let mem_used = if effective_util < 0.01 {
                        (MEM_TOTAL_MIB as f64 * 0.01) as i64
                    } else {
                        let mem_frac = match job_type {
                            "training" => 0.6 + 0.35 * effective_util,
                            "inference" => 0.2 + 0.3 * effective_util,
                            _ => 0.3 + 0.4 * effective_util,
                        };
                        (MEM_TOTAL_MIB as f64 * mem_frac) as i64
                    };
                    let mem_util = (mem_used as f64 / MEM_TOTAL_MIB as f64) * 100.0;

                    let fan_pct = if gpu_temp < FAN_RAMP_THRESHOLD {
                        30.0
                    } else {
                        30.0 + 70.0 * ((gpu_temp - FAN_RAMP_THRESHOLD)
                            / (THERMAL_THROTTLE_TEMP - FAN_RAMP_THRESHOLD))
                    }
                    .clamp(30.0, 100.0);

                    let mut pcie_base = effective_util * PCIE_MAX_GBPS * 0.4;
                    if job_type == "training" {
                        pcie_base *= 1.5;
                    }
                    let pcie_tx = (pcie_base * (0.9 + self.rng.gen::<f64>() * 0.2)).min(PCIE_MAX_GBPS);
                    let pcie_rx = (pcie_base * (0.9 + self.rng.gen::<f64>() * 0.2)).min(PCIE_MAX_GBPS);

                    let (mut nvlink_tx, mut nvlink_rx) = (0.0, 0.0);
                    if job_type == "training" && effective_util > 0.1 {
                        let nvlink_frac = effective_util * 0.5;
                        nvlink_tx = (nvlink_frac * NVLINK_MAX_GBPS * (0.85 + self.rng.gen::<f64>() * 0.3))
                            .min(NVLINK_MAX_GBPS);
                        nvlink_rx = (nvlink_frac * NVLINK_MAX_GBPS * (0.85 + self.rng.gen::<f64>() * 0.3))
                            .min(NVLINK_MAX_GBPS);
                    }

                    self.ecc_sbe.entry(gpu_id.clone()).or_insert(0);
                    self.ecc_dbe.entry(gpu_id.clone()).or_insert(0);
                    let temp_factor = 1.0 + (gpu_temp - 70.0).max(0.0) * 0.02;
                    if self.rng.gen::<f64>() < SBE_RATE_PER_TICK * temp_factor {
                        *self.ecc_sbe.get_mut(&gpu_id).unwrap() += 1;
                    }
                    if self.rng.gen::<f64>() < DBE_RATE_PER_TICK * temp_factor {
                        *self.ecc_dbe.get_mut(&gpu_id).unwrap() += 1;
                    }
                    let sbe = self.ecc_sbe[&gpu_id];
                    let dbe = self.ecc_dbe[&gpu_id];
                    if dbe > 0 {
                        ecc_error_count += 1;
                    }
                    if !thermal_thr && !power_thr {
                        healthy += 1;
                    }

                    srv_total_power += gpu_power;
                    srv_total_mem += mem_used;
                    srv_temps.push(gpu_temp);
                    all_temps.push(gpu_temp);
                    all_utils.push(sm_pct);

                    gpu_states.push(GpuState {
                        gpu_id,
                        server_id: server_id.clone(),
                        rack_id,
                        sm_utilisation_pct: round1(sm_pct),
                        mem_utilisation_pct: round1(mem_util),
                        gpu_temp_c: round1(gpu_temp),
                        mem_temp_c: round1(mem_temp),
                        power_draw_w: round1(gpu_power),
                        sm_clock_mhz: sm_clock,
                        mem_clock_mhz: mem_clock,
                        mem_used_mib: mem_used,
                        mem_total_mib: MEM_TOTAL_MIB,
                        ecc_sbe_count: sbe,
                        ecc_dbe_count: dbe,
                        pcie_tx_gbps: round2(pcie_tx),
                        pcie_rx_gbps: round2(pcie_rx),
                        nvlink_tx_gbps: round2(nvlink_tx),
                        nvlink_rx_gbps: round2(nvlink_rx),
                        fan_speed_pct: round1(fan_pct),
                        thermal_throttle: thermal_thr,
                        power_throttle: power_thr,
                    });
                }

                let srv_mem_total = MEM_TOTAL_MIB * self.facility.gpus_per_server as i64;
                let avg_srv_temp = srv_temps.iter().sum::<f64>() / srv_temps.len().max(1) as f64;
                servers.push(ServerGpuState {
                    server_id,
                    rack_id,
                    gpus: gpu_states,
                    total_gpu_power_w: round1(srv_total_power),
                    avg_gpu_temp_c: round1(avg_srv_temp),
                    total_mem_used_mib: srv_total_mem,
                    total_mem_total_mib: srv_mem_total,
                });
                total_mem_used += srv_total_mem;
                total_mem_total += srv_mem_total;
            }
        }

        let avg_gpu_temp_c = if all_temps.is_empty() {
            35.0
        } else {
            round1(all_temps.iter().sum::<f64>() / all_temps.len() as f64)
        };
        let avg_sm_util_pct = if all_utils.is_empty() {
            0.0
        } else {
            round1(all_utils.iter().sum::<f64>() / all_utils.len() as f64)
        };

        FacilityGpuState {
            servers,
            total_gpus,
            healthy_gpus: healthy,
            throttled_gpus: throttled_count,
            ecc_error_gpus: ecc_error_count,
            avg_gpu_temp_c,
            avg_sm_util_pct,
            total_gpu_mem_used_mib: total_mem_used,
            total_gpu_mem_total_mib: total_mem_total,
        }
    }

    pub fn reset(&mut self, config: &Config) {
        self.facility = config.facility.clone();
        self.gpu_tdp_w = config.power.gpu_tdp_watts;
        self.rng = model_rng(config.rng_seed, OFFSET_GPU);
        self.ecc_sbe.clear();
        self.ecc_dbe.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_count_matches_facility_layout() {
        let config = Config::default();
        let mut model = GpuModel::new(&config);
        let util = HashMap::new();
        let inlets = HashMap::new();
        let throttled = HashSet::new();
        let state = model.step(&util, &inlets, &throttled, &[], 0.0);
        let expected = config.facility.num_racks
            * config.facility.servers_per_rack
            * config.facility.gpus_per_server;
        assert_eq!(state.total_gpus, expected);
    }

    #[test]
    fn throttled_rack_marks_all_its_gpus_throttled_or_hot() {
        let config = Config::default();
        let mut model = GpuModel::new(&config);
        let util = HashMap::new();
        let inlets = HashMap::new();
        let mut throttled = HashSet::new();
        throttled.insert(0);
        let state = model.step(&util, &inlets, &throttled, &[], 0.0);
        assert!(state.throttled_gpus >= config.facility.servers_per_rack * config.facility.gpus_per_server);
    }

    #[test]
    fn ecc_counters_persist_across_ticks_until_reset() {
        let config = Config::default();
        let mut model = GpuModel::new(&config);
        let util = HashMap::new();
        let inlets = HashMap::new();
        let throttled = HashSet::new();
        for _ in 0..2000 {
            model.step(&util, &inlets, &throttled, &[], 0.0);
        }
        let had_errors = model.ecc_sbe.values().any(|&c| c > 0) || model.ecc_dbe.values().any(|&c| c > 0);
        assert!(had_errors, "expected at least one ECC event across 2000 ticks");
        model.reset(&config);
        assert!(model.ecc_sbe.values().all(|&c| c == 0));
    }
}
