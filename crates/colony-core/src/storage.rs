use std::collections::HashMap;

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::job::Job;
use crate::rng::{model_rng, OFFSET_STORAGE};

const MAX_IOPS: i64 = 1_000_000;
const MAX_THROUGHPUT_GBPS: f64 = 25.0;
const BASE_READ_LATENCY_US: f64 = 80.0;
const BASE_WRITE_LATENCY_US: f64 = 20.0;
const CAPACITY_PER_RACK_TB: f64 = 30.0;

const TRAINING_READ_IOPS: f64 = 50_000.0;
const TRAINING_WRITE_IOPS: f64 = 5_000.0;
const INFERENCE_READ_IOPS: f64 = 8_000.0;
const INFERENCE_WRITE_IOPS: f64 = 500.0;
const BATCH_READ_IOPS: f64 = 30_000.0;
const BATCH_WRITE_IOPS: f64 = 15_000.0;

const TRAINING_READ_GBPS: f64 = 3.0;
const TRAINING_WRITE_GBPS: f64 = 0.5;
const INFERENCE_READ_GBPS: f64 = 0.3;
const INFERENCE_WRITE_GBPS: f64 = 0.05;
const BATCH_READ_GBPS: f64 = 2.0;
const BATCH_WRITE_GBPS: f64 = 1.0;

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RackStorageState {
    pub rack_id: usize,
    pub read_iops: i64,
    pub write_iops: i64,
    pub total_iops: i64,
    pub max_iops: i64,
    pub read_throughput_gbps: f64,
    pub write_throughput_gbps: f64,
    pub max_throughput_gbps: f64,
    pub avg_read_latency_us: f64,
    pub avg_write_latency_us: f64,
    pub p99_read_latency_us: f64,
    pub used_tb: f64,
    pub total_tb: f64,
    pub utilisation_pct: f64,
    pub drive_health_pct: f64,
    pub queue_depth: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityStorageState {
    pub racks: Vec<RackStorageState>,
    pub total_read_iops: i64,
    pub total_write_iops: i64,
    pub total_read_throughput_gbps: f64,
    pub total_write_throughput_gbps: f64,
    pub total_used_tb: f64,
    pub total_capacity_tb: f64,
    pub avg_read_latency_us: f64,
    pub avg_write_latency_us: f64,
}

/// Shared NVMe-oF storage fabric I/O derived from per-server utilisation
/// and job type (§4.8). Cumulative writes and used capacity persist per
/// rack across ticks (drive wear, slow capacity growth) until `reset()`.
pub struct StorageModel {
    num_racks: usize,
    servers_per_rack: usize,
    rng: Pcg64,
    io_noise: Normal<f64>,
    initial_used: Uniform<f64>,
    cumulative_writes_tb: HashMap<usize, f64>,
    used_tb: HashMap<usize, f64>,
}

impl StorageModel {
    pub fn new(config: &Config) -> Self {
        Self {
            num_racks: config.facility.num_racks,
            servers_per_rack: config.facility.servers_per_rack,
            rng: model_rng(config.rng_seed, OFFSET_STORAGE),
            io_noise: Normal::new(0.0, 0.05).unwrap(),
            initial_used: Uniform::new(5.0, 15.0),
            cumulative_writes_tb: HashMap::new(),
            used_tb: HashMap::new(),
        }
    }

    pub fn step(
        &mut self,
        server_gpu_utilisation: &HashMap<String, f64>,
        running_jobs: &[Job],
        tick_interval_s: f64,
    ) -> FacilityStorageState {
        let mut server_job_types: HashMap<String, &'static str> = HashMap::new();
        for job in running_jobs {
            for srv in &job.assigned_servers {
                server_job_types.insert(srv.clone(), job.job_type.as_str());
            }
        }

        let mut rack_states = Vec::with_capacity(self.num_racks);
        let mut total_r_iops = 0i64;
        let mut total_w_iops = 0i64;
        let mut total_r_tp = 0.0;
        let mut total_w_tp = 0.0;
        let mut total_used = 0.0;
        let mut total_cap = 0.0;
        let mut all_r_lat = Vec::with_capacity(self.num_racks);
        let mut all_w_lat = Vec::with_capacity(self.num_racks);

        for rack_id in 0..self.num_racks {
            self.cumulative_writes_tb.entry(rack_id).or_insert(0.0);
            if !self.used_tb.contains_key(&rack_id) {
                let initial = self.initial_used.sample(&mut self.rng);
                self.used_tb.insert(rack_id, initial);
            }

            let mut rack_r_iops = 0.0;
            let mut rack_w_iops = 0.0;
            let mut rack_r_tp = 0.0;
            let mut rack_w_tp = 0.0;

            for srv_idx in 0..self.servers_per_rack {
                let server_id = format!("rack-{rack_id}-srv-{srv_idx}");
                let util = *server_gpu_utilisation.get(&server_id).unwrap_or(&0.0);
                let job_type = server_job_types.get(&server_id).copied().unwrap_or("idle");

                if util < 0.01 || job_type == "idle" {
                    rack_r_iops += 100.0;
                    rack_w_iops += 10.0;
                    rack_r_tp += 0.01;
                    rack_w_tp += 0.001;
                    continue;
                }

                let noise = 1.0 + self.io_noise.sample(&mut self.rng);
                let (r_iops, w_iops, r_gbps, w_gbps) = match job_type {
                    "training" => (TRAINING_READ_IOPS, TRAINING_WRITE_IOPS, TRAINING_READ_GBPS, TRAINING_WRITE_GBPS),
                    "inference" => {
                        (INFERENCE_READ_IOPS, INFERENCE_WRITE_IOPS, INFERENCE_READ_GBPS, INFERENCE_WRITE_GBPS)
                    }
                    _ => (BATCH_READ_IOPS, BATCH_WRITE_IOPS, BATCH_READ_GBPS, BATCH_WRITE_GBPS),
                };
                rack_r_iops += (r_iops * util * noise).trunc();
                rack_w_iops += (w_iops * util * noise).trunc();
                rack_r_tp += r_gbps * util * noise;
                rack_w_tp += w_gbps * util * noise;
            }

            let rack_total_iops = (MAX_IOPS as f64).min(rack_r_iops + rack_w_iops);
            let r_frac = if rack_r_iops + rack_w_iops > 0.0 {
                rack_r_iops / (rack_r_iops + rack_w_iops)
            } else {
                0.5
            };
            let rack_r_iops_final = (rack_total_iops * r_frac).trunc() as i64;
            let rack_w_iops_final = rack_total_iops as i64 - rack_r_iops_final;

            let rack_total_tp = rack_r_tp + rack_w_tp;
            if rack_total_tp > MAX_THROUGHPUT_GBPS {
                let scale = MAX_THROUGHPUT_GBPS / rack_total_tp;
                rack_r_tp *= scale;
                rack_w_tp *= scale;
            }

            let iops_rate = rack_total_iops;
            let qd = (1i64.max((iops_rate * BASE_READ_LATENCY_US / 1_000_000.0) as i64)).min(1024);

            let qd_factor = 1.0 + 0.3 * (qd.max(1) as f64).ln();
            let iops_pressure = (rack_total_iops / MAX_IOPS as f64).min(1.0);
            let congestion_factor = 1.0 / (1.0 - (iops_pressure * 0.9).min(0.95));

            let r_lat = BASE_READ_LATENCY_US * qd_factor * congestion_factor;
            let w_lat = BASE_WRITE_LATENCY_US * qd_factor * congestion_factor;
            let p99_r_lat = r_lat * 2.5;

            let writes_this_tick_tb = (rack_w_tp * tick_interval_s) / (8.0 * 1000.0);
            *self.cumulative_writes_tb.get_mut(&rack_id).unwrap() += writes_this_tick_tb;

            let endurance_pb = 100.0;
            let cumulative_pb = self.cumulative_writes_tb[&rack_id] / 1000.0;
            let drive_health = (100.0 * (1.0 - cumulative_pb / endurance_pb)).max(0.0);

            let used = self.used_tb.get_mut(&rack_id).unwrap();
            *used = (CAPACITY_PER_RACK_TB * 0.95).min(*used + writes_this_tick_tb * 0.001);
            let used_tb = *used;
            let utilisation = (used_tb / CAPACITY_PER_RACK_TB) * 100.0;

            rack_states.push(RackStorageState {
                rack_id,
                read_iops: rack_r_iops_final,
                write_iops: rack_w_iops_final,
                total_iops: rack_total_iops as i64,
                max_iops: MAX_IOPS,
                read_throughput_gbps: round2(rack_r_tp),
                write_throughput_gbps: round2(rack_w_tp),
                max_throughput_gbps: MAX_THROUGHPUT_GBPS,
                avg_read_latency_us: round1(r_lat),
                avg_write_latency_us: round1(w_lat),
                p99_read_latency_us: round1(p99_r_lat),
                used_tb: round2(used_tb),
                total_tb: CAPACITY_PER_RACK_TB,
                utilisation_pct: round1(utilisation),
                drive_health_pct: round1(drive_health),
                queue_depth: qd,
            });

            total_r_iops += rack_r_iops_final;
            total_w_iops += rack_w_iops_final;
            total_r_tp += rack_r_tp;
            total_w_tp += rack_w_tp;
            total_used += used_tb;
            total_cap += CAPACITY_PER_RACK_TB;
            all_r_lat.push(r_lat);
            all_w_lat.push(w_lat);
        }

        FacilityStorageState {
            racks: rack_states,
            total_read_iops: total_r_iops,
            total_write_iops: total_w_iops,
            total_read_throughput_gbps: round2(total_r_tp),
            total_write_throughput_gbps: round2(total_w_tp),
            total_used_tb: round2(total_used),
            total_capacity_tb: round2(total_cap),
            avg_read_latency_us: round1(all_r_lat.iter().sum::<f64>() / all_r_lat.len().max(1) as f64),
            avg_write_latency_us: round1(all_w_lat.iter().sum::<f64>() / all_w_lat.len().max(1) as f64),
        }
    }

    pub fn reset(&mut self, config: &Config) {
        self.num_racks = config.facility.num_racks;
        self.servers_per_rack = config.facility.servers_per_rack;
        self.rng = model_rng(config.rng_seed, OFFSET_STORAGE);
        self.cumulative_writes_tb.clear();
        self.used_tb.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_rack_still_produces_background_io() {
        let config = Config::default();
        let mut model = StorageModel::new(&config);
        let util = HashMap::new();
        let state = model.step(&util, &[], 60.0);
        assert!(state.racks.iter().all(|r| r.read_iops >= 100));
    }

    #[test]
    fn throughput_never_exceeds_shelf_capacity() {
        let config = Config::default();
        let mut model = StorageModel::new(&config);
        let mut util = HashMap::new();
        for srv_idx in 0..config.facility.servers_per_rack {
            util.insert(format!("rack-0-srv-{srv_idx}"), 1.0);
        }
        let state = model.step(&util, &[], 60.0);
        let rack0 = state.racks.iter().find(|r| r.rack_id == 0).unwrap();
        assert!(rack0.read_throughput_gbps + rack0.write_throughput_gbps <= MAX_THROUGHPUT_GBPS + 1e-6);
    }

    #[test]
    fn used_capacity_persists_and_resets() {
        let config = Config::default();
        let mut model = StorageModel::new(&config);
        let util = HashMap::new();
        model.step(&util, &[], 60.0);
        assert!(!model.used_tb.is_empty());
        model.reset(&config);
        assert!(model.used_tb.is_empty());
    }
}
