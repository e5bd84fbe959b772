use std::collections::{HashMap, HashSet};

use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::job::Job;
use crate::rng::{model_rng, OFFSET_NETWORK};

const BASE_INTRA_RACK_LATENCY_US: f64 = 2.0;
const BASE_INTER_RACK_LATENCY_US: f64 = 5.0;
const TOR_UPLINK_GBPS: f64 = 100.0;
const SPINE_LINK_GBPS: f64 = 400.0;
const PORTS_PER_TOR: i64 = 48;

const TRAINING_RDMA_GBPS_PER_SERVER: f64 = 40.0;
const INFERENCE_NS_GBPS_PER_SERVER: f64 = 8.0;
const BATCH_STORAGE_GBPS_PER_SERVER: f64 = 15.0;
const IDLE_TRAFFIC_GBPS: f64 = 0.1;

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
fn round4(x: f64) -> f64 {
    (x * 10000.0).round() / 10000.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RackNetworkState {
    pub rack_id: usize,
    pub ingress_gbps: f64,
    pub egress_gbps: f64,
    pub intra_rack_gbps: f64,
    pub tor_link_capacity_gbps: f64,
    pub tor_utilisation_pct: f64,
    pub avg_latency_us: f64,
    pub p99_latency_us: f64,
    pub packet_loss_pct: f64,
    pub crc_errors: u64,
    pub rdma_tx_gbps: f64,
    pub rdma_rx_gbps: f64,
    pub active_ports: usize,
    pub total_ports: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpineLinkState {
    pub src_rack_id: usize,
    pub dst_rack_id: usize,
    pub bandwidth_gbps: f64,
    pub capacity_gbps: f64,
    pub utilisation_pct: f64,
    pub latency_us: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityNetworkState {
    pub racks: Vec<RackNetworkState>,
    pub spine_links: Vec<SpineLinkState>,
    pub total_east_west_gbps: f64,
    pub total_north_south_gbps: f64,
    pub total_rdma_gbps: f64,
    pub avg_fabric_latency_us: f64,
    pub total_packet_loss_pct: f64,
    pub total_crc_errors: u64,
}

/// Leaf-spine fabric traffic derived from per-server GPU utilisation and
/// running job placements (§4.7). CRC error counters persist per rack
/// across ticks until `reset()`.
pub struct NetworkModel {
    num_racks: usize,
    servers_per_rack: usize,
    rng: Pcg64,
    ingress_noise: Normal<f64>,
    crc_errors: HashMap<usize, u64>,
}

impl NetworkModel {
    pub fn new(config: &Config) -> Self {
        Self {
            num_racks: config.facility.num_racks,
            servers_per_rack: config.facility.servers_per_rack,
            rng: model_rng(config.rng_seed, OFFSET_NETWORK),
            ingress_noise: Normal::new(0.0, 0.03).unwrap(),
            crc_errors: HashMap::new(),
        }
    }

    pub fn step(
        &mut self,
        server_gpu_utilisation: &HashMap<String, f64>,
        running_jobs: &[Job],
        network_partition_racks: &HashSet<usize>,
        _sim_time: f64,
    ) -> FacilityNetworkState {
        let mut server_job_types: HashMap<String, &'static str> = HashMap::new();
        let mut rack_to_job_racks: HashMap<usize, HashSet<usize>> =
            (0..self.num_racks).map(|r| (r, HashSet::new())).collect();

        for job in running_jobs {
            let mut job_racks = HashSet::new();
            for srv in &job.assigned_servers {
                server_job_types.insert(srv.clone(), job.job_type.as_str());
                if let Some(rack_id) = parse_rack_id(srv) {
                    job_racks.insert(rack_id);
                }
            }
            if job_racks.len() > 1 {
                for &r_id in &job_racks {
                    let others: HashSet<usize> = job_racks.iter().copied().filter(|&r| r != r_id).collect();
                    rack_to_job_racks.entry(r_id).or_default().extend(others);
                }
            }
        }

        let mut rack_states = Vec::with_capacity(self.num_racks);
        let mut spine_traffic: HashMap<(usize, usize), f64> = HashMap::new();
        let mut total_ew = 0.0;
        let mut total_ns = 0.0;
        let mut total_rdma = 0.0;
        let mut total_crc = 0u64;

        for rack_id in 0..self.num_racks {
            self.crc_errors.entry(rack_id).or_insert(0);
            let is_partitioned = network_partition_racks.contains(&rack_id);

            let mut rack_ingress = 0.0;
            let mut rack_egress = 0.0;
            let mut rack_intra = 0.0;
            let mut rack_rdma_tx = 0.0;
            let mut rack_rdma_rx = 0.0;
            let mut active_ports = 0usize;

            if !is_partitioned {
                for srv_idx in 0..self.servers_per_rack {
                    let server_id = format!("rack-{rack_id}-srv-{srv_idx}");
                    let util = *server_gpu_utilisation.get(&server_id).unwrap_or(&0.0);
                    let job_type = server_job_types.get(&server_id).copied().unwrap_or("idle");

                    if util < 0.01 {
                        rack_intra += IDLE_TRAFFIC_GBPS;
                        active_ports += 1;
                        continue;
                    }
                    active_ports += 1;

                    match job_type {
                        "training" => {
                            let rdma_bw = TRAINING_RDMA_GBPS_PER_SERVER * util;
                            rack_rdma_tx += rdma_bw * 0.5;
                            rack_rdma_rx += rdma_bw * 0.5;
                            rack_intra += rdma_bw * 0.7;
                            let inter_rack_bw = rdma_bw * 0.3;

                            let partner_racks = rack_to_job_racks.get(&rack_id).cloned().unwrap_or_default();
                            if !partner_racks.is_empty() {
                                let per_partner = inter_rack_bw / partner_racks.len() as f64;
                                for partner in partner_racks {
                                    let key = (rack_id.min(partner), rack_id.max(partner));
                                    *spine_traffic.entry(key).or_insert(0.0) += per_partner;
                                }
                                rack_egress += inter_rack_bw;
                            }
                            rack_egress += 2.0 * util;
                            total_rdma += rdma_bw;
                        }
                        "inference" => {
                            let ns_bw = INFERENCE_NS_GBPS_PER_SERVER * util;
                            rack_ingress += ns_bw * 0.6;
                            rack_egress += ns_bw * 0.4;
                            rack_intra += ns_bw * 0.2;
                            total_ns += ns_bw;
                        }
                        _ => {
                            let storage_bw = BATCH_STORAGE_GBPS_PER_SERVER * util;
                            rack_ingress += storage_bw * 0.7;
                            rack_egress += storage_bw * 0.3;
                            rack_intra += storage_bw * 0.1;
                        }
                    }
                }
            }

            let noise_factor = 1.0 + self.ingress_noise.sample(&mut self.rng);
            rack_ingress *= noise_factor;
            rack_egress *= noise_factor;

            total_ew += rack_intra;
            let total_traffic = rack_ingress + rack_egress;
            let tor_util = if is_partitioned { 0.0 } else { (total_traffic / TOR_UPLINK_GBPS) * 100.0 };

            let rho = tor_util.min(95.0) / 100.0;
            let (avg_latency, p99_latency) = if rho > 0.01 {
                let avg = BASE_INTRA_RACK_LATENCY_US / (1.0 - rho);
                (avg, avg * (1.0 + 2.3 * rho))
            } else {
                (BASE_INTRA_RACK_LATENCY_US, BASE_INTRA_RACK_LATENCY_US * 1.5)
            };

            let mut pkt_loss = if rho > 0.8 { (rho - 0.8) * 5.0 } else { 0.0 };
            pkt_loss = pkt_loss.min(2.0);

            if !is_partitioned && self.rng.gen::<f64>() < 0.001 {
                let added = self.rng.gen_range(1..5) as u64;
                *self.crc_errors.get_mut(&rack_id).unwrap() += added;
            }
            let crc = self.crc_errors[&rack_id];
            total_crc += crc;

            rack_states.push(RackNetworkState {
                rack_id,
                ingress_gbps: round2(rack_ingress),
                egress_gbps: round2(rack_egress),
                intra_rack_gbps: round2(rack_intra),
                tor_link_capacity_gbps: TOR_UPLINK_GBPS,
                tor_utilisation_pct: round1(tor_util.min(100.0)),
                avg_latency_us: round1(avg_latency),
                p99_latency_us: round1(p99_latency),
                packet_loss_pct: round3(pkt_loss),
                crc_errors: crc,
                rdma_tx_gbps: round2(rack_rdma_tx),
                rdma_rx_gbps: round2(rack_rdma_rx),
                active_ports,
                total_ports: PORTS_PER_TOR,
            });
        }

        let mut spine_links = Vec::with_capacity(spine_traffic.len());
        let mut all_latencies = Vec::with_capacity(spine_traffic.len());
        for ((src, dst), bw) in spine_traffic {
            let util_pct = (bw / SPINE_LINK_GBPS) * 100.0;
            let rho = (util_pct / 100.0).min(0.95);
            let link_latency = BASE_INTER_RACK_LATENCY_US / (1.0 - rho.max(0.01));
            all_latencies.push(link_latency);
            spine_links.push(SpineLinkState {
                src_rack_id: src,
                dst_rack_id: dst,
                bandwidth_gbps: round2(bw),
                capacity_gbps: SPINE_LINK_GBPS,
                utilisation_pct: round1(util_pct.min(100.0)),
                latency_us: round1(link_latency),
            });
        }

        let avg_fabric_latency = if all_latencies.is_empty() {
            BASE_INTER_RACK_LATENCY_US
        } else {
            all_latencies.iter().sum::<f64>() / all_latencies.len() as f64
        };
        let total_pkt_loss = if rack_states.is_empty() {
            0.0
        } else {
            rack_states.iter().map(|r| r.packet_loss_pct).sum::<f64>() / rack_states.len() as f64
        };

        FacilityNetworkState {
            racks: rack_states,
            spine_links,
            total_east_west_gbps: round2(total_ew),
            total_north_south_gbps: round2(total_ns),
            total_rdma_gbps: round2(total_rdma),
            avg_fabric_latency_us: round1(avg_fabric_latency),
            total_packet_loss_pct: round4(total_pkt_loss),
            total_crc_errors: total_crc,
        }
    }

    pub fn reset(&mut self, config: &Config) {
        self.num_racks = config.facility.num_racks;
        self.servers_per_rack = config.facility.servers_per_rack;
        self.rng = model_rng(config.rng_seed, OFFSET_NETWORK);
        self.crc_errors.clear();
    }
}

fn parse_rack_id(server_id: &str) -> Option<usize> {
    server_id.split('-').nth(1).and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitioned_rack_carries_no_traffic() {
        let config = Config::default();
        let mut model = NetworkModel::new(&config);
        let mut util = HashMap::new();
        util.insert("rack-0-srv-0".to_string(), 0.8);
        let mut partitioned = HashSet::new();
        partitioned.insert(0);
        let state = model.step(&util, &[], &partitioned, 0.0);
        let rack0 = state.racks.iter().find(|r| r.rack_id == 0).unwrap();
        assert_eq!(rack0.ingress_gbps, 0.0);
        assert_eq!(rack0.egress_gbps, 0.0);
        assert_eq!(rack0.active_ports, 0);
    }

    #[test]
    fn high_utilisation_produces_nonzero_packet_loss() {
        let config = Config::default();
        let mut model = NetworkModel::new(&config);
        let mut util = HashMap::new();
        for srv_idx in 0..config.facility.servers_per_rack {
            util.insert(format!("rack-0-srv-{srv_idx}"), 1.0);
        }
        let state = model.step(&util, &[], &HashSet::new(), 0.0);
        let rack0 = state.racks.iter().find(|r| r.rack_id == 0).unwrap();
        assert!(rack0.tor_utilisation_pct > 0.0);
    }

    #[test]
    fn crc_errors_persist_until_reset() {
        let config = Config::default();
        let mut model = NetworkModel::new(&config);
        let util = HashMap::new();
        for _ in 0..5000 {
            model.step(&util, &[], &HashSet::new(), 0.0);
        }
        assert!(model.crc_errors.values().any(|&c| c > 0));
        model.reset(&config);
        assert!(model.crc_errors.is_empty());
    }
}
