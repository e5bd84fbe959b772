use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::{FacilityConfig, PowerConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerPowerState {
    pub server_id: String,
    pub rack_id: usize,
    pub gpu_utilisation: f64,
    pub gpu_power_draw_w: f64,
    pub total_power_draw_w: f64,
    pub power_cap_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RackPowerState {
    pub rack_id: usize,
    pub total_power_kw: f64,
    pub pdu_utilisation_pct: f64,
    pub servers: Vec<ServerPowerState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityPowerState {
    pub it_power_kw: f64,
    pub total_power_kw: f64,
    pub pue: f64,
    pub headroom_kw: f64,
    pub power_cap_exceeded: bool,
    pub racks: Vec<RackPowerState>,
}

/// Deterministic function of GPU utilisations, throttle/cap state, and
/// ambient temperature (§4.4). Carries no RNG and no state of its own.
pub struct PowerModel {
    facility: FacilityConfig,
    power_cfg: PowerConfig,
}

impl PowerModel {
    pub fn new(facility: FacilityConfig, power_cfg: PowerConfig) -> Self {
        Self { facility, power_cfg }
    }

    fn gpu_power_curve(&self, utilisation: f64) -> f64 {
        let idle_fraction = 0.05;
        let tdp = self.power_cfg.gpu_tdp_watts;
        tdp * (idle_fraction + (1.0 - idle_fraction) * (0.3 * utilisation + 0.7 * utilisation * utilisation))
    }

    pub fn compute_dynamic_pue(&self, it_power_kw: f64, ambient_temp_c: f64) -> f64 {
        let base_pue = self.power_cfg.pue_overhead_factor;
        let max_it = self.power_cfg.facility_power_cap_kw / base_pue;
        let load_fraction = (it_power_kw / max_it.max(1.0)).min(1.0);
        let load_penalty = 0.2 * (1.0 - load_fraction).powi(2);
        let temp_penalty = (ambient_temp_c - 22.0).max(0.0) * 0.005;
        base_pue + load_penalty + temp_penalty
    }

    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        &self,
        server_gpu_utilisation: &HashMap<String, f64>,
        throttled_racks: &HashSet<usize>,
        server_power_caps: &HashMap<String, f64>,
        server_max_util_override: &HashMap<String, f64>,
        rack_power_multiplier: &HashMap<usize, f64>,
        ambient_temp_c: f64,
    ) -> FacilityPowerState {
        let mut racks = Vec::with_capacity(self.facility.num_racks);
        let mut total_it_power_w = 0.0;

        for rack_id in 0..self.facility.num_racks {
            let mut rack_servers = Vec::with_capacity(self.facility.servers_per_rack);
            let mut rack_power_w = 0.0;

            for srv_idx in 0..self.facility.servers_per_rack {
                let server_id = format!("rack-{rack_id}-srv-{srv_idx}");
                let mut raw_util = *server_gpu_utilisation.get(&server_id).unwrap_or(&0.05);

                if throttled_racks.contains(&rack_id) {
                    raw_util = raw_util.min(0.5);
                }
                if let Some(max_util) = server_max_util_override.get(&server_id) {
                    raw_util = raw_util.min(*max_util);
                }
                let power_cap = server_power_caps.get(&server_id).copied();
                if let Some(cap) = power_cap {
                    raw_util *= cap / 100.0;
                }

                let gpu_power = self.gpu_power_curve(raw_util) * self.facility.gpus_per_server as f64;
                let total_server = self.power_cfg.server_base_power_watts + gpu_power;
                rack_power_w += total_server;

                rack_servers.push(ServerPowerState {
                    server_id,
                    rack_id,
                    gpu_utilisation: raw_util,
                    gpu_power_draw_w: gpu_power,
                    total_power_draw_w: total_server,
                    power_cap_pct: power_cap,
                });
            }

            let mult = *rack_power_multiplier.get(&rack_id).unwrap_or(&1.0);
            let rack_power_kw = (rack_power_w / 1000.0) * mult;
            let pdu_util = (rack_power_kw / self.power_cfg.pdu_capacity_kw) * 100.0;
            racks.push(RackPowerState {
                rack_id,
                total_power_kw: rack_power_kw,
                pdu_utilisation_pct: pdu_util,
                servers: rack_servers,
            });
            total_it_power_w += rack_power_w * mult;
        }

        let it_power_kw = total_it_power_w / 1000.0;
        let pue = self.compute_dynamic_pue(it_power_kw, ambient_temp_c);
        let total_power_kw = it_power_kw * pue;
        let headroom_kw = self.power_cfg.facility_power_cap_kw - total_power_kw;
        let power_cap_exceeded = total_power_kw > self.power_cfg.facility_power_cap_kw;

        FacilityPowerState {
            it_power_kw,
            total_power_kw,
            pue,
            headroom_kw,
            power_cap_exceeded,
            racks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn model() -> PowerModel {
        let cfg = Config::default();
        PowerModel::new(cfg.facility, cfg.power)
    }

    #[test]
    fn idle_utilisation_draws_five_percent_tdp_per_gpu() {
        let m = model();
        let p = m.gpu_power_curve(0.0);
        assert!((p - 0.05 * m.power_cfg.gpu_tdp_watts).abs() < 1e-9);
    }

    #[test]
    fn full_utilisation_draws_full_tdp() {
        let m = model();
        let p = m.gpu_power_curve(1.0);
        assert!((p - m.power_cfg.gpu_tdp_watts).abs() < 1e-9);
    }

    #[test]
    fn pue_never_drops_below_base_overhead_factor() {
        let m = model();
        let pue = m.compute_dynamic_pue(1000.0, 22.0);
        assert!(pue >= m.power_cfg.pue_overhead_factor - 1e-9);
    }

    #[test]
    fn total_power_equals_it_power_times_pue() {
        let m = model();
        let util = HashMap::new();
        let throttled = HashSet::new();
        let caps = HashMap::new();
        let overrides = HashMap::new();
        let mult = HashMap::new();
        let state = m.compute(&util, &throttled, &caps, &overrides, &mult, 22.0);
        assert!((state.total_power_kw - state.it_power_kw * state.pue).abs() < 1e-6);
        assert_eq!(state.racks.len(), m.facility.num_racks);
    }

    #[test]
    fn power_cap_exceeded_matches_its_own_definition() {
        let m = model();
        let util = HashMap::new();
        let throttled = HashSet::new();
        let caps = HashMap::new();
        let overrides = HashMap::new();
        let mult = HashMap::new();
        let state = m.compute(&util, &throttled, &caps, &overrides, &mult, 22.0);
        assert_eq!(
            state.power_cap_exceeded,
            state.total_power_kw > m.power_cfg.facility_power_cap_kw
        );
    }
}
