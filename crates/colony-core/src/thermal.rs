use std::collections::HashMap;
use std::f64::consts::PI;

use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::config::{Config, ThermalConfig};
use crate::rng::{model_rng, OFFSET_THERMAL};

const RECIRCULATION_COEFF: f64 = 0.08;
const HUMIDITY_BASE: f64 = 45.0;
const HUMIDITY_HEAT_COEFF: f64 = 1.5;
const HUMIDITY_COOLING_COEFF: f64 = 0.8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RackThermalState {
    pub rack_id: usize,
    pub inlet_temp_c: f64,
    pub outlet_temp_c: f64,
    pub heat_generated_kw: f64,
    pub throttled: bool,
    pub humidity_pct: f64,
    pub delta_t_c: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityThermalState {
    pub racks: Vec<RackThermalState>,
    pub ambient_temp_c: f64,
    pub avg_humidity_pct: f64,
}

/// Rack inlet/outlet temperatures and humidity from rack power draw and
/// cooling capacity (§4.5). Hot-aisle/cold-aisle layout: adjacent racks
/// recirculate a fraction of each other's exhaust heat. Stateful across
/// ticks (inlet temps and humidity persist); only humidity noise draws
/// from the model's RNG stream.
pub struct ThermalModel {
    thermal_cfg: ThermalConfig,
    num_racks: usize,
    rng: Pcg64,
    humidity_noise: Normal<f64>,
    inlet_temps: HashMap<usize, f64>,
    humidity: HashMap<usize, f64>,
}

impl ThermalModel {
    pub fn new(config: &Config) -> Self {
        let mut model = Self {
            thermal_cfg: config.thermal.clone(),
            num_racks: config.facility.num_racks,
            rng: model_rng(config.rng_seed, OFFSET_THERMAL),
            humidity_noise: Normal::new(0.0, 0.3).unwrap(),
            inlet_temps: HashMap::new(),
            humidity: HashMap::new(),
        };
        model.initialise_temps();
        model
    }

    fn initialise_temps(&mut self) {
        for rack_id in 0..self.num_racks {
            self.inlet_temps.insert(rack_id, self.thermal_cfg.ambient_temp_c);
            self.humidity.insert(rack_id, HUMIDITY_BASE);
        }
    }

    fn effective_ambient(&self, sim_time: f64) -> f64 {
        let hour = (sim_time / 3600.0 + 8.0) % 24.0;
        let base = self.thermal_cfg.ambient_temp_c;
        let variation = 4.0 * (2.0 * PI * (hour - 4.0) / 24.0).sin();
        base + variation
    }

    fn cooling_efficiency(&self, inlet_temp: f64, humidity: f64) -> f64 {
        let temp_penalty = ((inlet_temp - 30.0) * 0.02).max(0.0);
        let humid_penalty = ((humidity - 60.0) * 0.005).max(0.0);
        (1.0 - temp_penalty - humid_penalty).max(0.7)
    }

    /// `rack_power_kw`: heat generated per rack. `cooling_capacity_factor`:
    /// 0.0-1.0 fraction of nominal CRAC capacity available per rack.
    pub fn step(
        &mut self,
        rack_power_kw: &HashMap<usize, f64>,
        cooling_capacity_factor: &HashMap<usize, f64>,
        tick_interval_s: f64,
        sim_time: f64,
    ) -> FacilityThermalState {
        let effective_ambient = self.effective_ambient(sim_time);

        let mut prev_outlets = HashMap::with_capacity(self.num_racks);
        for rack_id in 0..self.num_racks {
            let prev_inlet = *self.inlet_temps.get(&rack_id).unwrap_or(&effective_ambient);
            let heat_kw = *rack_power_kw.get(&rack_id).unwrap_or(&0.0);
            prev_outlets.insert(rack_id, prev_inlet + heat_kw * 5.0);
        }

        let mut racks = Vec::with_capacity(self.num_racks);
        for rack_id in 0..self.num_racks {
            let heat_kw = *rack_power_kw.get(&rack_id).unwrap_or(&0.0);
            let cooling_factor = *cooling_capacity_factor.get(&rack_id).unwrap_or(&1.0);
            let prev_inlet = *self.inlet_temps.get(&rack_id).unwrap_or(&effective_ambient);
            let humidity = *self.humidity.get(&rack_id).unwrap_or(&HUMIDITY_BASE);

            let mut recirculation_heat = 0.0;
            let neighbours = [rack_id.checked_sub(1), Some(rack_id + 1)];
            for neighbour in neighbours.into_iter().flatten() {
                if neighbour < self.num_racks {
                    let neighbour_exhaust = *prev_outlets.get(&neighbour).unwrap_or(&effective_ambient);
                    recirculation_heat += RECIRCULATION_COEFF * (neighbour_exhaust - prev_inlet).max(0.0);
                }
            }

            let efficiency = self.cooling_efficiency(prev_inlet, humidity);
            let mut cooling_per_rack =
                (self.thermal_cfg.crac_cooling_capacity_kw / self.num_racks as f64) * cooling_factor * efficiency;

            let ambient_penalty = ((effective_ambient - self.thermal_cfg.ambient_temp_c) * 0.02).max(0.0);
            cooling_per_rack *= (1.0 - ambient_penalty).max(0.8);

            let heat_removed = cooling_per_rack;
            let net_heat = heat_kw + recirculation_heat - heat_removed;

            let temp_delta = net_heat * self.thermal_cfg.thermal_mass_coefficient * (tick_interval_s / 60.0);
            let new_inlet = (prev_inlet + temp_delta).clamp(effective_ambient, 60.0);
            self.inlet_temps.insert(rack_id, new_inlet);

            let delta_t = heat_kw * 5.0;
            let outlet = new_inlet + delta_t;

            let heat_effect = -HUMIDITY_HEAT_COEFF * (heat_kw - 3.0).max(0.0);
            let cooling_effect = HUMIDITY_COOLING_COEFF * cooling_factor;
            let noise = self.humidity_noise.sample(&mut self.rng);
            let new_humidity = (HUMIDITY_BASE + heat_effect + cooling_effect + noise).clamp(20.0, 80.0);
            self.humidity.insert(rack_id, new_humidity);

            let throttled = new_inlet >= self.thermal_cfg.critical_inlet_temp_c;

            racks.push(RackThermalState {
                rack_id,
                inlet_temp_c: new_inlet,
                outlet_temp_c: outlet,
                heat_generated_kw: heat_kw,
                throttled,
                humidity_pct: new_humidity,
                delta_t_c: delta_t,
            });
        }

        let avg_humidity = racks.iter().map(|r| r.humidity_pct).sum::<f64>() / racks.len().max(1) as f64;

        FacilityThermalState {
            racks,
            ambient_temp_c: effective_ambient,
            avg_humidity_pct: avg_humidity,
        }
    }

    pub fn reset(&mut self, config: &Config) {
        self.thermal_cfg = config.thermal.clone();
        self.num_racks = config.facility.num_racks;
        self.rng = model_rng(config.rng_seed, OFFSET_THERMAL);
        self.initialise_temps();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_racks_drift_toward_ambient_not_above_it() {
        let config = Config::default();
        let mut model = ThermalModel::new(&config);
        let power = HashMap::new();
        let cooling: HashMap<usize, f64> = (0..config.facility.num_racks).map(|r| (r, 1.0)).collect();
        let mut last = None;
        for tick in 0..20 {
            let state = model.step(&power, &cooling, 60.0, tick as f64 * 60.0);
            last = Some(state);
        }
        let state = last.unwrap();
        for rack in &state.racks {
            assert!(rack.inlet_temp_c <= state.ambient_temp_c + 1.0);
            assert!(!rack.throttled);
        }
    }

    #[test]
    fn heavy_uncooled_load_raises_inlet_temp_and_can_throttle() {
        let config = Config::default();
        let mut model = ThermalModel::new(&config);
        let power: HashMap<usize, f64> = (0..config.facility.num_racks).map(|r| (r, 40.0)).collect();
        let cooling: HashMap<usize, f64> = (0..config.facility.num_racks).map(|r| (r, 0.0)).collect();
        let mut state = model.step(&power, &cooling, 60.0, 0.0);
        for _ in 0..200 {
            state = model.step(&power, &cooling, 60.0, 0.0);
        }
        assert!(state.racks.iter().any(|r| r.throttled));
    }

    #[test]
    fn reset_restores_ambient_inlet_temps() {
        let config = Config::default();
        let mut model = ThermalModel::new(&config);
        let power: HashMap<usize, f64> = (0..config.facility.num_racks).map(|r| (r, 40.0)).collect();
        let cooling: HashMap<usize, f64> = (0..config.facility.num_racks).map(|r| (r, 0.3)).collect();
        for _ in 0..50 {
            model.step(&power, &cooling, 60.0, 0.0);
        }
        model.reset(&config);
        for rack_id in 0..config.facility.num_racks {
            assert_eq!(model.inlet_temps[&rack_id], config.thermal.ambient_temp_c);
        }
    }
}
