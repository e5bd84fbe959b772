use std::f64::consts::PI;

use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::rng::{model_rng, OFFSET_CARBON};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CarbonState {
    pub carbon_intensity_gco2_kwh: f64,
    pub carbon_rate_gco2_s: f64,
    pub cumulative_carbon_kg: f64,
    pub electricity_price_gbp_kwh: f64,
    pub cost_rate_gbp_h: f64,
    pub cumulative_cost_gbp: f64,
}

/// Time-varying grid carbon intensity and electricity spot price following
/// a UK-shaped daily cycle (§4.10). Cumulative carbon/cost persist across
/// ticks until `reset()`.
pub struct CarbonModel {
    rng: Pcg64,
    carbon_noise: Normal<f64>,
    price_noise: Normal<f64>,
    cumulative_carbon_kg: f64,
    cumulative_cost_gbp: f64,
}

impl CarbonModel {
    pub fn new(config: &Config) -> Self {
        Self {
            rng: model_rng(config.rng_seed, OFFSET_CARBON),
            carbon_noise: Normal::new(0.0, 5.0).unwrap(),
            price_noise: Normal::new(0.0, 0.005).unwrap(),
            cumulative_carbon_kg: 0.0,
            cumulative_cost_gbp: 0.0,
        }
    }

    fn hour_of_day(&self, sim_time: f64) -> f64 {
        (sim_time / 3600.0 + 8.0) % 24.0
    }

    pub fn carbon_intensity(&mut self, sim_time: f64) -> f64 {
        let hour = self.hour_of_day(sim_time);
        let base = 200.0;
        let daily_variation = 60.0 * (2.0 * PI * (hour - 3.0) / 24.0).sin();
        let noise = self.carbon_noise.sample(&mut self.rng);
        (base + daily_variation + noise).max(50.0)
    }

    pub fn electricity_price(&mut self, sim_time: f64) -> f64 {
        let hour = self.hour_of_day(sim_time);
        let base = 0.15;
        let morning_peak = 0.08 * (-0.5 * ((hour - 8.0) / 2.0).powi(2)).exp();
        let evening_peak = 0.06 * (-0.5 * ((hour - 18.0) / 2.0).powi(2)).exp();
        let night_dip = -0.05 * (-0.5 * ((hour - 3.0) / 2.5).powi(2)).exp();
        let noise = self.price_noise.sample(&mut self.rng);
        (base + morning_peak + evening_peak + night_dip + noise).max(0.02)
    }

    pub fn step(&mut self, sim_time: f64, total_power_kw: f64, tick_interval_s: f64) -> CarbonState {
        let ci = self.carbon_intensity(sim_time);
        let price = self.electricity_price(sim_time);

        let energy_kwh = total_power_kw * (tick_interval_s / 3600.0);

        let carbon_kg = (ci * energy_kwh) / 1000.0;
        self.cumulative_carbon_kg += carbon_kg;

        let cost_gbp = price * energy_kwh;
        self.cumulative_cost_gbp += cost_gbp;

        let carbon_rate_gco2_s = ci * total_power_kw / 3600.0;
        let cost_rate_gbp_h = price * total_power_kw;

        CarbonState {
            carbon_intensity_gco2_kwh: ci,
            carbon_rate_gco2_s,
            cumulative_carbon_kg: self.cumulative_carbon_kg,
            electricity_price_gbp_kwh: price,
            cost_rate_gbp_h,
            cumulative_cost_gbp: self.cumulative_cost_gbp,
        }
    }

    pub fn reset(&mut self, config: &Config) {
        self.rng = model_rng(config.rng_seed, OFFSET_CARBON);
        self.cumulative_carbon_kg = 0.0;
        self.cumulative_cost_gbp = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carbon_intensity_never_drops_below_floor() {
        let config = Config::default();
        let mut model = CarbonModel::new(&config);
        for tick in 0..200 {
            let ci = model.carbon_intensity(tick as f64 * 60.0);
            assert!(ci >= 50.0);
        }
    }

    #[test]
    fn cumulative_carbon_only_grows() {
        let config = Config::default();
        let mut model = CarbonModel::new(&config);
        let mut last = 0.0;
        for tick in 0..50 {
            let state = model.step(tick as f64 * 60.0, 100.0, 60.0);
            assert!(state.cumulative_carbon_kg >= last);
            last = state.cumulative_carbon_kg;
        }
    }

    #[test]
    fn reset_clears_cumulative_counters() {
        let config = Config::default();
        let mut model = CarbonModel::new(&config);
        model.step(0.0, 100.0, 60.0);
        model.reset(&config);
        let state = model.step(0.0, 0.0, 60.0);
        assert_eq!(state.cumulative_cost_gbp, 0.0);
    }
}
