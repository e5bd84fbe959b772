use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::rng::{model_rng, OFFSET_COOLING};

const CRAC_MAX_COOLING_KW: f64 = 50.0;
const CRAC_MAX_AIRFLOW_CFM: f64 = 20_000.0;
const CRAC_MIN_SUPPLY_AIR_C: f64 = 12.0;

const CHW_DESIGN_SUPPLY_C: f64 = 7.0;
const CHW_DESIGN_FLOW_LPS: f64 = 5.0;

const TOWER_DESIGN_APPROACH_C: f64 = 5.0;

const COP_DESIGN: f64 = 4.5;
const COP_MIN: f64 = 2.0;

fn round0(x: f64) -> f64 {
    x.round()
}
fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CracUnitState {
    pub unit_id: usize,
    pub supply_air_temp_c: f64,
    pub return_air_temp_c: f64,
    pub fan_speed_pct: f64,
    pub airflow_cfm: f64,
    pub chw_supply_temp_c: f64,
    pub chw_return_temp_c: f64,
    pub chw_flow_rate_lps: f64,
    pub cooling_output_kw: f64,
    pub cooling_capacity_kw: f64,
    pub load_pct: f64,
    pub operational: bool,
    pub fault_code: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoolingTowerState {
    pub condenser_supply_temp_c: f64,
    pub condenser_return_temp_c: f64,
    pub wet_bulb_temp_c: f64,
    pub approach_temp_c: f64,
    pub fan_speed_pct: f64,
    pub heat_rejection_kw: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityCoolingState {
    pub crac_units: Vec<CracUnitState>,
    pub cooling_tower: CoolingTowerState,
    pub total_cooling_output_kw: f64,
    pub total_cooling_capacity_kw: f64,
    pub cooling_load_pct: f64,
    pub cop: f64,
    pub cooling_power_kw: f64,
    pub chw_plant_supply_temp_c: f64,
    pub chw_plant_return_temp_c: f64,
    pub chw_plant_delta_t_c: f64,
    pub pump_power_kw: f64,
    pub pump_flow_rate_lps: f64,
}

/// CRAC units, chilled water loop, and cooling tower derived from total IT
/// heat load and ambient temperature (§4.9). Which units are down is the
/// caller's concern — `step`'s `crac_failed_units` comes from the
/// `FailureEngine`'s active `crac_failure` entries (§4.11); this model only
/// renders the consequence (zero output, `fault_code > 0`).
pub struct CoolingModel {
    crac_units: usize,
    rng: Pcg64,
    wet_bulb_noise: Normal<f64>,
    chw_supply_noise: Normal<f64>,
}

impl CoolingModel {
    pub fn new(config: &Config) -> Self {
        Self {
            crac_units: config.thermal.crac_units,
            rng: model_rng(config.rng_seed, OFFSET_COOLING),
            wet_bulb_noise: Normal::new(0.0, 0.3).unwrap(),
            chw_supply_noise: Normal::new(0.0, 0.1).unwrap(),
        }
    }

    pub fn step(
        &mut self,
        total_it_heat_kw: f64,
        ambient_temp_c: f64,
        crac_setpoints: &HashMap<usize, f64>,
        crac_failed_units: &HashSet<usize>,
        sim_time: f64,
    ) -> FacilityCoolingState {
        let hour = (sim_time / 3600.0) % 24.0;
        let wb_depression = 5.0 + 2.0 * (2.0 * PI * (hour - 6.0) / 24.0).sin();
        let mut wet_bulb = ambient_temp_c - wb_depression;
        wet_bulb += self.wet_bulb_noise.sample(&mut self.rng);

        let approach = TOWER_DESIGN_APPROACH_C + ((wet_bulb - 18.0) * 0.15).max(0.0);
        let condenser_supply = wet_bulb + approach;
        let condenser_return = condenser_supply + 5.0;

        let tower_fan_pct = ((total_it_heat_kw / (CRAC_MAX_COOLING_KW * self.crac_units as f64)) * 100.0)
            .clamp(20.0, 100.0);
        let heat_rejection = total_it_heat_kw * 1.1;

        let tower_state = CoolingTowerState {
            condenser_supply_temp_c: round1(condenser_supply),
            condenser_return_temp_c: round1(condenser_return),
            wet_bulb_temp_c: round1(wet_bulb),
            approach_temp_c: round1(approach),
            fan_speed_pct: round1(tower_fan_pct),
            heat_rejection_kw: round1(heat_rejection),
        };

        let mut chw_supply = CHW_DESIGN_SUPPLY_C + ((condenser_supply - 28.0) * 0.2).max(0.0);
        chw_supply += self.chw_supply_noise.sample(&mut self.rng);

        let total_capacity = CRAC_MAX_COOLING_KW * (self.crac_units.saturating_sub(crac_failed_units.len())).max(1) as f64;
        let load_fraction = (total_it_heat_kw / total_capacity.max(1.0)).min(1.0);

        let chw_delta_t = 3.0 + load_fraction * 4.0;
        let chw_return = chw_supply + chw_delta_t;

        let mut cop = COP_DESIGN;
        cop -= ((condenser_supply - 28.0) * 0.08).max(0.0);
        cop -= ((CHW_DESIGN_SUPPLY_C - chw_supply) * 0.1).max(0.0);
        cop += ((28.0 - condenser_supply) * 0.05).max(0.0);
        cop = cop.clamp(COP_MIN, 6.0);

        let operating_units = (self.crac_units.saturating_sub(crac_failed_units.len())).max(1) as f64;
        let heat_per_crac = total_it_heat_kw / operating_units;

        let mut crac_states = Vec::with_capacity(self.crac_units);
        let mut total_cooling = 0.0;
        let mut total_cap_sum = 0.0;

        for unit_id in 0..self.crac_units {
            if crac_failed_units.contains(&unit_id) {
                crac_states.push(CracUnitState {
                    unit_id,
                    supply_air_temp_c: ambient_temp_c,
                    return_air_temp_c: ambient_temp_c,
                    fan_speed_pct: 0.0,
                    airflow_cfm: 0.0,
                    chw_supply_temp_c: chw_supply,
                    chw_return_temp_c: chw_supply,
                    chw_flow_rate_lps: 0.0,
                    cooling_output_kw: 0.0,
                    cooling_capacity_kw: CRAC_MAX_COOLING_KW,
                    load_pct: 0.0,
                    operational: false,
                    fault_code: 1,
                });
                total_cap_sum += CRAC_MAX_COOLING_KW;
                continue;
            }

            let unit_load = heat_per_crac.min(CRAC_MAX_COOLING_KW);
            let unit_load_pct = (unit_load / CRAC_MAX_COOLING_KW) * 100.0;

            let fan_pct = (30.0 + 70.0 * (unit_load / CRAC_MAX_COOLING_KW)).clamp(30.0, 100.0);
            let airflow = CRAC_MAX_AIRFLOW_CFM * (fan_pct / 100.0);

            let effectiveness = 0.7 + 0.2 * (fan_pct / 100.0);
            let mut supply_air = chw_supply + (1.0 - effectiveness) * (ambient_temp_c - chw_supply);

            if let Some(&setpoint) = crac_setpoints.get(&unit_id) {
                supply_air = setpoint.clamp(CRAC_MIN_SUPPLY_AIR_C, 25.0);
            }

            let return_air = supply_air + (unit_load / (airflow * 0.0012).max(0.1));

            let chw_flow = CHW_DESIGN_FLOW_LPS * (fan_pct / 100.0) * 1.2;
            let chw_unit_return = chw_supply + (unit_load / (chw_flow * 4.186).max(0.1));

            crac_states.push(CracUnitState {
                unit_id,
                supply_air_temp_c: round1(supply_air),
                return_air_temp_c: round1(return_air),
                fan_speed_pct: round1(fan_pct),
                airflow_cfm: round0(airflow),
                chw_supply_temp_c: round1(chw_supply),
                chw_return_temp_c: round1(chw_unit_return),
                chw_flow_rate_lps: round2(chw_flow),
                cooling_output_kw: round1(unit_load),
                cooling_capacity_kw: CRAC_MAX_COOLING_KW,
                load_pct: round1(unit_load_pct),
                operational: true,
                fault_code: 0,
            });
            total_cooling += unit_load;
            total_cap_sum += CRAC_MAX_COOLING_KW;
        }

        let cooling_power = total_cooling / cop;
        let total_flow: f64 = crac_states.iter().map(|c| c.chw_flow_rate_lps).sum();
        let pump_power = 1.0 + total_flow * 0.15;

        FacilityCoolingState {
            crac_units: crac_states,
            cooling_tower: tower_state,
            total_cooling_output_kw: round1(total_cooling),
            total_cooling_capacity_kw: round1(total_cap_sum),
            cooling_load_pct: round1((total_cooling / total_cap_sum.max(1.0)) * 100.0),
            cop: round2(cop),
            cooling_power_kw: round1(cooling_power),
            chw_plant_supply_temp_c: round1(chw_supply),
            chw_plant_return_temp_c: round1(chw_return),
            chw_plant_delta_t_c: round1(chw_delta_t),
            pump_power_kw: round1(pump_power),
            pump_flow_rate_lps: round1(total_flow),
        }
    }

    pub fn reset(&mut self, config: &Config) {
        self.crac_units = config.thermal.crac_units;
        self.rng = model_rng(config.rng_seed, OFFSET_COOLING);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_crac_contributes_zero_cooling() {
        let config = Config::default();
        let mut model = CoolingModel::new(&config);
        let mut failed = HashSet::new();
        failed.insert(0);
        let state = model.step(80.0, 22.0, &HashMap::new(), &failed, 0.0);
        let unit0 = state.crac_units.iter().find(|u| u.unit_id == 0).unwrap();
        assert_eq!(unit0.cooling_output_kw, 0.0);
        assert!(!unit0.operational);
    }

    #[test]
    fn cop_stays_within_design_bounds() {
        let config = Config::default();
        let mut model = CoolingModel::new(&config);
        let state = model.step(80.0, 35.0, &HashMap::new(), &HashSet::new(), 0.0);
        assert!(state.cop >= COP_MIN - 1e-9 && state.cop <= 6.0 + 1e-9);
    }

    #[test]
    fn healthy_run_has_no_failed_units_reported() {
        let config = Config::default();
        let mut model = CoolingModel::new(&config);
        let state = model.step(80.0, 22.0, &HashMap::new(), &HashSet::new(), 0.0);
        assert!(state.crac_units.iter().all(|u| u.operational && u.fault_code == 0));
    }
}
