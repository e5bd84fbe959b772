//! Randomized invariant checks over the pure per-tick model functions,
//! mirroring the teacher's `property_tests.rs` (bounds, monotonicity,
//! floor/ceiling checks across the input space rather than fixed cases).

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use crate::carbon::CarbonModel;
use crate::config::Config;
use crate::faults::FailureEngine;
use crate::power::PowerModel;

fn power_model() -> PowerModel {
    let cfg = Config::default();
    PowerModel::new(cfg.facility, cfg.power)
}

proptest! {
    /// gpu_power_curve (exercised through compute()'s idle default) always
    /// lands within [5% TDP, TDP] regardless of utilisation (§4.4).
    #[test]
    fn gpu_utilisation_never_draws_more_than_full_tdp(util in 0.0f64..=1.0f64) {
        let m = power_model();
        let mut utilisation = HashMap::new();
        utilisation.insert("rack-0-srv-0".to_string(), util);
        let state = m.compute(&utilisation, &HashSet::new(), &HashMap::new(), &HashMap::new(), &HashMap::new(), 22.0);
        let server = &state.racks[0].servers[0];
        let tdp = Config::default().power.gpu_tdp_watts;
        prop_assert!(server.gpu_power_draw_w >= 0.0);
        prop_assert!(server.gpu_power_draw_w <= tdp * Config::default().facility.gpus_per_server as f64 + 1e-6);
    }

    /// Dynamic PUE is never below the configured base overhead factor, for
    /// any IT load or ambient temperature (§4.4).
    #[test]
    fn dynamic_pue_never_drops_below_base_factor(it_power_kw in 0.0f64..500.0f64, ambient_c in -10.0f64..60.0f64) {
        let m = power_model();
        let pue = m.compute_dynamic_pue(it_power_kw, ambient_c);
        prop_assert!(pue >= Config::default().power.pue_overhead_factor - 1e-9);
    }

    /// Power cap breach is always exactly `total > cap`, never drifting
    /// from its own definition regardless of the racks' utilisation mix.
    #[test]
    fn power_cap_exceeded_always_matches_total_vs_cap(utils in prop::collection::vec(0.0f64..=1.0f64, 1..8)) {
        let m = power_model();
        let mut utilisation = HashMap::new();
        for (i, u) in utils.iter().enumerate() {
            utilisation.insert(format!("rack-0-srv-{i}"), *u);
        }
        let state = m.compute(&utilisation, &HashSet::new(), &HashMap::new(), &HashMap::new(), &HashMap::new(), 22.0);
        prop_assert_eq!(state.power_cap_exceeded, state.total_power_kw > Config::default().power.facility_power_cap_kw);
    }

    /// Carbon intensity never drops below its documented 50 gCO2/kWh floor,
    /// for any simulated time of day (§4.10).
    #[test]
    fn carbon_intensity_respects_its_floor_at_any_hour(sim_time in 0.0f64..(86400.0 * 30.0)) {
        let config = Config::default();
        let mut model = CarbonModel::new(&config);
        let ci = model.carbon_intensity(sim_time);
        prop_assert!(ci >= 50.0);
    }

    /// Electricity price never drops below its documented GBP 0.02/kWh
    /// floor, for any simulated time of day (§4.10).
    #[test]
    fn electricity_price_respects_its_floor_at_any_hour(sim_time in 0.0f64..(86400.0 * 30.0)) {
        let config = Config::default();
        let mut model = CarbonModel::new(&config);
        let price = model.electricity_price(sim_time);
        prop_assert!(price >= 0.02 - 1e-9);
    }

    /// `crac_degraded` never leaves a rack's cooling factor above 0.5, and
    /// `crac_failure` always zeroes it, regardless of which CRAC among the
    /// configured set is targeted (§4.11).
    #[test]
    fn crac_failure_dominates_and_degraded_caps_at_half(crac_id in 0usize..2usize) {
        let config = Config::default();
        let mut engine = FailureEngine::new(&config);
        let target = format!("crac-{crac_id}");
        engine.inject("crac_degraded", &target, Some(600));
        let racks_per_crac = config.facility.num_racks / config.thermal.crac_units.max(1);
        let rack_id = crac_id * racks_per_crac;
        prop_assert!(engine.get_cooling_capacity_factor(rack_id) <= 0.5 + 1e-9);

        engine.inject("crac_failure", &target, Some(600));
        prop_assert_eq!(engine.get_cooling_capacity_factor(rack_id), 0.0);
    }
}
