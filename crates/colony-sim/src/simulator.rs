//! Ties the clock, facility, and failure engine into the per-tick
//! orchestration described in §4.12/§4.13, plus the action handlers that
//! mutate simulator state from outside a tick (API, agent, scenario).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use colony_core::{ActiveFailure, Config, Facility, FacilityState, FailureEngine, SimClock};
use colony_io::TelemetrySink;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::telemetry::{AuditLog, TelemetryBuffer};

/// Owns one simulation run end to end: the clock, the facility (and
/// therefore its workload queue), the failure engine, and the bounded
/// telemetry/audit history. A single coarse lock around this struct (see
/// `AppState` in `colony-headless`) is what keeps ticks and action
/// handlers from interleaving.
pub struct Simulator {
    config: Config,
    clock: SimClock,
    facility: Facility,
    failure_engine: FailureEngine,
    telemetry: TelemetryBuffer,
    audit: AuditLog,
    running: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl Simulator {
    pub fn new(config: Config) -> Self {
        let clock = SimClock::new(config.clock.tick_interval_s, config.clock.realtime_factor);
        let facility = Facility::new(config.clone(), None);
        let failure_engine = FailureEngine::new(&config);
        Self {
            config,
            clock,
            facility,
            failure_engine,
            telemetry: TelemetryBuffer::new(),
            audit: AuditLog::new(),
            running: Arc::new(AtomicBool::new(false)),
            worker_handle: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the config, returning the previous one. Used by
    /// `SessionManager`/`run_scenario` to swap in a scenario's overrides
    /// and restore the caller's config afterwards.
    pub fn set_config(&mut self, config: Config) -> Config {
        std::mem::replace(&mut self.config, config)
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn facility(&self) -> &Facility {
        &self.facility
    }

    pub fn facility_mut(&mut self) -> &mut Facility {
        &mut self.facility
    }

    pub fn failure_engine(&self) -> &FailureEngine {
        &self.failure_engine
    }

    pub fn telemetry(&self) -> &TelemetryBuffer {
        &self.telemetry
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn set_telemetry_sink(&mut self, sink: Option<TelemetrySink>) {
        self.telemetry.set_sink(sink);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Advance `n` ticks, translating failure-engine effects into the
    /// per-tick overrides `Facility::step` expects (§4.13).
    pub fn tick(&mut self, n: u64) -> Vec<FacilityState> {
        let mut states = Vec::with_capacity(n as usize);
        for _ in 0..n {
            self.clock.advance(1);
            self.failure_engine.set_current_time(self.clock.current_time);
            self.failure_engine.tick(self.clock.current_time);

            let partition_racks = self.failure_engine.get_network_partition_racks();
            for rack_id in &partition_racks {
                let prefix = format!("rack-{rack_id}-");
                let job_ids: Vec<String> = self
                    .facility
                    .workload_queue
                    .running
                    .iter()
                    .filter(|j| j.assigned_servers.first().is_some_and(|s| s.starts_with(&prefix)))
                    .map(|j| j.job_id.clone())
                    .collect();
                for job_id in job_ids {
                    self.facility.workload_queue.preempt_job(&job_id, true);
                }
            }

            let mut cooling = self.failure_engine.get_cooling_capacity_factors();
            let default_setpoint = self.config.thermal.crac_setpoint_c;
            for rack_id in 0..self.config.facility.num_racks {
                if let Some(sp) = self.facility.crac_setpoint(rack_id) {
                    let scale = (1.0 + (default_setpoint - sp) * 0.03).clamp(0.8, 1.2);
                    let entry = cooling.entry(rack_id).or_insert(1.0);
                    *entry *= scale;
                }
            }

            let server_max_util: HashMap<String, f64> =
                self.failure_engine.get_gpu_degraded_servers().into_iter().map(|s| (s, 0.3)).collect();

            let mut rack_mult = HashMap::new();
            for rack_id in 0..self.config.facility.num_racks {
                let mult = self.failure_engine.get_pdu_spike_factor(rack_id);
                if (mult - 1.0).abs() > f64::EPSILON {
                    rack_mult.insert(rack_id, mult);
                }
            }

            let crac_failed_units = self.failure_engine.get_failed_crac_units();
            let state =
                self.facility.step(&self.clock, Some(cooling), &server_max_util, &rack_mult, &partition_racks, &crac_failed_units);
            self.failure_engine.expire(self.clock.current_time);
            self.telemetry.append(state.clone());
            tracing::debug!(tick = self.clock.tick_count, sim_time = self.clock.current_time, "tick");
            states.push(state);
        }
        states
    }

    /// Stop any worker, then rebuild every component from the current
    /// config. Idempotent: calling it twice in a row is a no-op the second
    /// time.
    pub fn reset(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.worker_handle = None;
        self.clock = SimClock::new(self.config.clock.tick_interval_s, self.config.clock.realtime_factor);
        self.facility.reset(self.config.clone());
        self.failure_engine.reset(&self.config);
        self.telemetry.clear();
        self.audit.clear();
        tracing::info!("simulator reset");
    }

    pub fn inject(&mut self, failure_type: &str, target: &str, duration_s: Option<i64>, source: &str) -> Vec<ActiveFailure> {
        self.failure_engine.set_current_time(self.clock.current_time);
        let failures = self.failure_engine.inject(failure_type, target, duration_s);
        if let Some(f) = failures.first() {
            self.audit.record(
                self.clock.current_time,
                "inject_failure",
                serde_json::json!({"type": failure_type, "target": target, "duration_s": duration_s, "failure_id": f.failure_id}),
                "ok",
                source,
            );
        }
        tracing::debug!(action = "inject_failure", failure_type, target, found = !failures.is_empty(), "action dispatched");
        failures
    }

    pub fn migrate_workload(&mut self, job_id: &str, target_rack_id: usize, source: &str) -> bool {
        let ok = self.facility.workload_queue.migrate_job(job_id, target_rack_id);
        self.audit.record(
            self.clock.current_time,
            "migrate_workload",
            serde_json::json!({"job_id": job_id, "target_rack_id": target_rack_id}),
            if ok { "ok" } else { "not_found" },
            source,
        );
        tracing::debug!(action = "migrate_workload", ok, "action dispatched");
        ok
    }

    pub fn adjust_cooling(&mut self, rack_id: usize, setpoint_c: f64, source: &str) {
        self.facility.set_crac_setpoint(rack_id, setpoint_c);
        self.audit.record(
            self.clock.current_time,
            "adjust_cooling",
            serde_json::json!({"rack_id": rack_id, "setpoint_c": setpoint_c}),
            "ok",
            source,
        );
        tracing::debug!(action = "adjust_cooling", rack_id, setpoint_c, "action dispatched");
    }

    pub fn throttle_gpu(&mut self, server_id: &str, power_cap_pct: Option<f64>, source: &str) {
        self.facility.set_server_power_cap(server_id, power_cap_pct);
        self.audit.record(
            self.clock.current_time,
            "throttle_gpu",
            serde_json::json!({"server_id": server_id, "power_cap_pct": power_cap_pct}),
            "ok",
            source,
        );
        tracing::debug!(action = "throttle_gpu", server_id, "action dispatched");
    }

    pub fn preempt_job(&mut self, job_id: &str, source: &str) -> bool {
        let ok = self.facility.workload_queue.preempt_job(job_id, false);
        self.audit.record(
            self.clock.current_time,
            "preempt_job",
            serde_json::json!({"job_id": job_id}),
            if ok { "ok" } else { "not_found" },
            source,
        );
        tracing::debug!(action = "preempt_job", ok, "action dispatched");
        ok
    }

    pub fn resolve_failure(&mut self, failure_id: &str, source: &str) -> bool {
        let ok = self.failure_engine.resolve(failure_id);
        self.audit.record(
            self.clock.current_time,
            "resolve_failure",
            serde_json::json!({"failure_id": failure_id}),
            if ok { "ok" } else { "not_found" },
            source,
        );
        tracing::debug!(action = "resolve_failure", ok, "action dispatched");
        ok
    }

    /// Start the background tick worker. Returns `false` if one is already
    /// running. Associated function (not `&mut self`) because the worker
    /// needs shared ownership of the simulator across the spawned task.
    pub async fn start_continuous(sim: Arc<Mutex<Simulator>>, tick_interval_real_s: f64) -> bool {
        let running = {
            let guard = sim.lock().await;
            if guard.running.load(Ordering::SeqCst) {
                return false;
            }
            guard.running.clone()
        };
        running.store(true, Ordering::SeqCst);
        tracing::info!(tick_interval_real_s, "starting continuous simulation");

        let sim_for_worker = sim.clone();
        let handle = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                {
                    let mut guard = sim_for_worker.lock().await;
                    guard.tick(1);
                }
                tokio::time::sleep(Duration::from_secs_f64(tick_interval_real_s.max(0.0))).await;
            }
        });
        sim.lock().await.worker_handle = Some(handle);
        true
    }

    /// Stop the background worker, waiting (bounded to ~2s) for any tick
    /// already in flight to finish.
    pub async fn stop_continuous(sim: Arc<Mutex<Simulator>>) -> bool {
        let was_running = {
            let guard = sim.lock().await;
            guard.running.load(Ordering::SeqCst)
        };
        if !was_running {
            return false;
        }
        sim.lock().await.running.store(false, Ordering::SeqCst);
        let handle = sim.lock().await.worker_handle.take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
        }
        tracing::info!("stopped continuous simulation");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bootstrap_produces_one_state_with_expected_layout() {
        let config = Config::default();
        let mut sim = Simulator::new(config.clone());
        let states = sim.tick(1);
        assert_eq!(states.len(), 1);
        assert_eq!(sim.telemetry().len(), 1);
        let state = &states[0];
        assert_eq!(state.thermal.racks.len(), config.facility.num_racks);
        assert!(state.power.pue >= config.power.pue_overhead_factor - 1e-9);
        assert!(state.carbon.cumulative_carbon_kg > 0.0);
    }

    #[test]
    fn reset_clears_telemetry_and_audit() {
        let config = Config::default();
        let mut sim = Simulator::new(config);
        sim.tick(3);
        sim.adjust_cooling(0, 15.0, "api");
        assert!(!sim.telemetry().is_empty());
        assert!(!sim.audit().is_empty());
        sim.reset();
        assert!(sim.telemetry().is_empty());
        assert!(sim.audit().is_empty());
        assert_eq!(sim.clock().tick_count, 0);
    }

    #[test]
    fn action_handlers_always_record_audit_even_on_failure() {
        let config = Config::default();
        let mut sim = Simulator::new(config);
        let ok = sim.preempt_job("does-not-exist", "api");
        assert!(!ok);
        let entries = sim.audit().get_last_n(1);
        assert_eq!(entries[0].action, "preempt_job");
        assert_eq!(entries[0].result, "not_found");
    }

    #[test]
    fn crac_failure_injection_marks_the_unit_down_in_cooling_telemetry() {
        let config = Config::default();
        let mut sim = Simulator::new(config);
        sim.inject("crac_failure", "crac-0", Some(600), "api");
        let states = sim.tick(1);
        let unit0 = states[0].cooling.crac_units.iter().find(|u| u.unit_id == 0).unwrap();
        assert!(!unit0.operational);
        assert!(unit0.fault_code > 0);
        assert_eq!(unit0.cooling_output_kw, 0.0);
    }

    #[test]
    fn network_partition_preempts_running_jobs_on_affected_rack() {
        let config = Config::default();
        let mut sim = Simulator::new(config);
        sim.tick(1);
        let job_id = {
            let job = sim.facility_mut().workload_queue.running.first();
            job.map(|j| j.job_id.clone())
        };
        if let Some(job_id) = job_id {
            let rack_id = sim.facility().workload_queue.get_job(&job_id).unwrap().assigned_servers[0].clone();
            let rack_id: usize = rack_id.split('-').nth(1).unwrap().parse().unwrap();
            sim.inject("network_partition", &format!("rack-{rack_id}"), Some(0), "api");
            sim.tick(1);
            assert!(sim.facility().workload_queue.get_job(&job_id).map(|j| j.is_running()).unwrap_or(false) == false);
        }
    }
}
