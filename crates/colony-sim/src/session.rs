//! The single-tenant, one-session-per-process evaluation session (§4.15).
//! `SessionManager` never owns a `Simulator`; every method takes `&mut
//! Simulator` explicitly so the caller (an HTTP handler or `AgentRunner`)
//! decides what's shared and how it's locked.

use std::collections::HashMap;
use std::time::Instant;

use colony_core::{ActiveFailure, Config, CoreError, CoreResult, FacilityState, Job};
use serde::Serialize;

use crate::evaluator::{EvaluationResult, Evaluator};
use crate::scenarios::{scenario_by_id, scenario_config, FailureInjection, ScenarioDefinition};
use crate::simulator::Simulator;

#[derive(Debug, Clone, Serialize)]
pub struct SessionStartInfo {
    pub scenario_id: String,
    pub scenario_name: String,
    pub scenario_description: String,
    pub duration_ticks: u64,
    pub tick_interval_s: f64,
    pub failure_count: usize,
    pub agent_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveFailureInfo {
    pub failure_id: String,
    #[serde(rename = "type")]
    pub failure_type: String,
    pub target: String,
    pub effect: String,
}

impl From<&ActiveFailure> for ActiveFailureInfo {
    fn from(f: &ActiveFailure) -> Self {
        Self { failure_id: f.failure_id.clone(), failure_type: f.failure_type.as_str().to_string(), target: f.target.clone(), effect: f.effect.clone() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunningJobInfo {
    pub job_id: String,
    pub name: String,
    pub gpu_requirement: usize,
    pub priority: i64,
    pub job_type: String,
    pub assigned_servers: Vec<String>,
}

impl From<&Job> for RunningJobInfo {
    fn from(j: &Job) -> Self {
        Self {
            job_id: j.job_id.clone(),
            name: j.name.clone(),
            gpu_requirement: j.gpu_requirement,
            priority: j.priority,
            job_type: j.job_type.as_str().to_string(),
            assigned_servers: j.assigned_servers.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InjectedFailureInfo {
    pub failure_id: String,
    #[serde(rename = "type")]
    pub failure_type: String,
    pub target: String,
    pub effect: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStepResult {
    pub tick: u64,
    pub max_ticks: u64,
    pub done: bool,
    pub sim_time_s: f64,
    pub failures_injected: Vec<InjectedFailureInfo>,
    pub state: Option<FacilityState>,
    pub active_failures: Vec<ActiveFailureInfo>,
    pub running_jobs: Vec<RunningJobInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub active: bool,
    pub scenario_id: Option<String>,
    pub agent_name: Option<String>,
    pub current_tick: u64,
    pub max_ticks: u64,
    pub remaining_ticks: u64,
    pub progress_pct: f64,
    pub sim_time_s: f64,
    pub elapsed_real_s: f64,
}

impl SessionStatus {
    fn inactive() -> Self {
        Self {
            active: false,
            scenario_id: None,
            agent_name: None,
            current_tick: 0,
            max_ticks: 0,
            remaining_ticks: 0,
            progress_pct: 0.0,
            sim_time_s: 0.0,
            elapsed_real_s: 0.0,
        }
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

struct SessionState {
    scenario_id: String,
    scenario: ScenarioDefinition,
    agent_name: String,
    current_tick: u64,
    max_ticks: u64,
    injections_by_tick: HashMap<u64, Vec<FailureInjection>>,
    original_config: Config,
    started_at_real: Instant,
}

/// Drives one scenario run tick by tick on behalf of an interactive caller
/// (the HTTP `/eval/session/*` routes, in `colony-headless`).
pub struct SessionManager {
    session: Option<SessionState>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self { session: None }
    }

    pub fn active(&self) -> bool {
        self.session.is_some()
    }

    pub fn start(
        &mut self,
        sim: &mut Simulator,
        scenario_id: &str,
        agent_name: &str,
        scenario_override: Option<ScenarioDefinition>,
    ) -> CoreResult<SessionStartInfo> {
        if self.active() {
            return Err(CoreError::SessionBusy("a session is already active; end it before starting another".into()));
        }
        if sim.is_running() {
            return Err(CoreError::InvalidState("stop continuous simulation before starting a session".into()));
        }

        let scenario = match scenario_override {
            Some(s) => s,
            None => scenario_by_id(scenario_id).ok_or_else(|| CoreError::NotFound(format!("unknown scenario: {scenario_id}")))?,
        };

        let original_config = sim.config().clone();
        let next_config = scenario_config(&original_config, &scenario);
        sim.set_config(next_config);
        sim.reset();

        let mut injections_by_tick: HashMap<u64, Vec<FailureInjection>> = HashMap::new();
        for fi in &scenario.failure_injections {
            injections_by_tick.entry(fi.at_tick).or_default().push(fi.clone());
        }

        let info = SessionStartInfo {
            scenario_id: scenario.scenario_id.clone(),
            scenario_name: scenario.name.clone(),
            scenario_description: scenario.description.clone(),
            duration_ticks: scenario.duration_ticks,
            tick_interval_s: sim.config().clock.tick_interval_s,
            failure_count: scenario.failure_injections.len(),
            agent_name: agent_name.to_string(),
        };

        self.session = Some(SessionState {
            scenario_id: scenario.scenario_id.clone(),
            max_ticks: scenario.duration_ticks,
            scenario,
            agent_name: agent_name.to_string(),
            current_tick: 0,
            injections_by_tick,
            original_config,
            started_at_real: Instant::now(),
        });

        tracing::info!(scenario_id = %info.scenario_id, agent_name, "session started");
        Ok(info)
    }

    pub fn step(&mut self, sim: &mut Simulator) -> CoreResult<SessionStepResult> {
        let session = self.session.as_mut().ok_or_else(|| CoreError::InvalidState("no active session".into()))?;
        if session.current_tick >= session.max_ticks {
            return Err(CoreError::InvalidState("session has already completed all ticks".into()));
        }

        let tick_idx = session.current_tick;
        let mut failures_injected = Vec::new();
        if let Some(fis) = session.injections_by_tick.get(&tick_idx).cloned() {
            for fi in fis {
                let created = sim.inject(&fi.failure_type, &fi.target, fi.duration_s, "scenario");
                if let Some(f) = created.first() {
                    failures_injected.push(InjectedFailureInfo {
                        failure_id: f.failure_id.clone(),
                        failure_type: fi.failure_type.clone(),
                        target: fi.target.clone(),
                        effect: f.effect.clone(),
                    });
                }
            }
        }

        let states = sim.tick(1);
        session.current_tick += 1;
        let done = session.current_tick >= session.max_ticks;

        let active_failures: Vec<ActiveFailureInfo> =
            sim.failure_engine().get_active_failures().iter().map(ActiveFailureInfo::from).collect();
        let running_jobs: Vec<RunningJobInfo> = sim.facility().workload_queue.running.iter().map(RunningJobInfo::from).collect();

        Ok(SessionStepResult {
            tick: session.current_tick,
            max_ticks: session.max_ticks,
            done,
            sim_time_s: sim.clock().current_time,
            failures_injected,
            state: states.into_iter().next(),
            active_failures,
            running_jobs,
        })
    }

    pub fn end(&mut self, sim: &mut Simulator) -> CoreResult<EvaluationResult> {
        let session = self.session.take().ok_or_else(|| CoreError::InvalidState("no active session".into()))?;

        let mut result = {
            let evaluator = Evaluator::new(sim, &session.scenario);
            evaluator.compute()
        };
        result.run_type = "agent".to_string();
        result.metadata.insert("agent_name".into(), serde_json::json!(session.agent_name));
        result.metadata.insert("session_ticks_completed".into(), serde_json::json!(session.current_tick));
        result.metadata.insert("session_ticks_total".into(), serde_json::json!(session.max_ticks));
        result
            .metadata
            .insert("session_elapsed_real_s".into(), serde_json::json!(round2(session.started_at_real.elapsed().as_secs_f64())));

        sim.set_config(session.original_config);
        tracing::info!(scenario_id = %session.scenario_id, composite_score = result.composite_score, "session ended");
        Ok(result)
    }

    pub fn get_status(&self, sim: &Simulator) -> SessionStatus {
        match &self.session {
            None => SessionStatus::inactive(),
            Some(session) => SessionStatus {
                active: true,
                scenario_id: Some(session.scenario_id.clone()),
                agent_name: Some(session.agent_name.clone()),
                current_tick: session.current_tick,
                max_ticks: session.max_ticks,
                remaining_ticks: session.max_ticks.saturating_sub(session.current_tick),
                progress_pct: round1(100.0 * session.current_tick as f64 / session.max_ticks.max(1) as f64),
                sim_time_s: sim.clock().current_time,
                elapsed_real_s: round2(session.started_at_real.elapsed().as_secs_f64()),
            },
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_twice_without_ending_is_session_busy() {
        let mut sim = Simulator::new(Config::default());
        let mut mgr = SessionManager::new();
        mgr.start(&mut sim, "steady_state", "random", None).unwrap();
        let err = mgr.start(&mut sim, "steady_state", "random", None).unwrap_err();
        assert_eq!(err, CoreError::SessionBusy("a session is already active; end it before starting another".into()));
    }

    #[test]
    fn start_unknown_scenario_is_not_found() {
        let mut sim = Simulator::new(Config::default());
        let mut mgr = SessionManager::new();
        let err = mgr.start(&mut sim, "no-such-scenario", "random", None).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn step_past_completion_without_ending_is_invalid_state() {
        let mut sim = Simulator::new(Config::default());
        let mut mgr = SessionManager::new();
        mgr.start(&mut sim, "thermal_crisis", "random", None).unwrap();
        for _ in 0..120 {
            mgr.step(&mut sim).unwrap();
        }
        let err = mgr.step(&mut sim).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn end_restores_the_original_config() {
        let original = Config::default();
        let mut sim = Simulator::new(original.clone());
        let mut mgr = SessionManager::new();
        mgr.start(&mut sim, "overload", "random", None).unwrap();
        assert_ne!(sim.config().rng_seed, original.rng_seed);
        mgr.step(&mut sim).unwrap();
        mgr.end(&mut sim).unwrap();
        assert_eq!(sim.config(), &original);
    }

    #[test]
    fn status_is_inactive_with_zeroed_fields_before_start() {
        let sim = Simulator::new(Config::default());
        let mgr = SessionManager::new();
        let status = mgr.get_status(&sim);
        assert!(!status.active);
        assert_eq!(status.max_ticks, 0);
        assert_eq!(status.sim_time_s, 0.0);
    }
}
