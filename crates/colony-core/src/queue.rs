use std::collections::HashMap;

use rand::Rng;
use rand_pcg::Pcg64;
use uuid::Uuid;

use crate::config::{Config, FacilityConfig, WorkloadConfig};
use crate::job::{profile_for, Job, JobStatus, JobType, JOB_TYPE_WEIGHTS};
use crate::rng::{model_rng, OFFSET_WORKLOAD};

fn server_id(rack_id: usize, srv_idx: usize) -> String {
    format!("rack-{rack_id}-srv-{srv_idx}")
}

fn pick_job_type(rng: &mut Pcg64) -> JobType {
    let roll: f64 = rng.gen();
    let mut acc = 0.0;
    for (job_type, weight) in JOB_TYPE_WEIGHTS {
        acc += weight;
        if roll < acc {
            return job_type;
        }
    }
    JobType::Batch
}

/// Holds `pending`/`running`/`completed` job sequences and the per-server
/// GPU-slot bookkeeping used for first-fit placement (§4.3).
pub struct WorkloadQueue {
    facility: FacilityConfig,
    workload_cfg: WorkloadConfig,
    tick_interval_s: f64,
    rng: Pcg64,
    pub pending: Vec<Job>,
    pub running: Vec<Job>,
    pub completed: Vec<Job>,
    server_gpu_utilisation: HashMap<String, f64>,
}

impl WorkloadQueue {
    pub fn new(config: &Config) -> Self {
        let mut q = Self {
            facility: config.facility.clone(),
            workload_cfg: config.workload.clone(),
            tick_interval_s: config.clock.tick_interval_s,
            rng: model_rng(config.rng_seed, OFFSET_WORKLOAD),
            pending: Vec::new(),
            running: Vec::new(),
            completed: Vec::new(),
            server_gpu_utilisation: HashMap::new(),
        };
        q.init_server_utilisation();
        q
    }

    fn init_server_utilisation(&mut self) {
        for r in 0..self.facility.num_racks {
            for s in 0..self.facility.servers_per_rack {
                self.server_gpu_utilisation.insert(server_id(r, s), 0.05);
            }
        }
    }

    fn server_gpus_available(&self) -> HashMap<String, i64> {
        let mut slots = HashMap::new();
        for r in 0..self.facility.num_racks {
            for s in 0..self.facility.servers_per_rack {
                slots.insert(server_id(r, s), self.facility.gpus_per_server as i64);
            }
        }
        for job in &self.running {
            for srv in &job.assigned_servers {
                if let Some(slot) = slots.get_mut(srv) {
                    *slot -= 1;
                }
            }
        }
        slots
    }

    /// First-fit placement over servers in lexicographic id order.
    fn find_placement(&self, gpu_req: usize) -> Option<Vec<String>> {
        let slots = self.server_gpus_available();
        let mut ids: Vec<&String> = slots.keys().collect();
        ids.sort();
        let mut assigned = Vec::new();
        let mut needed = gpu_req as i64;
        for id in ids {
            if needed <= 0 {
                break;
            }
            let avail = slots[id];
            let take = needed.min(avail);
            if take > 0 {
                for _ in 0..take {
                    assigned.push(id.clone());
                }
                needed -= take;
            }
        }
        if needed == 0 {
            Some(assigned)
        } else {
            None
        }
    }

    /// Advance one tick: arrival, SLA check, scheduling, completion, GPU
    /// utilisation. Returns `server_id -> gpu_util` for the tick.
    pub fn step(&mut self, current_time: f64) -> HashMap<String, f64> {
        // 1. Arrival.
        let rate = 1.0 / self.workload_cfg.mean_job_arrival_interval_s;
        let prob_arrival = if rate > 0.0 {
            1.0 - (-rate * self.tick_interval_s).exp()
        } else {
            0.0
        };
        if self.rng.gen::<f64>() < prob_arrival {
            let job_type = pick_job_type(&mut self.rng);
            let profile = profile_for(job_type);

            let max_gpus = (self.facility.num_racks
                * self.facility.servers_per_rack
                * self.facility.gpus_per_server) as i64;
            let (gpu_lo, gpu_hi) = profile.gpu_range;
            let gpu_hi_exclusive = (gpu_hi + 1).min(max_gpus).max(gpu_lo + 1);
            let gpu_req = self.rng.gen_range(gpu_lo..gpu_hi_exclusive).max(1) as usize;

            let (dur_lo, dur_hi) = profile.duration_range_s;
            let duration_s = self.rng.gen_range(dur_lo..=dur_hi);

            let (pri_lo, pri_hi) = profile.priority_range;
            let priority = self.rng.gen_range(pri_lo..=pri_hi);

            let (sla_lo, sla_hi) = profile.sla_range_s;
            let sla_deadline_s = self.rng.gen_range(sla_lo..sla_hi);

            let job_id = Uuid::new_v4().to_string();
            let name = format!("{}-{}", job_type.as_str(), &job_id[..8]);

            self.pending.push(Job {
                job_id,
                name,
                job_type,
                gpu_requirement: gpu_req,
                priority,
                duration_s,
                submitted_at: current_time,
                started_at: None,
                completed_at: None,
                assigned_servers: Vec::new(),
                status: JobStatus::Queued,
                sla_deadline_s,
                sla_violated: false,
                gpu_util_target: profile.gpu_util,
            });
        }

        // 2. SLA check.
        for job in &mut self.pending {
            let wait = current_time - job.submitted_at;
            if wait >= job.sla_deadline_s && !job.sla_violated {
                job.sla_violated = true;
            }
        }

        // 3. Scheduling: stable sort descending priority, first-fit.
        self.pending.sort_by(|a, b| b.priority.cmp(&a.priority));
        let mut still_pending = Vec::with_capacity(self.pending.len());
        for mut job in self.pending.drain(..) {
            if job.status != JobStatus::Queued {
                still_pending.push(job);
                continue;
            }
            match self.find_placement(job.gpu_requirement) {
                Some(placement) => {
                    job.assigned_servers = placement;
                    job.started_at = Some(current_time);
                    job.status = JobStatus::Running;
                    self.running.push(job);
                }
                None => still_pending.push(job),
            }
        }
        self.pending = still_pending;

        // 4. Completion.
        let mut still_running = Vec::with_capacity(self.running.len());
        for mut job in self.running.drain(..) {
            let elapsed = job
                .started_at
                .map(|t| current_time - t)
                .unwrap_or(0.0);
            if elapsed >= job.duration_s as f64 {
                job.completed_at = Some(current_time);
                job.status = JobStatus::Completed;
                self.completed.push(job);
            } else {
                still_running.push(job);
            }
        }
        self.running = still_running;

        // 5. GPU utilisation.
        self.init_server_utilisation();
        let gpus_per_server = self.facility.gpus_per_server as f64;
        let mut sum: HashMap<String, f64> = HashMap::new();
        for r in 0..self.facility.num_racks {
            for s in 0..self.facility.servers_per_rack {
                sum.insert(server_id(r, s), 0.05 * gpus_per_server);
            }
        }
        for job in &self.running {
            for srv in &job.assigned_servers {
                let entry = sum.entry(srv.clone()).or_insert(0.05 * gpus_per_server);
                *entry = *entry - 0.05 + job.gpu_util_target;
            }
        }
        for (srv, total) in sum {
            let util = (total / gpus_per_server).min(1.0);
            self.server_gpu_utilisation.insert(srv, util);
        }

        self.server_gpu_utilisation.clone()
    }

    pub fn get_job(&self, job_id: &str) -> Option<&Job> {
        self.pending
            .iter()
            .chain(self.running.iter())
            .chain(self.completed.iter())
            .find(|j| j.job_id == job_id)
    }

    /// Move a running job to a different rack; leaves it unchanged and
    /// returns `false` if the target rack lacks capacity.
    pub fn migrate_job(&mut self, job_id: &str, target_rack_id: usize) -> bool {
        let Some(pos) = self.running.iter().position(|j| j.job_id == job_id) else {
            return false;
        };
        let target_servers: Vec<String> = (0..self.facility.servers_per_rack)
            .map(|s| server_id(target_rack_id, s))
            .collect();

        let mut slots = self.server_gpus_available();
        for srv in &self.running[pos].assigned_servers {
            *slots.entry(srv.clone()).or_insert(0) += 1;
        }

        let mut assigned = Vec::new();
        let mut needed = self.running[pos].gpu_requirement as i64;
        for srv in &target_servers {
            if needed <= 0 {
                break;
            }
            let avail = *slots
                .get(srv)
                .unwrap_or(&(self.facility.gpus_per_server as i64));
            let take = needed.min(avail);
            for _ in 0..take {
                assigned.push(srv.clone());
            }
            needed -= take;
        }

        if needed == 0 {
            self.running[pos].assigned_servers = assigned;
            true
        } else {
            false
        }
    }

    /// Preempt a running job, moving it to `completed` with status
    /// `preempted` (or `failed`).
    pub fn preempt_job(&mut self, job_id: &str, mark_as_failed: bool) -> bool {
        let Some(pos) = self.running.iter().position(|j| j.job_id == job_id) else {
            return false;
        };
        let mut job = self.running.remove(pos);
        job.status = if mark_as_failed {
            JobStatus::Failed
        } else {
            JobStatus::Preempted
        };
        self.completed.push(job);
        true
    }

    pub fn get_sla_violations(&self) -> Vec<&Job> {
        self.pending
            .iter()
            .chain(self.running.iter())
            .chain(self.completed.iter())
            .filter(|j| j.sla_violated)
            .collect()
    }

    pub fn reset(&mut self, config: &Config) {
        self.facility = config.facility.clone();
        self.workload_cfg = config.workload.clone();
        self.tick_interval_s = config.clock.tick_interval_s;
        self.rng = model_rng(config.rng_seed, OFFSET_WORKLOAD);
        self.pending.clear();
        self.running.clear();
        self.completed.clear();
        self.init_server_utilisation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrivals_eventually_populate_pending_or_running() {
        let config = Config::default();
        let mut q = WorkloadQueue::new(&config);
        let mut saw_job = false;
        let mut t = 0.0;
        for _ in 0..500 {
            q.step(t);
            t += config.clock.tick_interval_s;
            if !q.pending.is_empty() || !q.running.is_empty() || !q.completed.is_empty() {
                saw_job = true;
                break;
            }
        }
        assert!(saw_job, "expected at least one job to arrive within 500 ticks");
    }

    #[test]
    fn migrate_job_onto_full_rack_fails_and_leaves_job_unchanged() {
        let mut config = Config::default();
        config.facility.num_racks = 2;
        config.facility.servers_per_rack = 1;
        config.facility.gpus_per_server = 1;
        let mut q = WorkloadQueue::new(&config);
        q.running.push(Job {
            job_id: "a".into(),
            name: "a".into(),
            job_type: JobType::Batch,
            gpu_requirement: 1,
            priority: 1,
            duration_s: 100,
            submitted_at: 0.0,
            started_at: Some(0.0),
            completed_at: None,
            assigned_servers: vec!["rack-0-srv-0".into()],
            status: JobStatus::Running,
            sla_deadline_s: 1000.0,
            sla_violated: false,
            gpu_util_target: 0.9,
        });
        q.running.push(Job {
            job_id: "b".into(),
            name: "b".into(),
            job_type: JobType::Batch,
            gpu_requirement: 1,
            priority: 1,
            duration_s: 100,
            submitted_at: 0.0,
            started_at: Some(0.0),
            completed_at: None,
            assigned_servers: vec!["rack-1-srv-0".into()],
            status: JobStatus::Running,
            sla_deadline_s: 1000.0,
            sla_violated: false,
            gpu_util_target: 0.9,
        });

        let before = q.running[0].assigned_servers.clone();
        let ok = q.migrate_job("a", 1);
        assert!(!ok);
        assert_eq!(q.running[0].assigned_servers, before);
    }

    #[test]
    fn preempt_job_moves_to_completed_with_preempted_status() {
        let config = Config::default();
        let mut q = WorkloadQueue::new(&config);
        q.running.push(Job {
            job_id: "x".into(),
            name: "x".into(),
            job_type: JobType::Inference,
            gpu_requirement: 1,
            priority: 5,
            duration_s: 100,
            submitted_at: 0.0,
            started_at: Some(0.0),
            completed_at: None,
            assigned_servers: vec!["rack-0-srv-0".into()],
            status: JobStatus::Running,
            sla_deadline_s: 200.0,
            sla_violated: false,
            gpu_util_target: 0.6,
        });
        assert!(q.preempt_job("x", false));
        assert!(q.running.is_empty());
        assert_eq!(q.completed[0].status, JobStatus::Preempted);
    }
}
