use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Training,
    Inference,
    Batch,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Training => "training",
            JobType::Inference => "inference",
            JobType::Batch => "batch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Preempted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Preempted => "preempted",
        }
    }
}

/// One row of `JOB_PROFILES` (§Glossary): the per-type distribution a
/// freshly arrived job is sampled from.
pub struct JobProfile {
    pub gpu_range: (i64, i64),
    pub duration_range_s: (i64, i64),
    pub priority_range: (i64, i64),
    pub sla_range_s: (f64, f64),
    pub gpu_util: f64,
}

pub const TRAINING_PROFILE: JobProfile = JobProfile {
    gpu_range: (4, 16),
    duration_range_s: (3600, 14400),
    priority_range: (2, 4),
    sla_range_s: (1800.0, 7200.0),
    gpu_util: 0.92,
};

pub const INFERENCE_PROFILE: JobProfile = JobProfile {
    gpu_range: (1, 2),
    duration_range_s: (60, 600),
    priority_range: (4, 5),
    sla_range_s: (30.0, 300.0),
    gpu_util: 0.6,
};

pub const BATCH_PROFILE: JobProfile = JobProfile {
    gpu_range: (2, 8),
    duration_range_s: (600, 7200),
    priority_range: (1, 3),
    sla_range_s: (3600.0, 14400.0),
    gpu_util: 0.85,
};

pub fn profile_for(job_type: JobType) -> &'static JobProfile {
    match job_type {
        JobType::Training => &TRAINING_PROFILE,
        JobType::Inference => &INFERENCE_PROFILE,
        JobType::Batch => &BATCH_PROFILE,
    }
}

/// Arrival weights: inference jobs arrive more frequently than training.
pub const JOB_TYPE_WEIGHTS: [(JobType, f64); 3] = [
    (JobType::Training, 0.2),
    (JobType::Inference, 0.5),
    (JobType::Batch, 0.3),
];

/// A single workload job (§3). `assigned_servers` is an ordered multiset:
/// one entry per occupied GPU slot, so its length equals `gpu_requirement`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub name: String,
    pub job_type: JobType,
    pub gpu_requirement: usize,
    pub priority: i64,
    pub duration_s: i64,
    pub submitted_at: f64,
    pub started_at: Option<f64>,
    pub completed_at: Option<f64>,
    pub assigned_servers: Vec<String>,
    pub status: JobStatus,
    pub sla_deadline_s: f64,
    pub sla_violated: bool,
    pub gpu_util_target: f64,
}

impl Job {
    pub fn is_queued(&self) -> bool {
        self.status == JobStatus::Queued
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }
}
