//! Physical and logical models of a GPU data centre: the clock, config,
//! workload queue, and the per-tick model chain (power, thermal, GPU,
//! network, storage, cooling, carbon) composed by `Facility`, plus the
//! failure engine that perturbs them. Transport- and persistence-agnostic;
//! orchestration (the simulator loop, telemetry, evaluation, sessions)
//! lives in `colony-sim`.

pub mod carbon;
pub mod clock;
pub mod config;
pub mod cooling;
pub mod error;
pub mod facility;
pub mod faults;
pub mod gpu;
pub mod job;
pub mod network;
pub mod power;
pub mod queue;
pub mod rng;
pub mod storage;
pub mod thermal;

#[cfg(test)]
mod property_tests;

pub use carbon::{CarbonModel, CarbonState};
pub use clock::SimClock;
pub use config::{ClockConfig, Config, FacilityConfig, PowerConfig, ThermalConfig, WorkloadConfig};
pub use cooling::{CoolingModel, CracUnitState, FacilityCoolingState};
pub use error::{CoreError, CoreResult};
pub use facility::{Facility, FacilityState};
pub use faults::{ActiveFailure, FailureEngine, FailureType};
pub use gpu::{FacilityGpuState, GpuModel, GpuState};
pub use job::{Job, JobStatus, JobType};
pub use network::{FacilityNetworkState, NetworkModel};
pub use power::{FacilityPowerState, PowerModel};
pub use queue::WorkloadQueue;
pub use storage::{FacilityStorageState, StorageModel};
pub use thermal::{FacilityThermalState, ThermalModel};
