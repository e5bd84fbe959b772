//! File-based external collaborators for the simulator: the CSV leaderboard
//! store and the telemetry JSONL sink. Kept separate from `colony-core` so
//! the core stays transport- and persistence-agnostic.

pub mod leaderboard;
pub mod telemetry_sink;

pub use leaderboard::{LeaderboardEntry, LeaderboardRecord, LeaderboardStore, DIMENSION_NAMES};
pub use telemetry_sink::TelemetrySink;
