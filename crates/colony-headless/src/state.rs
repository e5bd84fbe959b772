//! Process-wide shared state (§5 "Implementation note (ambient)"): one
//! `Simulator` and one `SessionManager`, each behind their own lock so a
//! pure status query never blocks on a session step. Handlers that need
//! both always lock `sim` before `session` to avoid ordering deadlocks.

use std::sync::Arc;

use colony_sim::{Agent, RandomAgent, SessionManager, Simulator};
use tokio::sync::Mutex;

use colony_io::LeaderboardStore;

#[derive(Clone)]
pub struct AppState {
    pub sim: Arc<Mutex<Simulator>>,
    pub session: Arc<Mutex<SessionManager>>,
    pub leaderboard: Arc<LeaderboardStore>,
}

impl AppState {
    pub fn new(sim: Simulator, leaderboard: LeaderboardStore) -> Self {
        Self {
            sim: Arc::new(Mutex::new(sim)),
            session: Arc::new(Mutex::new(SessionManager::new())),
            leaderboard: Arc::new(leaderboard),
        }
    }
}

/// The small set of agents this process can instantiate by name (§10).
pub const AVAILABLE_AGENTS: [&str; 1] = ["random"];

pub fn build_agent(agent_name: &str) -> Option<Box<dyn Agent>> {
    match agent_name {
        "random" => Some(Box::new(RandomAgent::new())),
        _ => None,
    }
}
