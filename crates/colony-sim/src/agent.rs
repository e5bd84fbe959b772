//! The agent interface evaluated sessions and scenario runs drive (§4.16).
//! An `Agent` only ever sees the JSON-shaped state a session step produces
//! and answers with a list of actions; it never touches `Simulator`
//! directly, so the same trait object works whether it's driven by
//! `AgentRunner` locally or, eventually, over a wire protocol.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct AgentAction {
    pub action_type: String,
    pub params: Value,
}

impl AgentAction {
    pub fn new(action_type: impl Into<String>, params: Value) -> Self {
        Self { action_type: action_type.into(), params }
    }
}

/// Implemented by anything that decides what to do each tick of an
/// evaluation session. `act` receives the session step's enriched state
/// (the facility state plus `failures` and `running_jobs`).
pub trait Agent {
    fn name(&self) -> &str;
    fn act(&mut self, state: &Value) -> Vec<AgentAction>;
    fn on_session_start(&mut self, _session_info: &Value) {}
    fn on_session_end(&mut self, _result: &Value) {}
}
