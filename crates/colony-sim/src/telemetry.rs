//! Bounded ring buffers for facility states and action records (§4.14).
//! Both drop the oldest entry on overflow and never fail to append.

use std::collections::VecDeque;

use colony_core::facility::FacilityState;
use colony_io::TelemetrySink;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const TELEMETRY_CAPACITY: usize = 1000;
const AUDIT_CAPACITY: usize = 5000;

/// Insertion-ordered, capacity-bounded history of `FacilityState`s, with an
/// optional JSONL mirror that preserves the same order.
pub struct TelemetryBuffer {
    capacity: usize,
    entries: VecDeque<FacilityState>,
    sink: Option<TelemetrySink>,
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self { capacity: TELEMETRY_CAPACITY, entries: VecDeque::new(), sink: None }
    }

    pub fn set_sink(&mut self, sink: Option<TelemetrySink>) {
        self.sink = sink;
    }

    pub fn append(&mut self, state: FacilityState) {
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.append(&state) {
                tracing::warn!(error = %err, "failed to mirror telemetry to sink");
            }
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(state);
    }

    pub fn get_latest(&self) -> Option<&FacilityState> {
        self.entries.back()
    }

    /// Last `n` states, oldest first.
    pub fn get_last_n(&self, n: usize) -> Vec<&FacilityState> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }

    /// States with `current_time` in `[start_time, end_time]`.
    pub fn get_range(&self, start_time: f64, end_time: f64) -> Vec<&FacilityState> {
        self.entries.iter().filter(|s| s.current_time >= start_time && s.current_time <= end_time).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FacilityState> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for TelemetryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// One audit-log row (§3): an append-only record of an action's dispatch
/// and outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: f64,
    pub action: String,
    pub params: Value,
    pub result: String,
    pub source: String,
}

/// Capacity-bounded audit trail. `record` never fails; it only drops the
/// oldest entry when full.
pub struct AuditLog {
    capacity: usize,
    entries: VecDeque<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self { capacity: AUDIT_CAPACITY, entries: VecDeque::new() }
    }

    pub fn record(&mut self, timestamp: f64, action: &str, params: Value, result: &str, source: &str) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(AuditEntry {
            timestamp,
            action: action.to_string(),
            params,
            result: result.to_string(),
            source: source.to_string(),
        });
    }

    pub fn get_last_n(&self, n: usize) -> Vec<&AuditEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }

    pub fn get_all(&self) -> Vec<&AuditEntry> {
        self.entries.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colony_core::{Config, Facility, SimClock};
    use std::collections::{HashMap, HashSet};

    fn sample_state(tick: u64) -> FacilityState {
        let config = Config::default();
        let mut facility = Facility::new(config.clone(), None);
        let mut clock = SimClock::new(config.clock.tick_interval_s, 0.0);
        clock.tick_count = tick;
        clock.current_time = tick as f64 * config.clock.tick_interval_s;
        facility.step(&clock, None, &HashMap::new(), &HashMap::new(), &HashSet::new(), &HashSet::new())
    }

    #[test]
    fn drops_oldest_entry_and_preserves_order_past_capacity() {
        let mut buf = TelemetryBuffer { capacity: 3, ..TelemetryBuffer::new() };
        for tick in 0..5 {
            buf.append(sample_state(tick));
        }
        assert_eq!(buf.len(), 3);
        let ticks: Vec<u64> = buf.iter().map(|s| s.tick_count).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
    }

    #[test]
    fn get_last_n_returns_oldest_first_within_window() {
        let mut buf = TelemetryBuffer::new();
        for tick in 0..10 {
            buf.append(sample_state(tick));
        }
        let last3: Vec<u64> = buf.get_last_n(3).iter().map(|s| s.tick_count).collect();
        assert_eq!(last3, vec![7, 8, 9]);
    }

    #[test]
    fn audit_log_drops_oldest_when_over_capacity() {
        let mut log = AuditLog { capacity: 2, entries: VecDeque::new() };
        log.record(0.0, "a", serde_json::json!({}), "ok", "api");
        log.record(1.0, "b", serde_json::json!({}), "ok", "api");
        log.record(2.0, "c", serde_json::json!({}), "ok", "api");
        assert_eq!(log.len(), 2);
        let actions: Vec<&str> = log.get_all().iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["b", "c"]);
    }
}
