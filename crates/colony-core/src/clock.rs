use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Integer tick counter plus accumulated simulated time (§4.1).
///
/// `advance` never has any side effect beyond the optional throttle sleep;
/// callers that don't want real-time pacing pass `realtime_factor <= 0.0`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub tick_interval_s: f64,
    pub realtime_factor: f64,
    pub tick_count: u64,
    pub current_time: f64,
}

impl SimClock {
    pub fn new(tick_interval_s: f64, realtime_factor: f64) -> Self {
        Self {
            tick_interval_s,
            realtime_factor,
            tick_count: 0,
            current_time: 0.0,
        }
    }

    /// Advance by `n` ticks, sleeping `tick_interval_s * realtime_factor` per
    /// tick when the throttle is enabled.
    pub fn advance(&mut self, n: u64) {
        for _ in 0..n {
            self.current_time += self.tick_interval_s;
            self.tick_count += 1;
            if self.realtime_factor > 0.0 {
                let millis = (self.tick_interval_s * self.realtime_factor * 1000.0).max(0.0);
                thread::sleep(Duration::from_millis(millis as u64));
            }
        }
    }

    pub fn hour_of_day(&self) -> f64 {
        ((self.current_time / 3600.0) + 8.0).rem_euclid(24.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_accumulates_time_and_ticks() {
        let mut clock = SimClock::new(60.0, 0.0);
        clock.advance(5);
        assert_eq!(clock.tick_count, 5);
        assert!((clock.current_time - 300.0).abs() < 1e-9);
    }

    #[test]
    fn hour_of_day_wraps() {
        let mut clock = SimClock::new(3600.0, 0.0);
        clock.advance(20);
        let hour = clock.hour_of_day();
        assert!((0.0..24.0).contains(&hour));
    }
}
