//! CSV-backed leaderboard store (§6). Hand-rolled against `std::fs` rather
//! than a CSV crate, matching this codebase's habit of talking to simple
//! flat files directly (see `colony_core::Config::load`/`save`).

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

/// Canonical dimension order shared by the CSV header and every row.
pub const DIMENSION_NAMES: [&str; 7] = [
    "sla_quality",
    "energy_efficiency",
    "carbon",
    "thermal_safety",
    "cost",
    "infra_health",
    "failure_response",
];

const COLUMNS: [&str; 14] = [
    "run_id",
    "timestamp",
    "agent_name",
    "scenario_id",
    "composite_score",
    "sla_quality",
    "energy_efficiency",
    "carbon",
    "thermal_safety",
    "cost",
    "infra_health",
    "failure_response",
    "duration_ticks",
    "total_sim_time_s",
];

/// What a caller (the evaluator's consumer) supplies to record one run.
#[derive(Debug, Clone)]
pub struct LeaderboardRecord {
    pub agent_name: String,
    pub scenario_id: String,
    pub composite_score: f64,
    pub dimension_scores: HashMap<String, f64>,
    pub duration_ticks: u64,
    pub total_sim_time_s: f64,
}

/// One row read back from the CSV.
#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
    pub run_id: String,
    pub timestamp: String,
    pub agent_name: String,
    pub scenario_id: String,
    pub composite_score: f64,
    pub dimension_scores: HashMap<String, f64>,
    pub duration_ticks: u64,
    pub total_sim_time_s: f64,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Append-only CSV file of evaluation results, plus a best-scores query.
pub struct LeaderboardStore {
    path: PathBuf,
}

impl LeaderboardStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn ensure_csv(&self) -> std::io::Result<()> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
            writeln!(file, "{}", COLUMNS.join(","))?;
        }
        Ok(())
    }

    /// Append one result, returning the generated 8-char run id.
    pub fn record_result(&self, record: &LeaderboardRecord) -> std::io::Result<String> {
        self.ensure_csv()?;
        let run_id = Uuid::new_v4().to_string()[..8].to_string();
        let timestamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

        let mut fields = vec![
            csv_escape(&run_id),
            csv_escape(&timestamp),
            csv_escape(&record.agent_name),
            csv_escape(&record.scenario_id),
            format!("{:.2}", round2(record.composite_score)),
        ];
        for dim in DIMENSION_NAMES {
            let score = record.dimension_scores.get(dim).copied().unwrap_or(0.0);
            fields.push(format!("{:.2}", round2(score)));
        }
        fields.push(record.duration_ticks.to_string());
        fields.push(format!("{:.2}", round2(record.total_sim_time_s)));

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", fields.join(","))?;
        Ok(run_id)
    }

    /// Load every row, optionally filtered by `scenario_id`.
    pub fn load_leaderboard(&self, scenario_id: Option<&str>) -> std::io::Result<Vec<LeaderboardEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let mut lines = BufReader::new(file).lines();
        lines.next(); // header

        let mut entries = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_csv_line(&line);
            if fields.len() != COLUMNS.len() {
                continue;
            }
            if let Some(filter) = scenario_id {
                if fields[3] != filter {
                    continue;
                }
            }
            let mut dimension_scores = HashMap::new();
            for (i, dim) in DIMENSION_NAMES.iter().enumerate() {
                dimension_scores.insert((*dim).to_string(), fields[5 + i].parse().unwrap_or(0.0));
            }
            entries.push(LeaderboardEntry {
                run_id: fields[0].clone(),
                timestamp: fields[1].clone(),
                agent_name: fields[2].clone(),
                scenario_id: fields[3].clone(),
                composite_score: fields[4].parse().unwrap_or(0.0),
                dimension_scores,
                duration_ticks: fields[12].parse().unwrap_or(0),
                total_sim_time_s: fields[13].parse().unwrap_or(0.0),
            });
        }
        Ok(entries)
    }

    /// Best composite score per `(agent_name, scenario_id)`, sorted
    /// descending by composite score.
    pub fn get_best_scores(&self, scenario_id: Option<&str>) -> std::io::Result<Vec<LeaderboardEntry>> {
        let entries = self.load_leaderboard(scenario_id)?;
        let mut best: HashMap<(String, String), LeaderboardEntry> = HashMap::new();
        for entry in entries {
            let key = (entry.agent_name.clone(), entry.scenario_id.clone());
            match best.get(&key) {
                Some(existing) if existing.composite_score >= entry.composite_score => {}
                _ => {
                    best.insert(key, entry);
                }
            }
        }
        let mut result: Vec<LeaderboardEntry> = best.into_values().collect();
        result.sort_by(|a, b| b.composite_score.partial_cmp(&a.composite_score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(result)
    }
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

pub fn default_leaderboard_path() -> &'static Path {
    Path::new("leaderboard.csv")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(agent: &str, scenario: &str, score: f64) -> LeaderboardRecord {
        let mut dims = HashMap::new();
        for (i, dim) in DIMENSION_NAMES.iter().enumerate() {
            dims.insert((*dim).to_string(), 10.0 * (i as f64 + 1.0));
        }
        LeaderboardRecord {
            agent_name: agent.to_string(),
            scenario_id: scenario.to_string(),
            composite_score: score,
            dimension_scores: dims,
            duration_ticks: 120,
            total_sim_time_s: 7200.0,
        }
    }

    #[test]
    fn record_and_reload_round_trips_composite_score() {
        let dir = std::env::temp_dir().join(format!("colony-leaderboard-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("leaderboard.csv");
        let store = LeaderboardStore::new(&path);

        let run_id = store.record_result(&sample_record("random", "steady_state", 73.456)).unwrap();
        assert_eq!(run_id.len(), 8);

        let rows = store.load_leaderboard(None).unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].composite_score - 73.46).abs() < 1e-9);
        assert_eq!(rows[0].dimension_scores.len(), 7);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn creates_file_with_header_when_missing() {
        let dir = std::env::temp_dir().join(format!("colony-leaderboard-test-hdr-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("leaderboard.csv");
        let store = LeaderboardStore::new(&path);
        store.record_result(&sample_record("random", "overload", 50.0)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let header = contents.lines().next().unwrap();
        assert_eq!(header, COLUMNS.join(","));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn best_scores_keeps_only_the_top_run_per_agent_scenario() {
        let dir = std::env::temp_dir().join(format!("colony-leaderboard-test-best-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("leaderboard.csv");
        let store = LeaderboardStore::new(&path);

        store.record_result(&sample_record("random", "steady_state", 40.0)).unwrap();
        store.record_result(&sample_record("random", "steady_state", 90.0)).unwrap();
        store.record_result(&sample_record("other", "steady_state", 60.0)).unwrap();

        let best = store.get_best_scores(None).unwrap();
        assert_eq!(best.len(), 2);
        assert!((best[0].composite_score - 90.0).abs() < 1e-9);

        std::fs::remove_dir_all(&dir).ok();
    }
}
