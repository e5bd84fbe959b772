//! Append-only JSONL mirror of telemetry states (§3, §4.14). One JSON
//! object per line, in insertion order, matching the serialization used by
//! `GET /status`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

pub struct TelemetrySink {
    path: PathBuf,
}

impl TelemetrySink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append<T: Serialize>(&self, state: &T) -> std::io::Result<()> {
        let line = serde_json::to_string(state)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        tick: u64,
        value: f64,
    }

    #[test]
    fn appended_lines_preserve_insertion_order() {
        let dir = std::env::temp_dir().join(format!("colony-telemetry-sink-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("telemetry.jsonl");
        let sink = TelemetrySink::new(&path);

        for tick in 0..5 {
            sink.append(&Sample { tick, value: tick as f64 * 1.5 }).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Sample> = contents.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 5);
        for (i, sample) in lines.iter().enumerate() {
            assert_eq!(sample.tick, i as u64);
        }

        std::fs::remove_dir_all(&dir).ok();
    }
}
