// Recorder - Per-turn snapshots and their JSON export
// Principle: The simulation hands over what happened; formatting happens elsewhere

use crate::types::TurnRecord;
use serde::Serialize;
use std::path::Path;

/// Recorder errors
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Consumer of turn snapshots
pub trait Recorder {
    fn record(&mut self, record: TurnRecord);
}

/// Keeps every snapshot in memory
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    records: Vec<TurnRecord>,
}

#[derive(Serialize)]
struct Export<'a> {
    exported_at: String,
    turns: &'a [TurnRecord],
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TurnRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&TurnRecord> {
        self.records.last()
    }

    pub fn to_json(&self) -> Result<String, RecorderError> {
        let export = Export {
            exported_at: chrono::Utc::now().to_rfc3339(),
            turns: &self.records,
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Write every snapshot to `path`, creating parent directories
    pub fn export_json(&self, path: &Path) -> Result<(), RecorderError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl Recorder for MemoryRecorder {
    fn record(&mut self, record: TurnRecord) {
        self.records.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CommonRecord, TurnRecord};

    fn record(turn: u32) -> TurnRecord {
        TurnRecord {
            iteration: 1,
            turn,
            agents: Vec::new(),
            teams: Vec::new(),
            common: CommonRecord {
                threshold: 12,
                threshold_applied: false,
            },
        }
    }

    #[test]
    fn test_records_in_order() {
        let mut recorder = MemoryRecorder::new();
        recorder.record(record(1));
        recorder.record(record(2));
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.last().map(|r| r.turn), Some(2));
    }

    #[test]
    fn test_export_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("turns.json");

        let mut recorder = MemoryRecorder::new();
        recorder.record(record(1));
        recorder.export_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["turns"][0]["common"]["threshold"], 12);
        assert!(value["exported_at"].is_string());
    }
}
