//! Metric sinks
//!
//! Scalars are reported through [`MetricSink`]. Sink failures never stop a
//! run: [`emit`] logs them and carries on.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, warn};

use crate::utils::error::{CrossValError, Result};

pub trait MetricSink: Send + Sync {
    fn log_scalar(&self, name: &str, value: f64) -> Result<()>;
}

/// Report a scalar, logging instead of propagating sink errors
pub fn emit(sink: &dyn MetricSink, name: &str, value: f64) {
    if let Err(err) = sink.log_scalar(name, value) {
        warn!("Metric sink rejected {}={}: {}", name, value, err);
    }
}

/// Writes scalars to the debug log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricSink for TracingSink {
    fn log_scalar(&self, name: &str, value: f64) -> Result<()> {
        debug!(metric = name, value, "scalar");
        Ok(())
    }
}

#[derive(Serialize)]
struct MetricLine<'a> {
    timestamp: String,
    name: &'a str,
    value: f64,
}

/// Appends one JSON object per scalar to a file
pub struct JsonlMetricSink {
    file: Mutex<File>,
}

impl JsonlMetricSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl MetricSink for JsonlMetricSink {
    fn log_scalar(&self, name: &str, value: f64) -> Result<()> {
        let line = serde_json::to_string(&MetricLine {
            timestamp: Local::now().to_rfc3339(),
            name,
            value,
        })?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| CrossValError::Serialization("metrics file lock poisoned".into()))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Keeps every scalar in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(String, f64)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(String, f64)> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Every value logged under `name`, in order
    pub fn values(&self, name: &str) -> Vec<f64> {
        self.records()
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v)
            .collect()
    }
}

impl MetricSink for RecordingSink {
    fn log_scalar(&self, name: &str, value: f64) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| CrossValError::Serialization("recording sink lock poisoned".into()))?
            .push((name.to_string(), value));
        Ok(())
    }
}

/// Forwards every scalar to each inner sink; one failing sink does not block the others
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn MetricSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Box<dyn MetricSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl MetricSink for FanoutSink {
    fn log_scalar(&self, name: &str, value: f64) -> Result<()> {
        for sink in &self.sinks {
            emit(sink.as_ref(), name, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl MetricSink for FailingSink {
        fn log_scalar(&self, _name: &str, _value: f64) -> Result<()> {
            Err(CrossValError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "tracking server down",
            )))
        }
    }

    #[test]
    fn test_emit_swallows_sink_errors() {
        emit(&FailingSink, "train_loss", 0.5);
    }

    #[test]
    fn test_fanout_continues_after_failure() -> Result<()> {
        let fanout = FanoutSink::new()
            .with(Box::new(FailingSink))
            .with(Box::new(TracingSink));
        fanout.log_scalar("val_loss", 0.3)?;
        Ok(())
    }

    #[test]
    fn test_recording_sink_keeps_order() -> Result<()> {
        let sink = RecordingSink::new();
        sink.log_scalar("train_loss", 0.9)?;
        sink.log_scalar("val_loss", 0.8)?;
        sink.log_scalar("train_loss", 0.7)?;
        assert_eq!(sink.values("train_loss"), vec![0.9, 0.7]);
        assert_eq!(sink.records().len(), 3);
        Ok(())
    }

    #[test]
    fn test_jsonl_sink_writes_lines() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("metrics").join("run.jsonl");
        let sink = JsonlMetricSink::create(&path)?;
        sink.log_scalar("fold_1_accuracy", 0.75)?;
        sink.log_scalar("fold_1_f1_score", 0.7)?;

        let content = std::fs::read_to_string(&path)?;
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(serde_json::from_str)
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["name"], "fold_1_accuracy");
        assert_eq!(lines[1]["value"], 0.7);
        Ok(())
    }
}
