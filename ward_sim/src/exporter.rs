//! JSON exporter for offline inspection of a run.
//!
//! One frame per completed tick; the file is written once, at the end.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use ward_core::{SystemStatus, TickReport};

/// A single completed tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickFrame {
    /// Context time at the end of the tick, in seconds
    pub time_sec: f64,

    #[serde(flatten)]
    pub report: TickReport,
}

/// Complete run export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickExport {
    /// Seed used (0 = OS entropy)
    pub seed: u64,

    pub cohort_size: usize,

    pub interval_ms: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<TickFrame>,

    /// Ticks that aborted before broadcasting
    pub failed_ticks: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_status: Option<SystemStatus>,
}

impl TickExport {
    /// Creates a new export container.
    pub fn new(seed: u64, cohort_size: usize, interval_ms: u64) -> Self {
        Self {
            seed,
            cohort_size,
            interval_ms,
            duration_sec: 0.0,
            frames: Vec::new(),
            failed_ticks: 0,
            final_status: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, time_sec: f64, report: TickReport) {
        self.duration_sec = time_sec;
        self.frames.push(TickFrame { time_sec, report });
    }

    pub fn record_failure(&mut self) {
        self.failed_ticks += 1;
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, status: SystemStatus) {
        self.final_status = Some(status);
    }

    /// Sum of per-tick persistence failures.
    pub fn persistence_failures(&self) -> usize {
        self.frames.iter().map(|f| f.report.persistence_failures).sum()
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
