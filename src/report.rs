//! End-of-run summary, printed as "Final Statistics" and optionally written
//! as JSON.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::aggregate::{HistorySample, OccupancyCounts};
use crate::occupancy::Occupancy;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionSummary {
    pub region_id: u32,
    pub label: u32,
    pub occupancy: Occupancy,
    pub has_reference: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub last_timestamp_s: Option<f64>,
    pub sensitivity: f64,
    pub counts: OccupancyCounts,
    pub transitions: u64,
    pub regions: Vec<RegionSummary>,
    pub history: Vec<HistorySample>,
    pub history_evicted: u64,
}

impl RunSummary {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize run summary")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write run summary {}", path.display()))?;
        log::info!("run summary written to {}", path.display());
        Ok(())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Final Statistics")?;
        writeln!(f, "  frames processed: {}", self.frames_processed)?;
        if let Some(t) = self.last_timestamp_s {
            writeln!(f, "  stream time:      {:.2}s", t)?;
        }
        writeln!(f, "  total spaces:     {}", self.counts.total)?;
        writeln!(f, "  vacant:           {}", self.counts.vacant)?;
        writeln!(f, "  occupied:         {}", self.counts.occupied)?;
        writeln!(f, "  transitions:      {}", self.transitions)?;
        writeln!(f, "  sensitivity:      {:.1}", self.sensitivity)?;
        write!(f, "  history samples:  {}", self.history.len())?;
        if self.history_evicted > 0 {
            write!(f, " ({} evicted)", self.history_evicted)?;
        }
        Ok(())
    }
}
