//! Per-process occupancy summary and JSON export of a trace.

use crate::trace::{QueueTrace, Series};
use anyhow::{Context, Result};
use num_format::{Locale, ToFormattedString};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Occupancy figures for a single process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub label: String,
    pub pid: u32,
    pub samples: usize,
    pub first_tick: Option<i64>,
    pub last_tick: Option<i64>,
    /// Number of samples seen at each queue level
    pub per_level: BTreeMap<i64, usize>,
    pub deepest: Option<i64>,
}

impl ProcessSummary {
    fn from_series(series: &Series) -> Self {
        let mut per_level = BTreeMap::new();
        for (_, level) in series.iter() {
            *per_level.entry(level).or_insert(0) += 1;
        }

        Self {
            label: series.label.clone(),
            pid: series.pid,
            samples: series.len(),
            first_tick: series.first_tick(),
            last_tick: series.last_tick(),
            deepest: per_level.keys().next_back().copied(),
            per_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSummary {
    pub processes: Vec<ProcessSummary>,
    /// Every queue level that occurs in the trace
    pub levels: Vec<i64>,
}

impl QueueSummary {
    pub fn from_trace(trace: &QueueTrace) -> Self {
        let processes: Vec<ProcessSummary> = trace
            .series()
            .iter()
            .map(ProcessSummary::from_series)
            .collect();
        let levels: BTreeSet<i64> = processes
            .iter()
            .flat_map(|p| p.per_level.keys().copied())
            .collect();

        Self {
            processes,
            levels: levels.into_iter().collect(),
        }
    }

    pub fn total_samples(&self) -> usize {
        self.processes.iter().map(|p| p.samples).sum()
    }

    /// Write the summary table
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "\n{}", "=".repeat(60))?;
        writeln!(out, "                  QUEUE OCCUPANCY SUMMARY")?;
        writeln!(out, "{}", "=".repeat(60))?;
        writeln!(
            out,
            "Processes: {}  Samples: {}",
            self.processes.len(),
            self.total_samples().to_formatted_string(&Locale::en)
        )?;
        writeln!(out)?;

        write!(
            out,
            "{:<5} {:>5} {:>8} {:>9} {:>9} {:>5}",
            "Proc", "PID", "Samples", "First", "Last", "Max"
        )?;
        for level in &self.levels {
            write!(out, " {:>8}", format!("Q{}", level))?;
        }
        writeln!(out)?;
        writeln!(out, "{}", "-".repeat(46 + 9 * self.levels.len()))?;

        for p in &self.processes {
            write!(
                out,
                "{:<5} {:>5} {:>8} {:>9} {:>9} {:>5}",
                p.label,
                p.pid,
                p.samples.to_formatted_string(&Locale::en),
                format_tick(p.first_tick),
                format_tick(p.last_tick),
                p.deepest.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
            )?;
            for level in &self.levels {
                let count = p.per_level.get(level).copied().unwrap_or(0);
                write!(out, " {:>8}", count.to_formatted_string(&Locale::en))?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    /// Write the summary table to stdout
    pub fn print(&self) -> std::io::Result<()> {
        let stdout = std::io::stdout();
        self.write_to(&mut stdout.lock())
    }
}

fn format_tick(tick: Option<i64>) -> String {
    tick.map(|t| t.to_formatted_string(&Locale::en))
        .unwrap_or_else(|| "-".to_string())
}

/// Write every series as JSON: `[{"pid", "label", "points": [[tick, level], ...]}]`
pub fn export_json<P: AsRef<Path>>(trace: &QueueTrace, path: P) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("Failed to create JSON export: {}", path.as_ref().display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, trace.series())?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
