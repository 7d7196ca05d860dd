//! Loading of per-process queue traces from procdump CSV files.
//!
//! Each row is `pid,queue,tick`. Rows for processes outside the tracked
//! range are dropped without looking at their other fields.

use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to open trace file {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read CSV record at line {line}")]
    Csv {
        line: u64,
        #[source]
        source: csv::Error,
    },
    #[error("Line {line}: missing {field} field")]
    MissingField { line: u64, field: &'static str },
    #[error("Line {line}: {field} '{value}' is not an integer")]
    InvalidNumber {
        line: u64,
        field: &'static str,
        value: String,
    },
}

/// Upper bound on tracked processes
pub const MAX_PROCESSES: usize = 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProcessSetError {
    #[error("Process count must be between 1 and {MAX_PROCESSES}, got {0}")]
    Count(usize),
    #[error("Pid range {first_pid} + {count} processes does not fit in a u32 pid")]
    Overflow { first_pid: u32, count: usize },
}

/// Contiguous range of process ids that get their own series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSet {
    first_pid: u32,
    count: usize,
}

impl Default for ProcessSet {
    /// pids 3..=10: the user processes spawned by the benchmark after init and sh
    fn default() -> Self {
        Self {
            first_pid: 3,
            count: 8,
        }
    }
}

impl ProcessSet {
    pub fn new(first_pid: u32, count: usize) -> Result<Self, ProcessSetError> {
        if count == 0 || count > MAX_PROCESSES {
            return Err(ProcessSetError::Count(count));
        }
        // every pid up to first_pid + count - 1 must be representable
        first_pid
            .checked_add(count as u32 - 1)
            .ok_or(ProcessSetError::Overflow { first_pid, count })?;
        Ok(Self { first_pid, count })
    }

    pub fn first_pid(&self) -> u32 {
        self.first_pid
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Slot index for `pid`, if it is tracked
    pub fn contains(&self, pid: u32) -> Option<usize> {
        let slot = pid.checked_sub(self.first_pid)? as usize;
        (slot < self.count).then_some(slot)
    }

    /// Display label for a slot, `P1` for the first tracked pid
    pub fn label(&self, slot: usize) -> String {
        format!("P{}", slot + 1)
    }

    pub fn last_pid(&self) -> u32 {
        self.first_pid + (self.count as u32 - 1)
    }

    pub fn pids(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.count as u32).map(move |slot| self.first_pid + slot)
    }
}

/// Queue level of one process, keyed by tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Series {
    pub pid: u32,
    pub label: String,
    #[serde(serialize_with = "serialize_points")]
    pub points: BTreeMap<i64, i64>,
}

fn serialize_points<S>(points: &BTreeMap<i64, i64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(points.iter().map(|(tick, level)| [*tick, *level]))
}

impl Series {
    fn new(pid: u32, label: String) -> Self {
        Self {
            pid,
            label,
            points: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Points in ascending tick order
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.points.iter().map(|(tick, level)| (*tick, *level))
    }

    pub fn first_tick(&self) -> Option<i64> {
        self.points.keys().next().copied()
    }

    pub fn last_tick(&self) -> Option<i64> {
        self.points.keys().next_back().copied()
    }
}

/// All tracked series, one per slot of the [`ProcessSet`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTrace {
    series: Vec<Series>,
}

impl QueueTrace {
    /// Load a trace from a procdump CSV file
    pub fn load<P: AsRef<Path>>(path: P, processes: &ProcessSet) -> Result<Self, LoadError> {
        let file = File::open(path.as_ref()).map_err(|source| LoadError::Open {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::from_reader(file, processes)
    }

    /// Parse a trace from any CSV source
    pub fn from_reader<R: Read>(reader: R, processes: &ProcessSet) -> Result<Self, LoadError> {
        let mut series: Vec<Series> = (0..processes.count)
            .zip(processes.pids())
            .map(|(slot, pid)| Series::new(pid, processes.label(slot)))
            .collect();

        // Blank lines are skipped by the csv reader itself
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut record = StringRecord::new();
        loop {
            let line = rdr.position().line();
            match rdr.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(source) => return Err(LoadError::Csv { line, source }),
            }
            let line = record.position().map(|p| p.line()).unwrap_or(line);

            // Only plain decimal digits name a process; "+3" or " 3" do not
            let Some(slot) = record
                .get(0)
                .filter(|pid| !pid.is_empty() && pid.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|pid| pid.parse::<u32>().ok())
                .and_then(|pid| processes.contains(pid))
            else {
                continue;
            };

            let level = parse_field(&record, 1, "queue", line)?;
            let tick = parse_field(&record, 2, "tick", line)?;
            series[slot].points.insert(tick, level);
        }

        Ok(Self { series })
    }

    pub fn series(&self) -> &[Series] {
        &self.series
    }

    /// True when no tracked process has any sample
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(Series::is_empty)
    }

    pub fn total_points(&self) -> usize {
        self.series.iter().map(Series::len).sum()
    }

    /// Lowest and highest tick over all series
    pub fn tick_range(&self) -> Option<(i64, i64)> {
        let first = self.series.iter().filter_map(Series::first_tick).min()?;
        let last = self.series.iter().filter_map(Series::last_tick).max()?;
        Some((first, last))
    }

    /// Lowest and highest queue level over all series
    pub fn level_range(&self) -> Option<(i64, i64)> {
        let mut levels = self.series.iter().flat_map(|s| s.points.values().copied());
        let first = levels.next()?;
        Some(levels.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}

fn parse_field(
    record: &StringRecord,
    index: usize,
    field: &'static str,
    line: u64,
) -> Result<i64, LoadError> {
    let raw = record
        .get(index)
        .ok_or(LoadError::MissingField { line, field })?;
    raw.trim().parse().map_err(|_| LoadError::InvalidNumber {
        line,
        field,
        value: raw.to_string(),
    })
}
