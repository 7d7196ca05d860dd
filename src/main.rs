//! Queue Plot - chart MLFQ scheduler queue occupancy over time.
//!
//! Reads a procdump CSV (`pid,queue,tick` per row) and draws one line per
//! tracked process on a dark-themed chart saved as PNG or SVG.

mod plot;
mod summary;
mod theme;
mod trace;

use anyhow::Result;
use clap::Parser;
use plot::{ChartConfig, RenderReport};
use std::path::PathBuf;
use summary::QueueSummary;
use trace::{ProcessSet, ProcessSetError, QueueTrace, MAX_PROCESSES};

/// Plot scheduler queue levels per process from a procdump CSV
#[derive(Parser, Debug)]
#[command(name = "queueplot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSV dump with `pid,queue,tick` rows
    #[arg(short, long, default_value = "procdump.csv")]
    input: PathBuf,

    /// Image to write (`.svg` for SVG, PNG otherwise)
    #[arg(short, long, default_value = "graph.png")]
    output: PathBuf,

    /// Lowest tracked process id (shown as P1)
    #[arg(long, default_value = "3")]
    first_pid: u32,

    /// Number of consecutive process ids to track
    #[arg(short = 'n', long, default_value = "8", value_parser = clap::value_parser!(u32).range(1..=MAX_PROCESSES as i64))]
    processes: u32,

    /// Output resolution in dots per inch
    #[arg(long, default_value = "600", value_parser = clap::value_parser!(u32).range(1..))]
    dpi: u32,

    /// Figure width in inches
    #[arg(long, default_value = "4.8")]
    width: f64,

    /// Figure height in inches
    #[arg(long, default_value = "2.4")]
    height: f64,

    /// Chart title
    #[arg(long, default_value = "MLFQ Scheduling Graph")]
    title: String,

    /// Queue levels marked on the y axis
    #[arg(long, value_delimiter = ',', default_value = "0,1,2,3,4")]
    y_ticks: Vec<i64>,

    /// TrueType font for chart text (a system monospace font is used otherwise)
    #[arg(long)]
    font: Option<PathBuf>,

    /// Print a per-process queue occupancy summary
    #[arg(long)]
    summary: bool,

    /// Also write the loaded series to a JSON file
    #[arg(long)]
    export_json: Option<PathBuf>,

    /// Suppress status messages
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn process_set(&self) -> Result<ProcessSet, ProcessSetError> {
        ProcessSet::new(self.first_pid, self.processes as usize)
    }

    fn chart_config(&self) -> ChartConfig {
        ChartConfig {
            title: self.title.clone(),
            y_ticks: self.y_ticks.clone(),
            dpi: self.dpi,
            width: self.width,
            height: self.height,
            font: self.font.clone(),
            ..ChartConfig::default()
        }
    }
}

fn run(args: &Args) -> Result<RenderReport> {
    if !args.width.is_finite() || !args.height.is_finite() || args.width <= 0.0 || args.height <= 0.0 {
        anyhow::bail!("Figure size must be positive, got {}x{} inches", args.width, args.height);
    }

    let processes = args.process_set()?;
    if !args.quiet {
        eprintln!("Loading samples from: {}", args.input.display());
    }
    // Fully loaded before anything is written, so a bad input leaves no output
    let trace = QueueTrace::load(&args.input, &processes)?;

    if !args.quiet {
        let active = trace.series().iter().filter(|s| !s.is_empty()).count();
        eprintln!(
            "Loaded {} samples for {}/{} processes (pids {}..={})",
            trace.total_points(),
            active,
            processes.count(),
            processes.first_pid(),
            processes.last_pid(),
        );
    }

    if trace.is_empty() {
        eprintln!(
            "Warning: no samples for pids {}..={} in {}",
            processes.first_pid(),
            processes.last_pid(),
            args.input.display()
        );
    }

    if args.summary {
        QueueSummary::from_trace(&trace).print()?;
    }

    if let Some(ref json_path) = args.export_json {
        summary::export_json(&trace, json_path)?;
        if !args.quiet {
            eprintln!("Series exported to: {}", json_path.display());
        }
    }

    let report = plot::render(&trace, &args.chart_config(), &args.output)?;
    if !report.labelled {
        eprintln!("Warning: no usable font found, chart rendered without text (use --font)");
    }
    if !args.quiet {
        eprintln!(
            "Generated {} chart ({}x{}, {} series): {}",
            report.format,
            report.width,
            report.height,
            report.series_drawn,
            report.path.display()
        );
    }

    Ok(report)
}

fn main() -> Result<()> {
    let args = Args::parse();
    run(&args)?;
    Ok(())
}
