//! Queue occupancy chart rendering.

use crate::theme::{self, Theme, FONT_FAMILY};
use crate::trace::QueueTrace;
use anyhow::{Context, Result};
use plotters::coord::ranged1d::{DefaultFormatting, KeyPointHint, Ranged};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Image format, picked from the output file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Svg,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("svg") => OutputFormat::Svg,
            _ => OutputFormat::Png,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Png => write!(f, "PNG"),
            OutputFormat::Svg => write!(f, "SVG"),
        }
    }
}

/// What goes on the chart and how big it is
#[derive(Debug, Clone)]
pub struct ChartConfig {
    pub title: String,
    pub x_desc: String,
    pub y_desc: String,
    pub y_ticks: Vec<i64>,
    pub dpi: u32,
    /// Figure width in inches
    pub width: f64,
    /// Figure height in inches
    pub height: f64,
    pub font: Option<PathBuf>,
    /// Fonts tried in order when `font` is not set
    pub font_search: Vec<PathBuf>,
    pub theme: Theme,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            title: "MLFQ Scheduling Graph".to_string(),
            x_desc: "Ticks".to_string(),
            y_desc: "Queue".to_string(),
            y_ticks: vec![0, 1, 2, 3, 4],
            dpi: 600,
            width: 4.8,
            height: 2.4,
            font: None,
            font_search: theme::system_fonts(),
            theme: Theme::default(),
        }
    }
}

impl ChartConfig {
    /// Output size in pixels
    pub fn pixel_size(&self) -> (u32, u32) {
        let dpi = f64::from(self.dpi);
        (
            (self.width * dpi).round().max(1.0) as u32,
            (self.height * dpi).round().max(1.0) as u32,
        )
    }

    /// Convert a size in points to pixels at the configured resolution
    fn px(&self, points: f64) -> f64 {
        points * f64::from(self.dpi) / 72.0
    }
}

#[derive(Debug, Clone)]
pub struct RenderReport {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// False when no font was available and the chart has no text
    pub labelled: bool,
    pub series_drawn: usize,
}

/// Render `trace` to `path`
pub fn render<P: AsRef<Path>>(trace: &QueueTrace, config: &ChartConfig, path: P) -> Result<RenderReport> {
    let path = path.as_ref();
    let format = OutputFormat::from_path(path);
    let (width, height) = config.pixel_size();
    let labelled = theme::load_font(config.font.as_deref(), &config.font_search)?.is_some();

    let series_drawn = match format {
        OutputFormat::Png => {
            let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
            draw_chart(root, trace, config, labelled)
        }
        OutputFormat::Svg => {
            let root = SVGBackend::new(path, (width, height)).into_drawing_area();
            draw_chart(root, trace, config, labelled)
        }
    }
    .with_context(|| format!("Failed to render chart to {}", path.display()))?;

    Ok(RenderReport {
        path: path.to_path_buf(),
        format,
        width,
        height,
        labelled,
        series_drawn,
    })
}

fn draw_chart<DB>(
    root: DrawingArea<DB, Shift>,
    trace: &QueueTrace,
    config: &ChartConfig,
    labelled: bool,
) -> Result<usize>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let theme = &config.theme;
    let line_px = config.px(theme.line_width).round().max(1.0) as u32;
    let axis_style = theme.foreground.stroke_width(line_px);

    root.fill(&theme.background)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(config.px(12.0) as u32);
    if labelled {
        builder
            .caption(
                &config.title,
                (FONT_FAMILY, config.px(theme.title_size))
                    .into_font()
                    .color(&theme.foreground),
            )
            .x_label_area_size(config.px(26.0) as u32)
            .y_label_area_size(config.px(30.0) as u32);
    }

    let mut chart = builder.build_cartesian_2d(
        x_range(trace),
        FixedTicks::new(y_range(trace, &config.y_ticks), &config.y_ticks),
    )?;

    if labelled {
        let tick_font = (FONT_FAMILY, config.px(theme.tick_size))
            .into_font()
            .color(&theme.foreground);
        let desc_font = (FONT_FAMILY, config.px(theme.label_size))
            .into_font()
            .color(&theme.foreground);

        chart
            .configure_mesh()
            .disable_mesh()
            .axis_style(axis_style)
            .set_all_tick_mark_size(config.px(3.5) as i32)
            .x_labels(8)
            .y_labels(config.y_ticks.len().max(1))
            .x_label_formatter(&|x| format!("{:.0}", x))
            .y_label_formatter(&|y| format!("{:.0}", y))
            .label_style(tick_font)
            .x_desc(config.x_desc.as_str())
            .y_desc(config.y_desc.as_str())
            .axis_desc_style(desc_font)
            .draw()?;
    }

    let legend_len = config.px(14.0) as i32;
    let mut series_drawn = 0;
    for (slot, series) in trace.series().iter().enumerate() {
        if series.is_empty() {
            continue;
        }
        let style = theme.series_color(slot).stroke_width(line_px);
        let anno = chart.draw_series(LineSeries::new(
            series.iter().map(|(tick, level)| (tick as f64, level as f64)),
            style,
        ))?;
        if labelled {
            anno.label(series.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + legend_len, y)], style));
        }
        series_drawn += 1;
    }

    // Spines on all four sides
    let (xs, ys) = (chart.x_range(), chart.y_range());
    chart.draw_series(std::iter::once(Rectangle::new(
        [(xs.start, ys.start), (xs.end, ys.end)],
        axis_style,
    )))?;

    if labelled && series_drawn > 0 {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerRight)
            .margin(config.px(4.0) as u32)
            .legend_area_size(config.px(16.0) as u32)
            .label_font(
                (FONT_FAMILY, config.px(theme.legend_size))
                    .into_font()
                    .color(&theme.foreground),
            )
            .background_style(theme.background.filled())
            .border_style(theme.background)
            .draw()?;
    }

    root.present()?;
    Ok(series_drawn)
}

/// Linear f64 axis whose key points are a fixed list of values
#[derive(Debug, Clone)]
pub struct FixedTicks {
    range: Range<f64>,
    ticks: Vec<f64>,
}

impl FixedTicks {
    pub fn new(range: Range<f64>, ticks: &[i64]) -> Self {
        let mut ticks: Vec<f64> = ticks
            .iter()
            .map(|&t| t as f64)
            .filter(|t| range.start <= *t && *t <= range.end)
            .collect();
        ticks.sort_by(f64::total_cmp);
        ticks.dedup();
        Self { range, ticks }
    }
}

impl Ranged for FixedTicks {
    type FormatOption = DefaultFormatting;
    type ValueType = f64;

    fn map(&self, value: &f64, limit: (i32, i32)) -> i32 {
        let span = self.range.end - self.range.start;
        if span <= 0.0 {
            return limit.0;
        }
        let frac = (value - self.range.start) / span;
        limit.0 + (f64::from(limit.1 - limit.0) * frac + 1e-3).floor() as i32
    }

    fn key_points<Hint: KeyPointHint>(&self, hint: Hint) -> Vec<f64> {
        if hint.max_num_points() == 0 {
            return Vec::new();
        }
        self.ticks.clone()
    }

    fn range(&self) -> Range<f64> {
        self.range.clone()
    }
}

/// Tick axis: span of all samples plus a 5% margin
fn x_range(trace: &QueueTrace) -> Range<f64> {
    match trace.tick_range() {
        Some((lo, hi)) if lo < hi => padded(lo, hi, 0.0),
        Some((tick, _)) => padded(tick, tick, 1.0),
        None => 0.0..1.0,
    }
}

/// Queue axis: covers the fixed ticks and any level outside them
fn y_range(trace: &QueueTrace, ticks: &[i64]) -> Range<f64> {
    let fixed = ticks
        .iter()
        .fold(None, |acc: Option<(i64, i64)>, &t| match acc {
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
            None => Some((t, t)),
        });
    let (lo, hi) = match (fixed, trace.level_range()) {
        (Some((a, b)), Some((c, d))) => (a.min(c), b.max(d)),
        (Some(r), None) | (None, Some(r)) => r,
        (None, None) => (0, 1),
    };
    padded(lo, hi, 0.2)
}

/// Widen `lo..=hi` by 5% of its span, at least `min_pad`.
///
/// The span is taken in f64 so the full i64 range cannot overflow, and the
/// pad never drops below the f64 spacing at the ends of the range.
fn padded(lo: i64, hi: i64, min_pad: f64) -> Range<f64> {
    let (lo, hi) = (lo as f64, hi as f64);
    let pad = ((hi - lo) * 0.05)
        .max(min_pad)
        .max(lo.abs().max(hi.abs()) * 1e-6);
    lo - pad..hi + pad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::ProcessSet;

    fn fixture() -> QueueTrace {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("test/procdump.csv");
        QueueTrace::load(path, &ProcessSet::default()).unwrap()
    }

    #[test]
    fn test_default_size_is_twice_as_wide() {
        let config = ChartConfig::default();
        assert_eq!(config.pixel_size(), (2880, 1440));
    }

    #[test]
    fn test_points_scale_with_dpi() {
        let config = ChartConfig {
            dpi: 72,
            ..ChartConfig::default()
        };
        assert_eq!(config.px(8.0), 8.0);
        assert_eq!(config.pixel_size(), (346, 173));
    }

    #[test]
    fn test_output_format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("graph.png")), OutputFormat::Png);
        assert_eq!(OutputFormat::from_path(Path::new("graph.SVG")), OutputFormat::Svg);
        assert_eq!(OutputFormat::from_path(Path::new("graph")), OutputFormat::Png);
    }

    #[test]
    fn test_ranges() {
        let trace = QueueTrace::from_reader("3,1,0\n3,2,100\n".as_bytes(), &ProcessSet::default())
            .unwrap();
        assert_eq!(x_range(&trace), -5.0..105.0);
        assert_eq!(y_range(&trace, &[0, 1, 2, 3, 4]), -0.2..4.2);

        let empty = QueueTrace::from_reader("".as_bytes(), &ProcessSet::default()).unwrap();
        assert_eq!(x_range(&empty), 0.0..1.0);
    }

    #[test]
    fn test_y_axis_key_points_are_fixed_ticks() {
        let axis = FixedTicks::new(-0.2..4.2, &[4, 0, 2, 1, 3, 2]);
        assert_eq!(axis.key_points(10usize), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(axis.key_points(0usize), Vec::<f64>::new());
        assert_eq!(axis.range(), -0.2..4.2);
    }

    #[test]
    fn test_y_axis_maps_linearly() {
        let axis = FixedTicks::new(0.0..4.0, &[0, 4]);
        assert_eq!(axis.map(&0.0, (0, 400)), 0);
        assert_eq!(axis.map(&2.0, (0, 400)), 200);
        assert_eq!(axis.map(&4.0, (400, 0)), 0);
    }

    #[test]
    fn test_ranges_survive_extreme_values() {
        let csv = format!("3,{},{}\n3,{},{}\n", i64::MIN, i64::MIN, i64::MAX, i64::MAX);
        let trace = QueueTrace::from_reader(csv.as_bytes(), &ProcessSet::default()).unwrap();

        for range in [x_range(&trace), y_range(&trace, &[0, 1, 2, 3, 4])] {
            assert!(range.start.is_finite() && range.end.is_finite());
            assert!(range.start < i64::MIN as f64);
            assert!(range.end > i64::MAX as f64);
        }

        let single = QueueTrace::from_reader(
            format!("3,{},{}\n", i64::MAX, i64::MAX).as_bytes(),
            &ProcessSet::default(),
        )
        .unwrap();
        let range = x_range(&single);
        assert!(range.start < range.end);
    }

    #[test]
    fn test_y_range_grows_past_fixed_ticks() {
        let trace = QueueTrace::from_reader("3,6,0\n".as_bytes(), &ProcessSet::default()).unwrap();
        let range = y_range(&trace, &[0, 1, 2, 3, 4]);
        assert!(range.start < 0.0);
        assert!(range.end > 6.0);
    }

    #[test]
    fn test_render_png_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("graph.png");
        let config = ChartConfig {
            dpi: 100,
            ..ChartConfig::default()
        };

        let report = render(&fixture(), &config, &out).unwrap();

        assert_eq!(report.format, OutputFormat::Png);
        assert_eq!(report.series_drawn, 8);
        assert_eq!((report.width, report.height), (480, 240));
        assert!(std::fs::metadata(&out).unwrap().len() > 0);
    }

    #[test]
    fn test_render_svg_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("graph.svg");
        let config = ChartConfig {
            dpi: 100,
            ..ChartConfig::default()
        };

        let report = render(&fixture(), &config, &out).unwrap();

        assert_eq!(report.format, OutputFormat::Svg);
        let svg = std::fs::read_to_string(&out).unwrap();
        assert!(svg.starts_with("<svg"));
    }

    #[test]
    fn test_render_empty_trace() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("empty.png");
        let trace = QueueTrace::from_reader("".as_bytes(), &ProcessSet::default()).unwrap();
        let config = ChartConfig {
            dpi: 50,
            ..ChartConfig::default()
        };

        let report = render(&trace, &config, &out).unwrap();
        assert_eq!(report.series_drawn, 0);
        assert!(out.exists());
    }

    #[test]
    fn test_render_extreme_ticks_and_levels() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChartConfig {
            dpi: 50,
            font_search: Vec::new(),
            ..ChartConfig::default()
        };
        let ticks = format!("3,0,{}\n3,1,{}\n", i64::MIN, i64::MAX);
        let levels = format!("4,{},0\n4,{},1\n", i64::MIN, i64::MAX);

        for (name, csv) in [("ticks.png", ticks), ("levels.png", levels)] {
            let trace = QueueTrace::from_reader(csv.as_bytes(), &ProcessSet::default()).unwrap();
            let out = dir.path().join(name);
            let report = render(&trace, &config, &out).unwrap();
            assert_eq!(report.series_drawn, 1);
            assert!(std::fs::metadata(&out).unwrap().len() > 0);
        }
    }

    #[test]
    fn test_render_without_font() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("plain.png");
        let config = ChartConfig {
            dpi: 100,
            font_search: Vec::new(),
            ..ChartConfig::default()
        };

        let report = render(&fixture(), &config, &out).unwrap();

        assert!(!report.labelled);
        assert_eq!(report.series_drawn, 8);
        assert!(std::fs::metadata(&out).unwrap().len() > 0);
    }

    #[test]
    fn test_labels_and_legend_in_svg() {
        let Some(font) = theme::system_fonts().into_iter().find(|p| p.is_file()) else {
            // nothing to label with on this host
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("graph.svg");
        let config = ChartConfig {
            dpi: 100,
            font: Some(font),
            ..ChartConfig::default()
        };

        let report = render(&fixture(), &config, &out).unwrap();
        assert!(report.labelled);

        let svg = std::fs::read_to_string(&out).unwrap();
        assert!(svg.contains("MLFQ Scheduling Graph"));
        assert!(svg.contains("Ticks"));
        assert!(svg.contains("Queue"));
        for label in ["P1", "P4", "P8"] {
            assert!(svg.contains(&format!(">{}<", label)), "legend misses {label}");
        }
        for tick in ["0", "1", "2", "3", "4"] {
            assert!(svg.contains(&format!(">{}<", tick)), "y axis misses {tick}");
        }
    }

    #[test]
    fn test_unwritable_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("missing").join("graph.png");
        let config = ChartConfig {
            dpi: 50,
            ..ChartConfig::default()
        };
        assert!(render(&fixture(), &config, &out).is_err());
    }
}
