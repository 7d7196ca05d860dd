//! Dark chart theme and font registration.

use anyhow::{anyhow, Context, Result};
use plotters::style::{register_font, FontStyle, RGBColor};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Family name every text style in the chart is drawn with
pub const FONT_FAMILY: &str = "monospace";

/// Monospace fonts tried when no font is given on the command line
const SYSTEM_FONTS: &[&str] = &[
    "C:\\Windows\\Fonts\\consola.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu-sans-mono-fonts/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/usr/share/fonts/liberation-mono/LiberationMono-Regular.ttf",
    "/usr/share/fonts/TTF/LiberationMono-Regular.ttf",
    "/Library/Fonts/Menlo.ttc",
    "/System/Library/Fonts/Menlo.ttc",
];

static REGISTERED: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Colors and sizes of the chart. Sizes are in points.
#[derive(Debug, Clone)]
pub struct Theme {
    pub background: RGBColor,
    pub foreground: RGBColor,
    pub palette: Vec<RGBColor>,
    pub title_size: f64,
    pub label_size: f64,
    pub tick_size: f64,
    pub legend_size: f64,
    pub line_width: f64,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: RGBColor(0x1c, 0x1d, 0x27),
            foreground: RGBColor(0xab, 0xb2, 0xbf),
            palette: vec![
                RGBColor(0xc6, 0x78, 0xdd), // purple
                RGBColor(0xe5, 0xc0, 0x7b), // yellow
                RGBColor(0xe0, 0x6c, 0x75), // red
                RGBColor(0x56, 0xb6, 0xc2), // cyan
                RGBColor(0x98, 0xc3, 0x79), // green
                RGBColor(0x61, 0xaf, 0xef), // blue
                RGBColor(0xd1, 0x9a, 0x66), // orange
                RGBColor(0xab, 0xb2, 0xbf), // grey
            ],
            title_size: 10.0,
            label_size: 8.0,
            tick_size: 8.0,
            legend_size: 6.0,
            line_width: 0.6,
        }
    }
}

impl Theme {
    /// Line color for the series in `slot`, cycling through the palette
    pub fn series_color(&self, slot: usize) -> RGBColor {
        self.palette[slot % self.palette.len()]
    }
}

/// Well-known monospace font locations, Consolas first
pub fn system_fonts() -> Vec<PathBuf> {
    SYSTEM_FONTS.iter().map(PathBuf::from).collect()
}

/// Register a font for [`FONT_FAMILY`].
///
/// An explicit path must load. Otherwise `search` is tried in order, and
/// `None` means no text can be drawn.
pub fn load_font(explicit: Option<&Path>, search: &[PathBuf]) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        register_font_file(path)?;
        return Ok(Some(path.to_path_buf()));
    }

    for candidate in search {
        if candidate.is_file() && register_font_file(candidate).is_ok() {
            return Ok(Some(candidate.clone()));
        }
    }

    Ok(None)
}

fn register_font_file(path: &Path) -> Result<()> {
    let mut registered = REGISTERED
        .lock()
        .map_err(|_| anyhow!("Font registry lock poisoned"))?;
    if registered.as_deref() == Some(path) {
        return Ok(());
    }

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read font file: {}", path.display()))?;
    // plotters holds registered fonts for the rest of the process
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    register_font(FONT_FAMILY, FontStyle::Normal, bytes)
        .map_err(|_| anyhow!("Not a usable TrueType font: {}", path.display()))?;

    *registered = Some(path.to_path_buf());
    Ok(())
}
