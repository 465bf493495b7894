//! CLI options and the optional TOML config file carrying defaults.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use textel::canvas::config::{opt, CanvasMode, ColorExtractor, DitherMode};
use textel::color::{parse_packed_rgb, ColorSpace};
use textel::util::{Align, Tuck};

/// Render images as character art on the terminal.
#[derive(Parser, Debug)]
#[command(name = "textel", version, about)]
pub struct Cli {
    /// Input image files.
    pub files: Vec<String>,

    /// Read additional paths from FILE ('-' for stdin), one per line.
    #[arg(long = "files-from", value_name = "FILE")]
    pub files_from: Option<PathBuf>,

    /// Paths from --files-from are NUL-separated.
    #[arg(short = '0', long = "null")]
    pub null_separated: bool,

    /// Output size in cells, e.g. 80x24. Defaults to the terminal size.
    #[arg(short = 's', long, value_name = "WxH")]
    pub size: Option<String>,

    /// Color mode: none, 2, 8, 16, 16-8, 240, 256, full.
    #[arg(short = 'c', long, value_name = "MODE")]
    pub colors: Option<String>,

    /// Symbol selector, e.g. "block,border-wide" or "all-extra".
    #[arg(long, value_name = "SELECTORS")]
    pub symbols: Option<String>,

    /// Fill symbol selector used when the primary match is poor.
    #[arg(long, value_name = "SELECTORS")]
    pub fill: Option<String>,

    /// Assumed foreground color, e.g. "#c0c0c0".
    #[arg(long, value_name = "RGB")]
    pub fg: Option<String>,

    /// Assumed background color, e.g. "#000000".
    #[arg(long, value_name = "RGB")]
    pub bg: Option<String>,

    /// Render foreground colors only, leaving the background untouched.
    #[arg(long)]
    pub fg_only: bool,

    /// Dither mode: none, ordered, diffusion, noise.
    #[arg(long, value_name = "MODE")]
    pub dither: Option<String>,

    /// Dither grain size: 1, 2, 4 or 8 (or WxH of those).
    #[arg(long, value_name = "SIZE")]
    pub dither_grain: Option<String>,

    #[arg(long, value_name = "F")]
    pub dither_intensity: Option<f32>,

    /// Color extractor: average or median.
    #[arg(long, value_name = "EXTRACTOR")]
    pub color_extractor: Option<String>,

    /// Color space for matching: rgb or din99d.
    #[arg(long, value_name = "SPACE")]
    pub color_space: Option<String>,

    /// Matcher effort in [0, 1]; 1 is exhaustive.
    #[arg(short = 'w', long, value_name = "FACTOR")]
    pub work: Option<f32>,

    /// Worker thread count (default: available cores).
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Lay out images in a grid: COLSxROWS, COLS, or "auto".
    #[arg(short = 'g', long, value_name = "GRID")]
    pub grid: Option<String>,

    /// Print ellipsized filenames under grid tiles.
    #[arg(long)]
    pub label: bool,

    /// Horizontal alignment: start, center, end.
    #[arg(long, value_name = "ALIGN")]
    pub halign: Option<String>,

    /// Vertical alignment: start, center, end.
    #[arg(long, value_name = "ALIGN")]
    pub valign: Option<String>,

    /// Stretch images to the exact output size, ignoring aspect.
    #[arg(long)]
    pub stretch: bool,

    /// Allow enlarging small images.
    #[arg(long)]
    pub zoom: bool,

    /// Output optimization level: 0 (none), 1 (reuse attributes),
    /// 2 (everything).
    #[arg(short = 'O', long, value_name = "LEVEL")]
    pub optimize: Option<u8>,

    /// Probe the terminal for colors, sizes, and capabilities first.
    #[arg(long)]
    pub probe: bool,
}

/// Defaults read from `config.toml`; CLI flags override them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub colors: Option<String>,
    #[serde(default)]
    pub symbols: Option<String>,
    #[serde(default)]
    pub dither: Option<String>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub label: Option<bool>,
    #[serde(default)]
    pub work: Option<f32>,
}

impl FileConfig {
    pub fn config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("~/.config"));
        base.join("textel").join("config.toml")
    }

    /// Loads the config file if one exists. A broken file is reported and
    /// treated as absent rather than aborting the run.
    pub fn load_or_default() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| toml::from_str(&text).map_err(|e| e.to_string()));

        parsed.unwrap_or_else(|reason| {
            log::warn!("ignoring config file {}: {}", path.display(), reason);
            Self::default()
        })
    }
}

pub fn parse_canvas_mode(s: &str) -> Result<Option<CanvasMode>> {
    Ok(Some(match s {
        "none" => CanvasMode::FgBg,
        "2" => CanvasMode::FgBgBgFg,
        "8" => CanvasMode::Indexed8,
        "16" => CanvasMode::Indexed16,
        "16-8" | "16/8" => CanvasMode::Indexed16_8,
        "240" => CanvasMode::Indexed240,
        "256" => CanvasMode::Indexed256,
        "full" | "truecolor" | "24bit" => CanvasMode::Truecolor,
        "auto" => return Ok(None),
        other => bail!("unknown color mode {:?}", other),
    }))
}

pub fn parse_dither_mode(s: &str) -> Result<DitherMode> {
    Ok(match s {
        "none" => DitherMode::None,
        "ordered" | "bayer" => DitherMode::Ordered,
        "diffusion" | "fs" => DitherMode::Diffusion,
        "noise" => DitherMode::Noise,
        other => bail!("unknown dither mode {:?}", other),
    })
}

pub fn parse_color_extractor(s: &str) -> Result<ColorExtractor> {
    Ok(match s {
        "average" => ColorExtractor::Average,
        "median" => ColorExtractor::Median,
        other => bail!("unknown color extractor {:?}", other),
    })
}

pub fn parse_color_space(s: &str) -> Result<ColorSpace> {
    Ok(match s {
        "rgb" => ColorSpace::Rgb,
        "din99d" => ColorSpace::Din99d,
        other => bail!("unknown color space {:?}", other),
    })
}

pub fn parse_align(s: &str) -> Result<Align> {
    Ok(match s {
        "start" | "left" | "top" => Align::Start,
        "center" | "middle" => Align::Center,
        "end" | "right" | "bottom" => Align::End,
        other => bail!("unknown alignment {:?}", other),
    })
}

/// "WxH" with either side optional ("80x", "x24", "80x24").
pub fn parse_size(s: &str) -> Result<(i32, i32)> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .with_context(|| format!("size {:?} is not WxH", s))?;
    let parse_dim = |d: &str| -> Result<i32> {
        if d.is_empty() {
            return Ok(-1);
        }
        let v: i32 = d.parse().with_context(|| format!("bad dimension {:?}", d))?;
        if v < 1 {
            bail!("dimension must be positive: {}", v);
        }
        Ok(v)
    };
    Ok((parse_dim(w)?, parse_dim(h)?))
}

/// "COLSxROWS", a bare column count, or "auto".
pub fn parse_grid(s: &str) -> Result<(i32, i32)> {
    if s == "auto" {
        return Ok((-1, -1));
    }
    if let Ok(cols) = s.parse::<i32>() {
        if cols < 1 {
            bail!("grid columns must be positive");
        }
        return Ok((cols, -1));
    }
    parse_size(s)
}

pub fn parse_dither_grain(s: &str) -> Result<(i32, i32)> {
    if let Ok(n) = s.parse::<i32>() {
        return Ok((n, n));
    }
    parse_size(s)
}

pub fn parse_rgb(s: &str) -> Result<u32> {
    parse_packed_rgb(s).with_context(|| format!("bad color {:?} (expected #rrggbb)", s))
}

pub fn optimizations_for_level(level: u8) -> u32 {
    match level {
        0 => opt::NONE,
        1 => opt::REUSE_ATTRIBUTES,
        _ => opt::ALL,
    }
}

pub fn parse_tuck(stretch: bool, zoom: bool) -> Tuck {
    if stretch {
        Tuck::Stretch
    } else if zoom {
        Tuck::Fit
    } else {
        Tuck::ShrinkToFit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_forms() {
        assert_eq!(parse_size("80x24").unwrap(), (80, 24));
        assert_eq!(parse_size("80x").unwrap(), (80, -1));
        assert_eq!(parse_size("x24").unwrap(), (-1, 24));
        assert!(parse_size("80").is_err());
        assert!(parse_size("0x5").is_err());
    }

    #[test]
    fn grid_forms() {
        assert_eq!(parse_grid("auto").unwrap(), (-1, -1));
        assert_eq!(parse_grid("4").unwrap(), (4, -1));
        assert_eq!(parse_grid("4x3").unwrap(), (4, 3));
    }

    #[test]
    fn color_modes() {
        assert_eq!(
            parse_canvas_mode("16-8").unwrap(),
            Some(CanvasMode::Indexed16_8)
        );
        assert_eq!(parse_canvas_mode("auto").unwrap(), None);
        assert!(parse_canvas_mode("17").is_err());
    }

    #[test]
    fn optimize_levels() {
        assert_eq!(optimizations_for_level(0), opt::NONE);
        assert_eq!(optimizations_for_level(1), opt::REUSE_ATTRIBUTES);
        assert_eq!(optimizations_for_level(2), opt::ALL);
    }

    #[test]
    fn cli_parses_typical_invocation() {
        let cli = Cli::parse_from([
            "textel",
            "-c",
            "256",
            "--symbols",
            "block,border",
            "-s",
            "120x40",
            "--grid",
            "3",
            "--label",
            "a.png",
            "b.png",
        ]);
        assert_eq!(cli.files, vec!["a.png", "b.png"]);
        assert_eq!(cli.colors.as_deref(), Some("256"));
        assert_eq!(cli.grid.as_deref(), Some("3"));
        assert!(cli.label);
    }
}
