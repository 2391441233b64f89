use std::path::PathBuf;

use clap::Parser;
use passconfig::{FilterSetting, FormatSetting};

#[derive(Parser, Debug)]
#[command(
    name = "texpass",
    author,
    version,
    about = "Render full-screen shader passes into textures and save the result"
)]
pub struct Cli {
    /// Pass description TOML; the flags below override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Storage preset for every texture (`rgba_byte`, `r_float`, ...).
    #[arg(long, value_name = "PRESET", value_parser = parse_format)]
    pub format: Option<FormatSetting>,

    /// Target extent (e.g. `64x64`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Number of depth slices; anything above 1 renders 3D volumes.
    #[arg(long, value_name = "N")]
    pub depth: Option<u32>,

    /// Sampler filtering for the allocated textures.
    #[arg(long, value_name = "nearest|linear", value_parser = parse_filter)]
    pub filter: Option<FilterSetting>,

    /// Comma separated pass sequence (e.g. `solid,invert,copy`).
    #[arg(long, value_name = "LIST", value_delimiter = ',', value_parser = parse_pass)]
    pub passes: Option<Vec<PassName>>,

    /// Color written by `solid` passes, four components in 0..1.
    #[arg(long, value_name = "R,G,B,A", value_parser = parse_color)]
    pub color: Option<[f32; 4]>,

    /// PNG file receiving the displayed result.
    #[arg(long, value_name = "PATH", default_value = "texpass.png")]
    pub output: PathBuf,

    /// Validate and print the plan as JSON without touching the GPU.
    #[arg(long)]
    pub check: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassName {
    Solid,
    Invert,
    Copy,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_format(value: &str) -> Result<FormatSetting, String> {
    if value.trim().is_empty() {
        return Err("format must not be empty".to_string());
    }
    value.parse()
}

pub fn parse_filter(value: &str) -> Result<FilterSetting, String> {
    if value.trim().is_empty() {
        return Err("filter must not be empty".to_string());
    }
    value.parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let normalized = trimmed.to_ascii_lowercase();
    let (width, height) = normalized
        .split_once('x')
        .ok_or_else(|| format!("invalid size '{trimmed}'; expected WIDTHxHEIGHT"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err(format!("size '{trimmed}' must be non-zero"));
    }
    Ok((width, height))
}

pub fn parse_pass(value: &str) -> Result<PassName, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("pass name must not be empty".to_string());
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "solid" => Ok(PassName::Solid),
        "invert" => Ok(PassName::Invert),
        "copy" => Ok(PassName::Copy),
        other => Err(format!(
            "unknown pass '{other}'; expected solid, invert, or copy"
        )),
    }
}

pub fn parse_color(value: &str) -> Result<[f32; 4], String> {
    let components = value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|_| format!("invalid color component '{}'", part.trim()))
        })
        .collect::<Result<Vec<f32>, String>>()?;
    let color: [f32; 4] = components
        .try_into()
        .map_err(|parts: Vec<f32>| format!("color needs 4 components, got {}", parts.len()))?;
    if color.iter().any(|component| !component.is_finite()) {
        return Err("color components must be finite".to_string());
    }
    Ok(color)
}
