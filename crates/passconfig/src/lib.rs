//! TOML description of a texpass run: the target texture and the ordered
//! list of passes rendered into it.
//!
//! ```toml
//! version = 1
//!
//! [target]
//! width = 64
//! height = 64
//! format = "rgba_byte"
//!
//! [[passes]]
//! kind = "solid"
//! color = [1.0, 0.0, 0.5, 1.0]
//!
//! [[passes]]
//! kind = "invert"
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Storage preset of every texture in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatSetting {
    RByte,
    RgByte,
    RgbByte,
    #[default]
    RgbaByte,
    RFloat,
    RgFloat,
    RgbFloat,
    RgbaFloat,
}

impl FormatSetting {
    pub const ALL: [FormatSetting; 8] = [
        FormatSetting::RByte,
        FormatSetting::RgByte,
        FormatSetting::RgbByte,
        FormatSetting::RgbaByte,
        FormatSetting::RFloat,
        FormatSetting::RgFloat,
        FormatSetting::RgbFloat,
        FormatSetting::RgbaFloat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FormatSetting::RByte => "r_byte",
            FormatSetting::RgByte => "rg_byte",
            FormatSetting::RgbByte => "rgb_byte",
            FormatSetting::RgbaByte => "rgba_byte",
            FormatSetting::RFloat => "r_float",
            FormatSetting::RgFloat => "rg_float",
            FormatSetting::RgbFloat => "rgb_float",
            FormatSetting::RgbaFloat => "rgba_float",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            FormatSetting::RFloat
                | FormatSetting::RgFloat
                | FormatSetting::RgbFloat
                | FormatSetting::RgbaFloat
        )
    }
}

impl fmt::Display for FormatSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FormatSetting {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        FormatSetting::ALL
            .into_iter()
            .find(|setting| setting.name() == normalized)
            .ok_or_else(|| {
                let names: Vec<&str> = FormatSetting::ALL.iter().map(|s| s.name()).collect();
                format!("unknown format '{value}'; expected one of {}", names.join(", "))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterSetting {
    #[default]
    Nearest,
    Linear,
}

impl FilterSetting {
    pub fn name(self) -> &'static str {
        match self {
            FilterSetting::Nearest => "nearest",
            FilterSetting::Linear => "linear",
        }
    }
}

impl FromStr for FilterSetting {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(FilterSetting::Nearest),
            "linear" => Ok(FilterSetting::Linear),
            other => Err(format!("unknown filter '{other}'; expected nearest or linear")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TargetConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// 1 renders 2D textures; anything larger renders 3D volumes.
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default)]
    pub format: FormatSetting,
    #[serde(default)]
    pub filter: FilterSetting,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            depth: default_depth(),
            format: FormatSetting::default(),
            filter: FilterSetting::default(),
        }
    }
}

impl TargetConfig {
    pub fn is_volume(&self) -> bool {
        self.depth > 1
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PassStep {
    /// Fills the target with one color.
    Solid {
        #[serde(default = "default_color")]
        color: Vec<f32>,
    },
    /// Writes `1 - rgb` of the previous result, keeping alpha.
    Invert,
    /// Copies the previous result unchanged.
    Copy,
}

impl PassStep {
    pub fn name(&self) -> &'static str {
        match self {
            PassStep::Solid { .. } => "solid",
            PassStep::Invert => "invert",
            PassStep::Copy => "copy",
        }
    }

    /// Whether the step reads the previous result.
    pub fn needs_input(&self) -> bool {
        !matches!(self, PassStep::Solid { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PassConfig {
    pub version: u32,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default = "default_passes")]
    pub passes: Vec<PassStep>,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            target: TargetConfig::default(),
            passes: default_passes(),
        }
    }
}

fn default_width() -> u32 {
    64
}

fn default_height() -> u32 {
    64
}

fn default_depth() -> u32 {
    1
}

pub fn default_color() -> Vec<f32> {
    vec![1.0, 0.0, 0.5, 1.0]
}

/// Solid, then invert, then copy.
pub fn default_passes() -> Vec<PassStep> {
    vec![
        PassStep::Solid {
            color: default_color(),
        },
        PassStep::Invert,
        PassStep::Copy,
    ]
}

impl PassConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: PassConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        let target = &self.target;
        if target.width == 0 || target.height == 0 || target.depth == 0 {
            return Err(ConfigError::Invalid(format!(
                "target extent {}x{}x{} must be non-zero",
                target.width, target.height, target.depth
            )));
        }

        let Some(first) = self.passes.first() else {
            return Err(ConfigError::Invalid(
                "config must define at least one pass".into(),
            ));
        };
        if first.needs_input() {
            return Err(ConfigError::Invalid(format!(
                "first pass must be `solid`, found `{}`",
                first.name()
            )));
        }

        for (index, pass) in self.passes.iter().enumerate() {
            if let PassStep::Solid { color } = pass {
                if color.len() != 4 {
                    return Err(ConfigError::Invalid(format!(
                        "pass {index} color must have 4 components, found {}",
                        color.len()
                    )));
                }
                if color.iter().any(|component| !component.is_finite()) {
                    return Err(ConfigError::Invalid(format!(
                        "pass {index} color must be finite"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = PassConfig::from_toml_str(
            r#"
version = 1

[target]
width = 32
height = 16
depth = 4
format = "rgba_float"
filter = "linear"

[[passes]]
kind = "solid"
color = [0.25, 0.5, 0.75, 1.0]

[[passes]]
kind = "invert"

[[passes]]
kind = "copy"
"#,
        )
        .unwrap();

        assert_eq!(config.target.width, 32);
        assert_eq!(config.target.depth, 4);
        assert!(config.target.is_volume());
        assert_eq!(config.target.format, FormatSetting::RgbaFloat);
        assert_eq!(config.target.filter, FilterSetting::Linear);
        assert_eq!(
            config.passes,
            vec![
                PassStep::Solid {
                    color: vec![0.25, 0.5, 0.75, 1.0]
                },
                PassStep::Invert,
                PassStep::Copy,
            ]
        );
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = PassConfig::from_toml_str("version = 1\n").unwrap();
        assert_eq!(config, PassConfig::default());
        assert_eq!(config.target.format, FormatSetting::RgbaByte);
        assert!(!config.target.is_volume());
    }

    #[test]
    fn rejects_unknown_version() {
        let err = PassConfig::from_toml_str("version = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("version 2")));
    }

    #[test]
    fn rejects_zero_extent() {
        let err = PassConfig::from_toml_str("version = 1\n[target]\nwidth = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_pipeline_without_generator() {
        let err = PassConfig::from_toml_str("version = 1\n[[passes]]\nkind = \"invert\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("first pass")));

        let err = PassConfig::from_toml_str("version = 1\npasses = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("at least one pass")));
    }

    #[test]
    fn rejects_short_colors() {
        let err = PassConfig::from_toml_str(
            "version = 1\n[[passes]]\nkind = \"solid\"\ncolor = [1.0, 0.0]\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("4 components")));
    }

    #[test]
    fn rejects_unknown_format_and_kind() {
        assert!(matches!(
            PassConfig::from_toml_str("version = 1\n[target]\nformat = \"rgba16\"\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            PassConfig::from_toml_str("version = 1\n[[passes]]\nkind = \"blur\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn format_names_match_serde_names() {
        for (name, setting) in [
            ("r_byte", FormatSetting::RByte),
            ("rgb_float", FormatSetting::RgbFloat),
        ] {
            let parsed: TargetConfig = toml::from_str(&format!("format = \"{name}\"")).unwrap();
            assert_eq!(parsed.format, setting);
            assert_eq!(setting.name(), name);
        }
        assert_eq!("RGBA_Float".parse::<FormatSetting>(), Ok(FormatSetting::RgbaFloat));
        assert!("rgba16".parse::<FormatSetting>().is_err());
        assert_eq!(" linear ".parse::<FilterSetting>(), Ok(FilterSetting::Linear));
        assert!(FormatSetting::RgFloat.is_float());
        assert!(!FormatSetting::RgByte.is_float());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passes.toml");
        std::fs::write(&path, "version = 1\n[target]\nwidth = 8\nheight = 8\n").unwrap();
        let config = PassConfig::load(&path).unwrap();
        assert_eq!(config.target.width, 8);

        let missing = PassConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
