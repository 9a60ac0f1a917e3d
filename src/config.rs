//! Configuration file loading.
//!
//! All settings live in one TOML file (default `reservoir_charts.toml` in
//! the working directory). Every section and key is optional. Command-line
//! flags, and the environment variables behind them, are applied on top by
//! the binary.
//!
//! ```toml
//! [source]
//! locator = "reservoirs.db"        # or an http(s):// URL
//!
//! [grouping]
//! malformed = "skip"               # or "reject"
//!
//! [render]
//! format = "html"
//! output = "dashboard.html"
//!
//! [axes]
//! layout = "stacked"               # or "single_panel", or custom tables:
//! # [[axes.panels]]  top_pct = 10  height_pct = 80
//! # [[axes.axes]]    fields = ["water_level"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alert::staleness::FreshnessConfig;
use crate::analysis::groupings::MalformedPolicy;
use crate::chart::axis::{AxisLayout, Panel, ValueAxis};
use crate::chart::series::SeriesOptions;
use crate::logging::LogLevel;
use crate::model::ChartError;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "reservoir_charts.toml";

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub grouping: GroupingConfig,
    pub render: RenderConfig,
    pub freshness: FreshnessConfig,
    pub logging: LoggingConfig,
    pub axes: AxesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Local path or http(s) URL of the SQLite database.
    pub locator: String,
    pub http_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            locator: "reservoirs.db".to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl SourceConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    pub malformed: MalformedPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Html,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub format: OutputFormat,
    /// Output file; `-` writes JSON to stdout.
    pub output: PathBuf,
    pub page_title: String,
    pub echarts_url: String,
    pub chart_height_px: u32,
    /// Fixed card width; unset keeps charts as wide as the page.
    pub chart_width_px: Option<u32>,
    #[serde(flatten)]
    pub series: SeriesOptions,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            format: OutputFormat::Html,
            output: PathBuf::from("dashboard.html"),
            page_title: "雅砻江梯级水库运行监测".to_string(),
            echarts_url: "https://cdn.jsdelivr.net/npm/echarts@5/dist/echarts.min.js".to_string(),
            chart_height_px: 520,
            chart_width_px: None,
            series: SeriesOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            file: None,
            timestamps: false,
        }
    }
}

/// Either a preset name or a full custom layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxesConfig {
    pub layout: Option<String>,
    pub panels: Vec<Panel>,
    pub axes: Vec<ValueAxis>,
}

impl AxesConfig {
    /// Resolves and validates the layout. Custom axes win over a preset
    /// name; with neither, the stacked preset is used.
    pub fn resolve(&self) -> Result<AxisLayout, ChartError> {
        let layout = if !self.axes.is_empty() {
            if self.layout.is_some() {
                return Err(ChartError::Config(
                    "[axes] sets both a preset 'layout' and custom axes".to_string(),
                ));
            }
            let panels = if self.panels.is_empty() {
                vec![Panel { top_pct: 12, height_pct: 70 }]
            } else {
                self.panels.clone()
            };
            AxisLayout {
                panels,
                axes: self.axes.clone(),
            }
        } else {
            let name = self.layout.as_deref().unwrap_or("stacked");
            AxisLayout::preset(name)
                .ok_or_else(|| ChartError::Config(format!("unknown axis layout '{}'", name)))?
        };
        layout.validate()?;
        Ok(layout)
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AppConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ChartError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads `path`, or `reservoir_charts.toml` if present, or defaults.
    /// An explicitly named file that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ChartError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.is_file() {
                    return Ok(AppConfig::default());
                }
                fallback
            }
        };

        let text = fs::read_to_string(&path).map_err(|e| {
            ChartError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Measurement;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.axes.resolve().unwrap(), AxisLayout::stacked());
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [source]
            locator = "https://example.org/reservoirs.db"

            [grouping]
            malformed = "reject"

            [render]
            format = "json"
            output = "-"
            connect_nulls = true

            [logging]
            level = "warn"
            "#,
        )
        .unwrap();
        assert_eq!(config.source.locator, "https://example.org/reservoirs.db");
        assert_eq!(config.source.http_timeout_secs, 30);
        assert_eq!(config.grouping.malformed, MalformedPolicy::Reject);
        assert_eq!(config.render.format, OutputFormat::Json);
        assert!(config.render.series.connect_nulls);
        assert!(config.render.series.show_pool_level, "unset keys keep defaults");
        assert_eq!(config.logging.level, LogLevel::Warning);
    }

    #[test]
    fn test_preset_by_name() {
        let config = AppConfig::from_toml_str("[axes]\nlayout = \"single_panel\"").unwrap();
        assert_eq!(config.axes.resolve().unwrap(), AxisLayout::single_panel());
    }

    #[test]
    fn test_unknown_preset_is_config_error() {
        let config = AppConfig::from_toml_str("[axes]\nlayout = \"triple\"").unwrap();
        assert!(matches!(config.axes.resolve(), Err(ChartError::Config(_))));
    }

    #[test]
    fn test_custom_axes() {
        let config = AppConfig::from_toml_str(
            r#"
            [[axes.axes]]
            name = "Level"
            fields = ["water_level"]

            [[axes.axes]]
            side = "right"
            fields = ["capacity_level"]
            "#,
        )
        .unwrap();
        let layout = config.axes.resolve().unwrap();
        assert_eq!(layout.panels.len(), 1);
        assert_eq!(layout.axes[1].fields, vec![Measurement::Storage]);
        assert_eq!(layout.unplotted(), vec![Measurement::Inflow, Measurement::Outflow]);
    }

    #[test]
    fn test_invalid_custom_axes_are_rejected() {
        let config = AppConfig::from_toml_str(
            r#"
            [[axes.axes]]
            fields = ["water_level", "inflow"]
            "#,
        )
        .unwrap();
        assert!(config.axes.resolve().is_err());
    }

    #[test]
    fn test_preset_and_custom_axes_conflict() {
        let config = AppConfig::from_toml_str(
            r#"
            [axes]
            layout = "stacked"
            [[axes.axes]]
            fields = ["water_level"]
            "#,
        )
        .unwrap();
        assert!(config.axes.resolve().is_err());
    }

    #[test]
    fn test_unknown_measurement_is_parse_error() {
        let result = AppConfig::from_toml_str("[[axes.axes]]\nfields = [\"percentage\"]");
        assert!(matches!(result, Err(ChartError::Config(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(matches!(result, Err(ChartError::Config(_))));
    }
}
