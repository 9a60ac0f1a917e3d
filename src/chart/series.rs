//! Series construction: one `SeriesGroup` plus an `AxisLayout` in, one
//! declarative `ChartSpec` out.
//!
//! A `ChartSpec` is sink-neutral. It names the shared category axis, the
//! value axes, and every series with the axis it binds to. Colours, line
//! styles and tooltips are left to the sink.

use serde::{Deserialize, Serialize};

use crate::analysis::groupings::SeriesGroup;
use crate::chart::axis::{AxisLayout, AxisSide, Panel};
use crate::model::Measurement;
use crate::reservoirs;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Knobs for series construction, read from the `[render]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesOptions {
    /// Chart title; `{name}` is replaced by the reservoir name.
    pub title_template: String,
    /// Draw lines across missing points instead of leaving gaps.
    pub connect_nulls: bool,
    /// Mark the normal pool level of registered reservoirs on the level axis.
    pub show_pool_level: bool,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        SeriesOptions {
            title_template: "{name} 运行详情".to_string(),
            connect_nulls: false,
            show_pool_level: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Chart specification
// ---------------------------------------------------------------------------

/// A horizontal reference line drawn against a value axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceLine {
    pub label: String,
    pub value: f64,
}

/// A resolved value axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisSpec {
    pub name: String,
    pub panel: usize,
    pub side: AxisSide,
    pub offset_px: u32,
    pub zero_based: bool,
    pub reference: Option<ReferenceLine>,
}

/// One plotted line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSpec {
    pub name: String,
    pub measurement: Measurement,
    /// Index into `ChartSpec::axes`.
    pub axis_index: usize,
    /// Index into `ChartSpec::panels`; also the category axis index.
    pub panel: usize,
    /// Aligned with `ChartSpec::categories`; `None` is a gap.
    pub data: Vec<Option<f64>>,
    pub connect_nulls: bool,
}

/// Everything a sink needs to draw one reservoir's chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub key: String,
    pub title: String,
    /// Shared time axis labels.
    pub categories: Vec<String>,
    pub panels: Vec<Panel>,
    pub axes: Vec<AxisSpec>,
    pub series: Vec<SeriesSpec>,
}

impl ChartSpec {
    pub fn series_for(&self, measurement: Measurement) -> Option<&SeriesSpec> {
        self.series.iter().find(|s| s.measurement == measurement)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds the chart for one reservoir.
///
/// `layout` is expected to have passed `AxisLayout::validate`. Series come
/// out in layout order: axis by axis, field by field.
pub fn build_chart(group: &SeriesGroup, layout: &AxisLayout, options: &SeriesOptions) -> ChartSpec {
    let pool_level = if options.show_pool_level {
        reservoirs::find_reservoir(&group.name).and_then(|r| r.normal_pool_level_m)
    } else {
        None
    };

    let axes = layout
        .axes
        .iter()
        .enumerate()
        .map(|(i, axis)| AxisSpec {
            name: axis.display_name(),
            panel: axis.panel,
            side: axis.side,
            offset_px: layout.axis_offset(i),
            zero_based: axis.zero_based,
            reference: pool_level
                .filter(|_| axis.fields.contains(&Measurement::WaterLevel))
                .map(|value| ReferenceLine {
                    label: "正常蓄水位".to_string(),
                    value,
                }),
        })
        .collect();

    let mut series = Vec::new();
    for (axis_index, axis) in layout.axes.iter().enumerate() {
        for &measurement in &axis.fields {
            series.push(SeriesSpec {
                name: measurement.label().to_string(),
                measurement,
                axis_index,
                panel: axis.panel,
                data: group.values(measurement).to_vec(),
                connect_nulls: options.connect_nulls,
            });
        }
    }

    ChartSpec {
        key: group.name.clone(),
        title: options.title_template.replace("{name}", &group.name),
        categories: group.timestamps.clone(),
        panels: layout.panels.clone(),
        axes,
        series,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
