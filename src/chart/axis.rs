//! Value-axis layouts.
//!
//! Measurements have very different magnitudes and units (a level around
//! 1200 m, flows in the thousands of m³/s, storage in tens of 亿m³), so they
//! cannot share one linear scale. An `AxisLayout` states, per field, which
//! axis it is drawn against, which panel that axis lives in, and whether the
//! axis is anchored at zero.
//!
//! Policy carried by the presets:
//! - water level gets its own axis that is *not* zero-based, so a change of
//!   a few decimetres on a 1200 m level stays visible;
//! - storage gets its own scaled axis, for the same reason;
//! - inflow and outflow share one zero-based flow axis, since they are
//!   directly comparable and their absolute size matters.
//!
//! Layouts are data, not code: the config file may define its own.

use serde::{Deserialize, Serialize};

use crate::model::{ChartError, Measurement};

/// Horizontal offset, in pixels, between stacked right-hand axes.
pub const RIGHT_AXIS_OFFSET_PX: u32 = 60;

// ---------------------------------------------------------------------------
// Layout types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisSide {
    #[default]
    Left,
    Right,
}

/// A plotting area. Geometry is in percent of the chart height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub top_pct: u32,
    pub height_pct: u32,
}

/// One numeric scale and the fields drawn against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueAxis {
    /// Axis title; derived from the fields when left empty.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub panel: usize,
    #[serde(default)]
    pub side: AxisSide,
    /// Whether the scale is anchored at zero. `false` fits the scale to the
    /// data range.
    #[serde(default)]
    pub zero_based: bool,
    pub fields: Vec<Measurement>,
}

impl ValueAxis {
    fn new(name: &str, panel: usize, side: AxisSide, zero_based: bool, fields: &[Measurement]) -> Self {
        ValueAxis {
            name: name.to_string(),
            panel,
            side,
            zero_based,
            fields: fields.to_vec(),
        }
    }

    /// Title shown next to the axis, e.g. "水位 (m)".
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        match self.fields.as_slice() {
            [only] => format!("{} ({})", only.label(), only.unit()),
            [first, ..] => format!("({})", first.unit()),
            [] => String::new(),
        }
    }
}

/// Panels plus the axes drawn in them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisLayout {
    pub panels: Vec<Panel>,
    pub axes: Vec<ValueAxis>,
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

impl Default for AxisLayout {
    fn default() -> Self {
        AxisLayout::stacked()
    }
}

impl AxisLayout {
    /// Two panels: level and storage on top, both flows below.
    pub fn stacked() -> Self {
        AxisLayout {
            panels: vec![
                Panel { top_pct: 10, height_pct: 45 },
                Panel { top_pct: 65, height_pct: 25 },
            ],
            axes: vec![
                ValueAxis::new("水位 (m)", 0, AxisSide::Left, false, &[Measurement::WaterLevel]),
                ValueAxis::new("蓄量 (亿m³)", 0, AxisSide::Right, false, &[Measurement::Storage]),
                ValueAxis::new(
                    "流量 (m³/s)",
                    1,
                    AxisSide::Left,
                    true,
                    &[Measurement::Inflow, Measurement::Outflow],
                ),
            ],
        }
    }

    /// One panel with three scales: level left, flow and storage right.
    pub fn single_panel() -> Self {
        AxisLayout {
            panels: vec![Panel { top_pct: 12, height_pct: 70 }],
            axes: vec![
                ValueAxis::new("水位 (m)", 0, AxisSide::Left, false, &[Measurement::WaterLevel]),
                ValueAxis::new(
                    "流量 (m³/s)",
                    0,
                    AxisSide::Right,
                    true,
                    &[Measurement::Inflow, Measurement::Outflow],
                ),
                ValueAxis::new("蓄量 (亿m³)", 0, AxisSide::Right, false, &[Measurement::Storage]),
            ],
        }
    }

    /// Looks up a preset by its config name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "stacked" => Some(AxisLayout::stacked()),
            "single_panel" => Some(AxisLayout::single_panel()),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The axis a measurement is drawn against, with its index.
    /// `None` means the field is not plotted in this layout.
    pub fn axis_for(&self, measurement: Measurement) -> Option<(usize, &ValueAxis)> {
        self.axes
            .iter()
            .enumerate()
            .find(|(_, axis)| axis.fields.contains(&measurement))
    }

    /// Pixel offset of an axis from its panel edge. Only right-hand axes
    /// after the first in a panel are pushed outward.
    pub fn axis_offset(&self, axis_index: usize) -> u32 {
        let Some(axis) = self.axes.get(axis_index) else {
            return 0;
        };
        let earlier_same_slot = self.axes[..axis_index]
            .iter()
            .filter(|a| a.panel == axis.panel && a.side == axis.side)
            .count() as u32;
        earlier_same_slot * RIGHT_AXIS_OFFSET_PX
    }

    /// Fields this layout does not plot.
    pub fn unplotted(&self) -> Vec<Measurement> {
        Measurement::ALL
            .into_iter()
            .filter(|m| self.axis_for(*m).is_none())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Checks the layout is drawable.
    ///
    /// Rules: at least one panel; every axis sits in an existing panel and
    /// carries at least one field; no field is on two axes; all fields on one
    /// axis share a unit; every panel has an axis; a panel has at most one
    /// left-hand axis.
    pub fn validate(&self) -> Result<(), ChartError> {
        if self.panels.is_empty() {
            return Err(ChartError::Config("axis layout has no panels".into()));
        }
        for (i, panel) in self.panels.iter().enumerate() {
            let bottom = panel.top_pct.checked_add(panel.height_pct);
            if panel.height_pct == 0 || bottom.is_none_or(|b| b > 100) {
                return Err(ChartError::Config(format!(
                    "panel {} does not fit the chart (top {}%, height {}%)",
                    i, panel.top_pct, panel.height_pct
                )));
            }
        }

        let mut seen: Vec<Measurement> = Vec::new();
        for (i, axis) in self.axes.iter().enumerate() {
            if axis.panel >= self.panels.len() {
                return Err(ChartError::Config(format!(
                    "axis {} ('{}') refers to panel {}, but only {} panel(s) exist",
                    i,
                    axis.display_name(),
                    axis.panel,
                    self.panels.len()
                )));
            }
            let Some(first) = axis.fields.first() else {
                return Err(ChartError::Config(format!("axis {} has no fields", i)));
            };
            if let Some(other) = axis.fields.iter().find(|m| m.unit() != first.unit()) {
                return Err(ChartError::Config(format!(
                    "axis {} mixes units: {} is {} but {} is {}",
                    i,
                    first,
                    first.unit(),
                    other,
                    other.unit()
                )));
            }
            for field in &axis.fields {
                if seen.contains(field) {
                    return Err(ChartError::Config(format!(
                        "field {} is assigned to more than one axis",
                        field
                    )));
                }
                seen.push(*field);
            }
        }

        for panel in 0..self.panels.len() {
            let on_panel: Vec<_> = self.axes.iter().filter(|a| a.panel == panel).collect();
            if on_panel.is_empty() {
                return Err(ChartError::Config(format!("panel {} has no axes", panel)));
            }
            if on_panel.iter().filter(|a| a.side == AxisSide::Left).count() > 1 {
                return Err(ChartError::Config(format!(
                    "panel {} has more than one left-hand axis",
                    panel
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
