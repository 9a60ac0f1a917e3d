/// Chart construction for the reservoir chart service.
///
/// Submodules:
/// - `axis`: value-axis layouts (which field goes on which scale).
/// - `series`: builds a sink-neutral `ChartSpec` from one reservoir group.
/// - `echarts`: translates a `ChartSpec` into an ECharts option object.

pub mod axis;
pub mod echarts;
pub mod series;

pub use axis::{AxisLayout, AxisSide, Panel, ValueAxis};
pub use series::{build_chart, ChartSpec, SeriesOptions, SeriesSpec};
