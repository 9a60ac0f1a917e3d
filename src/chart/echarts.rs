//! ECharts option rendering.
//!
//! Translates a `ChartSpec` into the option object accepted by
//! `echarts.setOption`. This is the only place presentation choices live:
//! colours, line widths, the legend, and which category axis shows labels.

use serde_json::{json, Value};

use crate::chart::axis::AxisSide;
use crate::chart::series::{AxisSpec, ChartSpec, SeriesSpec};
use crate::model::Measurement;

/// Line colour per measurement.
pub fn measurement_color(measurement: Measurement) -> &'static str {
    match measurement {
        Measurement::WaterLevel => "#0056b3",
        Measurement::Storage => "#fac858",
        Measurement::Inflow => "#91cc75",
        Measurement::Outflow => "#ee6666",
    }
}

/// Applied to each option in the page before `setOption`. Bottom-axis
/// labels show only the date part of `record_time`; a function cannot be
/// carried in the JSON option, so the page attaches it.
pub const DATE_LABEL_SCRIPT: &str =
    "for (const axis of option.xAxis) { if (axis.axisLabel.show) axis.axisLabel.formatter = (val) => String(val).split(' ')[0]; }";

/// Builds the full option object for one chart.
pub fn to_option(spec: &ChartSpec) -> Value {
    let last_panel = spec.panels.len().saturating_sub(1);

    let grid: Vec<Value> = spec
        .panels
        .iter()
        .map(|p| {
            json!({
                "left": "8%",
                "right": "8%",
                "top": format!("{}%", p.top_pct),
                "height": format!("{}%", p.height_pct),
            })
        })
        .collect();

    // One category axis per panel, all sharing the same labels. Only the
    // bottom panel prints them.
    let x_axis: Vec<Value> = (0..spec.panels.len())
        .map(|panel| {
            let show = panel == last_panel;
            json!({
                "type": "category",
                "data": spec.categories,
                "gridIndex": panel,
                "boundaryGap": false,
                "axisLabel": { "show": show },
                "axisTick": { "show": show },
            })
        })
        .collect();

    let y_axis: Vec<Value> = spec
        .axes
        .iter()
        .enumerate()
        .map(|(i, axis)| y_axis_option(spec, i, axis))
        .collect();

    let series: Vec<Value> = spec.series.iter().map(|s| series_option(spec, s)).collect();
    let legend: Vec<&str> = spec.series.iter().map(|s| s.name.as_str()).collect();

    let x_axis_index: Vec<usize> = (0..spec.panels.len()).collect();

    json!({
        "title": { "text": spec.title, "left": "center" },
        "tooltip": { "trigger": "axis", "axisPointer": { "type": "shadow" } },
        "axisPointer": { "link": [{ "xAxisIndex": "all" }] },
        "legend": { "data": legend, "bottom": 0 },
        "grid": grid,
        "xAxis": x_axis,
        "yAxis": y_axis,
        "dataZoom": [{ "type": "inside", "xAxisIndex": x_axis_index }],
        "series": series,
    })
}

fn y_axis_option(spec: &ChartSpec, index: usize, axis: &AxisSpec) -> Value {
    // The first axis in each panel owns the grid lines.
    let owns_grid = !spec.axes[..index].iter().any(|a| a.panel == axis.panel);
    let position = match axis.side {
        AxisSide::Left => "left",
        AxisSide::Right => "right",
    };

    json!({
        "name": axis.name,
        "type": "value",
        "gridIndex": axis.panel,
        "position": position,
        "offset": axis.offset_px,
        "scale": !axis.zero_based,
        "splitLine": { "show": owns_grid, "lineStyle": { "type": "dashed" } },
    })
}

fn series_option(spec: &ChartSpec, series: &SeriesSpec) -> Value {
    let color = measurement_color(series.measurement);
    let mut option = json!({
        "name": series.name,
        "type": "line",
        "xAxisIndex": series.panel,
        "yAxisIndex": series.axis_index,
        "data": series.data,
        "connectNulls": series.connect_nulls,
        "itemStyle": { "color": color },
    });

    match series.measurement {
        Measurement::WaterLevel => {
            option["lineStyle"] = json!({ "width": 3 });
            option["z"] = json!(5);
        }
        Measurement::Storage => {
            option["smooth"] = json!(true);
            option["areaStyle"] = json!({ "color": "rgba(250, 200, 88, 0.2)" });
        }
        Measurement::Inflow => {
            option["symbol"] = json!("none");
            option["areaStyle"] = json!({ "opacity": 0.1 });
        }
        Measurement::Outflow => {
            option["symbol"] = json!("none");
        }
    }

    if let Some(reference) = spec.axes.get(series.axis_index).and_then(|a| a.reference.as_ref()) {
        option["markLine"] = json!({
            "symbol": "none",
            "lineStyle": { "type": "dotted", "color": color },
            "label": { "formatter": format!("{} {}", reference.label, reference.value) },
            "data": [{ "yAxis": reference.value }],
        });
    }

    option
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::groupings::{group_rows, MalformedPolicy};
    use crate::chart::axis::AxisLayout;
    use crate::chart::series::{build_chart, SeriesOptions};
    use crate::model::RawRow;

    fn chart(name: &str, layout: &AxisLayout) -> ChartSpec {
        let rows = vec![
            RawRow {
                name: Some(name.to_string()),
                record_time: Some("2025-06-01 08:00:00".to_string()),
                water_level: Some(1329.1),
                inflow: None,
                outflow: Some(1100.0),
                capacity_level: Some(7.1),
            },
            RawRow {
                name: Some(name.to_string()),
                record_time: Some("2025-06-01 20:00:00".to_string()),
                water_level: Some(1329.4),
                inflow: Some(1180.0),
                outflow: Some(1090.0),
                capacity_level: Some(7.2),
            },
        ];
        let grouping = group_rows(rows, MalformedPolicy::Skip).unwrap();
        build_chart(&grouping.groups[name], layout, &SeriesOptions::default())
    }

    #[test]
    fn test_option_has_one_grid_and_x_axis_per_panel() {
        let option = to_option(&chart("官地", &AxisLayout::stacked()));
        assert_eq!(option["grid"].as_array().unwrap().len(), 2);
        let x_axis = option["xAxis"].as_array().unwrap();
        assert_eq!(x_axis.len(), 2);
        assert_eq!(x_axis[0]["axisLabel"]["show"], json!(false));
        assert_eq!(x_axis[1]["axisLabel"]["show"], json!(true));
        assert_eq!(x_axis[1]["data"][1], json!("2025-06-01 20:00:00"));
        assert_eq!(option["tooltip"]["axisPointer"]["type"], json!("shadow"));
    }

    #[test]
    fn test_missing_values_become_null() {
        let option = to_option(&chart("官地", &AxisLayout::stacked()));
        let inflow = option["series"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["name"] == json!("入库"))
            .expect("inflow series present");
        assert_eq!(inflow["data"], json!([null, 1180.0]));
        assert_eq!(inflow["connectNulls"], json!(false));
    }

    #[test]
    fn test_zero_based_axes_are_not_scaled() {
        let option = to_option(&chart("官地", &AxisLayout::stacked()));
        let y_axis = option["yAxis"].as_array().unwrap();
        assert_eq!(y_axis[0]["scale"], json!(true));
        assert_eq!(y_axis[2]["scale"], json!(false));
        assert_eq!(y_axis[2]["gridIndex"], json!(1));
    }

    #[test]
    fn test_only_first_axis_per_panel_draws_split_lines() {
        let option = to_option(&chart("官地", &AxisLayout::single_panel()));
        let shows: Vec<_> = option["yAxis"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["splitLine"]["show"].clone())
            .collect();
        assert_eq!(shows, vec![json!(true), json!(false), json!(false)]);
        assert_eq!(option["yAxis"][2]["offset"], json!(60));
    }

    #[test]
    fn test_pool_level_becomes_mark_line_on_level_series() {
        let option = to_option(&chart("官地", &AxisLayout::stacked()));
        let level = &option["series"][0];
        assert_eq!(level["name"], json!("水位"));
        assert_eq!(level["markLine"]["data"][0]["yAxis"], json!(1330.0));
        assert!(option["series"][1].get("markLine").is_none());
    }

    #[test]
    fn test_legend_lists_series_in_order() {
        let option = to_option(&chart("官地", &AxisLayout::stacked()));
        assert_eq!(option["legend"]["data"], json!(["水位", "蓄量", "入库", "出库"]));
    }
}
