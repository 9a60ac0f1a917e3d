//! Rendering sinks and the chart registry.
//!
//! A sink receives one `ChartSpec` per reservoir and owns presentation
//! entirely. Rendering is fire-and-forget: `render` returns nothing, and
//! write failures surface once, from `finish`.
//!
//! # Registry
//! Each sink keeps its charts in a `ChartRegistry`, keyed by reservoir name.
//! Rendering a key again replaces (and drops) the previous handle rather than
//! adding a second one, and resizing goes through one `dispatch_resize` call
//! over the whole registry. The generated HTML page follows the same shape:
//! one `charts` object and a single `resize` listener.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};

use crate::chart::echarts;
use crate::chart::series::ChartSpec;
use crate::logging::{self, Stage};
use crate::model::ChartError;

// ============================================================================
// Sink contract
// ============================================================================

/// Status line shown above the charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderStatus {
    /// `record_time` of the newest reading.
    pub last_sync: String,
    /// Whether the newest reading is older than the configured maximum.
    pub stale: bool,
    /// When this pass ran (RFC 3339).
    pub generated_at: String,
}

pub trait RenderSink {
    /// Draws (or redraws) the chart for one reservoir.
    fn render(&mut self, key: &str, spec: &ChartSpec);

    /// Replaces any charts with a single user-visible error message.
    fn render_error(&mut self, message: &str);

    /// Flushes output. `status` is `None` after `render_error`.
    fn finish(&mut self, status: Option<&RenderStatus>) -> Result<(), ChartError>;
}

// ============================================================================
// Registry
// ============================================================================

/// A live chart owned by a sink.
pub trait ChartHandle {
    fn set_option(&mut self, spec: &ChartSpec);
    fn resize(&mut self, width_px: u32, height_px: u32);
}

/// Reservoir name → chart handle, in first-render order.
pub struct ChartRegistry<H: ChartHandle> {
    charts: IndexMap<String, H>,
}

impl<H: ChartHandle> Default for ChartRegistry<H> {
    fn default() -> Self {
        ChartRegistry {
            charts: IndexMap::new(),
        }
    }
}

impl<H: ChartHandle> ChartRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handle` under `key`. An existing handle for the key is
    /// returned (and normally dropped) and the key keeps its position.
    pub fn mount(&mut self, key: &str, handle: H) -> Option<H> {
        self.charts.insert(key.to_string(), handle)
    }

    pub fn get(&self, key: &str) -> Option<&H> {
        self.charts.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut H> {
        self.charts.get_mut(key)
    }

    /// Resizes every chart.
    pub fn dispatch_resize(&mut self, width_px: u32, height_px: u32) {
        for handle in self.charts.values_mut() {
            handle.resize(width_px, height_px);
        }
    }

    /// Drops every chart.
    pub fn clear(&mut self) {
        self.charts.clear();
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &H)> {
        self.charts.iter()
    }
}

/// An ECharts instance described by its container and current option.
#[derive(Debug, Clone, PartialEq)]
pub struct EChartsHandle {
    pub dom_id: String,
    pub option: Value,
    pub width_px: Option<u32>,
    pub height_px: u32,
}

impl EChartsHandle {
    /// Unsized until the sink dispatches a resize.
    fn new(dom_id: String) -> Self {
        EChartsHandle {
            dom_id,
            option: Value::Null,
            width_px: None,
            height_px: 0,
        }
    }
}

impl ChartHandle for EChartsHandle {
    fn set_option(&mut self, spec: &ChartSpec) {
        self.option = echarts::to_option(spec);
    }

    /// A width of 0 leaves the container fluid.
    fn resize(&mut self, width_px: u32, height_px: u32) {
        self.width_px = (width_px > 0).then_some(width_px);
        self.height_px = height_px;
    }
}

/// Renders into a registry of `EChartsHandle`s, reusing the handle when a
/// key is rendered again.
fn render_into(registry: &mut ChartRegistry<EChartsHandle>, key: &str, spec: &ChartSpec) {
    if let Some(handle) = registry.get_mut(key) {
        handle.set_option(spec);
        return;
    }
    let mut handle = EChartsHandle::new(format!("chart_{}", registry.len()));
    handle.set_option(spec);
    registry.mount(key, handle);
}

// ============================================================================
// HTML dashboard
// ============================================================================

/// Writes a self-contained dashboard page: one card per reservoir, the
/// last-sync line, and an error banner when the pass failed.
pub struct HtmlSink {
    path: PathBuf,
    page_title: String,
    echarts_url: String,
    chart_width_px: Option<u32>,
    chart_height_px: u32,
    registry: ChartRegistry<EChartsHandle>,
    error: Option<String>,
}

impl HtmlSink {
    pub fn new(path: impl Into<PathBuf>, page_title: &str, echarts_url: &str, chart_height_px: u32) -> Self {
        HtmlSink {
            path: path.into(),
            page_title: page_title.to_string(),
            echarts_url: echarts_url.to_string(),
            chart_width_px: None,
            chart_height_px,
            registry: ChartRegistry::new(),
            error: None,
        }
    }

    /// Pins every card to `width_px`; `None` keeps them fluid.
    pub fn with_chart_width(mut self, width_px: Option<u32>) -> Self {
        self.chart_width_px = width_px;
        self
    }

    pub fn registry(&self) -> &ChartRegistry<EChartsHandle> {
        &self.registry
    }

    /// Builds the page text.
    pub fn page(&self, status: Option<&RenderStatus>) -> Result<String, ChartError> {
        let mut cards = String::new();
        let mut options = serde_json::Map::new();
        for (key, handle) in self.registry.iter() {
            let width = handle
                .width_px
                .map(|w| format!("width:{}px;", w))
                .unwrap_or_default();
            cards.push_str(&format!(
                "    <div class=\"reservoir-card\">\n      <h2>{} 水库</h2>\n      <div id=\"{}\" class=\"chart-container\" style=\"{}height:{}px\"></div>\n    </div>\n",
                escape_html(key),
                handle.dom_id,
                width,
                handle.height_px
            ));
            options.insert(handle.dom_id.clone(), handle.option.clone());
        }

        let status_line = match status {
            Some(s) if s.stale => format!(
                "<p id=\"last-sync\" class=\"stale\">最后数据同步时间：{}（数据已过期）</p>",
                escape_html(&s.last_sync)
            ),
            Some(s) => format!(
                "<p id=\"last-sync\">最后数据同步时间：{}</p>",
                escape_html(&s.last_sync)
            ),
            None => String::new(),
        };
        let error_banner = match &self.error {
            Some(message) => format!(
                "<div id=\"data-error\" class=\"error\">❌ 加载失败: {}</div>",
                escape_html(message)
            ),
            None => String::new(),
        };

        let options_json = serde_json::to_string(&Value::Object(options))
            .map_err(|e| ChartError::Io(e.into()))?;
        let options_json = script_safe(&options_json);

        Ok(format!(
            r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <script src="{echarts}"></script>
  <style>
    body {{ font-family: sans-serif; margin: 0 auto; max-width: 1200px; padding: 1rem; }}
    .reservoir-card {{ background: #fff; border-radius: 8px; box-shadow: 0 1px 4px rgba(0,0,0,.15); margin-bottom: 1.5rem; padding: 1rem; }}
    .error {{ color: #b00020; font-weight: bold; }}
    .stale {{ color: #b36b00; }}
  </style>
</head>
<body>
  <h1>{title}</h1>
  {status}
  {error}
  <div id="charts-area">
{cards}  </div>
  <script>
    const options = {options};
    const charts = {{}};
    for (const [id, option] of Object.entries(options)) {{
      {label_script}
      charts[id] = echarts.init(document.getElementById(id));
      charts[id].setOption(option);
    }}
    window.addEventListener('resize', () => {{
      for (const chart of Object.values(charts)) chart.resize();
    }});
  </script>
</body>
</html>
"#,
            title = escape_html(&self.page_title),
            echarts = escape_html(&self.echarts_url),
            status = status_line,
            error = error_banner,
            cards = cards,
            options = options_json,
            label_script = echarts::DATE_LABEL_SCRIPT,
        ))
    }
}

impl RenderSink for HtmlSink {
    fn render(&mut self, key: &str, spec: &ChartSpec) {
        render_into(&mut self.registry, key, spec);
        logging::debug(Stage::Render, Some(key), "chart added to dashboard");
    }

    fn render_error(&mut self, message: &str) {
        self.registry.clear();
        self.error = Some(message.to_string());
    }

    fn finish(&mut self, status: Option<&RenderStatus>) -> Result<(), ChartError> {
        self.registry
            .dispatch_resize(self.chart_width_px.unwrap_or(0), self.chart_height_px);
        let page = self.page(status)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, page)?;
        logging::info(
            Stage::Render,
            None,
            &format!("Wrote dashboard with {} charts to {}", self.registry.len(), self.path.display()),
        );
        Ok(())
    }
}

// ============================================================================
// JSON output
// ============================================================================

/// Writes `{ "status": ..., "charts": { name: option } }`, or
/// `{ "error": message }`, to any writer.
pub struct JsonSink<W: Write> {
    out: W,
    registry: ChartRegistry<EChartsHandle>,
    error: Option<String>,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        JsonSink {
            out,
            registry: ChartRegistry::new(),
            error: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn document(&self, status: Option<&RenderStatus>) -> Value {
        if let Some(message) = &self.error {
            return json!({ "error": message });
        }
        let charts: serde_json::Map<String, Value> = self
            .registry
            .iter()
            .map(|(key, handle)| (key.clone(), handle.option.clone()))
            .collect();
        json!({ "status": status, "charts": charts })
    }
}

impl<W: Write> RenderSink for JsonSink<W> {
    fn render(&mut self, key: &str, spec: &ChartSpec) {
        render_into(&mut self.registry, key, spec);
    }

    fn render_error(&mut self, message: &str) {
        self.registry.clear();
        self.error = Some(message.to_string());
    }

    fn finish(&mut self, status: Option<&RenderStatus>) -> Result<(), ChartError> {
        let document = self.document(status);
        serde_json::to_writer_pretty(&mut self.out, &document)
            .map_err(|e| ChartError::Io(e.into()))?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// JSON embedded in a `<script>` block must not contain `</`.
fn script_safe(json: &str) -> String {
    json.replace("</", "<\\/")
}

// ============================================================================
// Tests
// ============================================================================
