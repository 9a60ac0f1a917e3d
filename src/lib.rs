//! Reservoir operations charts.
//!
//! Reads timestamped reservoir readings from a SQLite database (local or
//! downloaded), groups them per reservoir and renders one multi-axis time
//! series chart per reservoir, as an HTML dashboard or JSON chart options.
//!
//! Layout follows the flow of a render pass:
//! - `ingest`      record sources and gateway imports
//! - `analysis`    grouping rows into per-reservoir series
//! - `chart`       axis layouts and chart specifications
//! - `render`      sinks that draw charts
//! - `pipeline`    one load → group → build → render pass
//! - `alert`       freshness of the newest reading
//! - `maintenance` and `verify` for database upkeep

pub mod alert;
pub mod analysis;
pub mod chart;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod maintenance;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod reservoirs;
pub mod verify;
