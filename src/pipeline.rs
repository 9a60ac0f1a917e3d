//! One render pass: load → group → build → render.
//!
//! Every error is terminal for the pass. On failure the sink gets exactly
//! one `render_error` call and no charts, never a partial dashboard.

use chrono::{DateTime, Utc};

use crate::alert::staleness::{self, FreshnessConfig};
use crate::analysis::groupings::{self, MalformedPolicy};
use crate::chart::axis::AxisLayout;
use crate::chart::series::{self, ChartSpec, SeriesOptions};
use crate::ingest::RecordSource;
use crate::logging::{self, Stage};
use crate::model::{ChartError, MalformedRecord};
use crate::render::{RenderSink, RenderStatus};

/// Everything a pass needs besides the source and sink.
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    pub malformed: MalformedPolicy,
    pub layout: AxisLayout,
    pub series: SeriesOptions,
    pub freshness: FreshnessConfig,
}

/// What a successful pass produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    /// Reservoir names, in chart order.
    pub reservoirs: Vec<String>,
    pub points: usize,
    pub rejected: Vec<MalformedRecord>,
    pub status: RenderStatus,
}

/// Loads, groups and builds every chart without touching a sink.
pub fn build_charts(
    source: &dyn RecordSource,
    options: &PassOptions,
) -> Result<(Vec<ChartSpec>, groupings::Grouping), ChartError> {
    options.layout.validate()?;

    let rows = source.load_rows()?;
    let grouping = groupings::group_rows(rows, options.malformed)?;

    for field in options.layout.unplotted() {
        logging::debug(Stage::Chart, None, &format!("{} is not plotted by this layout", field));
    }

    let charts = grouping
        .groups
        .values()
        .map(|group| series::build_chart(group, &options.layout, &options.series))
        .collect();
    Ok((charts, grouping))
}

/// Runs one pass against `sink` using the real clock.
pub fn run_pass(
    source: &dyn RecordSource,
    sink: &mut dyn RenderSink,
    options: &PassOptions,
) -> Result<PassReport, ChartError> {
    run_pass_at(source, sink, options, Utc::now())
}

/// Runs one pass with an injected clock.
pub fn run_pass_at(
    source: &dyn RecordSource,
    sink: &mut dyn RenderSink,
    options: &PassOptions,
    now: DateTime<Utc>,
) -> Result<PassReport, ChartError> {
    let (charts, grouping) = match build_charts(source, options) {
        Ok(built) => built,
        Err(err) => {
            logging::log_pass_failure(&source.describe(), &err);
            sink.render_error(&err.to_string());
            sink.finish(None)?;
            return Err(err);
        }
    };

    let stale = match staleness::is_stale_at(&grouping.last_record_time, &options.freshness, now) {
        Ok(stale) => stale,
        Err(e) => {
            logging::warn(
                Stage::Chart,
                None,
                &format!("cannot check freshness, treating data as stale: {}", e),
            );
            true
        }
    };
    if stale {
        logging::warn(
            Stage::Chart,
            None,
            &format!("newest reading ({}) is stale", grouping.last_record_time),
        );
    }

    for chart in &charts {
        sink.render(&chart.key, chart);
    }

    let status = RenderStatus {
        last_sync: grouping.last_record_time.clone(),
        stale,
        generated_at: now.to_rfc3339(),
    };
    sink.finish(Some(&status))?;

    logging::log_pass_summary(grouping.groups.len(), charts.len(), grouping.rejected.len());

    Ok(PassReport {
        reservoirs: charts.into_iter().map(|c| c.key).collect(),
        points: grouping.total_points(),
        rejected: grouping.rejected,
        status,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawRow;
    use chrono::TimeZone;

    struct VecSource(Result<Vec<RawRow>, fn() -> ChartError>);

    impl RecordSource for VecSource {
        fn load_rows(&self) -> Result<Vec<RawRow>, ChartError> {
            match &self.0 {
                Ok(rows) => Ok(rows.clone()),
                Err(make) => Err(make()),
            }
        }
        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        rendered: Vec<String>,
        errors: Vec<String>,
        finished: Vec<Option<RenderStatus>>,
    }

    impl RenderSink for RecordingSink {
        fn render(&mut self, key: &str, _spec: &ChartSpec) {
            self.rendered.push(key.to_string());
        }
        fn render_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
        fn finish(&mut self, status: Option<&RenderStatus>) -> Result<(), ChartError> {
            self.finished.push(status.cloned());
            Ok(())
        }
    }

    fn row(name: Option<&str>, time: &str) -> RawRow {
        RawRow {
            name: name.map(String::from),
            record_time: Some(time.to_string()),
            water_level: Some(1199.0),
            ..RawRow::default()
        }
    }

    fn now() -> DateTime<Utc> {
        // 2025-06-02 08:00 in UTC+8
        Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_successful_pass_renders_each_reservoir_once() {
        let source = VecSource(Ok(vec![
            row(Some("二滩"), "2025-06-01 08:00:00"),
            row(Some("官地"), "2025-06-01 08:00:00"),
            row(Some("二滩"), "2025-06-02 08:00:00"),
        ]));
        let mut sink = RecordingSink::default();
        let report = run_pass_at(&source, &mut sink, &PassOptions::default(), now()).unwrap();

        assert_eq!(sink.rendered, vec!["二滩", "官地"]);
        assert!(sink.errors.is_empty());
        assert_eq!(report.points, 3);
        assert_eq!(report.status.last_sync, "2025-06-02 08:00:00");
        assert!(!report.status.stale);
        assert_eq!(sink.finished, vec![Some(report.status.clone())]);
    }

    #[test]
    fn test_empty_source_reports_single_error_and_no_charts() {
        let source = VecSource(Err(|| ChartError::EmptyResult));
        let mut sink = RecordingSink::default();
        let result = run_pass_at(&source, &mut sink, &PassOptions::default(), now());

        assert!(matches!(result, Err(ChartError::EmptyResult)));
        assert!(sink.rendered.is_empty());
        assert_eq!(sink.errors.len(), 1);
        assert_eq!(sink.finished, vec![None]);
    }

    #[test]
    fn test_unavailable_source_is_terminal() {
        let source = VecSource(Err(|| ChartError::SourceUnavailable("HTTP error: 404".into())));
        let mut sink = RecordingSink::default();
        assert!(run_pass_at(&source, &mut sink, &PassOptions::default(), now()).is_err());
        assert!(sink.errors[0].contains("404"));
    }

    #[test]
    fn test_reject_policy_renders_nothing() {
        let source = VecSource(Ok(vec![
            row(Some("二滩"), "2025-06-01 08:00:00"),
            row(None, "2025-06-01 09:00:00"),
        ]));
        let options = PassOptions {
            malformed: MalformedPolicy::Reject,
            ..PassOptions::default()
        };
        let mut sink = RecordingSink::default();
        let result = run_pass_at(&source, &mut sink, &options, now());
        assert!(matches!(result, Err(ChartError::MalformedRecord(_))));
        assert!(sink.rendered.is_empty(), "no partial charts");
    }

    #[test]
    fn test_skip_policy_reports_rejected_rows() {
        let source = VecSource(Ok(vec![
            row(Some("二滩"), "2025-06-01 08:00:00"),
            row(None, "2025-06-01 09:00:00"),
        ]));
        let mut sink = RecordingSink::default();
        let report = run_pass_at(&source, &mut sink, &PassOptions::default(), now()).unwrap();
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.reservoirs, vec!["二滩"]);
    }

    #[test]
    fn test_invalid_layout_fails_before_loading() {
        let mut options = PassOptions::default();
        options.layout.panels.clear();
        let source = VecSource(Ok(vec![row(Some("二滩"), "2025-06-01 08:00:00")]));
        let mut sink = RecordingSink::default();
        let result = run_pass_at(&source, &mut sink, &options, now());
        assert!(matches!(result, Err(ChartError::Config(_))));
        assert_eq!(sink.errors.len(), 1);
    }

    #[test]
    fn test_old_or_unparseable_last_sync_is_stale() {
        let mut sink = RecordingSink::default();
        let source = VecSource(Ok(vec![row(Some("二滩"), "2025-05-01 08:00:00")]));
        let report = run_pass_at(&source, &mut sink, &PassOptions::default(), now()).unwrap();
        assert!(report.status.stale);

        let source = VecSource(Ok(vec![row(Some("二滩"), "yesterday")]));
        let report = run_pass_at(&source, &mut sink, &PassOptions::default(), now()).unwrap();
        assert!(report.status.stale, "unparseable time is treated as stale");
    }
}
