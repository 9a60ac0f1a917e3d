/// Stage-tagged logging for render passes and database upkeep
///
/// Every line names the stage it came from and, when one is involved, the
/// reservoir. Console output goes to stderr so JSON on stdout stays
/// parseable; an optional log file receives full timestamped lines for
/// scheduled runs.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::LoggingConfig;
use crate::model::ChartError;

// ---------------------------------------------------------------------------
// Levels and stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    fn tag(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.tag())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Where in the pass a message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Source,
    Group,
    Chart,
    Render,
    Database,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Source => "SOURCE",
            Stage::Group => "GROUP",
            Stage::Chart => "CHART",
            Stage::Render => "RENDER",
            Stage::Database => "DB",
            Stage::System => "SYS",
        })
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

fn global() -> MutexGuard<'static, Option<Logger>> {
    // A panic while holding the lock leaves the logger itself intact.
    LOGGER.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Logger {
    threshold: LogLevel,
    file: Option<PathBuf>,
    /// Print full timestamped lines on the console too.
    timestamps: bool,
}

impl Logger {
    fn write(&self, level: LogLevel, stage: Stage, reservoir: Option<&str>, message: &str) {
        if level < self.threshold {
            return;
        }

        let context = match reservoir {
            Some(name) => format!("{} [{}]", stage, name),
            None => stage.to_string(),
        };
        let line = format!(
            "{} {:<5} {}: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            level,
            context,
            message
        );

        if self.timestamps {
            eprintln!("{}", line);
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}: {}", context, message),
                LogLevel::Warning => eprintln!("   ⚠ {}: {}", context, message),
                LogLevel::Info => eprintln!("   {}", message),
                LogLevel::Debug => eprintln!("   · {}: {}", context, message),
            }
        }

        if let Some(path) = &self.file {
            let appended = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut f| writeln!(f, "{}", line));
            if let Err(e) = appended {
                eprintln!("cannot append to log file {}: {}", path.display(), e);
            }
        }
    }
}

/// Installs the process-wide logger. Until this is called, log calls are
/// dropped.
pub fn init(config: &LoggingConfig) {
    *global() = Some(Logger {
        threshold: config.level,
        file: config.file.as_ref().map(PathBuf::from),
        timestamps: config.timestamps,
    });
}

fn emit(level: LogLevel, stage: Stage, reservoir: Option<&str>, message: &str) {
    if let Some(logger) = global().as_ref() {
        logger.write(level, stage, reservoir, message);
    }
}

pub fn info(stage: Stage, reservoir: Option<&str>, message: &str) {
    emit(LogLevel::Info, stage, reservoir, message);
}

pub fn warn(stage: Stage, reservoir: Option<&str>, message: &str) {
    emit(LogLevel::Warning, stage, reservoir, message);
}

pub fn error(stage: Stage, reservoir: Option<&str>, message: &str) {
    emit(LogLevel::Error, stage, reservoir, message);
}

pub fn debug(stage: Stage, reservoir: Option<&str>, message: &str) {
    emit(LogLevel::Debug, stage, reservoir, message);
}

// ---------------------------------------------------------------------------
// Pass outcomes
// ---------------------------------------------------------------------------

/// How alarming a failed pass is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The database is reachable but nothing has been imported yet.
    NoDataYet,
    /// Source, configuration or output is broken.
    Fault,
    /// Bad rows: a one-off write glitch or a schema change upstream.
    BadData,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::NoDataYet => "no data yet",
            FailureKind::Fault => "fault",
            FailureKind::BadData => "bad data",
        })
    }
}

pub fn classify_failure(err: &ChartError) -> FailureKind {
    match err {
        ChartError::EmptyResult => FailureKind::NoDataYet,
        ChartError::MalformedRecord(_) => FailureKind::BadData,
        ChartError::SourceUnavailable(_) | ChartError::Config(_) | ChartError::Io(_) => {
            FailureKind::Fault
        }
    }
}

/// Logs a failed pass at a level matching its kind.
pub fn log_pass_failure(locator: &str, err: &ChartError) {
    let kind = classify_failure(err);
    let message = format!("render pass for {} failed ({}): {}", locator, kind, err);

    match kind {
        FailureKind::NoDataYet => info(Stage::System, None, &message),
        FailureKind::BadData => warn(Stage::System, None, &message),
        FailureKind::Fault => error(Stage::System, None, &message),
    }
}

pub fn log_pass_summary(reservoirs: usize, rendered: usize, rejected_rows: usize) {
    let message = format!(
        "Rendered {} of {} reservoir charts; {} rows rejected",
        rendered, reservoirs, rejected_rows
    );

    if rendered == 0 {
        error(Stage::Render, None, &message);
    } else if rendered < reservoirs || rejected_rows > 0 {
        warn(Stage::Render, None, &message);
    } else {
        info(Stage::Render, None, &message);
    }
}
