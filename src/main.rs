use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process;

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::Connection;

use reservoir_charts::config::{AppConfig, OutputFormat, RenderConfig};
use reservoir_charts::ingest::{self, gateway};
use reservoir_charts::logging::{self, LogLevel, Stage};
use reservoir_charts::maintenance;
use reservoir_charts::model::ChartError;
use reservoir_charts::pipeline::{self, PassOptions};
use reservoir_charts::render::{HtmlSink, JsonSink, RenderSink};
use reservoir_charts::reservoirs;
use reservoir_charts::verify;

#[derive(Parser)]
#[command(name = "reservoir-charts")]
#[command(about = "Per-reservoir operations charts from a SQLite reading log")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./reservoir_charts.toml if present)
    #[arg(long, short, env = "RESERVOIR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Database path or http(s) URL, overriding [source].locator
    #[arg(long, env = "RESERVOIR_DB", global = true)]
    db: Option<String>,

    /// Minimum log level: debug, info, warn, error
    #[arg(long, env = "RESERVOIR_LOG", global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Render one chart per reservoir (default)
    Render {
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        /// Output file, or - for JSON on stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Axis layout preset: stacked or single_panel
        #[arg(long)]
        layout: Option<String>,
    },
    #[command(flatten)]
    Tool(Tool),
}

/// Verification and database upkeep.
#[derive(Subcommand)]
enum Tool {
    /// Report coverage, gaps and freshness per reservoir
    Verify {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create the readings table in a new database
    Init,
    /// Rescale storage values recorded in the wrong unit
    FixStorage,
    /// Remove repeated readings
    Dedup,
    /// Append every reading from an older database
    Merge { old: PathBuf },
    /// Import captured gateway responses as one reading per reservoir
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Html,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Html => OutputFormat::Html,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    if let Some(db) = cli.db {
        config.source.locator = db;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    logging::init(&config.logging);

    let command = cli.command.unwrap_or(Command::Render {
        format: None,
        output: None,
        layout: None,
    });

    if let Err(failure) = run(command, config) {
        if !failure.logged {
            logging::error(Stage::System, None, &failure.error.to_string());
        }
        process::exit(1);
    }
}

/// A failed command. Render passes log their own failures, so `logged` is
/// set for those.
#[derive(Debug)]
struct Failure {
    error: ChartError,
    logged: bool,
}

impl From<ChartError> for Failure {
    fn from(error: ChartError) -> Self {
        Failure { error, logged: false }
    }
}

fn run(command: Command, mut config: AppConfig) -> Result<(), Failure> {
    match command {
        Command::Render { format, output, layout } => {
            if let Some(f) = format {
                config.render.format = f.into();
            }
            if let Some(o) = output {
                config.render.output = o;
            }
            if let Some(name) = layout {
                config.axes.layout = Some(name);
                config.axes.panels.clear();
                config.axes.axes.clear();
            }
            render(&config)
        }
        Command::Tool(tool) => Ok(run_tool(tool, &config)?),
    }
}

fn run_tool(tool: Tool, config: &AppConfig) -> Result<(), ChartError> {
    match tool {
        Tool::Verify { json } => {
            let source = ingest::open_source(&config.source.locator, config.source.http_timeout());
            let report = verify::verify_source(source.as_ref(), &config.freshness)?;
            if json {
                let text = serde_json::to_string_pretty(&report).map_err(|e| ChartError::Io(e.into()))?;
                println!("{}", text);
            } else {
                verify::print_summary(&report);
            }
            Ok(())
        }
        Tool::Init => {
            let conn = Connection::open(local_db(config)?)?;
            maintenance::init_schema(&conn)
        }
        Tool::FixStorage => {
            let conn = open_existing(local_db(config)?)?;
            let changed = maintenance::fix_storage_scale(&conn)?;
            println!("Fixed {} rows", changed);
            Ok(())
        }
        Tool::Dedup => {
            let conn = open_existing(local_db(config)?)?;
            let report = maintenance::remove_duplicates(&conn)?;
            println!(
                "Rows before: {}, after: {}, removed: {}",
                report.before,
                report.after,
                report.removed()
            );
            Ok(())
        }
        Tool::Merge { old } => {
            let mut conn = Connection::open(local_db(config)?)?;
            let inserted = maintenance::merge_from(&mut conn, &old)?;
            println!("Merged {} rows from {}", inserted, old.display());
            Ok(())
        }
        Tool::Import { files } => import(config, &files),
    }
}

fn render(config: &AppConfig) -> Result<(), Failure> {
    let options = PassOptions {
        malformed: config.grouping.malformed,
        layout: config.axes.resolve()?,
        series: config.render.series.clone(),
        freshness: config.freshness.clone(),
    };
    let source = ingest::open_source(&config.source.locator, config.source.http_timeout());
    let mut sink = open_sink(&config.render)?;

    let report = pipeline::run_pass(source.as_ref(), sink.as_mut(), &options)
        .map_err(|error| Failure { error, logged: true })?;
    if !report.rejected.is_empty() {
        logging::warn(
            Stage::Group,
            None,
            &format!("{} malformed rows were left out of the charts", report.rejected.len()),
        );
    }
    Ok(())
}

fn open_sink(render: &RenderConfig) -> Result<Box<dyn RenderSink>, ChartError> {
    let to_stdout = render.output.as_os_str() == "-";
    let sink: Box<dyn RenderSink> = match render.format {
        OutputFormat::Html if to_stdout => {
            return Err(ChartError::Config(
                "HTML output needs a file path; use --format json for stdout".to_string(),
            ));
        }
        OutputFormat::Html => Box::new(
            HtmlSink::new(&render.output, &render.page_title, &render.echarts_url, render.chart_height_px)
                .with_chart_width(render.chart_width_px),
        ),
        OutputFormat::Json if to_stdout => Box::new(JsonSink::new(io::stdout().lock())),
        OutputFormat::Json => {
            if let Some(parent) = render.output.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            Box::new(JsonSink::new(BufWriter::new(File::create(&render.output)?)))
        }
    };
    Ok(sink)
}

fn import(config: &AppConfig, files: &[PathBuf]) -> Result<(), ChartError> {
    let mut responses = Vec::with_capacity(files.len());
    for file in files {
        let body = fs::read_to_string(file)?;
        match gateway::parse_gateway_response(&body) {
            Ok(stations) => responses.push(stations),
            Err(e) => logging::warn(
                Stage::Source,
                None,
                &format!("skipping {}: {}", file.display(), e),
            ),
        }
    }

    let record_time = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let names = reservoirs::all_reservoir_names();
    let rows = gateway::collect_readings(&responses, &names, &record_time);
    if rows.is_empty() {
        return Err(ChartError::EmptyResult);
    }

    let mut conn = Connection::open(local_db(config)?)?;
    maintenance::init_schema(&conn)?;
    let inserted = gateway::import_rows(&mut conn, &rows)?;
    println!("Imported {} readings at {}", inserted, record_time);
    Ok(())
}

/// Maintenance commands write to the database, so the locator must be a path.
fn local_db(config: &AppConfig) -> Result<&Path, ChartError> {
    let locator = config.source.locator.as_str();
    if locator.starts_with("http://") || locator.starts_with("https://") {
        return Err(ChartError::Config(format!(
            "'{}' is remote; this command needs a local database path",
            locator
        )));
    }
    Ok(Path::new(locator))
}

fn open_existing(path: &Path) -> Result<Connection, ChartError> {
    if !path.is_file() {
        return Err(ChartError::SourceUnavailable(format!(
            "database file not found: {}",
            path.display()
        )));
    }
    Ok(Connection::open(path)?)
}
