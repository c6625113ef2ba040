//! oyatlas - Opportunity Youth metro dashboard
//!
//! A CLI tool that loads per-metro Opportunity Youth statistics, rolls
//! them up into national totals, and renders filterable breakdown tables
//! as Markdown, JSON or CSV.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (data load failure, bad config, write failure, etc.)
//!   2 - The selected metro has no detail data (report still written)

mod analysis;
mod cli;
mod config;
mod loader;
mod models;
mod report;
mod session;

use analysis::Engine;
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use loader::{LoadOptions, Loader, Source};
use models::{Filter, Report, ReportMetadata, Selection, ViewState};
use report::ReportOptions;
use session::{Action, Event, Session};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("oyatlas v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Dashboard failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .oyatlas.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to point at your data files and pick defaults.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Everything a report needs besides the engine and the view.
struct ReportContext {
    geojson_source: String,
    detail_source: String,
    options: ReportOptions,
}

/// Load the data and serve the requested mode. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let geojson = Source::parse(&config.data.geojson);
    let detail = Source::parse(&config.data.detail);

    let output = PathBuf::from(&config.report.output);
    let mut status = status_writer(is_stdout(&output));

    // Step 1: Load both documents
    if !args.quiet {
        writeln!(status, "📥 Loading data:")?;
        writeln!(status, "   GeoJSON: {}", geojson)?;
        writeln!(status, "   Detail:  {}", detail)?;
    }

    let loader = Loader::new(LoadOptions {
        timeout: Duration::from_secs(config.data.timeout_seconds),
        show_progress: !args.quiet,
    })?;
    let dataset = loader
        .load(&geojson, &detail)
        .await
        .context("Failed to load dashboard data")?;

    // Step 2: Build the national rollup
    let engine = Engine::new(dataset);
    info!("Data ready in {:.2}s", start_time.elapsed().as_secs_f64());

    let state = ViewState {
        selection: args.selection(),
        gender: args.gender_filter(),
        race: args.race_filter(),
        year: config.view.year,
        metric: config.view.metric,
    };

    let ctx = ReportContext {
        geojson_source: geojson.to_string(),
        detail_source: detail.to_string(),
        options: ReportOptions::from(&config.report),
    };

    if args.list_metros {
        print!("{}", report::generate_metro_index(&engine.metro_index(state.year), state.year));
        return Ok(0);
    }

    if args.interactive {
        run_interactive(&engine, Session::new(state), &ctx).await?;
        return Ok(0);
    }

    // Step 3: Query and render
    check_view(&engine, &state);
    let report = build_report(&engine, &state, &ctx);
    if !report.panel.percent.is_available() {
        debug!("No OY percentage for {} in {}", report.panel.title, state.year);
    }

    let format = args
        .format
        .or_else(|| args.output.as_deref().and_then(OutputFormat::from_path))
        .unwrap_or(config.report.format);
    emit_report(&report, format, &ctx.options, &output, &mut std::io::stdout())?;

    // Print summary
    let table = &report.table;
    let totals = &table.totals[state.year];
    if !args.quiet {
        writeln!(status, "\n📊 {} ({}):", report.panel.title, state.year)?;
        writeln!(
            status,
            "   Youth population: {} | Opportunity youth: {} | OY rate: {}",
            report::format_count(report.panel.youth_population),
            report::format_count(report.panel.opportunity_youth),
            report.panel.percent
        )?;
        writeln!(
            status,
            "   Table rows: {} | Footer OY: {} | Footer {}: {}",
            table.rows.len(),
            report::format_count(totals.total_oy),
            state.metric.label(),
            table.footer[state.year]
        )?;
        if !is_stdout(&output) {
            writeln!(status, "\n✅ Report saved to: {}", output.display())?;
        }
    }

    if matches!(state.selection, Selection::Metro(_)) && !table.has_data {
        eprintln!("\n⚠️  {}", report::NO_DATA_MESSAGE);
        return Ok(2);
    }

    Ok(0)
}

/// Whether the report goes to stdout rather than a file.
fn is_stdout(output: &Path) -> bool {
    output.as_os_str() == "-"
}

/// Progress and summary lines move to stderr when stdout carries the report.
fn status_writer(report_on_stdout: bool) -> Box<dyn Write> {
    if report_on_stdout {
        Box::new(std::io::stderr())
    } else {
        Box::new(std::io::stdout())
    }
}

/// Write the rendered report to `output`, or to `stdout` when the path is "-".
fn emit_report(
    report: &Report,
    format: OutputFormat,
    options: &ReportOptions,
    output: &Path,
    stdout: &mut dyn Write,
) -> Result<()> {
    if is_stdout(output) {
        let rendered = report::render_report(report, format, options)?;
        stdout
            .write_all(rendered.as_bytes())
            .context("Failed to write report to stdout")?;
        stdout.flush()?;
    } else {
        report::write_report(report, format, options, output)?;
    }
    Ok(())
}

/// Assemble the full report for a view.
fn build_report(engine: &Engine, state: &ViewState, ctx: &ReportContext) -> Report {
    Report {
        metadata: ReportMetadata {
            geojson_source: ctx.geojson_source.clone(),
            detail_source: ctx.detail_source.clone(),
            generated_at: Utc::now(),
            view: state.clone(),
            metros_loaded: engine.metro_count(),
        },
        panel: engine.summary(state),
        table: engine.query(state),
    }
}

/// Warn about selections and filters that cannot match anything.
fn check_view(engine: &Engine, state: &ViewState) {
    if !engine.is_known(&state.selection) {
        warn!("Metro '{}' is not in the dataset", state.selection);
    }

    let options = engine.filter_options();
    if let Filter::Only(ref gender) = state.gender {
        if !options.genders.contains(gender) {
            warn!("Gender '{}' does not occur in the dataset", gender);
        }
    }
    if let Filter::Only(ref race) = state.race {
        if !options.races.contains(race) {
            warn!("Race/ethnicity '{}' does not occur in the dataset", race);
        }
    }
}

/// Print the info panel and breakdown table for the current view.
fn print_view(engine: &Engine, state: &ViewState, ctx: &ReportContext) {
    println!();
    print!("{}", report::generate_panel_section(&engine.summary(state)));
    print!("{}", report::generate_table_section(&engine.query(state), &ctx.options));
}

/// Interactive mode: one command per line on stdin.
async fn run_interactive(engine: &Engine, mut session: Session, ctx: &ReportContext) -> Result<()> {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    println!("{}", session::HELP);
    print_view(engine, session.state(), ctx);

    loop {
        print!("\noyatlas> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let event: Event = match line.parse() {
            Ok(event) => event,
            Err(message) => {
                eprintln!("{}", message);
                continue;
            }
        };
        debug!("Event: {:?}", event);

        match session.apply(event) {
            Action::Render => {
                check_view(engine, session.state());
                print_view(engine, session.state(), ctx);
            }
            Action::ShowOptions => {
                print!("{}", report::generate_filter_options(&engine.filter_options()));
            }
            Action::ListMetros => {
                let year = session.state().year;
                print!("{}", report::generate_metro_index(&engine.metro_index(year), year));
            }
            Action::Export(path) => {
                let format = OutputFormat::from_path(&path).unwrap_or_default();
                let report = build_report(engine, session.state(), ctx);
                match report::write_report(&report, format, &ctx.options, &path) {
                    Ok(()) => println!("✅ Saved {}", path.display()),
                    Err(e) => eprintln!("❌ {:#}", e),
                }
            }
            Action::Help => println!("{}", session::HELP),
            Action::Quit => break,
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
