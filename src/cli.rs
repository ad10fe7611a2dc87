// CLI module - command-line argument parsing and handlers
//
// Subcommands:
// - watch:   load the bus log, print visible telegrams and follow the file
// - stats:   print traffic statistics for the loaded log
// - filters: manage the named filter document
// - config:  inspect or regenerate the config file

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use knx_lens::config::{Config, VERSION};
use knx_lens::engine::{Command, Engine};
use knx_lens::error::IngestError;
use knx_lens::filter::shorten_payload;
use knx_lens::parser::{LogRecord, TimeRange};
use knx_lens::project::AddressBook;
use knx_lens::selection::NamedFilters;
use knx_lens::stats::Grouping;
use knx_lens::watch::{self, StopReason};
use std::io::{ErrorKind, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Instant;

/// KNX-Lens - headless viewer for KNX bus logs
#[derive(Parser)]
#[command(name = "knx-lens")]
#[command(version = VERSION)]
#[command(about = "Follow, filter and summarize KNX bus logs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print visible telegrams and follow the log (default)
    Watch(WatchArgs),

    /// Print traffic statistics
    Stats(StatsArgs),

    /// Manage named filters
    Filters {
        #[command(subcommand)]
        action: FilterAction,
    },

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

/// Where the log and names come from
#[derive(Args, Debug, Default, Clone)]
pub struct SourceArgs {
    /// Bus log (.log, .log.gz or .zip); overrides LOG_FILE
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// JSON project export; overrides KNX_PROJECT_PATH
    #[arg(long)]
    pub project: Option<PathBuf>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Activate a named filter (repeatable)
    #[arg(long = "filter", value_name = "NAME")]
    pub filters: Vec<String>,

    /// Only show telegrams matching this regex (case-insensitive)
    #[arg(long)]
    pub regex: Option<String>,

    /// Select a group address (repeatable)
    #[arg(long = "select", value_name = "ADDR")]
    pub addresses: Vec<String>,

    /// Start of the time-of-day window (HH:MM or HH:MM:SS)
    #[arg(long)]
    pub from: Option<String>,

    /// End of the time-of-day window (HH:MM or HH:MM:SS)
    #[arg(long)]
    pub to: Option<String>,

    /// Print the current view and exit
    #[arg(long)]
    pub once: bool,

    /// Print payloads as logged instead of shortened
    #[arg(long)]
    pub full_payload: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Which grouping to print
    #[arg(long, value_enum, default_value_t = StatsGrouping::All)]
    pub by: StatsGrouping,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsGrouping {
    Source,
    Destination,
    Hierarchy,
    All,
}

impl StatsGrouping {
    fn groupings(self) -> Vec<Grouping> {
        match self {
            Self::Source => vec![Grouping::BySource],
            Self::Destination => vec![Grouping::ByDestination],
            Self::Hierarchy => vec![Grouping::Hierarchy],
            Self::All => vec![Grouping::BySource, Grouping::ByDestination, Grouping::Hierarchy],
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum FilterAction {
    /// List filters with their rule counts
    List,
    /// Show the rules of one filter
    Show { name: String },
    /// Create an empty filter
    Create { name: String },
    /// Delete a filter
    Delete { name: String },
    /// Add a group address or regex rule
    AddRule { name: String, rule: String },
    /// Replace a rule
    EditRule { name: String, old: String, new: String },
    /// Remove a rule
    DeleteRule { name: String, rule: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared setup
// ─────────────────────────────────────────────────────────────────────────────

fn load_book(config: &Config) -> Result<AddressBook> {
    match &config.project_file {
        Some(path) => AddressBook::load(path)
            .with_context(|| format!("Failed to load project {}", path.display())),
        None => Ok(AddressBook::default()),
    }
}

fn apply_source(config: &mut Config, source: &SourceArgs) {
    if let Some(log) = &source.log {
        config.log_file = Some(log.clone());
    }
    if let Some(project) = &source.project {
        config.project_file = Some(project.clone());
    }
}

/// Build an engine and run the initial load
///
/// A missing log is not an error: the engine keeps polling until it appears.
fn open_engine(config: &Config, time_range: TimeRange) -> Result<Engine> {
    let book = load_book(config)?;
    let filters = NamedFilters::load(&config.named_filters).with_context(|| {
        format!(
            "Failed to load named filters {}",
            config.named_filters.display()
        )
    })?;

    let mut settings = config.engine_settings();
    settings.time_range = time_range;
    let mut engine = Engine::new(settings, book, filters, Instant::now());

    let report = engine.load();
    match report.error {
        None => tracing::info!(
            "Loaded {} telegrams from {} ({} lines skipped, {:?})",
            report.records,
            report.source.display(),
            report.skipped,
            report.duration
        ),
        Some(IngestError::SourceNotFound(_)) => {
            tracing::warn!("{} does not exist yet, waiting for it", report.source.display())
        }
        Some(e) => return Err(e).context("Failed to load the bus log"),
    }
    Ok(engine)
}

// ─────────────────────────────────────────────────────────────────────────────
// watch
// ─────────────────────────────────────────────────────────────────────────────

fn display_line(record: &LogRecord, full_payload: bool) -> String {
    if full_payload {
        return record.to_line();
    }
    let shortened = LogRecord::new(
        record.timestamp.as_str(),
        record.source_id.as_str(),
        record.source_name.as_str(),
        record.dest_id.as_str(),
        record.dest_name.as_str(),
        shorten_payload(&record.payload),
    );
    shortened.to_line()
}

/// Write one output line; a failed write ends output
///
/// A reader that went away (`head`, a closed pager) is a normal end.
fn write_line(out: &mut impl Write, line: &str) -> ControlFlow<()> {
    match writeln!(out, "{}", line) {
        Ok(()) => ControlFlow::Continue(()),
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            tracing::debug!("Output closed");
            ControlFlow::Break(())
        }
        Err(e) => {
            tracing::warn!("Cannot write output: {}", e);
            ControlFlow::Break(())
        }
    }
}

pub async fn handle_watch(mut config: Config, args: WatchArgs) -> Result<()> {
    apply_source(&mut config, &args.source);
    let start = args.from.clone().or_else(|| config.time_start.clone());
    let end = args.to.clone().or_else(|| config.time_end.clone());
    let time_range = TimeRange::from_input(start.as_deref(), end.as_deref());

    let mut engine = open_engine(&config, time_range)?;
    let now = Instant::now();

    if !args.addresses.is_empty() {
        engine.execute(Command::SelectAddresses(args.addresses.clone()), now)?;
    }
    for name in &args.filters {
        engine
            .execute(Command::ActivateFilter(name.clone()), now)
            .with_context(|| format!("Cannot activate filter '{}'", name))?;
    }
    if let Some(regex) = &args.regex {
        engine
            .execute(Command::SetGlobalRegex(Some(regex.clone())), now)
            .with_context(|| format!("Invalid regex '{}'", regex))?;
    }

    let stdout = std::io::stdout();
    let full_payload = args.full_payload;

    if args.once {
        let mut out = stdout.lock();
        for record in engine.visible_records() {
            if write_line(&mut out, &display_line(record, full_payload)).is_break() {
                break;
            }
        }
        return Ok(());
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let (stop, summary) = watch::run(
        &mut engine,
        config.reload_interval(),
        |record| write_line(&mut stdout.lock(), &display_line(record, full_payload)),
        shutdown,
    )
    .await?;

    match stop {
        StopReason::Shutdown => tracing::info!("Stopped"),
        StopReason::Disarmed => tracing::info!("Auto-reload is off, stopped following the log"),
        StopReason::OutputClosed => tracing::info!("Output closed, stopped following the log"),
    }
    tracing::debug!(
        "{} ticks, {} appended, {} reloads, {} lines printed",
        summary.ticks,
        summary.appended,
        summary.reloads,
        summary.emitted
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// stats
// ─────────────────────────────────────────────────────────────────────────────

pub fn handle_stats(mut config: Config, args: StatsArgs) -> Result<()> {
    apply_source(&mut config, &args.source);
    let engine = open_engine(&config, config.time_range())?;
    let stats = engine.statistics();

    if args.json {
        let json = if args.by == StatsGrouping::All {
            serde_json::to_string_pretty(&stats)?
        } else {
            let grouping = args.by.groupings()[0];
            serde_json::to_string_pretty(stats.grouping(grouping))?
        };
        println!("{}", json);
        return Ok(());
    }

    let mut out = std::io::stdout().lock();
    let header = format!("{} telegrams, {} bytes", stats.total_count, stats.total_bytes);
    let lines = args
        .by
        .groupings()
        .into_iter()
        .flat_map(|grouping| std::iter::once(String::new()).chain(stats.render(grouping)));
    for line in std::iter::once(header).chain(lines) {
        if write_line(&mut out, &line).is_break() {
            break;
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// filters
// ─────────────────────────────────────────────────────────────────────────────

pub fn handle_filters(config: Config, action: FilterAction) -> Result<()> {
    let book = load_book(&config)?;
    let path = &config.named_filters;
    let mut filters = NamedFilters::load(path)
        .with_context(|| format!("Failed to load named filters {}", path.display()))?;

    let changed = match action {
        FilterAction::List => {
            for (name, filter) in filters.iter() {
                println!("{}  ({} rules)", name, filter.rules().len());
            }
            false
        }
        FilterAction::Show { name } => {
            let Some(filter) = filters.get(&name) else {
                bail!("No filter named '{}'", name);
            };
            for rule in filter.rules() {
                match book.group_name(rule) {
                    Some(label) => println!("{}  # {}", rule, label),
                    None => println!("{}", rule),
                }
            }
            false
        }
        FilterAction::Create { name } => {
            filters.create(&name)?;
            true
        }
        FilterAction::Delete { name } => {
            filters.delete(&name)?;
            true
        }
        FilterAction::AddRule { name, rule } => {
            filters.add_rule(&name, &rule)?;
            true
        }
        FilterAction::EditRule { name, old, new } => {
            filters.edit_rule(&name, &old, &new)?;
            true
        }
        FilterAction::DeleteRule { name, rule } => {
            filters.delete_rule(&name, &rule)?;
            true
        }
    };

    if changed {
        filters.save(&book)?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// config
// ─────────────────────────────────────────────────────────────────────────────

pub fn handle_config(show: bool, reset: bool, path: bool) -> Result<()> {
    if path {
        handle_config_path()
    } else if show {
        handle_config_show();
        Ok(())
    } else if reset {
        handle_config_reset()
    } else {
        println!("Usage: knx-lens config [--show|--reset|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --path    Show config file path");
        Ok(())
    }
}

fn handle_config_path() -> Result<()> {
    let path = Config::config_path().context("Could not determine config path")?;
    println!("{}", path.display());
    Ok(())
}

fn handle_config_show() {
    let config = Config::from_env();

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());
    println!();
    println!("# Log file in use: {}", config.resolved_log_file().display());

    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

fn handle_config_reset() -> Result<()> {
    let path = Config::config_path().context("Could not determine config path")?;

    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    Config::write_template(&path)
        .with_context(|| format!("Error writing config {}", path.display()))?;
    println!("Config reset to defaults: {}", path.display());
    Ok(())
}
