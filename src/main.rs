//! EventHarvest — event log ingestion, normalization and filtered export.
//!
//! Entry point: initialises structured logging, then dispatches one of the
//! boundary operations (`ingest`, `filter`, `query`, `export`) onto an
//! [`Engine`] wired from the command-line paths. On Windows the live Evt*
//! channel backend is used; on other hosts channels are read from JSONL
//! captures under `--log-dir`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use eventharvest::core::event_record::EventType;
use eventharvest::core::filter::FilterCriteria;
use eventharvest::core::log_source::LogSource;
use eventharvest::engine::Engine;
use eventharvest::export::csv_sink::CsvSink;
use eventharvest::store::event_store::{EventStore, OrderBy, StoreQuery, TimeRange};
use eventharvest::util::constants;
use eventharvest::util::error::Result;

#[derive(Debug, Parser)]
#[command(name = "eventharvest", version, about)]
struct Cli {
    /// Path of the append-only record store.
    #[arg(long, default_value = constants::DEFAULT_STORE_FILE, global = true)]
    store: PathBuf,

    /// Path of the ingestion-path CSV mirror.
    #[arg(long, default_value = constants::INGEST_CSV_FILE, global = true)]
    ingest_csv: PathBuf,

    /// Path of the filter-path CSV output.
    #[arg(long, default_value = constants::FILTER_CSV_FILE, global = true)]
    filter_csv: PathBuf,

    /// Directory holding JSONL channel captures (non-Windows hosts).
    #[arg(long, default_value = ".", global = true)]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read a channel to exhaustion, persisting and mirroring every entry.
    Ingest {
        /// Channel to read.
        #[arg(long, default_value = constants::DEFAULT_CHANNEL)]
        channel: String,
    },

    /// Scan a channel live against predicates, appending matches to the
    /// filter CSV.
    Filter {
        /// Channel to scan.
        #[arg(long, default_value = constants::DEFAULT_CHANNEL)]
        channel: String,

        /// Named predicate preset; explicit predicates refine it.
        #[arg(long, value_enum)]
        preset: Option<PresetArg>,

        /// Accepted event classifications.
        #[arg(long = "event-type", value_enum)]
        event_types: Vec<TypeArg>,

        /// Accepted numeric event codes.
        #[arg(long = "event-id")]
        event_ids: Vec<u16>,

        /// Exact computer name to accept.
        #[arg(long)]
        computer: Option<String>,

        /// Exact user name to accept.
        #[arg(long)]
        user: Option<String>,

        /// Maximum entry age in seconds; exceeding it stops the scan.
        #[arg(long)]
        window_secs: Option<i64>,
    },

    /// Query the record store.
    Query {
        /// Numeric event code to match.
        #[arg(long)]
        event_id: Option<u16>,

        /// Exact computer name to match.
        #[arg(long)]
        computer: Option<String>,

        /// Exact user name to match.
        #[arg(long)]
        user: Option<String>,

        /// Ingestion-date window.
        #[arg(long, value_enum)]
        range: Option<RangeArg>,

        /// Sort key (always descending).
        #[arg(long, value_enum, default_value = "created")]
        order: OrderArg,
    },

    /// Write the whole store to a fresh CSV snapshot.
    Export {
        /// Output file.
        #[arg(long, default_value = constants::EXPORT_CSV_FILE)]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    LogonSuccess,
    LogonFailure,
    LogonActivity,
}

impl PresetArg {
    fn criteria(self) -> FilterCriteria {
        match self {
            PresetArg::LogonSuccess => FilterCriteria::logon_success(),
            PresetArg::LogonFailure => FilterCriteria::logon_failure(),
            PresetArg::LogonActivity => FilterCriteria::logon_activity(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TypeArg {
    AuditFailure,
    AuditSuccess,
    Information,
    Warning,
    Error,
    Unknown,
}

impl From<TypeArg> for EventType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::AuditFailure => EventType::AuditFailure,
            TypeArg::AuditSuccess => EventType::AuditSuccess,
            TypeArg::Information => EventType::Information,
            TypeArg::Warning => EventType::Warning,
            TypeArg::Error => EventType::Error,
            TypeArg::Unknown => EventType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RangeArg {
    EightHours,
    OneDay,
    Week,
    Month,
    All,
}

impl From<RangeArg> for TimeRange {
    fn from(arg: RangeArg) -> Self {
        match arg {
            RangeArg::EightHours => TimeRange::EightHours,
            RangeArg::OneDay => TimeRange::OneDay,
            RangeArg::Week => TimeRange::Week,
            RangeArg::Month => TimeRange::Month,
            RangeArg::All => TimeRange::AllPeriod,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OrderArg {
    Created,
    Timestamp,
}

impl From<OrderArg> for OrderBy {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Created => OrderBy::CreatedDate,
            OrderArg::Timestamp => OrderBy::Timestamp,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging();
    tracing::info!(
        "{} v{} starting",
        constants::APP_NAME,
        constants::APP_VERSION
    );

    if let Err(e) = run(cli) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let engine = Engine::new(
        EventStore::new(&cli.store),
        CsvSink::new(&cli.ingest_csv, &constants::INGEST_CSV_HEADER),
        CsvSink::new(&cli.filter_csv, &constants::FILTER_CSV_HEADER),
    );

    match cli.command {
        Command::Ingest { ref channel } => {
            let mut source = open_source(&cli);
            let summary = engine.ingest(source.as_mut(), channel)?;
            println!(
                "persisted {} of {} ({} skipped, {} write failures)",
                summary.persisted,
                summary.total_in_channel,
                summary.skipped,
                summary.write_failures
            );
        }

        Command::Filter {
            ref channel,
            preset,
            ref event_types,
            ref event_ids,
            ref computer,
            ref user,
            window_secs,
        } => {
            let mut criteria = preset.map(PresetArg::criteria).unwrap_or_default();
            if !event_types.is_empty() {
                criteria.event_types =
                    Some(event_types.iter().map(|&t| EventType::from(t)).collect());
            }
            if !event_ids.is_empty() {
                criteria.event_ids = Some(event_ids.clone());
            }
            if computer.is_some() {
                criteria.computer_name = computer.clone();
            }
            if user.is_some() {
                criteria.user_name = user.clone();
            }
            if window_secs.is_some() {
                criteria.seconds_window = window_secs;
            }

            let mut source = open_source(&cli);
            let outcome = engine.query_filtered(source.as_mut(), channel, criteria)?;
            println!(
                "matched {} of {} scanned{}",
                outcome.matched,
                outcome.scanned,
                if outcome.stopped_early {
                    " (stopped at recency window)"
                } else {
                    ""
                }
            );
        }

        Command::Query {
            event_id,
            ref computer,
            ref user,
            range,
            order,
        } => {
            let query = StoreQuery {
                event_id,
                computer_name: computer.clone(),
                user_name: user.clone(),
                created_within: range.map(TimeRange::from),
                order: order.into(),
            };
            let records = engine.query(&query)?;
            for r in &records {
                println!(
                    "{}  {:>5}  {:<12}  {:<16}  {:<16}  {}",
                    r.time, r.event_id, r.event_type, r.computer_name, r.user_name, r.message
                );
            }
            println!("{} records", records.len());
        }

        Command::Export { ref out } => {
            let written = engine.export_all_to_csv(out)?;
            println!("wrote {written} rows to {}", out.display());
        }
    }
    Ok(())
}

/// Pick the channel backend for this host.
#[cfg(windows)]
fn open_source(_cli: &Cli) -> Box<dyn LogSource> {
    Box::new(eventharvest::core::win_channel::EvtChannel::new())
}

/// Pick the channel backend for this host.
#[cfg(not(windows))]
fn open_source(cli: &Cli) -> Box<dyn LogSource> {
    Box::new(eventharvest::core::log_source::JsonlChannel::new(
        &cli.log_dir,
    ))
}

/// Initialise the stderr tracing subscriber, filtered by `RUST_LOG`
/// (default: `info`).
fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();
}
