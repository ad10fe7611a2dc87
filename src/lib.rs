// KNX-Lens - live view over KNX bus telegram logs
//
// The library is the headless engine: it ingests an append-only, rotating
// bus log, keeps a bounded cache of parsed telegrams, filters them through
// address selections and regex rules, and summarizes traffic.
//
// Architecture:
// - Ingest: full loads (plain, .gz, .zip) and incremental tails of the log
// - Parser: turns fixed-width log lines into records
// - Store: bounded record cache and per-address payload history
// - Selection / Filter: tri-state address tree selection, named filters, regex
// - Stats: byte shares and send-cycle estimates
// - Engine: owns all of the above; every user action is a Command
// - Watch: the single tokio timer loop that keeps the engine following the file

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod logging;
pub mod parser;
pub mod project;
pub mod selection;
pub mod stats;
pub mod store;
pub mod util;
pub mod watch;
