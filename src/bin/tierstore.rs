//! `tierstore` command-line tool.
//!
//! ```text
//! tierstore serve [addr]
//! tierstore datapoints [--with-gauges]
//! tierstore series <metric> <begin> <end>
//! tierstore truncate <metric> <since>
//! tierstore drain <key>
//! ```
//!
//! Backend and retention settings come from the file named by
//! `TIERSTORE_CONFIG`, or the built-in defaults.

use std::process::ExitCode;
use tierstore::observability::init_tracing;
use tierstore::server::LoopbackServer;
use tierstore::{Backend, TierstoreConfig, TimeSeriesStore};
use tracing::{error, info};

const USAGE: &str = "usage: tierstore <serve [addr] | datapoints [--with-gauges] | \
series <metric> <begin> <end> | truncate <metric> <since> | drain <key>>";

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    let config = match TierstoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tierstore: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };

    let result = match (command.as_str(), rest) {
        ("serve", []) => serve("127.0.0.1:6379"),
        ("serve", [addr]) => serve(addr),
        ("datapoints", []) => datapoints(&config, false),
        ("datapoints", [flag]) if flag == "--with-gauges" => datapoints(&config, true),
        ("series", [metric, begin, end]) => series(&config, metric, begin, end),
        ("truncate", [metric, since]) => truncate(&config, metric, since),
        ("drain", [key]) => drain(&config, key),
        _ => {
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(command = %command, error = %e, "command failed");
            eprintln!("tierstore: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn open_store(config: &TierstoreConfig) -> Result<TimeSeriesStore<Box<dyn Backend>>, Box<dyn std::error::Error>> {
    let retentions = config.retention_table()?;
    let backend = config.backend.connect()?;
    Ok(TimeSeriesStore::new(backend, retentions))
}

fn parse_timestamp(arg: &str) -> Result<i64, Box<dyn std::error::Error>> {
    arg.parse::<i64>()
        .map_err(|_| format!("invalid timestamp {:?}", arg).into())
}

fn serve(addr: &str) -> CliResult {
    info!(addr, "starting loopback server");
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(LoopbackServer::new(addr).run())?;
    Ok(())
}

fn datapoints(config: &TierstoreConfig, include_gauges: bool) -> CliResult {
    let store = open_store(config)?;
    let listed = store.list_datapoints(include_gauges)?;
    for (name, kind) in &listed.entries {
        println!("{}\t{}", name, kind);
    }
    for rejected in &listed.rejected {
        eprintln!("skipped: {}", rejected);
    }
    Ok(())
}

fn series(config: &TierstoreConfig, metric: &str, begin: &str, end: &str) -> CliResult {
    let (begin, end) = (parse_timestamp(begin)?, parse_timestamp(end)?);
    let store = open_store(config)?;
    let read = store.read_series(metric, begin, end)?;
    for point in &read.points {
        println!("{}", serde_json::to_string(point)?);
    }
    for err in &read.errors {
        eprintln!("skipped: {}", err);
    }
    Ok(())
}

fn truncate(config: &TierstoreConfig, metric: &str, since: &str) -> CliResult {
    let since = parse_timestamp(since)?;
    let store = open_store(config)?;
    let removed = store.truncate_series(metric, since)?;
    println!("{}", removed);
    Ok(())
}

fn drain(config: &TierstoreConfig, key: &str) -> CliResult {
    let store = open_store(config)?;
    match store.drain_and_clear(key)? {
        Some(value) => println!("{}", value),
        None => println!("(nil)"),
    }
    Ok(())
}
