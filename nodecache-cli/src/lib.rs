//! Command-line interface for building and querying node coordinate stores.
#![forbid(unsafe_code)]

use std::io::Write;

use clap::{Parser, Subcommand};
use serde::Serialize;

mod error;
mod ingest;
mod lookup;

pub use error::CliError;
use ingest::{IngestArgs, run_ingest};
use lookup::{LookupCommand, run_lookup};

const ARG_OSM_PBF: &str = "osm-pbf";
const ARG_OUTPUT: &str = "output";
const ARG_STORAGE: &str = "storage";
const ARG_WAYS_CACHE: &str = "ways-cache";
const ARG_DENSE_CAPACITY: &str = "dense-capacity";
const ARG_INPUT: &str = "input";
const ENV_INGEST_OSM_PBF: &str = "NODECACHE_CMDS_INGEST_OSM_PBF";
const ENV_INGEST_OUTPUT: &str = "NODECACHE_CMDS_INGEST_OUTPUT";
const ENV_LOOKUP_INPUT: &str = "NODECACHE_CMDS_LOOKUP_INPUT";

/// Run the nodecache CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Ingest(args) => run_ingest(args),
        Command::Lookup(command) => run_lookup(command),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "nodecache",
    about = "Build and query OSM node coordinate stores",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load node coordinates (and optionally way node lists) from an OSM PBF file.
    Ingest(IngestArgs),
    /// Look node coordinates up in a previously built store.
    Lookup(LookupCommand),
}

fn write_json<T: Serialize + ?Sized>(writer: &mut dyn Write, value: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(value).map_err(CliError::SerialiseOutput)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[cfg(test)]
mod tests;
