//! Lookup command: print stored coordinates for a list of node ids.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::{Args, Parser};
use nodecache_core::PointReader;
use nodecache_store::{PointStorageKind, StoreOptions, open_point_reader};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{ARG_INPUT, ARG_STORAGE, CliError, ENV_LOOKUP_INPUT, write_json};

/// Layered options for the `lookup` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[ortho_config(prefix = "NODECACHE")]
pub(crate) struct LookupArgs {
    /// Base name the store was written under.
    #[arg(long = ARG_INPUT, value_name = "prefix")]
    #[serde(default)]
    pub(crate) input: Option<Utf8PathBuf>,
    /// Point storage medium the store was written with.
    #[arg(long = ARG_STORAGE, value_name = "kind")]
    #[serde(default)]
    pub(crate) storage: Option<PointStorageKind>,
}

/// `lookup` invocation: layered options plus the ids to resolve.
#[derive(Debug, Clone, Args)]
#[command(
    long_about = "Open a node coordinate store written by `ingest` and print \
                 the coordinate of each requested node as JSON. Nodes that \
                 were never written are reported with null coordinates.",
    about = "Look node coordinates up by id"
)]
pub(crate) struct LookupCommand {
    #[command(flatten)]
    pub(crate) args: LookupArgs,
    /// Node ids to resolve.
    #[arg(value_name = "id", required = true)]
    pub(crate) ids: Vec<u64>,
}

impl LookupArgs {
    pub(crate) fn into_config(self) -> Result<LookupConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        LookupConfig::try_from(merged)
    }
}

/// Resolved `lookup` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LookupConfig {
    pub(crate) input: Utf8PathBuf,
    pub(crate) storage: PointStorageKind,
}

impl TryFrom<LookupArgs> for LookupConfig {
    type Error = CliError;

    fn try_from(args: LookupArgs) -> Result<Self, Self::Error> {
        let input = args.input.ok_or(CliError::MissingArgument {
            field: ARG_INPUT,
            env: ENV_LOOKUP_INPUT,
        })?;
        Ok(Self {
            input,
            storage: args.storage.unwrap_or_default(),
        })
    }
}

/// One line of lookup output; coordinates are `null` for absent nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LookupResult {
    pub(crate) id: u64,
    pub(crate) lat: Option<f64>,
    pub(crate) lon: Option<f64>,
}

pub(crate) fn run_lookup(command: LookupCommand) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_lookup_with(command, &mut stdout)
}

pub(crate) fn run_lookup_with(
    command: LookupCommand,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let config = command.args.into_config()?;
    let results = lookup_ids(&config, &command.ids)?;
    write_json(writer, &results)
}

pub(crate) fn lookup_ids(
    config: &LookupConfig,
    ids: &[u64],
) -> Result<Vec<LookupResult>, CliError> {
    let reader = open_point_reader(config.storage, &config.input, &StoreOptions::default())?;
    ids.iter()
        .map(|&id| -> Result<LookupResult, CliError> {
            let coord = reader.get_point(id)?;
            Ok(LookupResult {
                id,
                lat: coord.map(|c| c.y),
                lon: coord.map(|c| c.x),
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<LookupConfig, CliError> {
    let merged = LookupArgs::merge_from_layers(layers).map_err(CliError::from)?;
    LookupConfig::try_from(merged)
}
