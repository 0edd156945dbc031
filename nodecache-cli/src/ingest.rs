//! Ingest command: stream an OSM PBF file into a point store.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::{debug, info};
use nodecache_core::{DEFAULT_DENSE_CAPACITY, ElementCacheWriter, PointWriter};
use nodecache_store::element_cache::typed::write_encoded;
use nodecache_store::paths::with_suffix;
use nodecache_store::{
    BoxedCacheWriter, BoxedPointWriter, ElementCacheKind, PointStorageKind, StoreOptions,
    open_cache_writer, open_point_writer,
};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmpbf::{Element, ElementReader};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_DENSE_CAPACITY, ARG_OSM_PBF, ARG_OUTPUT, ARG_STORAGE, ARG_WAYS_CACHE, CliError,
    ENV_INGEST_OSM_PBF, ENV_INGEST_OUTPUT, write_json,
};

/// Suffix of the way node-list cache written next to the point store.
pub(crate) const WAYS_SUFFIX: &str = ".ways";

/// CLI arguments for the `ingest` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Stream the nodes of an OpenStreetMap PBF file into a \
                 coordinate store and, when a ways cache is requested, cache \
                 each way's node references. Options can come from CLI \
                 flags, configuration files, or environment variables.",
    about = "Build a node coordinate store from an OSM PBF file"
)]
#[ortho_config(prefix = "NODECACHE")]
pub(crate) struct IngestArgs {
    /// Path to the OpenStreetMap PBF file.
    #[arg(long = ARG_OSM_PBF, value_name = "path")]
    #[serde(default)]
    pub(crate) osm_pbf: Option<Utf8PathBuf>,
    /// Base name of the artefacts to write.
    #[arg(long = ARG_OUTPUT, value_name = "prefix")]
    #[serde(default)]
    pub(crate) output: Option<Utf8PathBuf>,
    /// Point storage medium (dense-file, dense-memory, sparse, sqlite).
    #[arg(long = ARG_STORAGE, value_name = "kind")]
    #[serde(default)]
    pub(crate) storage: Option<PointStorageKind>,
    /// Also cache way node references using this medium (file, sqlite).
    #[arg(long = ARG_WAYS_CACHE, value_name = "kind")]
    #[serde(default)]
    pub(crate) ways_cache: Option<ElementCacheKind>,
    /// Slots allocated by the dense-memory store.
    #[arg(long = ARG_DENSE_CAPACITY, value_name = "slots")]
    #[serde(default)]
    pub(crate) dense_capacity: Option<u64>,
}

impl IngestArgs {
    pub(crate) fn into_config(self) -> Result<IngestConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        IngestConfig::try_from(merged)
    }
}

/// Resolved `ingest` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IngestConfig {
    pub(crate) osm_pbf: Utf8PathBuf,
    pub(crate) output: Utf8PathBuf,
    pub(crate) storage: PointStorageKind,
    pub(crate) ways_cache: Option<ElementCacheKind>,
    pub(crate) dense_capacity: u64,
}

impl IngestConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.osm_pbf, ARG_OSM_PBF)
    }

    /// Name of the way cache derived from the output prefix.
    pub(crate) fn ways_path(&self) -> Utf8PathBuf {
        with_suffix(&self.output, WAYS_SUFFIX)
    }

    fn store_options(&self) -> StoreOptions {
        StoreOptions {
            dense_capacity: self.dense_capacity,
            ..StoreOptions::default()
        }
    }
}

impl TryFrom<IngestArgs> for IngestConfig {
    type Error = CliError;

    fn try_from(args: IngestArgs) -> Result<Self, Self::Error> {
        let osm_pbf = args.osm_pbf.ok_or(CliError::MissingArgument {
            field: ARG_OSM_PBF,
            env: ENV_INGEST_OSM_PBF,
        })?;
        let output = args.output.ok_or(CliError::MissingArgument {
            field: ARG_OUTPUT,
            env: ENV_INGEST_OUTPUT,
        })?;
        Ok(Self {
            osm_pbf,
            output,
            storage: args.storage.unwrap_or_default(),
            ways_cache: args.ways_cache,
            dense_capacity: args.dense_capacity.unwrap_or(DEFAULT_DENSE_CAPACITY),
        })
    }
}

pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match nodecache_fs::file_is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            })
        }
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Counts reported once ingestion finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct IngestSummary {
    /// Node coordinates written to the point store.
    pub(crate) nodes: u64,
    /// Ways seen in the input.
    pub(crate) ways: u64,
    /// Ways whose node references were cached.
    pub(crate) cached_ways: u64,
    /// Relations seen in the input.
    pub(crate) relations: u64,
    /// Elements dropped because their id is negative.
    pub(crate) skipped_ids: u64,
}

/// Owned view of the PBF elements the ingestor cares about.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OsmElement {
    Node { id: i64, lat: f64, lon: f64 },
    Way { id: i64, refs: Vec<i64> },
    Relation,
}

impl OsmElement {
    fn from_pbf(element: &Element<'_>) -> Self {
        match element {
            Element::Node(node) => Self::Node {
                id: node.id(),
                lat: node.lat(),
                lon: node.lon(),
            },
            Element::DenseNode(node) => Self::Node {
                id: node.id(),
                lat: node.lat(),
                lon: node.lon(),
            },
            Element::Way(way) => Self::Way {
                id: way.id(),
                refs: way.refs().collect(),
            },
            Element::Relation(_) => Self::Relation,
        }
    }
}

/// Feeds elements into the configured writers.
///
/// `osmpbf` drives the iteration through a closure that cannot return an
/// error, so the first failure is parked here and every later element is
/// ignored.
pub(crate) struct Ingestor {
    points: BoxedPointWriter,
    ways: Option<BoxedCacheWriter>,
    summary: IngestSummary,
    failure: Option<CliError>,
}

impl Ingestor {
    pub(crate) fn new(points: BoxedPointWriter, ways: Option<BoxedCacheWriter>) -> Self {
        Self {
            points,
            ways,
            summary: IngestSummary::default(),
            failure: None,
        }
    }

    pub(crate) fn process(&mut self, element: OsmElement) {
        if self.failure.is_some() {
            return;
        }
        if let Err(err) = self.try_process(element) {
            self.failure = Some(err);
        }
    }

    fn try_process(&mut self, element: OsmElement) -> Result<(), CliError> {
        match element {
            OsmElement::Node { id, lat, lon } => {
                let Ok(id) = u64::try_from(id) else {
                    debug!("skipping node with negative id {id}");
                    self.summary.skipped_ids += 1;
                    return Ok(());
                };
                self.points.add_point(id, lat, lon)?;
                self.summary.nodes += 1;
            }
            OsmElement::Way { id, refs } => {
                self.summary.ways += 1;
                let Some(cache) = self.ways.as_mut() else {
                    return Ok(());
                };
                let Ok(id) = u64::try_from(id) else {
                    debug!("skipping way with negative id {id}");
                    self.summary.skipped_ids += 1;
                    return Ok(());
                };
                write_encoded(cache, id, &refs)?;
                self.summary.cached_ways += 1;
            }
            OsmElement::Relation => self.summary.relations += 1,
        }
        Ok(())
    }

    /// Surface any parked failure, then flush every writer.
    pub(crate) fn finish(mut self) -> Result<IngestSummary, CliError> {
        if let Some(err) = self.failure.take() {
            return Err(err);
        }
        self.points.flush()?;
        if let Some(cache) = self.ways.as_mut() {
            cache.save_offsets()?;
        }
        Ok(self.summary)
    }
}

pub(crate) fn run_ingest(args: IngestArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_ingest_with(args, &mut stdout)
}

pub(crate) fn run_ingest_with(args: IngestArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = resolve_ingest_config(args)?;
    let summary = ingest_file(&config)?;
    write_json(writer, &summary)
}

pub(crate) fn resolve_ingest_config(args: IngestArgs) -> Result<IngestConfig, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    Ok(config)
}

pub(crate) fn ingest_file(config: &IngestConfig) -> Result<IngestSummary, CliError> {
    let options = config.store_options();
    let points = open_point_writer(config.storage, &config.output, &options)?;
    let ways = config
        .ways_cache
        .map(|kind| open_cache_writer(kind, &config.ways_path(), &options))
        .transpose()?;

    let reader =
        ElementReader::from_path(config.osm_pbf.as_std_path()).map_err(|source| {
            CliError::OpenOsm {
                path: config.osm_pbf.clone(),
                source,
            }
        })?;

    info!(
        "ingesting {} into {} store {}",
        config.osm_pbf, config.storage, config.output
    );
    let mut ingestor = Ingestor::new(points, ways);
    reader
        .for_each(|element| ingestor.process(OsmElement::from_pbf(&element)))
        .map_err(|source| CliError::ReadOsm {
            path: config.osm_pbf.clone(),
            source,
        })?;
    let summary = ingestor.finish()?;
    info!(
        "ingested {} nodes and cached {} of {} ways",
        summary.nodes, summary.cached_ways, summary.ways
    );
    Ok(summary)
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<IngestConfig, CliError> {
    let merged = IngestArgs::merge_from_layers(layers).map_err(CliError::from)?;
    IngestConfig::try_from(merged)
}
