//! Focused unit tests covering ingest configuration and element handling.

use super::helpers::{Workspace, write_utf8};
use super::*;
use camino::Utf8PathBuf;
use crate::ingest::{
    IngestArgs, IngestConfig, IngestSummary, Ingestor, OsmElement, config_from_layers_for_test,
    ingest_file, run_ingest_with,
};
use nodecache_core::{DEFAULT_DENSE_CAPACITY, ElementCacheReader, PointReader};
use nodecache_store::element_cache::typed::read_decoded;
use nodecache_store::{
    ElementCacheKind, PointStorageKind, PointStoreError, StoreOptions, open_cache_reader,
    open_cache_writer, open_point_reader, open_point_writer,
};
use ortho_config::MergeComposer;
use rstest::rstest;
use serde_json::json;

fn config_for(workspace: &Workspace) -> IngestConfig {
    IngestConfig {
        osm_pbf: workspace.path("extract.osm.pbf"),
        output: workspace.path("nodes"),
        storage: PointStorageKind::Sparse,
        ways_cache: Some(ElementCacheKind::File),
        dense_capacity: DEFAULT_DENSE_CAPACITY,
    }
}

fn ingestor_for(config: &IngestConfig) -> Ingestor {
    let options = StoreOptions::default();
    let points =
        open_point_writer(config.storage, &config.output, &options).expect("open point writer");
    let ways = config.ways_cache.map(|kind| {
        open_cache_writer(kind, &config.ways_path(), &options).expect("open ways cache")
    });
    Ingestor::new(points, ways)
}

#[rstest]
#[case(None, Some("nodes"), ARG_OSM_PBF, ENV_INGEST_OSM_PBF)]
#[case(Some("extract.osm.pbf"), None, ARG_OUTPUT, ENV_INGEST_OUTPUT)]
fn converting_without_required_fields_errors(
    #[case] osm: Option<&str>,
    #[case] output: Option<&str>,
    #[case] field: &'static str,
    #[case] env_var: &'static str,
) {
    let args = IngestArgs {
        osm_pbf: osm.map(Utf8PathBuf::from),
        output: output.map(Utf8PathBuf::from),
        ..IngestArgs::default()
    };
    let err = IngestConfig::try_from(args).expect_err("missing field should error");
    match err {
        CliError::MissingArgument {
            field: missing,
            env,
        } => {
            assert_eq!(missing, field);
            assert_eq!(env, env_var);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn converting_applies_defaults() {
    let args = IngestArgs {
        osm_pbf: Some(Utf8PathBuf::from("extract.osm.pbf")),
        output: Some(Utf8PathBuf::from("out/nodes")),
        ..IngestArgs::default()
    };
    let config = IngestConfig::try_from(args).expect("config should build");
    assert_eq!(config.storage, PointStorageKind::Sparse);
    assert_eq!(config.ways_cache, None);
    assert_eq!(config.dense_capacity, DEFAULT_DENSE_CAPACITY);
    assert_eq!(config.ways_path(), Utf8PathBuf::from("out/nodes.ways"));
}

#[rstest]
fn validate_sources_reports_missing_files() {
    let workspace = Workspace::new();
    let config = config_for(&workspace);
    let err = config.validate_sources().expect_err("expected failure");
    match err {
        CliError::MissingSourceFile { field, path } => {
            assert_eq!(field, ARG_OSM_PBF);
            assert_eq!(path, config.osm_pbf);
        }
        other => panic!("expected MissingSourceFile, found {other:?}"),
    }
}

#[rstest]
fn validate_sources_rejects_directories() {
    let workspace = Workspace::new();
    let mut config = config_for(&workspace);
    config.osm_pbf = workspace.path("extract-dir");
    std::fs::create_dir(config.osm_pbf.as_std_path()).expect("create directory");
    let err = config
        .validate_sources()
        .expect_err("expected directory rejection");
    match err {
        CliError::SourcePathNotFile { field, .. } => assert_eq!(field, ARG_OSM_PBF),
        other => panic!("expected SourcePathNotFile, found {other:?}"),
    }
}

#[rstest]
fn merge_layers_maps_configuration_errors() {
    let mut composer = MergeComposer::new();
    composer.push_cli(json!({ "storage": "tape" }));

    let err = config_from_layers_for_test(composer.layers())
        .expect_err("unknown storage kind should map to CliError::Configuration");
    match err {
        CliError::Configuration(_) => {}
        other => panic!("expected CliError::Configuration, found {other:?}"),
    }
}

#[rstest]
fn merge_layers_honours_precedence() {
    let mut composer = MergeComposer::new();
    composer.push_file(
        json!({
            "osm_pbf": "from-file.osm.pbf",
            "output": "from-file/nodes",
            "storage": "dense-file",
            "dense_capacity": 64,
        }),
        None,
    );
    composer.push_environment(json!({
        "output": "from-env/nodes",
        "ways_cache": "file",
    }));
    composer.push_cli(json!({
        "storage": "sparse",
    }));

    let config =
        config_from_layers_for_test(composer.layers()).expect("merged config should build");
    assert_eq!(config.osm_pbf, Utf8PathBuf::from("from-file.osm.pbf"));
    assert_eq!(config.output, Utf8PathBuf::from("from-env/nodes"));
    assert_eq!(config.storage, PointStorageKind::Sparse);
    assert_eq!(config.ways_cache, Some(ElementCacheKind::File));
    assert_eq!(config.dense_capacity, 64);
}

#[rstest]
fn ingestor_writes_nodes_and_caches_ways() {
    let workspace = Workspace::new();
    let config = config_for(&workspace);
    let mut ingestor = ingestor_for(&config);
    for element in [
        OsmElement::Node {
            id: 1,
            lat: 55.75,
            lon: 37.61,
        },
        OsmElement::Node {
            id: 2,
            lat: -33.86,
            lon: 151.21,
        },
        OsmElement::Way {
            id: 10,
            refs: vec![1, 2, 1],
        },
        OsmElement::Relation,
    ] {
        ingestor.process(element);
    }
    let summary = ingestor.finish().expect("ingestion should succeed");
    assert_eq!(
        summary,
        IngestSummary {
            nodes: 2,
            ways: 1,
            cached_ways: 1,
            relations: 1,
            skipped_ids: 0,
        }
    );

    let options = StoreOptions::default();
    let points = open_point_reader(config.storage, &config.output, &options).expect("open reader");
    let coord = points.get_point(2).expect("lookup").expect("node 2 present");
    assert!((coord.y + 33.86).abs() < 1.0e-6);
    assert!((coord.x - 151.21).abs() < 1.0e-6);

    let mut ways = open_cache_reader(ElementCacheKind::File, &config.ways_path(), &options)
        .expect("open ways cache");
    ways.load_offsets().expect("load offsets");
    let refs: Option<Vec<i64>> = read_decoded(&ways, 10).expect("decode way");
    assert_eq!(refs, Some(vec![1, 2, 1]));
}

#[rstest]
fn ingestor_skips_negative_ids() {
    let workspace = Workspace::new();
    let config = config_for(&workspace);
    let mut ingestor = ingestor_for(&config);
    ingestor.process(OsmElement::Node {
        id: -4,
        lat: 1.0,
        lon: 1.0,
    });
    ingestor.process(OsmElement::Way {
        id: -9,
        refs: vec![-4],
    });
    let summary = ingestor.finish().expect("ingestion should succeed");
    assert_eq!(summary.nodes, 0);
    assert_eq!(summary.ways, 1);
    assert_eq!(summary.cached_ways, 0);
    assert_eq!(summary.skipped_ids, 2);
}

#[rstest]
fn ingestor_counts_ways_without_a_cache() {
    let workspace = Workspace::new();
    let mut config = config_for(&workspace);
    config.ways_cache = None;
    let mut ingestor = ingestor_for(&config);
    ingestor.process(OsmElement::Way {
        id: 3,
        refs: vec![1, 2],
    });
    let summary = ingestor.finish().expect("ingestion should succeed");
    assert_eq!(summary.ways, 1);
    assert_eq!(summary.cached_ways, 0);
}

#[rstest]
fn ingestor_stops_at_the_first_invalid_coordinate() {
    let workspace = Workspace::new();
    let config = config_for(&workspace);
    let mut ingestor = ingestor_for(&config);
    ingestor.process(OsmElement::Node {
        id: 1,
        lat: 250.0,
        lon: 0.0,
    });
    ingestor.process(OsmElement::Node {
        id: 2,
        lat: 1.0,
        lon: 1.0,
    });
    let err = ingestor.finish().expect_err("invalid coordinate should fail");
    match err {
        CliError::PointStore(source @ PointStoreError::Coordinate(_)) => {
            assert!(source.is_fatal());
        }
        other => panic!("expected a coordinate error, found {other:?}"),
    }
}

#[rstest]
fn ingest_reports_undecodable_input() {
    let workspace = Workspace::new();
    let config = config_for(&workspace);
    write_utf8(&config.osm_pbf, b"this is not a protocol buffer");
    let err = ingest_file(&config).expect_err("garbage input should fail");
    match err {
        CliError::ReadOsm { path, .. } | CliError::OpenOsm { path, .. } => {
            assert_eq!(path, config.osm_pbf);
        }
        other => panic!("expected an OSM decoding error, found {other:?}"),
    }
}

#[rstest]
fn run_ingest_rejects_missing_input_before_creating_artefacts() {
    let workspace = Workspace::new();
    let config = config_for(&workspace);
    let args = IngestArgs {
        osm_pbf: Some(config.osm_pbf.clone()),
        output: Some(config.output.clone()),
        ..IngestArgs::default()
    };
    let mut stdout = Vec::new();
    let err = run_ingest_with(args, &mut stdout).expect_err("missing input should fail");
    assert!(matches!(err, CliError::MissingSourceFile { .. }));
    assert!(stdout.is_empty());
    assert!(!workspace.path("nodes.short").exists());
}
