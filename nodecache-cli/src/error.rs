//! Error types emitted by the nodecache CLI.
//!
//! Keep this error type reasonably small, as every command helper returns
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use nodecache_store::element_cache::typed::TypedCacheError;
use nodecache_store::{ElementCacheError, PointStoreError};
use thiserror::Error;

/// Errors emitted by the nodecache CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Flag name without the leading dashes.
        field: &'static str,
        /// Environment variable that can supply the value.
        env: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        /// Flag naming the path.
        field: &'static str,
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        /// Flag naming the path.
        field: &'static str,
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        /// Flag naming the path.
        field: &'static str,
        /// Offending path.
        path: Utf8PathBuf,
        /// Source error from the filesystem.
        #[source]
        source: std::io::Error,
    },
    /// Opening the OSM PBF file failed.
    #[error("failed to open OSM PBF file at {path:?}: {source}")]
    OpenOsm {
        /// Path of the PBF file.
        path: Utf8PathBuf,
        /// Source error from `osmpbf`.
        #[source]
        source: osmpbf::Error,
    },
    /// Decoding the OSM PBF file failed part-way through.
    #[error("failed to decode OSM PBF data at {path:?}: {source}")]
    ReadOsm {
        /// Path of the PBF file.
        path: Utf8PathBuf,
        /// Source error from `osmpbf`.
        #[source]
        source: osmpbf::Error,
    },
    /// The point store rejected an operation.
    #[error(transparent)]
    PointStore(#[from] PointStoreError),
    /// The element cache rejected an operation.
    #[error(transparent)]
    ElementCache(#[from] ElementCacheError),
    /// Encoding or caching a way's node list failed.
    #[error("failed to cache way node references: {0}")]
    WaysCache(#[from] TypedCacheError<ElementCacheError>),
    /// Serialising command output failed.
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
