//! NWP Harvest Core Library
//!
//! This library fetches numerical weather prediction artifacts from public
//! agency endpoints (ECMWF open data, ECCC datamart, DWD open data) into a
//! uniform local archive: resolve what each provider publishes, transfer it
//! under bounded concurrency, verify the payload structure, commit
//! atomically, and convert the result into canonical netCDF files.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`catalog`] - Variable catalogs mapping native field identities to canonical names
//! - [`model`] - Static registry of supported (source, product) pairs
//! - [`plan`] - Artifact descriptors, byte ranges, and the archive layout
//! - [`resolver`] - Provider-specific artifact discovery
//! - [`fetch`] - Transfer engine with verification, atomic commit, and retry
//! - [`convert`] - Conversion of raw files into canonical archive netCDF
//! - [`pipeline`] - Batch orchestration over all of the above
//! - [`config`] - Explicit runtime configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod config;
pub mod convert;
pub mod fetch;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod resolver;

// Re-export commonly used types
pub use catalog::{CatalogError, VariableCatalog, VariableKey};
pub use config::{DEFAULT_DATAHOME, HarvestConfig};
pub use convert::{
    CdoTool, ConversionTool, ConvertError, ConvertJob, ConvertPipeline, ConvertReport,
    DEFAULT_CONVERT_CONCURRENCY, EnsembleStatistic,
};
pub use fetch::{
    CommittedFile, DEFAULT_FETCH_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, EngineError, FetchEngine,
    FetchError, FetchReport, HttpClient, RetryPolicy,
};
pub use model::{ModelError, ModelSpec, model_for, registered_models};
pub use pipeline::{BatchRequest, Pipeline, PipelineError, PipelineReport};
pub use plan::{ArchiveLayout, Artifact, ArtifactFormat, BatchPlan, ByteRange};
pub use resolver::{FileSetResolver, ResolveError, resolver_for};
