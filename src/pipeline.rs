//! Batch orchestration: validate, resolve, fetch, convert, finalize.
//!
//! One [`Pipeline::run`] performs one harvest batch: the requested variables
//! are validated against the model catalog before any network activity, the
//! resolver turns each (variable, lead) into artifacts under bounded
//! concurrency, the fetch engine fills the staging directory, the conversion
//! pipeline produces the canonical archive files, and the staging directory
//! is removed only when every step fully succeeded.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogError, VariableKey};
use crate::config::HarvestConfig;
use crate::convert::{ConversionTool, ConvertJob, ConvertPipeline};
use crate::fetch::{EngineError, FetchEngine, HttpClient};
use crate::model::{ModelError, ModelSpec};
use crate::plan::{ArchiveLayout, Artifact, BatchPlan};
use crate::resolver::{ResolveError, resolver_for};

/// Concurrent discovery requests while resolving a batch.
const RESOLVE_CONCURRENCY: usize = 8;

/// Errors that abort a batch before or between the pooled phases.
///
/// Per-artifact and per-job failures never surface here; they land in the
/// report so one bad artifact cannot abort its siblings.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unknown (source, product).
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A requested variable is not in the model catalog.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Artifact discovery failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The fetch pool could not run.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Filesystem failure outside the pooled phases.
    #[error("pipeline IO failure at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// One harvest request as the caller states it.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Publishing agency identifier.
    pub source: String,
    /// Product identifier within the agency.
    pub product: String,
    /// Canonical variable names to harvest; empty means the whole catalog.
    pub variables: Vec<String>,
    /// Explicit initialization time; `None` derives the latest published
    /// cycle from the wall clock.
    pub init: Option<DateTime<Utc>>,
    /// Lead hours to harvest; `None` means the model's full schedule.
    pub lead_hours: Option<Vec<u32>>,
}

/// Outcome of one batch.
#[derive(Debug)]
pub struct PipelineReport {
    /// Source the batch ran against.
    pub source: String,
    /// Product the batch ran against.
    pub product: String,
    /// Initialization time the batch resolved.
    pub init: DateTime<Utc>,
    /// Artifacts the resolvers planned.
    pub planned: usize,
    /// Raw files present after the fetch phase.
    pub fetched: usize,
    /// Archive files present after the conversion phase.
    pub converted: usize,
    /// Artifacts still failed after the fetch engine's retry pass.
    pub fetch_failed: Vec<Artifact>,
    /// Jobs still failed after the conversion retry pass.
    pub convert_failed: Vec<ConvertJob>,
}

impl PipelineReport {
    /// Returns true when every planned artifact was fetched and converted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.fetch_failed.is_empty() && self.convert_failed.is_empty()
    }

    /// Batch status code: `0` full success, `-1` otherwise.
    #[must_use]
    pub fn status(&self) -> i32 {
        if self.is_complete() { 0 } else { -1 }
    }
}

/// The harvest orchestrator.
pub struct Pipeline {
    config: HarvestConfig,
    tool: Arc<dyn ConversionTool>,
}

impl Pipeline {
    /// Creates a pipeline over a conversion backend.
    pub fn new(config: HarvestConfig, tool: Arc<dyn ConversionTool>) -> Self {
        Self { config, tool }
    }

    /// Runs one batch end to end.
    ///
    /// # Errors
    ///
    /// See [`PipelineError`]. Validation failures surface before any network
    /// request is made.
    pub async fn run(&self, request: &BatchRequest) -> Result<PipelineReport, PipelineError> {
        let spec = crate::model::model_for(&request.source, &request.product)?;
        let selections = select_variables(spec, &request.variables)?;
        let leads = select_leads(spec, request.lead_hours.as_deref());
        let init = request
            .init
            .unwrap_or_else(|| spec.default_init_time(Utc::now()));
        info!(
            source = spec.source,
            product = spec.product,
            init = %init.format("%Y-%m-%d %H:%M"),
            variables = selections.len(),
            leads = leads.len(),
            "batch starting"
        );

        let client =
            HttpClient::with_timeouts(self.config.connect_timeout, self.config.request_timeout);
        let plan = self
            .resolve_plan(spec, client.clone(), init, &selections, &leads)
            .await?;
        if plan.is_empty() {
            warn!(
                source = spec.source,
                product = spec.product,
                "nothing published for this batch yet"
            );
        }

        let layout = ArchiveLayout::new(&self.config.datahome);
        let staging = layout.staging_dir(&plan.source, &plan.product, plan.init);
        let engine = FetchEngine::new(
            client,
            self.config.fetch_concurrency,
            self.config.transfer_retry,
        )?;
        let fetch_report = engine.fetch_all(&plan.artifacts, &staging).await?;

        let committed: HashSet<PathBuf> = fetch_report
            .committed
            .iter()
            .map(|f| f.path.clone())
            .collect();
        let natives: HashMap<&str, &VariableKey> = selections
            .iter()
            .map(|(key, name)| (name.as_str(), key))
            .collect();
        let jobs = self.plan_conversions(spec, &plan, &staging, &committed, &natives);

        let converter = ConvertPipeline::new(
            Arc::clone(&self.tool),
            self.config.convert_concurrency,
            self.config.convert_retry,
        );
        let convert_report = converter.convert_all(&jobs).await;

        let report = PipelineReport {
            source: plan.source,
            product: plan.product,
            init: plan.init,
            planned: plan.artifacts.len(),
            fetched: fetch_report.committed.len(),
            converted: convert_report.converted.len(),
            fetch_failed: fetch_report.failed,
            convert_failed: convert_report.failed,
        };

        if report.is_complete() {
            if let Err(error) = tokio::fs::remove_dir_all(&staging).await
                && error.kind() != std::io::ErrorKind::NotFound
            {
                warn!(
                    staging = %staging.display(),
                    %error,
                    "could not remove staging directory"
                );
            }
        } else {
            info!(
                staging = %staging.display(),
                "keeping staging directory for the incomplete batch"
            );
        }

        info!(
            planned = report.planned,
            fetched = report.fetched,
            converted = report.converted,
            status = report.status(),
            "batch finished"
        );
        Ok(report)
    }

    async fn resolve_plan(
        &self,
        spec: &'static ModelSpec,
        client: HttpClient,
        init: DateTime<Utc>,
        selections: &[(VariableKey, String)],
        leads: &[u32],
    ) -> Result<BatchPlan, PipelineError> {
        let resolver = resolver_for(spec, client, self.config.endpoint.as_deref())?;

        let pairs: Vec<(u32, &VariableKey, &str)> = leads
            .iter()
            .flat_map(|&lead| {
                selections
                    .iter()
                    .map(move |(key, name)| (lead, key, name.as_str()))
            })
            .collect();

        let results: Vec<Result<Vec<Artifact>, ResolveError>> = stream::iter(&pairs)
            .map(|&(lead, key, name)| {
                let resolver = resolver.as_ref();
                async move { resolver.resolve(init, lead, key, name).await }
            })
            .buffer_unordered(RESOLVE_CONCURRENCY)
            .collect()
            .await;

        let mut artifacts = Vec::new();
        for result in results {
            artifacts.extend(result?);
        }
        debug!(artifacts = artifacts.len(), "batch plan resolved");
        Ok(BatchPlan {
            source: spec.source.to_string(),
            product: spec.product.to_string(),
            init,
            artifacts,
        })
    }

    fn plan_conversions(
        &self,
        spec: &ModelSpec,
        plan: &BatchPlan,
        staging: &std::path::Path,
        committed: &HashSet<PathBuf>,
        natives: &HashMap<&str, &VariableKey>,
    ) -> Vec<ConvertJob> {
        let layout = ArchiveLayout::new(&self.config.datahome);
        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        for artifact in &plan.artifacts {
            let input = staging.join(artifact.file_name());
            if !committed.contains(&input) || !seen.insert(input.clone()) {
                continue;
            }
            let Some(key) = natives.get(artifact.canonical_name.as_str()) else {
                continue;
            };
            jobs.push(ConvertJob {
                input,
                output: layout.archive_file(
                    &plan.source,
                    &plan.product,
                    plan.init,
                    &artifact.canonical_name,
                    artifact.lead_hour,
                ),
                native_name: key.name.clone(),
                canonical_name: artifact.canonical_name.clone(),
                ensemble: spec.ensemble,
                statistic: self.config.statistic,
                split_rule: self.config.split_rule.clone(),
            });
        }
        jobs
    }
}

/// Maps the requested canonical names to native keys, or takes the whole
/// catalog when nothing was named. Fails on the first unknown name.
fn select_variables(
    spec: &ModelSpec,
    variables: &[String],
) -> Result<Vec<(VariableKey, String)>, CatalogError> {
    let catalog = spec.catalog();
    if variables.is_empty() {
        let mut all: Vec<(VariableKey, String)> = catalog
            .iter()
            .map(|(key, name)| (key.clone(), name.to_string()))
            .collect();
        all.sort_by(|a, b| a.1.cmp(&b.1));
        return Ok(all);
    }
    variables
        .iter()
        .map(|name| {
            catalog
                .key_for_output(name, spec.source, spec.product)
                .map(|(key, out)| (key.clone(), out.to_string()))
        })
        .collect()
}

/// Intersects requested leads with the model schedule; off-schedule requests
/// are dropped with a warning rather than probed against the provider.
fn select_leads(spec: &ModelSpec, requested: Option<&[u32]>) -> Vec<u32> {
    let schedule = spec.lead_hours();
    let Some(requested) = requested else {
        return schedule;
    };
    let known: HashSet<u32> = schedule.into_iter().collect();
    let mut leads = Vec::new();
    for &lead in requested {
        if known.contains(&lead) {
            if !leads.contains(&lead) {
                leads.push(lead);
            }
        } else {
            warn!(
                lead,
                source = spec.source,
                product = spec.product,
                "lead hour not in the model schedule, skipping"
            );
        }
    }
    leads.sort_unstable();
    leads
}
