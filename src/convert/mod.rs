//! Conversion of committed raw files into canonical archive netCDF.
//!
//! Conversion always shells out: GRIB decoding and ensemble reduction are
//! the job of external tools (`cdo`, `grib_filter`), not of this crate. The
//! [`ConversionTool`] trait is the seam; [`CdoTool`] is the production
//! implementation and tests substitute their own.
//!
//! [`ConvertPipeline`] mirrors the fetch engine's shape: a bounded pool over
//! independent jobs, per-job retry, idempotent skip of existing outputs, and
//! exactly one aggregated retry pass over the failed subset.

mod cdo;

pub use cdo::CdoTool;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::fetch::{RetryDecision, RetryPolicy};

/// Default concurrent conversions. Decoding is CPU-bound, so the pool is
/// smaller than the transfer pool.
pub const DEFAULT_CONVERT_CONCURRENCY: usize = 4;

/// Ensemble reduction applied when a model carries a member dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnsembleStatistic {
    /// Member mean.
    #[default]
    Mean,
    /// Member minimum.
    Min,
    /// Member maximum.
    Max,
    /// Member standard deviation.
    Std,
}

impl EnsembleStatistic {
    /// The `cdo` operator implementing this reduction.
    #[must_use]
    pub fn cdo_operator(&self) -> &'static str {
        match self {
            Self::Mean => "ensmean",
            Self::Min => "ensmin",
            Self::Max => "ensmax",
            Self::Std => "ensstd",
        }
    }
}

impl std::str::FromStr for EnsembleStatistic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "std" => Ok(Self::Std),
            other => Err(format!(
                "unknown ensemble statistic {other:?}; expected mean, min, max, or std"
            )),
        }
    }
}

/// Errors from conversion.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A required external tool is not on PATH.
    #[error("required tool {tool:?} not found on PATH")]
    ToolMissing {
        /// Tool binary name.
        tool: String,
    },

    /// An external tool could not be started.
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        /// Tool binary name.
        tool: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An external tool ran and exited with failure.
    #[error("{tool} failed for {input}: {detail}")]
    CommandFailed {
        /// Tool binary name.
        tool: String,
        /// Input path the tool was given.
        input: PathBuf,
        /// Exit status and trimmed stderr.
        detail: String,
    },

    /// Filesystem failure around a conversion.
    #[error("conversion IO failure at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// One raw-to-archive conversion. Immutable once planned; failure reporting
/// is keyed by this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertJob {
    /// Committed raw file (GRIB or netCDF).
    pub input: PathBuf,
    /// Final archive path for the converted netCDF.
    pub output: PathBuf,
    /// Provider-native variable name, renamed during conversion.
    pub native_name: String,
    /// Canonical variable name the output carries.
    pub canonical_name: String,
    /// True when the input carries ensemble members to reduce.
    pub ensemble: bool,
    /// Reduction applied when `ensemble` is set.
    pub statistic: EnsembleStatistic,
    /// Member-splitting rule file handed to `grib_filter` for ensemble
    /// inputs. Opaque to this crate.
    pub split_rule: Option<PathBuf>,
}

/// External conversion backend.
#[async_trait]
pub trait ConversionTool: Send + Sync {
    /// Converts one job's input into its output.
    ///
    /// The implementation must write the output atomically: on error the
    /// output path must not exist.
    ///
    /// # Errors
    ///
    /// See [`ConvertError`].
    async fn convert(&self, job: &ConvertJob) -> Result<(), ConvertError>;
}

/// Outcome of one `convert_all` invocation.
#[derive(Debug, Default)]
pub struct ConvertReport {
    /// Outputs now present (including pre-existing files skipped
    /// idempotently).
    pub converted: Vec<PathBuf>,
    /// Jobs still failed after the aggregated retry pass.
    pub failed: Vec<ConvertJob>,
}

impl ConvertReport {
    /// Returns true when nothing remained failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Bounded pool over independent conversion jobs.
pub struct ConvertPipeline {
    tool: Arc<dyn ConversionTool>,
    concurrency: usize,
    retry_policy: RetryPolicy,
}

impl ConvertPipeline {
    /// Creates a pipeline over `tool`. Zero concurrency is clamped to one.
    pub fn new(
        tool: Arc<dyn ConversionTool>,
        concurrency: usize,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            tool,
            concurrency: concurrency.max(1),
            retry_policy,
        }
    }

    /// Converts every job, then makes exactly one more pass over whatever
    /// failed. Jobs whose output already exists convert nothing.
    pub async fn convert_all(&self, jobs: &[ConvertJob]) -> ConvertReport {
        info!(jobs = jobs.len(), "conversion pass starting");
        let (mut converted, failed) = self.run_pass(jobs).await;

        let failed = if failed.is_empty() {
            failed
        } else {
            info!(failed = failed.len(), "retrying failed conversions once");
            let (recovered, still_failed) = self.run_pass(&failed).await;
            converted.extend(recovered);
            still_failed
        };

        info!(
            converted = converted.len(),
            failed = failed.len(),
            "conversion complete"
        );
        ConvertReport { converted, failed }
    }

    async fn run_pass(&self, jobs: &[ConvertJob]) -> (Vec<PathBuf>, Vec<ConvertJob>) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut converted = Vec::new();
        let mut failed = Vec::new();
        let mut handles = Vec::new();

        for job in jobs {
            if tokio::fs::metadata(&job.output).await.is_ok() {
                debug!(output = %job.output.display(), "output exists, skipping conversion");
                converted.push(job.output.clone());
                continue;
            }

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                failed.push(job.clone());
                continue;
            };
            let tool = Arc::clone(&self.tool);
            let policy = self.retry_policy;
            let task_job = job.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                convert_with_retry(tool.as_ref(), &task_job, &policy).await
            });
            handles.push((job.clone(), handle));
        }

        for (job, handle) in handles {
            match handle.await {
                Ok(Ok(())) => converted.push(job.output),
                Ok(Err(error)) => {
                    warn!(output = %job.output.display(), error = %error, "conversion failed");
                    failed.push(job);
                }
                Err(join_error) => {
                    warn!(output = %job.output.display(), error = %join_error, "conversion task panicked");
                    failed.push(job);
                }
            }
        }

        (converted, failed)
    }
}

async fn convert_with_retry(
    tool: &dyn ConversionTool,
    job: &ConvertJob,
    policy: &RetryPolicy,
) -> Result<(), ConvertError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match tool.convert(job).await {
            Ok(()) => {
                info!(
                    output = %job.output.display(),
                    attempts = attempt,
                    "conversion committed"
                );
                return Ok(());
            }
            // A missing tool will not appear between attempts.
            Err(error @ ConvertError::ToolMissing { .. }) => return Err(error),
            Err(error) => match policy.should_retry(attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    debug!(
                        output = %job.output.display(),
                        next_attempt = next,
                        error = %error,
                        "retrying conversion"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(output = %job.output.display(), %reason, "giving up on conversion");
                    return Err(error);
                }
            },
        }
    }
}
