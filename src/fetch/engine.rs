//! Bounded-concurrency fetch engine with verification and aggregated retry.
//!
//! [`FetchEngine::fetch_all`] is the core operation of the whole system:
//! given the artifacts of one batch plan, it transfers them concurrently
//! under a semaphore, verifies each payload structurally, commits verified
//! files atomically (temp-then-rename), and reports failures by artifact
//! identity. One full extra pass is made over the failed subset — exactly
//! one — before failures become final.
//!
//! Invariants:
//! - a final path either does not exist or holds a fully verified file;
//! - one permanently failing artifact never aborts its siblings;
//! - at most one outstanding transfer per local target per invocation;
//! - the retry pass re-fetches only what failed, never what committed.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::retry::{RetryDecision, RetryPolicy};
use super::verify::{sibling_with_suffix, verify_payload};
use super::{FetchError, HttpClient};
use crate::plan::Artifact;

/// Minimum allowed transfer concurrency.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed transfer concurrency.
const MAX_CONCURRENCY: usize = 64;

/// Default concurrent transfers.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 5;

/// Error type for engine construction and pool failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid fetch concurrency {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("fetch pool semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// A successfully committed local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedFile {
    /// Final path of the verified file.
    pub path: PathBuf,
    /// Size in bytes.
    pub bytes: u64,
}

/// Outcome of one `fetch_all` invocation.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Every local target now present and verified (including pre-existing
    /// files skipped idempotently).
    pub committed: Vec<CommittedFile>,
    /// Artifacts still failed after the aggregated retry pass.
    pub failed: Vec<Artifact>,
}

impl FetchReport {
    /// Returns true when nothing remained failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Batch status code: `0` full success, `-1` otherwise.
    #[must_use]
    pub fn status(&self) -> i32 {
        if self.is_complete() { 0 } else { -1 }
    }
}

/// Concurrent downloader for the artifacts of one batch plan.
#[derive(Debug, Clone)]
pub struct FetchEngine {
    client: HttpClient,
    concurrency: usize,
    retry_policy: RetryPolicy,
}

impl FetchEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] outside 1..=64.
    pub fn new(
        client: HttpClient,
        concurrency: usize,
        retry_policy: RetryPolicy,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }
        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            "creating fetch engine"
        );
        Ok(Self {
            client,
            concurrency,
            retry_policy,
        })
    }

    /// Configured transfer concurrency.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Configured per-attempt retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Fetches every artifact into `dest_dir`, then makes exactly one more
    /// pass over whatever failed.
    ///
    /// Already-present final files are committed without any network call.
    ///
    /// # Errors
    ///
    /// Only pool-level failures ([`EngineError`]); per-artifact errors land
    /// in the report's `failed` list, never here.
    pub async fn fetch_all(
        &self,
        artifacts: &[Artifact],
        dest_dir: &Path,
    ) -> Result<FetchReport, EngineError> {
        info!(
            artifacts = artifacts.len(),
            dest = %dest_dir.display(),
            "fetch pass starting"
        );
        let (mut committed, failed) = self.run_pass(artifacts, dest_dir).await?;

        let failed = if failed.is_empty() {
            failed
        } else {
            info!(failed = failed.len(), "retrying failed artifacts once");
            let (recovered, still_failed) = self.run_pass(&failed, dest_dir).await?;
            committed.extend(recovered);
            still_failed
        };

        info!(
            committed = committed.len(),
            failed = failed.len(),
            "fetch complete"
        );
        Ok(FetchReport { committed, failed })
    }

    /// One pool pass over `artifacts`: skip existing targets, transfer and
    /// verify the rest, collect failures by identity.
    async fn run_pass(
        &self,
        artifacts: &[Artifact],
        dest_dir: &Path,
    ) -> Result<(Vec<CommittedFile>, Vec<Artifact>), EngineError> {
        // The pool lives for this pass only.
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut committed = Vec::new();
        let mut failed = Vec::new();
        let mut handles = Vec::new();
        let mut targets_in_flight: HashSet<PathBuf> = HashSet::new();
        let mut duplicates: HashMap<PathBuf, Vec<Artifact>> = HashMap::new();

        for artifact in artifacts {
            let final_path = dest_dir.join(artifact.file_name());

            if let Ok(meta) = tokio::fs::metadata(&final_path).await {
                debug!(path = %final_path.display(), "target exists, skipping transfer");
                committed.push(CommittedFile {
                    path: final_path,
                    bytes: meta.len(),
                });
                continue;
            }

            // Two artifacts resolving to the same target collapse to one
            // transfer; the duplicate shares its sibling's outcome.
            if !targets_in_flight.insert(final_path.clone()) {
                debug!(path = %final_path.display(), "duplicate target, sharing transfer");
                duplicates
                    .entry(final_path)
                    .or_default()
                    .push(artifact.clone());
                continue;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let client = self.client.clone();
            let policy = self.retry_policy;
            let task_artifact = artifact.clone();
            let target = final_path.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                fetch_with_retry(&client, &task_artifact, &final_path, &policy).await
            });
            handles.push((artifact.clone(), target, handle));
        }

        // Drain in submission order; per-artifact identity, not position,
        // carries the outcome, and progress was already logged on completion
        // inside each task. Duplicates of a target inherit the outcome of
        // the one transfer that ran for it.
        for (artifact, target, handle) in handles {
            let twins = duplicates.remove(&target).unwrap_or_default();
            match handle.await {
                Ok(Ok(file)) => {
                    committed.extend(twins.iter().map(|_| file.clone()));
                    committed.push(file);
                }
                Ok(Err(error)) => {
                    warn!(artifact = %artifact, error = %error, "artifact failed");
                    failed.push(artifact);
                    failed.extend(twins);
                }
                Err(join_error) => {
                    warn!(artifact = %artifact, error = %join_error, "fetch task panicked");
                    failed.push(artifact);
                    failed.extend(twins);
                }
            }
        }

        Ok((committed, failed))
    }
}

/// Transfers and verifies one artifact under the bounded per-attempt retry.
///
/// Every attempt writes to a unique temp sibling of the final path; any
/// failure removes the temp artifacts before the next attempt or the final
/// error, so the target is never left half-written.
async fn fetch_with_retry(
    client: &HttpClient,
    artifact: &Artifact,
    final_path: &Path,
    policy: &RetryPolicy,
) -> Result<CommittedFile, FetchError> {
    if let Some(parent) = final_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::io(parent, e))?;
    }

    let tmp = sibling_with_suffix(final_path, ".tmp");
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(artifact = %artifact, attempt, "transfer attempt");

        match transfer_and_commit(client, artifact, &tmp, final_path).await {
            Ok(file) => {
                info!(
                    artifact = %artifact,
                    bytes = file.bytes,
                    attempts = attempt,
                    "artifact committed"
                );
                return Ok(file);
            }
            Err(error) => {
                remove_temps(&tmp).await;
                match policy.should_retry(attempt) {
                    RetryDecision::Retry { delay, attempt: next } => {
                        debug!(
                            artifact = %artifact,
                            next_attempt = next,
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "retrying transfer"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(artifact = %artifact, %reason, "giving up on artifact");
                        return Err(error);
                    }
                }
            }
        }
    }
}

async fn transfer_and_commit(
    client: &HttpClient,
    artifact: &Artifact,
    tmp: &Path,
    final_path: &Path,
) -> Result<CommittedFile, FetchError> {
    client.fetch_to_path(&artifact.url, &artifact.ranges, tmp).await?;

    let format = artifact.format;
    let tmp_owned = tmp.to_path_buf();
    let verified = tokio::task::spawn_blocking(move || verify_payload(&tmp_owned, format))
        .await
        .map_err(|e| FetchError::verification(tmp, format!("verification task failed: {e}")))??;

    tokio::fs::rename(&verified, final_path)
        .await
        .map_err(|e| FetchError::io(final_path, e))?;

    let meta = tokio::fs::metadata(final_path)
        .await
        .map_err(|e| FetchError::io(final_path, e))?;
    Ok(CommittedFile {
        path: final_path.to_path_buf(),
        bytes: meta.len(),
    })
}

/// Removes the attempt's temp files, ignoring races with files already gone.
async fn remove_temps(tmp: &Path) {
    let _ = tokio::fs::remove_file(tmp).await;
    let _ = tokio::fs::remove_file(sibling_with_suffix(tmp, ".dec")).await;
}
