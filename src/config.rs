//! Runtime configuration for one harvest invocation.
//!
//! Every knob is an explicit field with an explicit default; nothing reads
//! process-global mutable state. The CLI builds one [`HarvestConfig`] per
//! invocation and hands it to the pipeline.

use std::path::PathBuf;
use std::time::Duration;

use crate::convert::{DEFAULT_CONVERT_CONCURRENCY, EnsembleStatistic};
use crate::fetch::{DEFAULT_FETCH_CONCURRENCY, RetryPolicy};

/// Default archive root when none is given.
pub const DEFAULT_DATAHOME: &str = "data";

/// Default HTTP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default whole-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// All knobs of one harvest run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Archive root directory.
    pub datahome: PathBuf,
    /// Concurrent artifact transfers.
    pub fetch_concurrency: usize,
    /// Concurrent conversions.
    pub convert_concurrency: usize,
    /// Per-artifact transfer retry.
    pub transfer_retry: RetryPolicy,
    /// Per-job conversion retry.
    pub convert_retry: RetryPolicy,
    /// Replacement origin (scheme and host) for provider URLs, when a
    /// mirror should be used instead of the registered endpoint.
    pub endpoint: Option<String>,
    /// Ensemble reduction for ensemble models.
    pub statistic: EnsembleStatistic,
    /// Member split rule file for ensemble conversion, when configured.
    pub split_rule: Option<PathBuf>,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// HTTP whole-request timeout.
    pub request_timeout: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            datahome: PathBuf::from(DEFAULT_DATAHOME),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            convert_concurrency: DEFAULT_CONVERT_CONCURRENCY,
            transfer_retry: RetryPolicy::default(),
            convert_retry: RetryPolicy::default(),
            endpoint: None,
            statistic: EnsembleStatistic::default(),
            split_rule: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl HarvestConfig {
    /// Default configuration rooted at `datahome`.
    #[must_use]
    pub fn with_datahome(datahome: impl Into<PathBuf>) -> Self {
        Self {
            datahome: datahome.into(),
            ..Self::default()
        }
    }
}
