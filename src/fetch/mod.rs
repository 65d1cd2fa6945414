//! Artifact acquisition: transfer, verification, atomic commit, retry.
//!
//! The submodules split the concern the way the work actually flows:
//! [`client`](self) performs the HTTP transfer, [`verify`](self) checks the
//! payload structure, and the engine coordinates the bounded pool, the
//! per-attempt retry, and the single aggregated retry pass.

mod client;
mod engine;
mod error;
mod retry;
mod verify;

pub use client::HttpClient;
pub use engine::{
    CommittedFile, DEFAULT_FETCH_CONCURRENCY, EngineError, FetchEngine, FetchReport,
};
pub use error::FetchError;
pub use retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryDecision, RetryPolicy};
pub use verify::verify_payload;
