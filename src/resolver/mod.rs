//! File-set resolvers: turning (init time, lead, variable) into artifacts.
//!
//! Each provider publishes its files differently. ECMWF ships a GRIB index
//! sidecar with byte offsets, ECCC and DWD expose plain HTML directory
//! listings with provider-specific filename grammars. A resolver hides that
//! behind one contract: discovery only, never transfer.
//!
//! Contract, honored by every implementation:
//! - an empty vec when the provider simply has nothing for that
//!   (lead, variable) pair, since absence is not an error;
//! - [`ResolveError::ProviderUnavailable`] when the discovery request itself
//!   returns a non-success status;
//! - discovery may hit the network, but transferring artifact bytes is always
//!   left to the fetch engine.
//!
//! Resolvers are constructed from the static model registry via
//! [`resolver_for`], never by assembling a lookup name from user strings.

mod dwd;
mod eccc;
mod ecmwf;

pub use dwd::DwdListingResolver;
pub use eccc::EcccListingResolver;
pub use ecmwf::EcmwfIndexResolver;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;

use crate::catalog::VariableKey;
use crate::fetch::{FetchError, HttpClient};
use crate::model::{ModelError, ModelSpec};
use crate::plan::Artifact;

/// Errors from artifact discovery.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Discovery endpoint answered with a non-success status. Fatal for this
    /// resolver invocation; discovery is never retried.
    #[error("provider discovery failed for {url}: HTTP {status}")]
    ProviderUnavailable {
        /// The discovery URL.
        url: String,
        /// The status the provider returned.
        status: u16,
    },

    /// Discovery request could not be completed at the transport level.
    #[error("provider discovery transport failure for {url}: {source}")]
    Transport {
        /// The discovery URL.
        url: String,
        /// The underlying transfer error.
        #[source]
        source: FetchError,
    },

    /// A discovered listing entry could not be combined into a valid URL.
    #[error("invalid artifact locator {locator} under {base}: {source}")]
    InvalidLocator {
        /// The listing base URL.
        base: String,
        /// The entry that failed to join.
        locator: String,
        /// The parse failure.
        #[source]
        source: url::ParseError,
    },
}

impl ResolveError {
    /// Maps a discovery fetch failure into the resolver taxonomy.
    fn from_discovery(url: &str, error: FetchError) -> Self {
        match error {
            FetchError::HttpStatus { status, .. } => Self::ProviderUnavailable {
                url: url.to_string(),
                status,
            },
            other => Self::Transport {
                url: url.to_string(),
                source: other,
            },
        }
    }
}

/// Provider-specific artifact discovery.
///
/// # Object Safety
///
/// `async_trait` keeps the trait object-safe so callers can hold a
/// `Box<dyn FileSetResolver>` picked out of the static registry.
#[async_trait]
pub trait FileSetResolver: Send + Sync {
    /// Resolver name for logs.
    fn name(&self) -> &'static str;

    /// Resolves the artifacts carrying one variable at one lead hour of one
    /// initialization time.
    ///
    /// `canonical_name` is the provider-independent output name the artifact
    /// will be archived under.
    ///
    /// # Errors
    ///
    /// See [`ResolveError`]; "nothing published yet" is `Ok(vec![])`, not an
    /// error.
    async fn resolve(
        &self,
        init: DateTime<Utc>,
        lead_hour: u32,
        key: &VariableKey,
        canonical_name: &str,
    ) -> Result<Vec<Artifact>, ResolveError>;
}

/// Builds the resolver registered for a model spec.
///
/// # Errors
///
/// Returns [`ModelError::UnknownModel`] if no resolver is registered for the
/// spec's source. Cannot happen for specs obtained from
/// [`crate::model::model_for`].
pub fn resolver_for(
    spec: &'static ModelSpec,
    client: HttpClient,
    endpoint: Option<&str>,
) -> Result<Box<dyn FileSetResolver>, ModelError> {
    match (spec.source, endpoint) {
        ("ecmwf", None) => Ok(Box::new(EcmwfIndexResolver::new(spec, client))),
        ("ecmwf", Some(e)) => Ok(Box::new(EcmwfIndexResolver::new(spec, client).with_endpoint(e))),
        ("eccc", None) => Ok(Box::new(EcccListingResolver::new(spec, client))),
        ("eccc", Some(e)) => Ok(Box::new(EcccListingResolver::new(spec, client).with_endpoint(e))),
        ("dwd", None) => Ok(Box::new(DwdListingResolver::new(spec, client))),
        ("dwd", Some(e)) => Ok(Box::new(DwdListingResolver::new(spec, client).with_endpoint(e))),
        (other, _) => Err(ModelError::unknown_model(other, spec.product)),
    }
}

/// Compiles a pattern known at compile time; panics on an invalid pattern,
/// which the resolver unit tests catch.
#[allow(clippy::expect_used)]
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex must compile")
}

/// Expands a model URL template for one (init, lead): strftime fields come
/// from the initialization time, then `{lead}` is substituted literally.
pub(crate) fn expand_template(template: &str, init: DateTime<Utc>, lead: &str) -> String {
    init.format(template).to_string().replace("{lead}", lead)
}

/// Rebases a URL template onto a different origin, keeping the path. Used to
/// point a resolver at a mirror instead of the registered provider host.
pub(crate) fn rebase_template(template: &str, endpoint: &str) -> String {
    let path = template
        .split_once("://")
        .and_then(|(_, rest)| rest.find('/').map(|i| &rest[i..]))
        .unwrap_or(template);
    format!("{}{}", endpoint.trim_end_matches('/'), path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::{model_for, registered_models};

    #[test]
    fn registry_builds_a_resolver_per_model() {
        for spec in registered_models() {
            let resolver = resolver_for(spec, HttpClient::new(), None).unwrap();
            assert!(!resolver.name().is_empty());
        }
    }

    #[test]
    fn rebase_keeps_the_template_path() {
        let spec = model_for("eccc", "geps_ens").unwrap();
        assert_eq!(
            rebase_template(spec.url_template, "http://127.0.0.1:9000"),
            "http://127.0.0.1:9000/ensemble/geps/grib2/raw/%H/{lead}/"
        );
        // A trailing slash on the endpoint does not double up.
        assert_eq!(
            rebase_template("https://host.example/a/b.grib2", "http://mirror/"),
            "http://mirror/a/b.grib2"
        );
    }

    #[test]
    fn template_expansion_applies_init_and_lead() {
        let spec = model_for("ecmwf", "enfo").unwrap();
        let init = Utc.with_ymd_and_hms(2022, 6, 25, 12, 0, 0).unwrap();
        let url = expand_template(spec.url_template, init, "6");
        assert_eq!(
            url,
            "https://data.ecmwf.int/forecasts/20220625/12z/ifs/0p25/enfo/20220625120000-6h-enfo-ef.grib2"
        );
    }

    #[test]
    fn discovery_status_maps_to_provider_unavailable() {
        let err = ResolveError::from_discovery(
            "http://x/idx",
            FetchError::http_status("http://x/idx", 404),
        );
        assert!(matches!(
            err,
            ResolveError::ProviderUnavailable { status: 404, .. }
        ));
    }

    #[test]
    fn discovery_timeout_maps_to_transport() {
        let err = ResolveError::from_discovery("http://x/idx", FetchError::timeout("http://x/idx"));
        assert!(matches!(err, ResolveError::Transport { .. }));
    }
}
