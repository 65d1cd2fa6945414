//! ECCC datamart resolver: HTML directory listings to whole-file artifacts.
//!
//! `dd.weather.gc.ca` publishes GEPS as one file per (variable, level, lead)
//! holding all ensemble members, under a per-lead directory. Discovery pulls
//! the directory listing and picks the file whose name tokens match the
//! requested variable key and the expected initialization stamp.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use super::{FileSetResolver, ResolveError, compile_static_regex, expand_template};
use crate::catalog::VariableKey;
use crate::fetch::HttpClient;
use crate::model::ModelSpec;
use crate::plan::{Artifact, ArtifactFormat};

/// GEPS raw filename grammar:
/// `CMC_geps-raw_{VAR}_{LVLTYPE}_{LVL}_latlon0p5x0p5_{YYYYMMDDHH}_P{NNN}_allmbrs.grib2`.
static GEPS_FILE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"CMC_geps-raw_([0-9A-Za-z]+)_([A-Z]+)_([0-9A-Za-z]+)_latlon0p5x0p5_(\d{10})_P(\d{3})_allmbrs\.grib2",
    )
});

/// Resolver for ECCC GEPS ensemble products.
pub struct EcccListingResolver {
    client: HttpClient,
    template: String,
}

impl EcccListingResolver {
    /// Creates the resolver for one ECCC model spec.
    #[must_use]
    pub fn new(spec: &'static ModelSpec, client: HttpClient) -> Self {
        Self {
            client,
            template: spec.url_template.to_string(),
        }
    }

    /// Rebases listing URLs onto a mirror origin.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.template = super::rebase_template(&self.template, endpoint);
        self
    }

    fn listing_url(&self, init: DateTime<Utc>, lead_hour: u32) -> String {
        expand_template(&self.template, init, &format!("{lead_hour:03}"))
    }

    fn select_artifacts(
        listing: &str,
        base_url: &str,
        init: DateTime<Utc>,
        lead_hour: u32,
        key: &VariableKey,
        canonical_name: &str,
    ) -> Result<Vec<Artifact>, ResolveError> {
        let base = Url::parse(base_url).map_err(|source| ResolveError::InvalidLocator {
            base: base_url.to_string(),
            locator: base_url.to_string(),
            source,
        })?;
        let init_stamp = init.format("%Y%m%d%H").to_string();
        let lead_stamp = format!("{lead_hour:03}");

        let mut artifacts = Vec::new();
        for captures in GEPS_FILE.captures_iter(listing) {
            let (Some(file), Some(var), Some(lvltype), Some(lvl), Some(stamp), Some(lead)) = (
                captures.get(0),
                captures.get(1),
                captures.get(2),
                captures.get(3),
                captures.get(4),
                captures.get(5),
            ) else {
                continue;
            };
            if var.as_str() != key.name
                || lvltype.as_str() != key.level_type
                || lvl.as_str() != key.level
            {
                continue;
            }
            if stamp.as_str() != init_stamp {
                warn!(
                    file = file.as_str(),
                    expected = init_stamp,
                    "listing entry from a different cycle, skipping"
                );
                continue;
            }
            if lead.as_str() != lead_stamp {
                continue;
            }
            let url = base
                .join(file.as_str())
                .map_err(|source| ResolveError::InvalidLocator {
                    base: base_url.to_string(),
                    locator: file.as_str().to_string(),
                    source,
                })?;
            // Listings repeat each name as link text and href.
            if artifacts
                .iter()
                .any(|a: &Artifact| a.url == url.as_str())
            {
                continue;
            }
            artifacts.push(Artifact {
                url: url.into(),
                ranges: Vec::new(),
                canonical_name: canonical_name.to_string(),
                lead_hour,
                format: ArtifactFormat::Grib,
            });
        }
        Ok(artifacts)
    }
}

#[async_trait]
impl FileSetResolver for EcccListingResolver {
    fn name(&self) -> &'static str {
        "eccc-listing"
    }

    async fn resolve(
        &self,
        init: DateTime<Utc>,
        lead_hour: u32,
        key: &VariableKey,
        canonical_name: &str,
    ) -> Result<Vec<Artifact>, ResolveError> {
        let listing_url = self.listing_url(init, lead_hour);
        let listing = self
            .client
            .fetch_text(&listing_url)
            .await
            .map_err(|e| ResolveError::from_discovery(&listing_url, e))?;

        let artifacts = Self::select_artifacts(
            &listing,
            &listing_url,
            init,
            lead_hour,
            key,
            canonical_name,
        )?;
        debug!(
            url = listing_url,
            variable = canonical_name,
            matches = artifacts.len(),
            "listing resolved"
        );
        Ok(artifacts)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::model::model_for;

    const LISTING_SAMPLE: &str = r#"
<html><body>
<a href="CMC_geps-raw_TMP_TGL_2m_latlon0p5x0p5_2022062500_P003_allmbrs.grib2">CMC_geps-raw_TMP_TGL_2m_latlon0p5x0p5_2022062500_P003_allmbrs.grib2</a>
<a href="CMC_geps-raw_TMP_ISBL_0500_latlon0p5x0p5_2022062500_P003_allmbrs.grib2">CMC_geps-raw_TMP_ISBL_0500_latlon0p5x0p5_2022062500_P003_allmbrs.grib2</a>
<a href="CMC_geps-raw_UGRD_TGL_10m_latlon0p5x0p5_2022062500_P003_allmbrs.grib2">CMC_geps-raw_UGRD_TGL_10m_latlon0p5x0p5_2022062500_P003_allmbrs.grib2</a>
<a href="CMC_geps-raw_TMP_TGL_2m_latlon0p5x0p5_2022062412_P003_allmbrs.grib2">stale cycle</a>
</body></html>
"#;

    fn init() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 6, 25, 0, 0, 0).unwrap()
    }

    #[test]
    fn listing_url_expands_cycle_hour_and_lead() {
        let resolver =
            EcccListingResolver::new(model_for("eccc", "geps_ens").unwrap(), HttpClient::new());
        assert_eq!(
            resolver.listing_url(init(), 3),
            "https://dd.weather.gc.ca/ensemble/geps/grib2/raw/00/003/"
        );
    }

    #[test]
    fn selection_matches_variable_and_cycle() {
        let key = VariableKey::new("TMP", "TGL", "2m");
        let artifacts = EcccListingResolver::select_artifacts(
            LISTING_SAMPLE,
            "https://dd.weather.gc.ca/ensemble/geps/grib2/raw/00/003/",
            init(),
            3,
            &key,
            "TMP_L0",
        )
        .unwrap();
        // The stale-cycle file and other variables drop out; href and link
        // text collapse to one artifact.
        assert_eq!(artifacts.len(), 1);
        assert_eq!(
            artifacts[0].url,
            "https://dd.weather.gc.ca/ensemble/geps/grib2/raw/00/003/CMC_geps-raw_TMP_TGL_2m_latlon0p5x0p5_2022062500_P003_allmbrs.grib2"
        );
        assert!(artifacts[0].ranges.is_empty());
        assert_eq!(artifacts[0].format, ArtifactFormat::Grib);
    }

    #[test]
    fn selection_distinguishes_levels_of_one_variable() {
        let surface = VariableKey::new("TMP", "TGL", "2m");
        let pressure = VariableKey::new("TMP", "ISBL", "0500");
        let base = "https://dd.weather.gc.ca/ensemble/geps/grib2/raw/00/003/";

        let at_surface = EcccListingResolver::select_artifacts(
            LISTING_SAMPLE, base, init(), 3, &surface, "TMP_L0",
        )
        .unwrap();
        let at_500 = EcccListingResolver::select_artifacts(
            LISTING_SAMPLE, base, init(), 3, &pressure, "TMP_P500",
        )
        .unwrap();
        assert_eq!(at_surface.len(), 1);
        assert_eq!(at_500.len(), 1);
        assert_ne!(at_surface[0].url, at_500[0].url);
    }

    #[test]
    fn selection_returns_empty_for_absent_variable() {
        let key = VariableKey::new("CAPE", "SFC", "0");
        let artifacts = EcccListingResolver::select_artifacts(
            LISTING_SAMPLE,
            "https://dd.weather.gc.ca/ensemble/geps/grib2/raw/00/003/",
            init(),
            3,
            &key,
            "CAPE_L0",
        )
        .unwrap();
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn unreachable_listing_is_provider_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ensemble/geps/grib2/raw/00/003/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let resolver =
            EcccListingResolver::new(model_for("eccc", "geps_ens").unwrap(), HttpClient::new())
                .with_endpoint(&server.uri());
        let key = VariableKey::new("TMP", "TGL", "2m");
        let err = resolver.resolve(init(), 3, &key, "TMP_L0").await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::ProviderUnavailable { status: 503, .. }
        ));
    }
}
