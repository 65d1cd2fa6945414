//! DWD open-data resolver: per-variable bz2 listings to artifacts.
//!
//! `opendata.dwd.de` publishes ICON global as one bz2-wrapped GRIB file per
//! (variable, level, lead), grouped into one directory per variable.
//! Discovery pulls that variable's listing and picks the entries whose
//! filename tokens match the requested key, the cycle stamp, and the lead.

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

/// ICON global filename grammar:
/// `icon_global_icosahedral_{single|pressure}-level_{YYYYMMDDHH}_{NNN}[_{LVL}]_{FIELD}.grib2.bz2`.
/// The level token appears only for pressure-level files; single-level fields
/// carry their height in the field token instead (`T_2M`, `U_10M`).
static ICON_FILE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"icon_global_icosahedral_(single|pressure)-level_(\d{10})_(\d{3})_(?:(\d+)_)?([A-Z0-9_]+)\.grib2\.bz2",
    )
});

/// Splits a single-level field token into (name, level): a trailing
/// `_<height>M` carries the height, anything else sits at level 0.
fn split_single_level_token(token: &str) -> (String, String) {
    if let Some((name, suffix)) = token.rsplit_once('_')
        && let Some(height) = suffix.strip_suffix('M')
        && !height.is_empty()
        && height.bytes().all(|b| b.is_ascii_digit())
    {
        return (name.to_string(), height.to_string());
    }
    (token.to_string(), "0".to_string())
}

/// Resolver for DWD ICON global.
pub struct DwdListingResolver {
    client: HttpClient,
    template: String,
}

impl DwdListingResolver {
    /// Creates the resolver for one DWD model spec.
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

    /// The listing directory for one variable: lowercased native name, with
    /// the height suffix DWD appends for near-surface fields (`t_2m`,
    /// `u_10m`).
    fn variable_dir(key: &VariableKey) -> String {
        if key.level_type == "single" && key.level != "0" {
            format!("{}_{}m", key.name.to_lowercase(), key.level)
        } else {
            key.name.to_lowercase()
        }
    }

    fn listing_url(&self, init: DateTime<Utc>, key: &VariableKey) -> String {
        expand_template(&self.template, init, "")
            .replace("{variable}", &Self::variable_dir(key))
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
        for captures in ICON_FILE.captures_iter(listing) {
            let (Some(file), Some(kind), Some(stamp), Some(lead), Some(field)) = (
                captures.get(0),
                captures.get(1),
                captures.get(2),
                captures.get(3),
                captures.get(5),
            ) else {
                continue;
            };
            let (name, level) = match kind.as_str() {
                "pressure" => {
                    let Some(lvl) = captures.get(4) else {
                        warn!(
                            file = file.as_str(),
                            "pressure-level entry without a level token, skipping"
                        );
                        continue;
                    };
                    (field.as_str().to_string(), lvl.as_str().to_string())
                }
                _ => split_single_level_token(field.as_str()),
            };
            if name != key.name || kind.as_str() != key.level_type || level != key.level {
                continue;
            }
            if stamp.as_str() != init_stamp || lead.as_str() != lead_stamp {
                continue;
            }
            let url = base
                .join(file.as_str())
                .map_err(|source| ResolveError::InvalidLocator {
                    base: base_url.to_string(),
                    locator: file.as_str().to_string(),
                    source,
                })?;
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
                format: ArtifactFormat::Bzip2Grib,
            });
        }
        Ok(artifacts)
    }
}

#[async_trait]
impl FileSetResolver for DwdListingResolver {
    fn name(&self) -> &'static str {
        "dwd-listing"
    }

    async fn resolve(
        &self,
        init: DateTime<Utc>,
        lead_hour: u32,
        key: &VariableKey,
        canonical_name: &str,
    ) -> Result<Vec<Artifact>, ResolveError> {
        let listing_url = self.listing_url(init, key);
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

    const T_2M_LISTING: &str = r#"
<a href="icon_global_icosahedral_single-level_2022062500_000_T_2M.grib2.bz2">icon_global_icosahedral_single-level_2022062500_000_T_2M.grib2.bz2</a>
<a href="icon_global_icosahedral_single-level_2022062500_003_T_2M.grib2.bz2">icon_global_icosahedral_single-level_2022062500_003_T_2M.grib2.bz2</a>
<a href="icon_global_icosahedral_single-level_2022062412_003_T_2M.grib2.bz2">stale</a>
"#;

    const T_PRESSURE_LISTING: &str = r#"
<a href="icon_global_icosahedral_pressure-level_2022062500_003_500_T.grib2.bz2">x</a>
<a href="icon_global_icosahedral_pressure-level_2022062500_003_850_T.grib2.bz2">x</a>
"#;

    fn init() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 6, 25, 0, 0, 0).unwrap()
    }

    #[test]
    fn single_level_token_parsing() {
        assert_eq!(
            split_single_level_token("T_2M"),
            ("T".to_string(), "2".to_string())
        );
        assert_eq!(
            split_single_level_token("U_10M"),
            ("U".to_string(), "10".to_string())
        );
        assert_eq!(
            split_single_level_token("TOT_PREC"),
            ("TOT_PREC".to_string(), "0".to_string())
        );
        assert_eq!(
            split_single_level_token("H_SNOW"),
            ("H_SNOW".to_string(), "0".to_string())
        );
    }

    #[test]
    fn variable_dir_carries_height_suffix() {
        assert_eq!(
            DwdListingResolver::variable_dir(&VariableKey::new("T", "single", "2")),
            "t_2m"
        );
        assert_eq!(
            DwdListingResolver::variable_dir(&VariableKey::new("U", "single", "10")),
            "u_10m"
        );
        assert_eq!(
            DwdListingResolver::variable_dir(&VariableKey::new("TOT_PREC", "single", "0")),
            "tot_prec"
        );
        assert_eq!(
            DwdListingResolver::variable_dir(&VariableKey::new("T", "pressure", "500")),
            "t"
        );
    }

    #[test]
    fn listing_url_expands_hour_and_variable_dir() {
        let resolver =
            DwdListingResolver::new(model_for("dwd", "icon").unwrap(), HttpClient::new());
        assert_eq!(
            resolver.listing_url(init(), &VariableKey::new("T", "single", "2")),
            "https://opendata.dwd.de/weather/nwp/icon/grib/00/t_2m/"
        );
    }

    #[test]
    fn selection_matches_lead_and_cycle() {
        let key = VariableKey::new("T", "single", "2");
        let artifacts = DwdListingResolver::select_artifacts(
            T_2M_LISTING,
            "https://opendata.dwd.de/weather/nwp/icon/grib/00/t_2m/",
            init(),
            3,
            &key,
            "TMP_L0",
        )
        .unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(
            artifacts[0].url,
            "https://opendata.dwd.de/weather/nwp/icon/grib/00/t_2m/icon_global_icosahedral_single-level_2022062500_003_T_2M.grib2.bz2"
        );
        assert_eq!(artifacts[0].format, ArtifactFormat::Bzip2Grib);
        assert_eq!(artifacts[0].file_name(), "TMP_L0-003.grib2");
    }

    #[test]
    fn selection_distinguishes_pressure_levels() {
        let key = VariableKey::new("T", "pressure", "500");
        let artifacts = DwdListingResolver::select_artifacts(
            T_PRESSURE_LISTING,
            "https://opendata.dwd.de/weather/nwp/icon/grib/00/t/",
            init(),
            3,
            &key,
            "TMP_P500",
        )
        .unwrap();
        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0].url.ends_with("_500_T.grib2.bz2"));
    }

    #[test]
    fn selection_returns_empty_for_absent_lead() {
        let key = VariableKey::new("T", "single", "2");
        let artifacts = DwdListingResolver::select_artifacts(
            T_2M_LISTING,
            "https://opendata.dwd.de/weather/nwp/icon/grib/00/t_2m/",
            init(),
            120,
            &key,
            "TMP_L0",
        )
        .unwrap();
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn resolve_walks_the_mock_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather/nwp/icon/grib/00/t_2m/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(T_2M_LISTING))
            .expect(1)
            .mount(&server)
            .await;

        let spec = model_for("dwd", "icon").unwrap();
        let resolver =
            DwdListingResolver::new(spec, HttpClient::new()).with_endpoint(&server.uri());
        let key = VariableKey::new("T", "single", "2");
        let artifacts = resolver.resolve(init(), 3, &key, "TMP_L0").await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0].url.starts_with(&server.uri()));
    }
}
