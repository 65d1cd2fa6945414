//! ECMWF open-data resolver: GRIB index sidecars to byte-range artifacts.
//!
//! Every forecast file on `data.ecmwf.int` has an `.index` sidecar holding
//! one JSON object per line, each describing one GRIB message with its
//! `_offset` and `_length` in the data file. Resolution fetches the sidecar
//! and turns matching entries into `Range` transfers of the single data file,
//! so a variable costs a few megabytes instead of the full multi-gigabyte
//! step file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{FileSetResolver, ResolveError, expand_template};
use crate::catalog::VariableKey;
use crate::fetch::HttpClient;
use crate::model::ModelSpec;
use crate::plan::{Artifact, ArtifactFormat, ByteRange};

/// One line of an ECMWF `.index` sidecar. Fields we never filter on are
/// ignored by serde.
#[derive(Debug, Deserialize)]
struct IndexEntry {
    /// MARS parameter shortname (`2t`, `gh`, ...).
    param: String,
    /// Level type (`sfc`, `pl`).
    levtype: String,
    /// Pressure level in hPa; absent for surface fields.
    levelist: Option<String>,
    /// Data type: `cf`/`pf` for ensemble streams, `fc` for deterministic.
    #[serde(rename = "type")]
    data_type: String,
    /// Byte offset of the message in the data file.
    #[serde(rename = "_offset")]
    offset: u64,
    /// Byte length of the message.
    #[serde(rename = "_length")]
    length: u64,
}

impl IndexEntry {
    /// The catalog key this entry describes, with the surface-level fixups
    /// the index convention requires: `2t` sits at 2 m, `10u`/`10v` at 10 m,
    /// any other entry without a levelist at level 0.
    fn variable_key(&self) -> VariableKey {
        let level = match (self.param.as_str(), self.levelist.as_deref()) {
            (_, Some(level)) => level.to_string(),
            ("2t", None) => "2".to_string(),
            ("10u" | "10v", None) => "10".to_string(),
            (_, None) => "0".to_string(),
        };
        VariableKey::new(&self.param, &self.levtype, &level)
    }
}

/// Resolver for ECMWF open-data products (`enfo`, `oper`).
pub struct EcmwfIndexResolver {
    spec: &'static ModelSpec,
    client: HttpClient,
    template: String,
}

impl EcmwfIndexResolver {
    /// Creates the resolver for one ECMWF model spec.
    #[must_use]
    pub fn new(spec: &'static ModelSpec, client: HttpClient) -> Self {
        Self {
            spec,
            client,
            template: spec.url_template.to_string(),
        }
    }

    /// Rebases discovery and data URLs onto a mirror origin.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.template = super::rebase_template(&self.template, endpoint);
        self
    }

    fn data_url(&self, init: DateTime<Utc>, lead_hour: u32) -> String {
        expand_template(&self.template, init, &lead_hour.to_string())
    }

    /// Ensemble streams spread a field over one control (`cf`) and fifty
    /// perturbed (`pf`) messages; deterministic streams publish one `fc`.
    fn wants_data_type(&self, data_type: &str) -> bool {
        if self.spec.ensemble {
            matches!(data_type, "cf" | "pf")
        } else {
            data_type == "fc"
        }
    }

    /// All matching index entries collapse into one artifact whose ranges
    /// are fetched in offset order and concatenated: for ensemble streams
    /// that yields one local GRIB file holding the control and every
    /// perturbed member, which the conversion step then splits and reduces.
    fn select_artifacts(
        &self,
        index_text: &str,
        index_url: &str,
        data_url: &str,
        lead_hour: u32,
        key: &VariableKey,
        canonical_name: &str,
    ) -> Vec<Artifact> {
        let mut ranges = Vec::new();
        for line in index_text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: IndexEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(url = index_url, %error, "skipping malformed index line");
                    continue;
                }
            };
            if !self.wants_data_type(&entry.data_type) || entry.variable_key() != *key {
                continue;
            }
            ranges.push(ByteRange::from_offset_length(entry.offset, entry.length));
        }
        if ranges.is_empty() {
            return Vec::new();
        }
        ranges.sort_by_key(|r| r.start);
        vec![Artifact {
            url: data_url.to_string(),
            ranges,
            canonical_name: canonical_name.to_string(),
            lead_hour,
            format: ArtifactFormat::Grib,
        }]
    }
}

#[async_trait]
impl FileSetResolver for EcmwfIndexResolver {
    fn name(&self) -> &'static str {
        "ecmwf-index"
    }

    async fn resolve(
        &self,
        init: DateTime<Utc>,
        lead_hour: u32,
        key: &VariableKey,
        canonical_name: &str,
    ) -> Result<Vec<Artifact>, ResolveError> {
        let data_url = self.data_url(init, lead_hour);
        let index_url = data_url.replace(".grib2", ".index");

        let index_text = self
            .client
            .fetch_text(&index_url)
            .await
            .map_err(|e| ResolveError::from_discovery(&index_url, e))?;

        let artifacts = self.select_artifacts(
            &index_text,
            &index_url,
            &data_url,
            lead_hour,
            key,
            canonical_name,
        );
        debug!(
            url = index_url,
            variable = canonical_name,
            matches = artifacts.len(),
            "index resolved"
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

    const INDEX_SAMPLE: &str = concat!(
        r#"{"domain":"g","date":"20220625","time":"1200","class":"od","type":"cf","stream":"enfo","step":"6","levtype":"sfc","param":"2t","_offset":0,"_length":100}"#,
        "\n",
        r#"{"domain":"g","date":"20220625","time":"1200","class":"od","type":"pf","number":"1","stream":"enfo","step":"6","levtype":"sfc","param":"2t","_offset":100,"_length":120}"#,
        "\n",
        r#"{"domain":"g","date":"20220625","time":"1200","class":"od","type":"pf","number":"2","stream":"enfo","step":"6","levtype":"sfc","param":"2t","_offset":220,"_length":110}"#,
        "\n",
        r#"{"domain":"g","date":"20220625","time":"1200","class":"od","type":"pf","number":"1","stream":"enfo","step":"6","levtype":"pl","levelist":"500","param":"gh","_offset":330,"_length":200}"#,
        "\n",
        "this line is not JSON\n",
        r#"{"domain":"g","date":"20220625","time":"1200","class":"od","type":"em","stream":"enfo","step":"6","levtype":"sfc","param":"2t","_offset":530,"_length":90}"#,
        "\n",
    );

    fn resolver() -> EcmwfIndexResolver {
        EcmwfIndexResolver::new(model_for("ecmwf", "enfo").unwrap(), HttpClient::new())
    }

    #[test]
    fn index_entry_level_fixups() {
        let two_t: IndexEntry =
            serde_json::from_str(r#"{"param":"2t","levtype":"sfc","type":"cf","_offset":0,"_length":1}"#)
                .unwrap();
        assert_eq!(two_t.variable_key(), VariableKey::new("2t", "sfc", "2"));

        let ten_u: IndexEntry =
            serde_json::from_str(r#"{"param":"10u","levtype":"sfc","type":"cf","_offset":0,"_length":1}"#)
                .unwrap();
        assert_eq!(ten_u.variable_key(), VariableKey::new("10u", "sfc", "10"));

        let msl: IndexEntry =
            serde_json::from_str(r#"{"param":"msl","levtype":"sfc","type":"cf","_offset":0,"_length":1}"#)
                .unwrap();
        assert_eq!(msl.variable_key(), VariableKey::new("msl", "sfc", "0"));

        let gh: IndexEntry = serde_json::from_str(
            r#"{"param":"gh","levtype":"pl","levelist":"500","type":"pf","_offset":0,"_length":1}"#,
        )
        .unwrap();
        assert_eq!(gh.variable_key(), VariableKey::new("gh", "pl", "500"));
    }

    #[test]
    fn selection_merges_cf_and_pf_members_into_one_artifact() {
        let key = VariableKey::new("2t", "sfc", "2");
        let artifacts = resolver().select_artifacts(
            INDEX_SAMPLE,
            "http://x/data.index",
            "http://x/data.grib2",
            6,
            &key,
            "TMP_L0",
        );
        // cf + two pf members as three ranges of one artifact; the `em`
        // entry and the garbage line drop out.
        assert_eq!(artifacts.len(), 1);
        let artifact = &artifacts[0];
        assert_eq!(artifact.url, "http://x/data.grib2");
        assert_eq!(artifact.format, ArtifactFormat::Grib);
        assert_eq!(artifact.canonical_name, "TMP_L0");
        assert_eq!(
            artifact.ranges,
            [
                ByteRange::from_offset_length(0, 100),
                ByteRange::from_offset_length(100, 120),
                ByteRange::from_offset_length(220, 110),
            ]
        );
        assert_eq!(artifact.total_range_bytes(), 330);
    }

    #[test]
    fn selection_matches_pressure_levels_exactly() {
        let key = VariableKey::new("gh", "pl", "500");
        let artifacts = resolver().select_artifacts(
            INDEX_SAMPLE,
            "http://x/data.index",
            "http://x/data.grib2",
            6,
            &key,
            "HGT_P500",
        );
        assert_eq!(artifacts.len(), 1);
        assert_eq!(
            artifacts[0].ranges,
            [ByteRange::from_offset_length(330, 200)]
        );
    }

    #[test]
    fn selection_returns_empty_when_nothing_matches() {
        let key = VariableKey::new("tp", "sfc", "0");
        let artifacts = resolver().select_artifacts(
            INDEX_SAMPLE,
            "http://x/data.index",
            "http://x/data.grib2",
            6,
            &key,
            "TP_L0",
        );
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn resolve_fetches_sidecar_and_builds_ranges() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/forecasts/20220625/12z/ifs/0p25/enfo/20220625120000-6h-enfo-ef.index",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX_SAMPLE))
            .expect(1)
            .mount(&server)
            .await;

        let spec = model_for("ecmwf", "enfo").unwrap();
        let resolver =
            EcmwfIndexResolver::new(spec, HttpClient::new()).with_endpoint(&server.uri());
        let init = Utc.with_ymd_and_hms(2022, 6, 25, 12, 0, 0).unwrap();
        let key = VariableKey::new("2t", "sfc", "2");
        let artifacts = resolver.resolve(init, 6, &key, "TMP_L0").await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].ranges.len(), 3);
        assert!(artifacts[0].url.starts_with(&server.uri()));
    }

    #[tokio::test]
    async fn missing_sidecar_is_provider_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let resolver = resolver();
        let url = format!("{}/nope.index", server.uri());
        let err = resolver
            .client
            .fetch_text(&url)
            .await
            .map_err(|e| ResolveError::from_discovery(&url, e))
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::ProviderUnavailable { status: 404, .. }
        ));
    }
}
