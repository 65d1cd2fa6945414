//! Static model registry: which agencies and products this tool knows.
//!
//! The registry maps a (source, product) pair to a [`ModelSpec`] at startup.
//! Provider lookup is a plain match over registered specs, never a
//! name-string-driven module import; adding a model means adding a spec here
//! and a resolver in [`crate::resolver`].

use chrono::{DateTime, Duration, Timelike, Utc};
use thiserror::Error;

use crate::catalog::{
    DWD_ICON_VARIABLES, ECCC_GEPS_ENS_VARIABLES, ECMWF_ENFO_VARIABLES, VariableCatalog,
};

/// Errors from model registry lookups.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No spec registered for the requested (source, product).
    #[error("unknown model {model_source}/{product}; known: {known}")]
    UnknownModel {
        /// Requested source.
        model_source: String,
        /// Requested product.
        product: String,
        /// Comma-separated list of registered models.
        known: String,
    },
}

impl ModelError {
    /// Builds the unknown-model error, enumerating the registered models.
    #[must_use]
    pub fn unknown_model(source: &str, product: &str) -> Self {
        Self::UnknownModel {
            model_source: source.to_string(),
            product: product.to_string(),
            known: MODELS
                .iter()
                .map(|m| format!("{}/{}", m.source, m.product))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Everything the pipeline needs to know about one model product.
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    /// Publishing agency identifier (`ecmwf`, `eccc`, `dwd`).
    pub source: &'static str,
    /// Product identifier within the agency (`enfo`, `geps_ens`, `icon`).
    pub product: &'static str,
    /// Remote location template. Interpretation is resolver-specific:
    /// strftime fields expand from the initialization time, `{lead}` from the
    /// zero-padded lead hour, `{variable}` from the lowercased native name.
    pub url_template: &'static str,
    /// Cycle granularity in hours: initialization times are multiples of this.
    pub cycle_hours: u32,
    /// How long after a cycle starts before its files are fully published.
    pub publication_delay_hours: i64,
    /// True when artifacts carry an ensemble member dimension that the
    /// conversion step reduces by a statistic.
    pub ensemble: bool,
    catalog: fn() -> &'static VariableCatalog,
    lead_hours: fn() -> Vec<u32>,
}

impl ModelSpec {
    /// The variable catalog for this model.
    #[must_use]
    pub fn catalog(&self) -> &'static VariableCatalog {
        (self.catalog)()
    }

    /// The full medium-range lead-hour schedule for this model.
    #[must_use]
    pub fn lead_hours(&self) -> Vec<u32> {
        (self.lead_hours)()
    }

    /// Default initialization time: `now` minus the publication delay, hour
    /// floored to the cycle granularity, minutes and seconds zeroed.
    ///
    /// # Panics
    ///
    /// Never: the floored hour is always a valid hour of the same day.
    #[must_use]
    pub fn default_init_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let shifted = now - Duration::hours(self.publication_delay_hours);
        let batch_hour = shifted.hour() - shifted.hour() % self.cycle_hours;
        shifted
            .with_hour(batch_hour)
            .and_then(|t| t.with_minute(0))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(shifted)
    }
}

const MODELS: &[ModelSpec] = &[
    ModelSpec {
        source: "ecmwf",
        product: "enfo",
        url_template:
            "https://data.ecmwf.int/forecasts/%Y%m%d/%Hz/ifs/0p25/enfo/%Y%m%d%H0000-{lead}h-enfo-ef.grib2",
        cycle_hours: 12,
        publication_delay_hours: 9,
        ensemble: true,
        catalog: || &ECMWF_ENFO_VARIABLES,
        lead_hours: || {
            (0..144)
                .step_by(3)
                .chain((144..=360).step_by(6))
                .collect()
        },
    },
    ModelSpec {
        source: "ecmwf",
        product: "oper",
        url_template:
            "https://data.ecmwf.int/forecasts/%Y%m%d/%Hz/ifs/0p25/oper/%Y%m%d%H0000-{lead}h-oper-fc.grib2",
        cycle_hours: 12,
        publication_delay_hours: 9,
        ensemble: false,
        catalog: || &ECMWF_ENFO_VARIABLES,
        lead_hours: || {
            (0..144)
                .step_by(3)
                .chain((144..=240).step_by(6))
                .collect()
        },
    },
    ModelSpec {
        source: "eccc",
        product: "geps_ens",
        url_template: "https://dd.weather.gc.ca/ensemble/geps/grib2/raw/%H/{lead}/",
        cycle_hours: 12,
        publication_delay_hours: 6,
        ensemble: true,
        catalog: || &ECCC_GEPS_ENS_VARIABLES,
        lead_hours: || {
            (3..192)
                .step_by(3)
                .chain((192..=384).step_by(6))
                .collect()
        },
    },
    ModelSpec {
        source: "dwd",
        product: "icon",
        url_template: "https://opendata.dwd.de/weather/nwp/icon/grib/%H/{variable}/",
        cycle_hours: 12,
        publication_delay_hours: 4,
        ensemble: false,
        catalog: || &DWD_ICON_VARIABLES,
        lead_hours: || (0..78).chain((78..=180).step_by(3)).collect(),
    },
];

/// Looks up the spec registered for (source, product).
///
/// # Errors
///
/// Returns [`ModelError::UnknownModel`] when nothing is registered under that
/// pair; the message enumerates the known models.
pub fn model_for(source: &str, product: &str) -> Result<&'static ModelSpec, ModelError> {
    MODELS
        .iter()
        .find(|m| m.source == source && m.product == product)
        .ok_or_else(|| ModelError::unknown_model(source, product))
}

/// All registered models, in registration order.
#[must_use]
pub fn registered_models() -> &'static [ModelSpec] {
    MODELS
}
