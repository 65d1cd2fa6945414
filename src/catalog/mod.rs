//! Variable catalogs mapping provider-native field identities to canonical names.
//!
//! Each agency labels the same physical field differently: ECCC GEPS uses
//! GRIB shortnames with `TGL`/`SFC`/`ISBL` level types, ECMWF open data uses
//! MARS param names (`2t`, `10u`, `msl`), DWD ICON encodes the field in the
//! filename. A [`VariableCatalog`] is the immutable, process-lifetime mapping
//! from a provider's [`VariableKey`] to the canonical output name used in the
//! local archive and downstream datasets.
//!
//! Catalogs are pure lookup tables: built once, read-only, no I/O.

mod builtin;

pub use builtin::{DWD_ICON_VARIABLES, ECCC_GEPS_ENS_VARIABLES, ECMWF_ENFO_VARIABLES};

use std::collections::HashMap;

use thiserror::Error;

/// Errors raised by catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The requested canonical variable is not produced by this model.
    ///
    /// Raised before any network activity; a typo'd variable name must never
    /// start a transfer.
    #[error("variable {name:?} is not in the {model_source}/{product} catalog")]
    VariableNotFound {
        /// The canonical name that was requested.
        name: String,
        /// Model source the catalog belongs to.
        model_source: String,
        /// Model product the catalog belongs to.
        product: String,
    },
}

/// A provider's native identity for one forecast field.
///
/// Equality and hashing are field-wise over all three components. Two keys
/// that differ only in `level` are distinct variables (e.g. temperature at
/// 40 m vs 120 m above ground).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableKey {
    /// Provider-native variable name (GRIB shortname or MARS param).
    pub name: String,
    /// Level type code (`SFC`, `TGL`, `ISBL`, `sfc`, `pl`, ...).
    pub level_type: String,
    /// Level value as the provider spells it (`2m`, `0500`, `10`).
    pub level: String,
}

impl VariableKey {
    /// Creates a key from the three native components.
    pub fn new(
        name: impl Into<String>,
        level_type: impl Into<String>,
        level: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            level_type: level_type.into(),
            level: level.into(),
        }
    }
}

/// Immutable mapping from native variable identity to canonical output name.
///
/// One `VariableKey` maps to at most one canonical name per (source, product)
/// catalog. Lookups are pure and total.
#[derive(Debug, Clone)]
pub struct VariableCatalog {
    entries: HashMap<VariableKey, String>,
}

impl VariableCatalog {
    /// Builds a catalog from (native key, canonical name) pairs.
    #[must_use]
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (VariableKey, S)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect(),
        }
    }

    /// Returns the canonical name for a native key, if the catalog carries it.
    #[must_use]
    pub fn lookup(&self, key: &VariableKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Reverse lookup: finds the native key that produces `canonical_name`.
    ///
    /// Used by the orchestrator to validate a request before any resolver
    /// runs.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::VariableNotFound`] when no entry produces the
    /// requested canonical name.
    pub fn key_for_output(
        &self,
        canonical_name: &str,
        source: &str,
        product: &str,
    ) -> Result<(&VariableKey, &str), CatalogError> {
        self.entries
            .iter()
            .find(|(_, out)| out.as_str() == canonical_name)
            .map(|(key, out)| (key, out.as_str()))
            .ok_or_else(|| CatalogError::VariableNotFound {
                name: canonical_name.to_string(),
                model_source: source.to_string(),
                product: product.to_string(),
            })
    }

    /// Number of variables in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over (native key, canonical name) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&VariableKey, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }
}
