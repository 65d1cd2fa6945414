//! Batch planning types: artifacts, byte ranges, and the local archive layout.
//!
//! An [`Artifact`] is one remote file (or a byte range of one) that must be
//! fetched to satisfy a (variable, lead hour) pair. A [`BatchPlan`] is the
//! full set of artifacts for one initialization time. [`ArchiveLayout`]
//! derives every local path deterministically, so re-resolving the same
//! logical artifact always lands on the same file.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Half-open byte range `[start, end)` within a remote file.
///
/// GRIB index sidecars publish `_offset`/`_length`; the HTTP `Range` header
/// wants an inclusive end, which [`ByteRange::http_range_value`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Offset of the first byte.
    pub start: u64,
    /// Offset one past the last byte.
    pub end: u64,
}

impl ByteRange {
    /// Creates a range from an index entry's offset and length.
    #[must_use]
    pub fn from_offset_length(offset: u64, length: u64) -> Self {
        Self {
            start: offset,
            end: offset + length,
        }
    }

    /// Number of bytes covered.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns true for an empty range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// The `bytes=start-end` value for an HTTP `Range` header (inclusive end).
    #[must_use]
    pub fn http_range_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end.saturating_sub(1))
    }
}

/// Encoding of the payload an artifact's transfer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Raw GRIB (edition 1 or 2) messages.
    Grib,
    /// netCDF classic or netCDF-4/HDF5.
    NetCdf,
    /// bz2-wrapped GRIB; decompressed before verification and commit.
    Bzip2Grib,
}

impl ArtifactFormat {
    /// Extension of the committed raw file (post-decompression for bz2).
    #[must_use]
    pub fn raw_extension(&self) -> &'static str {
        match self {
            Self::Grib | Self::Bzip2Grib => "grib2",
            Self::NetCdf => "nc",
        }
    }
}

/// One unit of remote data to fetch. Immutable once resolved.
///
/// Failure reporting is keyed by this value, never by task position, so the
/// engine can hand the exact failed descriptors back for the aggregated
/// retry pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Remote locator (plain URL; byte-range artifacts share one URL).
    pub url: String,
    /// Byte ranges within the remote file, when the provider publishes an
    /// offset index. Ranges are transferred in order and concatenated, which
    /// is valid for GRIB message sequences. Empty means transfer the whole
    /// file.
    pub ranges: Vec<ByteRange>,
    /// Canonical variable name this artifact satisfies.
    pub canonical_name: String,
    /// Forecast lead hour.
    pub lead_hour: u32,
    /// Payload encoding, drives verification.
    pub format: ArtifactFormat,
}

impl Artifact {
    /// Local raw file name: `{canonical}-{lead:03}.{ext}`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{}-{:03}.{}",
            self.canonical_name,
            self.lead_hour,
            self.format.raw_extension()
        )
    }

    /// Archive (converted) file name: `{canonical}-{lead:03}.nc`.
    #[must_use]
    pub fn output_name(&self) -> String {
        format!("{}-{:03}.nc", self.canonical_name, self.lead_hour)
    }

    /// Total bytes covered by the ranges; zero for whole-file transfers.
    #[must_use]
    pub fn total_range_bytes(&self) -> u64 {
        self.ranges.iter().map(ByteRange::len).sum()
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ranges.is_empty() {
            write!(
                f,
                "{}-{:03} <- {}",
                self.canonical_name, self.lead_hour, self.url
            )
        } else {
            write!(
                f,
                "{}-{:03} <- {} ({} ranges, {} bytes)",
                self.canonical_name,
                self.lead_hour,
                self.url,
                self.ranges.len(),
                self.total_range_bytes()
            )
        }
    }
}

/// All artifacts required for one initialization time of one model.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// Publishing agency.
    pub source: String,
    /// Product within the agency.
    pub product: String,
    /// Initialization time (UTC, on a cycle boundary).
    pub init: DateTime<Utc>,
    /// The required artifacts.
    pub artifacts: Vec<Artifact>,
}

impl BatchPlan {
    /// Number of artifacts in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true when the plan holds no artifacts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Deterministic local path derivation under `datahome`.
///
/// Layout: `{datahome}/{source}/{product}/{init:%Y%m%d%H}0000/{name}-{lead:03}.nc`,
/// with raw staging next to it in a `_tmp`-suffixed directory.
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    datahome: PathBuf,
}

impl ArchiveLayout {
    /// Creates a layout rooted at `datahome`.
    pub fn new(datahome: impl Into<PathBuf>) -> Self {
        Self {
            datahome: datahome.into(),
        }
    }

    /// The archive root.
    #[must_use]
    pub fn datahome(&self) -> &Path {
        &self.datahome
    }

    fn init_stamp(init: DateTime<Utc>) -> String {
        init.format("%Y%m%d%H0000").to_string()
    }

    /// Directory holding converted files for one batch.
    #[must_use]
    pub fn batch_dir(&self, source: &str, product: &str, init: DateTime<Utc>) -> PathBuf {
        self.datahome
            .join(source)
            .join(product)
            .join(Self::init_stamp(init))
    }

    /// Directory holding raw downloads for one batch; removed after a fully
    /// successful conversion pass.
    #[must_use]
    pub fn staging_dir(&self, source: &str, product: &str, init: DateTime<Utc>) -> PathBuf {
        self.datahome
            .join(source)
            .join(product)
            .join(format!("{}_tmp", Self::init_stamp(init)))
    }

    /// Final archive path for one (variable, lead).
    #[must_use]
    pub fn archive_file(
        &self,
        source: &str,
        product: &str,
        init: DateTime<Utc>,
        canonical_name: &str,
        lead_hour: u32,
    ) -> PathBuf {
        self.batch_dir(source, product, init)
            .join(format!("{canonical_name}-{lead_hour:03}.nc"))
    }
}
