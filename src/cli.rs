//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::Parser;

use nwp_harvest::{
    DEFAULT_DATAHOME, DEFAULT_FETCH_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, EnsembleStatistic,
};

/// Fetch numerical weather prediction artifacts into a local archive.
///
/// One invocation harvests one batch: the requested variables of one model
/// initialization, downloaded, verified, and converted into canonical netCDF
/// files under the archive root.
#[derive(Parser, Debug)]
#[command(name = "nwp-harvest")]
#[command(author, version, about, disable_version_flag = true)]
pub struct Args {
    /// Publishing agency (ecmwf, eccc, dwd)
    pub source: String,

    /// Product within the agency (enfo, oper, geps_ens, icon)
    pub product: String,

    /// Canonical variable names to harvest; omit for the whole catalog
    #[arg(short = 'V', long = "variable", value_delimiter = ',')]
    pub variables: Vec<String>,

    /// Initialization time (YYYYMMDDHH); omit for the latest published cycle
    #[arg(short = 'd', long, value_parser = parse_init_time)]
    pub init: Option<DateTime<Utc>>,

    /// Lead hours to harvest; omit for the model's full schedule
    #[arg(short = 'L', long = "lead", value_delimiter = ',')]
    pub leads: Vec<u32>,

    /// Archive root directory
    #[arg(short = 'o', long, default_value = DEFAULT_DATAHOME)]
    pub datahome: PathBuf,

    /// Maximum concurrent transfers (1-64)
    #[arg(short = 'c', long, default_value_t = DEFAULT_FETCH_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub concurrency: u8,

    /// Transfer attempts per artifact, including the first (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_ATTEMPTS as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: u8,

    /// Mirror origin replacing the provider's registered host
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Ensemble reduction for ensemble products (mean, min, max, std)
    #[arg(long = "stat", default_value = "mean", value_parser = parse_statistic)]
    pub statistic: EnsembleStatistic,

    /// Member split rule file handed to grib_filter for ensemble conversion
    #[arg(long)]
    pub split_rule: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Parses `YYYYMMDDHH`, with `YYYY-MM-DDTHH:MM` accepted as well.
fn parse_init_time(value: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(&format!("{value}0000"), "%Y%m%d%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("invalid initialization time {value:?}; expected YYYYMMDDHH"))
}

fn parse_statistic(value: &str) -> Result<EnsembleStatistic, String> {
    value.parse()
}
