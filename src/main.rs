//! CLI entry point for the nwp-harvest tool.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use nwp_harvest::{
    BatchRequest, CdoTool, ConversionTool, HarvestConfig, Pipeline, RetryPolicy,
};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let retry = RetryPolicy::with_max_attempts(u32::from(args.max_attempts));
    let config = HarvestConfig {
        datahome: args.datahome,
        fetch_concurrency: usize::from(args.concurrency),
        transfer_retry: retry,
        convert_retry: retry,
        endpoint: args.endpoint,
        statistic: args.statistic,
        split_rule: args.split_rule,
        ..HarvestConfig::default()
    };

    let tool: Arc<dyn ConversionTool> = Arc::new(CdoTool::discover()?);
    let pipeline = Pipeline::new(config, tool);

    let request = BatchRequest {
        source: args.source,
        product: args.product,
        variables: args.variables,
        init: args.init,
        lead_hours: (!args.leads.is_empty()).then_some(args.leads),
    };

    let report = pipeline.run(&request).await?;

    for artifact in &report.fetch_failed {
        warn!(artifact = %artifact, "artifact not fetched");
    }
    for job in &report.convert_failed {
        warn!(output = %job.output.display(), "artifact not converted");
    }
    info!(
        source = report.source,
        product = report.product,
        init = %report.init.format("%Y-%m-%d %H:%M"),
        planned = report.planned,
        converted = report.converted,
        status = report.status(),
        "harvest finished"
    );

    Ok(if report.status() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
