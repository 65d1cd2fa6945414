//! Production conversion backend shelling out to `cdo` and `grib_filter`.
//!
//! Deterministic inputs take one `cdo` invocation: convert to netCDF-4 and
//! rename the native variable to its canonical name. Ensemble inputs first
//! split per member with `grib_filter` under a scratch directory, then reduce
//! the member files with the configured `cdo ens*` operator in the same
//! invocation that converts and renames.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ConversionTool, ConvertError, ConvertJob};

/// Conversion backend backed by the cdo toolchain.
pub struct CdoTool {
    cdo: PathBuf,
    grib_filter: Option<PathBuf>,
}

impl CdoTool {
    /// Locates the tools on PATH. `grib_filter` is optional; only ensemble
    /// inputs need it.
    ///
    /// # Errors
    ///
    /// [`ConvertError::ToolMissing`] when `cdo` is not on PATH.
    pub fn discover() -> Result<Self, ConvertError> {
        let cdo = which::which("cdo").map_err(|_| ConvertError::ToolMissing {
            tool: "cdo".to_string(),
        })?;
        let grib_filter = which::which("grib_filter").ok();
        debug!(
            cdo = %cdo.display(),
            grib_filter = grib_filter.as_ref().map(|p| p.display().to_string()),
            "conversion tools located"
        );
        Ok(Self { cdo, grib_filter })
    }

    /// Builds a backend from explicit tool paths.
    #[must_use]
    pub fn with_paths(cdo: PathBuf, grib_filter: Option<PathBuf>) -> Self {
        Self { cdo, grib_filter }
    }

    async fn convert_single(&self, job: &ConvertJob, tmp_out: &Path) -> Result<(), ConvertError> {
        let args = single_args(job, tmp_out);
        run_tool(&self.cdo, "cdo", &args, &job.input).await
    }

    async fn convert_ensemble(&self, job: &ConvertJob, tmp_out: &Path) -> Result<(), ConvertError> {
        let grib_filter = self.grib_filter.as_ref().ok_or_else(|| {
            ConvertError::ToolMissing {
                tool: "grib_filter".to_string(),
            }
        })?;
        let rule = job.split_rule.as_ref().ok_or_else(|| {
            ConvertError::CommandFailed {
                tool: "grib_filter".to_string(),
                input: job.input.clone(),
                detail: "ensemble input without a member split rule".to_string(),
            }
        })?;

        // Scratch directory for the per-member files; dropped with its
        // contents when the conversion ends either way.
        let scratch = tempfile::tempdir().map_err(|e| ConvertError::io(&job.input, e))?;
        let split_args: Vec<OsString> =
            vec![rule.as_os_str().to_owned(), job.input.as_os_str().to_owned()];
        run_tool_in(grib_filter, "grib_filter", &split_args, &job.input, scratch.path()).await?;

        let mut members = Vec::new();
        let mut entries = tokio::fs::read_dir(scratch.path())
            .await
            .map_err(|e| ConvertError::io(scratch.path(), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ConvertError::io(scratch.path(), e))?
        {
            members.push(entry.path());
        }
        if members.is_empty() {
            return Err(ConvertError::CommandFailed {
                tool: "grib_filter".to_string(),
                input: job.input.clone(),
                detail: "split rule produced no member files".to_string(),
            });
        }
        members.sort();

        let args = ensemble_args(job, &members, tmp_out);
        run_tool(&self.cdo, "cdo", &args, &job.input).await
    }
}

#[async_trait]
impl ConversionTool for CdoTool {
    async fn convert(&self, job: &ConvertJob) -> Result<(), ConvertError> {
        let tmp_out = tmp_output(&job.output);
        if let Some(parent) = job.output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConvertError::io(parent, e))?;
        }

        let result = if job.ensemble {
            self.convert_ensemble(job, &tmp_out).await
        } else {
            self.convert_single(job, &tmp_out).await
        };
        if let Err(error) = result {
            let _ = tokio::fs::remove_file(&tmp_out).await;
            return Err(error);
        }

        tokio::fs::rename(&tmp_out, &job.output)
            .await
            .map_err(|e| ConvertError::io(&job.output, e))
    }
}

fn tmp_output(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map_or_else(|| "out".to_string(), |n| n.to_string_lossy().into_owned());
    name.push_str(".tmp");
    output.with_file_name(name)
}

fn chname_arg(job: &ConvertJob) -> OsString {
    OsString::from(format!("-chname,{},{}", job.native_name, job.canonical_name))
}

/// `cdo -s -f nc4 -chname,native,canonical input tmp_out`
fn single_args(job: &ConvertJob, tmp_out: &Path) -> Vec<OsString> {
    vec![
        OsString::from("-s"),
        OsString::from("-f"),
        OsString::from("nc4"),
        chname_arg(job),
        job.input.as_os_str().to_owned(),
        tmp_out.as_os_str().to_owned(),
    ]
}

/// `cdo -s -f nc4 -chname,native,canonical -ens<stat> member... tmp_out`
fn ensemble_args(job: &ConvertJob, members: &[PathBuf], tmp_out: &Path) -> Vec<OsString> {
    let mut args = vec![
        OsString::from("-s"),
        OsString::from("-f"),
        OsString::from("nc4"),
        chname_arg(job),
        OsString::from(format!("-{}", job.statistic.cdo_operator())),
    ];
    args.extend(members.iter().map(|m| m.as_os_str().to_owned()));
    args.push(tmp_out.as_os_str().to_owned());
    args
}

async fn run_tool(
    program: &Path,
    tool: &str,
    args: &[OsString],
    input: &Path,
) -> Result<(), ConvertError> {
    run_command(Command::new(program).args(args), tool, input).await
}

async fn run_tool_in(
    program: &Path,
    tool: &str,
    args: &[OsString],
    input: &Path,
    cwd: &Path,
) -> Result<(), ConvertError> {
    run_command(Command::new(program).args(args).current_dir(cwd), tool, input).await
}

async fn run_command(command: &mut Command, tool: &str, input: &Path) -> Result<(), ConvertError> {
    debug!(tool, input = %input.display(), "running conversion tool");
    let output = command
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ConvertError::Spawn {
            tool: tool.to_string(),
            source,
        })?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(ConvertError::CommandFailed {
        tool: tool.to_string(),
        input: input.to_path_buf(),
        detail: format!("{}: {}", output.status, stderr.trim()),
    })
}
