//! Structural verification of downloaded payloads before commit.
//!
//! Nothing here decodes meteorological data. The checks establish only that
//! the bytes are a well-formed container: GRIB files must frame as a sequence
//! of complete messages, netCDF files must carry a known magic, bz2 wrappers
//! must decompress into a well-formed GRIB file. A payload that fails any of
//! these never reaches its final path.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use tracing::debug;

use super::FetchError;
use crate::plan::ArtifactFormat;

/// netCDF classic magics and the HDF5 signature used by netCDF-4.
const NETCDF_MAGICS: [&[u8]; 3] = [b"CDF\x01", b"CDF\x02", b"\x89HDF\r\n\x1a\n"];

/// Verifies the payload at `tmp` and returns the path holding the verified
/// bytes, ready to be renamed to the final target.
///
/// For [`ArtifactFormat::Bzip2Grib`] the verified payload is a sibling
/// `.dec` file holding the decompressed GRIB; the compressed temp is removed
/// on success. For the other formats the verified payload is `tmp` itself.
///
/// # Errors
///
/// [`FetchError::Verification`] when the structure check fails,
/// [`FetchError::Io`] when the payload cannot be read.
pub fn verify_payload(tmp: &Path, format: ArtifactFormat) -> Result<PathBuf, FetchError> {
    match format {
        ArtifactFormat::Grib => {
            let data = std::fs::read(tmp).map_err(|e| FetchError::io(tmp, e))?;
            scan_grib(&data).map_err(|reason| FetchError::verification(tmp, reason))?;
            Ok(tmp.to_path_buf())
        }
        ArtifactFormat::NetCdf => {
            let data = std::fs::read(tmp).map_err(|e| FetchError::io(tmp, e))?;
            check_netcdf_magic(&data).map_err(|reason| FetchError::verification(tmp, reason))?;
            Ok(tmp.to_path_buf())
        }
        ArtifactFormat::Bzip2Grib => {
            let decompressed = sibling_with_suffix(tmp, ".dec");
            decompress_bz2(tmp, &decompressed)?;
            let data = std::fs::read(&decompressed).map_err(|e| FetchError::io(&decompressed, e))?;
            if let Err(reason) = scan_grib(&data) {
                let _ = std::fs::remove_file(&decompressed);
                return Err(FetchError::verification(tmp, reason));
            }
            // The compressed wrapper has served its purpose.
            let _ = std::fs::remove_file(tmp);
            debug!(path = %decompressed.display(), "bz2 payload unwrapped and verified");
            Ok(decompressed)
        }
    }
}

/// Appends `suffix` to the file name of `path`.
pub(crate) fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map_or_else(
        || suffix.trim_start_matches('.').to_string(),
        |n| n.to_string_lossy().into_owned(),
    );
    name.push_str(suffix);
    path.with_file_name(name)
}

fn decompress_bz2(src: &Path, dest: &Path) -> Result<(), FetchError> {
    let input = File::open(src).map_err(|e| FetchError::io(src, e))?;
    let mut decoder = BzDecoder::new(input);
    let mut output = File::create(dest).map_err(|e| FetchError::io(dest, e))?;
    match io::copy(&mut decoder, &mut output) {
        Ok(_) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(dest);
            // A corrupt stream surfaces as an InvalidData IO error; report it
            // as a verification failure so it retries like any bad payload.
            Err(FetchError::verification(
                src,
                format!("bz2 decompression failed: {e}"),
            ))
        }
    }
}

/// Walks the GRIB message framing: each message starts with `GRIB`, carries
/// its total length (24-bit for edition 1, 64-bit for edition 2), and ends
/// with `7777`. Requires at least one complete message and nothing but
/// padding after the last.
fn scan_grib(data: &[u8]) -> Result<(), String> {
    let mut pos = 0usize;
    let mut messages = 0usize;

    while pos < data.len() {
        if data[pos..].iter().all(|&b| matches!(b, 0 | b' ' | b'\n' | b'\r')) {
            break; // trailing padding
        }
        if data.len() - pos < 16 {
            return Err(format!("truncated message header at offset {pos}"));
        }
        if &data[pos..pos + 4] != b"GRIB" {
            return Err(format!("missing GRIB magic at offset {pos}"));
        }
        let edition = data[pos + 7];
        let total_len = match edition {
            1 => u32::from_be_bytes([0, data[pos + 4], data[pos + 5], data[pos + 6]]) as usize,
            2 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&data[pos + 8..pos + 16]);
                usize::try_from(u64::from_be_bytes(buf))
                    .map_err(|_| format!("oversized message length at offset {pos}"))?
            }
            other => return Err(format!("unsupported GRIB edition {other} at offset {pos}")),
        };
        if total_len < 20 {
            return Err(format!("implausible message length {total_len} at offset {pos}"));
        }
        if pos + total_len > data.len() {
            return Err(format!(
                "message at offset {pos} claims {total_len} bytes but only {} remain",
                data.len() - pos
            ));
        }
        if &data[pos + total_len - 4..pos + total_len] != b"7777" {
            return Err(format!("message at offset {pos} lacks 7777 terminator"));
        }
        messages += 1;
        pos += total_len;
    }

    if messages == 0 {
        return Err("no GRIB messages found".to_string());
    }
    Ok(())
}

fn check_netcdf_magic(data: &[u8]) -> Result<(), String> {
    if NETCDF_MAGICS.iter().any(|magic| data.starts_with(magic)) {
        Ok(())
    } else {
        Err("not a netCDF file (no CDF or HDF5 magic)".to_string())
    }
}
