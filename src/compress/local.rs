//! Local optimizer processes.
//!
//! Thin wrappers around command-line optimizers that rewrite a file in place:
//!
//! ```text
//! jpegoptim --quiet --strip-all <path>
//! pngquant --force --speed <N> --floyd=<F> --ext .png <path>
//! optipng -silent <path>
//! ```
//!
//! Program names come from config, so a full path works as well as a name
//! on `PATH`.

use super::{CompressError, Compressor};
use crate::config::LocalConfig;
use log::debug;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

/// pngquant exit codes meaning "result would not be smaller / not good
/// enough"; the file is left untouched and the pipeline continues.
const PNGQUANT_NOT_IMPROVED: &[i32] = &[98, 99];

/// Run `program args...`, treating `allowed` non-zero exit codes as success.
fn run_tool<I, S>(program: &str, args: I, allowed: &[i32]) -> Result<(), CompressError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| CompressError::ExternalTool {
            tool: program.to_string(),
            reason: e.to_string(),
        })?;

    if output.status.success() {
        return Ok(());
    }

    if let Some(code) = output.status.code()
        && allowed.contains(&code)
    {
        debug!("{program} exited with {code}, file left unchanged");
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let reason = match stderr.trim() {
        "" => output.status.to_string(),
        msg => msg.to_string(),
    };
    Err(CompressError::ExternalTool {
        tool: program.to_string(),
        reason,
    })
}

/// Lossless JPEG optimizer (`jpegoptim`).
pub struct JpegOptim {
    program: String,
}

impl JpegOptim {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl Compressor for JpegOptim {
    fn name(&self) -> &str {
        &self.program
    }

    fn compress(&self, path: &Path) -> Result<(), CompressError> {
        run_tool(
            &self.program,
            [OsStr::new("--quiet"), OsStr::new("--strip-all"), path.as_os_str()],
            &[],
        )
    }
}

/// Local PNG pipeline: palette quantization, then lossless stream
/// optimization, both in place.
pub struct LocalPngPipeline {
    quantizer: String,
    optimizer: String,
    speed: u8,
    dithering: f32,
    label: String,
}

impl LocalPngPipeline {
    pub fn new(quantizer: &str, optimizer: &str, speed: u8, dithering: f32) -> Self {
        Self {
            quantizer: quantizer.to_string(),
            optimizer: optimizer.to_string(),
            speed,
            dithering,
            label: format!("{quantizer}+{optimizer}"),
        }
    }

    pub fn from_config(config: &LocalConfig) -> Self {
        Self::new(
            &config.quantizer,
            &config.optimizer,
            config.speed,
            config.dithering,
        )
    }

    /// Arguments passed to the quantizer, path last.
    pub fn quantizer_args(&self, path: &Path) -> Vec<String> {
        vec![
            "--force".to_string(),
            "--speed".to_string(),
            // pngquant accepts 1-11
            self.speed.max(1).to_string(),
            format!("--floyd={}", self.dithering),
            "--ext".to_string(),
            ".png".to_string(),
            path.to_string_lossy().to_string(),
        ]
    }
}

impl Compressor for LocalPngPipeline {
    fn name(&self) -> &str {
        &self.label
    }

    fn compress(&self, path: &Path) -> Result<(), CompressError> {
        run_tool(
            &self.quantizer,
            self.quantizer_args(path),
            PNGQUANT_NOT_IMPROVED,
        )?;
        run_tool(
            &self.optimizer,
            [OsStr::new("-silent"), path.as_os_str()],
            &[],
        )
    }
}
