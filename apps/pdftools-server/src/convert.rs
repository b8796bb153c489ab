//! PDF to DOCX conversion
//!
//! Conversion is delegated to a [`DocxRenderer`]. The default renderer runs an
//! external converter command. Every conversion happens inside a scratch
//! directory that is removed when it goes out of scope.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::ApiError;

/// Default converter invocation; `{input}` and `{output}` are substituted
pub const DEFAULT_CONVERTER: &str = "pdf2docx convert {input} {output}";

/// Turns a PDF file into a DOCX file
pub trait DocxRenderer: Send + Sync {
    /// Write `docx_path` from `pdf_path`. All or nothing: on error no usable
    /// output may remain at `docx_path`.
    fn convert(&self, pdf_path: &Path, docx_path: &Path) -> Result<(), ApiError>;
}

/// Runs an external converter command
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    /// Parse a whitespace-separated command line such as
    /// `pdf2docx convert {input} {output}`
    pub fn from_command_line(command_line: &str) -> Result<Self, String> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| "Converter command is empty".to_string())?;
        let args: Vec<String> = parts.collect();

        let mentions = |placeholder: &str| args.iter().any(|a| a.contains(placeholder));
        if !mentions("{input}") || !mentions("{output}") {
            return Err(format!(
                "Converter command '{}' must reference {{input}} and {{output}}",
                command_line
            ));
        }

        Ok(Self { program, args })
    }

    fn expand(&self, pdf_path: &Path, docx_path: &Path) -> Vec<String> {
        let input = pdf_path.to_string_lossy();
        let output = docx_path.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

impl DocxRenderer for CommandRenderer {
    fn convert(&self, pdf_path: &Path, docx_path: &Path) -> Result<(), ApiError> {
        let args = self.expand(pdf_path, docx_path);
        debug!("Running {} {:?}", self.program, args);

        let result = Command::new(&self.program).args(&args).output();

        let failure = match result {
            Err(e) => Some(format!("Could not start '{}': {}", self.program, e)),
            Ok(output) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Some(format!(
                    "'{}' exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                ))
            }
            Ok(_) => match std::fs::metadata(docx_path) {
                Ok(meta) if meta.len() > 0 => None,
                _ => Some("Converter produced no output".to_string()),
            },
        };

        match failure {
            None => Ok(()),
            Some(reason) => {
                remove_partial(docx_path);
                Err(ApiError::ConversionFailed(reason))
            }
        }
    }
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

/// A finished conversion living in its scratch directory
pub struct Converted {
    /// Removed together with the output when dropped
    scratch: TempDir,
    output: PathBuf,
}

impl Converted {
    pub fn read(&self) -> Result<Vec<u8>, ApiError> {
        std::fs::read(&self.output)
            .map_err(|e| ApiError::Internal(format!("Failed to read converted file: {}", e)))
    }

    /// Move the output to `destination`, outliving the scratch directory
    pub fn persist(self, destination: &Path) -> Result<(), ApiError> {
        if std::fs::rename(&self.output, destination).is_err() {
            // Scratch and destination may be on different filesystems
            std::fs::copy(&self.output, destination).map_err(|e| {
                ApiError::Internal(format!("Failed to store converted file: {}", e))
            })?;
        }
        debug!(
            "Stored {} (scratch {} released)",
            destination.display(),
            self.scratch.path().display()
        );
        Ok(())
    }
}

/// A gated artifact between conversion and registration.
///
/// Dropping it while armed deletes the destination, and also makes the
/// matching [`ArtifactWriter`] delete whatever it stores afterwards. A job
/// that outlives its request (timeout, client gone) leaves nothing behind.
pub struct PendingArtifact {
    path: PathBuf,
    abandoned: Arc<AtomicBool>,
    armed: bool,
}

impl PendingArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            abandoned: Arc::new(AtomicBool::new(false)),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle for the job that produces the file
    pub fn writer(&self) -> ArtifactWriter {
        ArtifactWriter {
            path: self.path.clone(),
            abandoned: self.abandoned.clone(),
        }
    }

    /// The file is owned elsewhere now (the registry)
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingArtifact {
    fn drop(&mut self) {
        if self.armed {
            self.abandoned.store(true, Ordering::SeqCst);
            remove_partial(&self.path);
        }
    }
}

/// Stores a conversion at the destination of a [`PendingArtifact`]
pub struct ArtifactWriter {
    path: PathBuf,
    abandoned: Arc<AtomicBool>,
}

impl ArtifactWriter {
    pub fn store(&self, converted: Converted) -> Result<(), ApiError> {
        if let Err(e) = converted.persist(&self.path) {
            remove_partial(&self.path);
            return Err(e);
        }

        // Checked after the file exists: either this sees the flag, or the
        // pending side's removal runs after the file was written
        if self.abandoned.load(Ordering::SeqCst) {
            debug!("Request gone, discarding {}", self.path.display());
            remove_partial(&self.path);
        }
        Ok(())
    }
}

/// Convert `pdf` inside a fresh scratch directory under `work_dir`
pub fn convert_in_scratch(
    renderer: &dyn DocxRenderer,
    work_dir: &Path,
    pdf: &[u8],
) -> Result<Converted, ApiError> {
    let scratch = tempfile::Builder::new()
        .prefix("convert-")
        .tempdir_in(work_dir)
        .map_err(|e| ApiError::Internal(format!("Failed to create scratch directory: {}", e)))?;

    let input = scratch.path().join("input.pdf");
    let output = scratch.path().join("output.docx");

    std::fs::write(&input, pdf)
        .map_err(|e| ApiError::Internal(format!("Failed to write upload: {}", e)))?;

    renderer.convert(&input, &output)?;
    info!("Converted {} bytes of PDF to DOCX", pdf.len());

    Ok(Converted { scratch, output })
}
