//! Concatenating per-page PDFs into the final manual.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Joins `pages` into `dest`, keeping their order.
#[async_trait]
pub trait PageMerger: Send + Sync {
    async fn merge(&self, pages: &[PathBuf], dest: &Path) -> Result<()>;
}

/// Command line tools that can concatenate PDFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeTool {
    /// `pdftk a.pdf b.pdf cat output dest.pdf`
    Pdftk,
    /// `pdfunite a.pdf b.pdf dest.pdf`
    Pdfunite,
    /// `qpdf --empty --pages a.pdf b.pdf -- dest.pdf`
    Qpdf,
}

impl MergeTool {
    pub fn program(self) -> &'static str {
        match self {
            Self::Pdftk => "pdftk",
            Self::Pdfunite => "pdfunite",
            Self::Qpdf => "qpdf",
        }
    }

    pub fn args(self, pages: &[PathBuf], dest: &Path) -> Vec<OsString> {
        let pages = pages.iter().map(|p| p.as_os_str().to_os_string());
        let mut args: Vec<OsString> = Vec::new();
        match self {
            Self::Pdftk => {
                args.extend(pages);
                args.extend(["cat".into(), "output".into(), dest.as_os_str().into()]);
            }
            Self::Pdfunite => {
                args.extend(pages);
                args.push(dest.as_os_str().into());
            }
            Self::Qpdf => {
                args.extend(["--empty".into(), "--pages".into()]);
                args.extend(pages);
                args.extend(["--".into(), dest.as_os_str().into()]);
            }
        }
        args
    }
}

/// Runs one of the [`MergeTool`]s as a subprocess.
#[derive(Debug, Clone)]
pub struct CommandMerger {
    tool: MergeTool,
    program: OsString,
    timeout: Duration,
}

impl CommandMerger {
    pub fn new(tool: MergeTool, timeout: Duration) -> Self {
        Self {
            tool,
            program: tool.program().into(),
            timeout,
        }
    }

    /// Uses a different executable with the same argument layout.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl PageMerger for CommandMerger {
    async fn merge(&self, pages: &[PathBuf], dest: &Path) -> Result<()> {
        if pages.is_empty() {
            return Err(Error::merge(dest, "no pages to merge"));
        }

        let program = self.program.to_string_lossy().into_owned();
        let args = self.tool.args(pages, dest);
        debug!("Running {} with {} arguments", program, args.len());

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::merge(dest, format!("cannot start {program}: {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::merge(dest, format!("{program} timed out after {:?}", self.timeout)))?
            .map_err(|e| Error::merge(dest, format!("{program} failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::merge(
                dest,
                format!("{program} exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        if !dest.exists() {
            return Err(Error::merge(dest, format!("{program} produced no output file")));
        }

        Ok(())
    }
}
