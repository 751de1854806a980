//! Run configuration, filled in from the command line.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use url::Url;

use crate::error::{Error, Result};
use crate::merger::MergeTool;
use crate::next_link::DEFAULT_NEXT_PATTERN;
use crate::workspace::ScratchLocation;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RendererKind {
    /// External `wkhtmltopdf` process per page
    #[default]
    Wkhtmltopdf,
    /// Headless Chromium driven over the DevTools protocol
    Chromium,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MergerKind {
    #[default]
    Pdftk,
    Pdfunite,
    Qpdf,
    /// Merge in-process without any external tool
    Lopdf,
}

impl MergerKind {
    /// The command line tool behind this merger, if it uses one.
    pub fn tool(self) -> Option<MergeTool> {
        match self {
            Self::Pdftk => Some(MergeTool::Pdftk),
            Self::Pdfunite => Some(MergeTool::Pdfunite),
            Self::Qpdf => Some(MergeTool::Qpdf),
            Self::Lopdf => None,
        }
    }
}

/// How the next page is found in a fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStrategy {
    Pattern(String),
    Selector(String),
}

impl Default for LinkStrategy {
    fn default() -> Self {
        Self::Pattern(DEFAULT_NEXT_PATTERN.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub end_index: Option<NonZeroUsize>,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    pub render_timeout: Duration,
    pub merge_timeout: Duration,
    pub renderer: RendererKind,
    pub renderer_program: Option<PathBuf>,
    pub renderer_args: Vec<String>,
    pub merger: MergerKind,
    pub merger_program: Option<PathBuf>,
    pub link_strategy: LinkStrategy,
    pub out_dir: PathBuf,
    pub scratch: ScratchLocation,
    pub keep_pages: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            end_index: None,
            timeout: Duration::from_secs(30),
            render_timeout: Duration::from_secs(120),
            merge_timeout: Duration::from_secs(600),
            renderer: RendererKind::default(),
            renderer_program: None,
            renderer_args: Vec::new(),
            merger: MergerKind::default(),
            merger_program: None,
            link_strategy: LinkStrategy::default(),
            out_dir: PathBuf::from("."),
            scratch: ScratchLocation::default(),
            keep_pages: false,
        }
    }
}

/// Accepts only absolute http(s) URLs as the first page of a manual.
pub fn parse_start_url(input: &str) -> Result<Url> {
    let url = Url::parse(input.trim())
        .map_err(|e| Error::Usage(format!("'{input}' is not an absolute URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::Usage(format!(
            "'{input}' uses unsupported scheme '{other}', expected http or https"
        ))),
    }
}
