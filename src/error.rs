//! Error types shared by every stage of the pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while walking, rendering or merging a manual.
#[derive(Debug, Error)]
pub enum Error {
    /// The command line could not be turned into a run.
    #[error("{0}")]
    Usage(String),

    /// An option value was rejected (bad pattern, selector, program).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Network-level failure while fetching a page.
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// A next link was found but could not be resolved into a URL.
    #[error("cannot resolve next link \"{href}\" found on {base}: {source}")]
    InvalidLink {
        base: String,
        href: String,
        #[source]
        source: url::ParseError,
    },

    /// The renderer failed or produced nothing for a page.
    #[error("failed to render {url}: {reason}")]
    Render { url: String, reason: String },

    /// The merge tool failed to produce the final document.
    #[error("failed to merge pages into {}: {reason}", output.display())]
    Merge { output: PathBuf, reason: String },

    /// Scratch directory or output file could not be created, read or removed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn render(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Render {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn merge(output: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Merge {
            output: output.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Name of the pipeline stage the error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Usage(_) | Self::Config(_) => "setup",
            Self::Client(_)
            | Self::Fetch { .. }
            | Self::HttpStatus { .. }
            | Self::InvalidLink { .. } => "fetch",
            Self::Render { .. } => "render",
            Self::Merge { .. } => "merge",
            Self::Io { .. } => "filesystem",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
