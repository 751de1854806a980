//! Scratch space for per-page PDFs.

use std::path::{Path, PathBuf};

use colored::*;
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Where per-page PDFs are written while a manual is being built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScratchLocation {
    /// A fresh directory under the system temp dir, removed as a whole.
    #[default]
    Temporary,
    /// A caller supplied directory. Only the files this run created are removed.
    Dir(PathBuf),
}

pub struct Workspace {
    root: PathBuf,
    temp: Option<TempDir>,
    pages: Vec<PathBuf>,
    keep_pages: bool,
}

impl Workspace {
    pub fn acquire(location: &ScratchLocation, keep_pages: bool) -> Result<Self> {
        let (root, temp) = match location {
            ScratchLocation::Temporary => {
                let temp = tempfile::Builder::new()
                    .prefix("manual2pdf-")
                    .tempdir()
                    .map_err(|e| Error::io(std::env::temp_dir(), e))?;
                (temp.path().to_path_buf(), Some(temp))
            }
            ScratchLocation::Dir(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
                (dir.clone(), None)
            }
        };

        debug!("Scratch directory: {}", root.display());

        Ok(Self {
            root,
            temp,
            pages: Vec::new(),
            keep_pages,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Allocates the file for the page at `index` (0-based) and remembers it.
    pub fn page_path(&mut self, index: usize) -> PathBuf {
        let path = self.root.join(format!("page_{:04}.pdf", index + 1));
        self.pages.push(path.clone());
        path
    }

    pub fn pages(&self) -> &[PathBuf] {
        &self.pages
    }

    /// Cleans up after a successful merge, unless pages were asked to be kept.
    pub async fn release(mut self) -> Result<()> {
        if self.keep_pages {
            info!(
                "Keeping {} page files in {}",
                self.pages.len(),
                self.root.display().to_string().blue()
            );
            self.persist();
            return Ok(());
        }

        if let Some(temp) = self.temp.take() {
            info!("Cleaning up scratch directory...");
            temp.close().map_err(|e| Error::io(&self.root, e))?;
            return Ok(());
        }

        info!("Cleaning up individual page files...");
        for page in &self.pages {
            if let Err(e) = fs::remove_file(page).await {
                warn!("Failed to remove {}: {}", page.display(), e);
            }
        }

        // Remove the directory only if nothing else lives there
        if let Ok(mut entries) = fs::read_dir(&self.root).await {
            if matches!(entries.next_entry().await, Ok(None)) {
                let _ = fs::remove_dir(&self.root).await;
            }
        }

        Ok(())
    }

    /// Leaves every page file in place after a failure so the run can be inspected.
    pub fn preserve(mut self) -> PathBuf {
        warn!(
            "Leaving {} page files in {} for recovery",
            self.pages.len(),
            self.root.display().to_string().yellow()
        );
        self.persist();
        self.root.clone()
    }

    fn persist(&mut self) {
        if let Some(temp) = self.temp.take() {
            let _ = temp.keep();
        }
    }
}
