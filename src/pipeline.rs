use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use colored::*;
use tokio::fs;
use tracing::{info, warn};
use url::Url;

use crate::config::{Config, LinkStrategy, RendererKind};
use crate::error::{Error, Result};
use crate::fetcher::HttpFetcher;
use crate::link_walker::{LinkWalker, WalkResult};
use crate::merger::{CommandMerger, PageMerger};
use crate::next_link::{NextLinkExtractor, PatternExtractor, SelectorExtractor};
use crate::output_namer::{name_for, FileProbe, LocalFs};
use crate::pdf_merger::LopdfMerger;
use crate::renderer::{ChromiumRenderer, CommandRenderer, PageRenderer};
use crate::workspace::{ScratchLocation, Workspace};

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct Report {
    pub output: PathBuf,
    pub urls: Vec<Url>,
}

impl Report {
    pub fn pages(&self) -> usize {
        self.urls.len()
    }
}

/// Walk, render, name, merge, clean up. Each stage finishes before the next starts.
pub struct Pipeline {
    walker: LinkWalker,
    renderer: Box<dyn PageRenderer>,
    merger: Box<dyn PageMerger>,
    probe: Box<dyn FileProbe + Send + Sync>,
    end_index: Option<NonZeroUsize>,
    out_dir: PathBuf,
    scratch: ScratchLocation,
    keep_pages: bool,
}

impl Pipeline {
    pub fn new(
        walker: LinkWalker,
        renderer: Box<dyn PageRenderer>,
        merger: Box<dyn PageMerger>,
    ) -> Self {
        Self {
            walker,
            renderer,
            merger,
            probe: Box::new(LocalFs),
            end_index: None,
            out_dir: PathBuf::from("."),
            scratch: ScratchLocation::Temporary,
            keep_pages: false,
        }
    }

    /// Wires up the collaborators selected in `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let extractor: Box<dyn NextLinkExtractor> = match &config.link_strategy {
            LinkStrategy::Pattern(pattern) => Box::new(PatternExtractor::new(pattern)?),
            LinkStrategy::Selector(selector) => Box::new(SelectorExtractor::new(selector)?),
        };
        let walker = LinkWalker::new(Box::new(HttpFetcher::new(config.timeout)?), extractor);

        let renderer: Box<dyn PageRenderer> = match config.renderer {
            RendererKind::Wkhtmltopdf => {
                let renderer = match &config.renderer_program {
                    Some(program) => CommandRenderer::new(program, config.render_timeout),
                    None => CommandRenderer::wkhtmltopdf(config.render_timeout),
                };
                Box::new(renderer.with_args(&config.renderer_args))
            }
            RendererKind::Chromium => {
                if !config.renderer_args.is_empty() {
                    warn!("--renderer-arg is ignored by the chromium renderer");
                }
                Box::new(
                    ChromiumRenderer::launch(
                        config.render_timeout,
                        config.renderer_program.as_deref(),
                    )
                    .await?,
                )
            }
        };

        let merger: Box<dyn PageMerger> = match config.merger.tool() {
            Some(tool) => {
                let mut merger = CommandMerger::new(tool, config.merge_timeout);
                if let Some(program) = &config.merger_program {
                    merger = merger.with_program(program);
                }
                Box::new(merger)
            }
            None => Box::new(LopdfMerger::new()),
        };

        Ok(Self::new(walker, renderer, merger)
            .end_index(config.end_index)
            .out_dir(config.out_dir.clone())
            .scratch(config.scratch.clone())
            .keep_pages(config.keep_pages))
    }

    pub fn end_index(mut self, end_index: Option<NonZeroUsize>) -> Self {
        self.end_index = end_index;
        self
    }

    pub fn out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    pub fn scratch(mut self, scratch: ScratchLocation) -> Self {
        self.scratch = scratch;
        self
    }

    pub fn keep_pages(mut self, keep_pages: bool) -> Self {
        self.keep_pages = keep_pages;
        self
    }

    pub fn probe(mut self, probe: Box<dyn FileProbe + Send + Sync>) -> Self {
        self.probe = probe;
        self
    }

    pub async fn run(mut self, start: &Url) -> Result<Report> {
        info!("Visiting \"{}\"", start.as_str().green());

        let result = self.build(start).await;

        if let Err(e) = self.renderer.shutdown().await {
            warn!("Failed to shut down renderer: {}", e);
        }

        result
    }

    async fn build(&self, start: &Url) -> Result<Report> {
        let walk = self.walker.walk(start, self.end_index).await?;
        info!("Found {} pages", walk.len());

        let mut workspace = Workspace::acquire(&self.scratch, self.keep_pages)?;

        if let Err(e) = self.render_pages(&walk, &mut workspace).await {
            workspace.preserve();
            return Err(e);
        }

        let output = match self.prepare_output(start).await {
            Ok(output) => output,
            Err(e) => {
                workspace.preserve();
                return Err(e);
            }
        };

        info!("Writing {} ...", output.display().to_string().blue());
        if let Err(e) = self.merger.merge(workspace.pages(), &output).await {
            workspace.preserve();
            return Err(e);
        }

        workspace.release().await?;

        info!(
            "Merged {} pages into {}",
            walk.len(),
            output.display().to_string().green()
        );

        Ok(Report {
            output,
            urls: walk.into_urls(),
        })
    }

    async fn render_pages(&self, walk: &WalkResult, workspace: &mut Workspace) -> Result<()> {
        let total = walk.len();
        for (index, url) in walk.urls().iter().enumerate() {
            let dest = workspace.page_path(index);
            info!(
                "Rendering [{}/{}] \"{}\" into \"{}\"",
                index + 1,
                total,
                url.as_str().green(),
                dest.display().to_string().blue()
            );
            self.renderer.render(url, &dest).await?;
            ensure_rendered(url, &dest).await?;
        }
        Ok(())
    }

    /// Picks the output name only now, after rendering, so the collision check is fresh.
    async fn prepare_output(&self, start: &Url) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| Error::io(&self.out_dir, e))?;
        Ok(name_for(start, &self.out_dir, self.probe.as_ref()))
    }
}

async fn ensure_rendered(url: &Url, dest: &Path) -> Result<()> {
    match fs::metadata(dest).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(Error::render(
            url.as_str(),
            format!("renderer wrote an empty file at {}", dest.display()),
        )),
        Err(_) => Err(Error::render(
            url.as_str(),
            format!("renderer produced no file at {}", dest.display()),
        )),
    }
}
