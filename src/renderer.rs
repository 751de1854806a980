//! Turning a single page into a PDF file.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures_util::StreamExt;
use tokio::fs;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use url::Url;

use crate::error::{Error, Result};

/// Converts one URL into a PDF at `dest`. Called once per page, in order.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &Url, dest: &Path) -> Result<()>;

    /// Releases whatever the renderer holds on to (a browser, say).
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Runs an external converter as `<program> [args...] <url> <dest>`.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: OsString,
    args: Vec<OsString>,
    timeout: Duration,
}

impl CommandRenderer {
    pub const DEFAULT_PROGRAM: &'static str = "wkhtmltopdf";

    pub fn new(program: impl Into<OsString>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn wkhtmltopdf(timeout: Duration) -> Self {
        Self::new(Self::DEFAULT_PROGRAM, timeout)
    }

    /// Extra arguments passed before the URL and destination.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl PageRenderer for CommandRenderer {
    async fn render(&self, url: &Url, dest: &Path) -> Result<()> {
        let program = self.program.to_string_lossy().into_owned();
        debug!("Running {} for {}", program, url);

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(url.as_str())
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::render(url.as_str(), format!("cannot start {program}: {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::render(
                    url.as_str(),
                    format!("{program} timed out after {:?}", self.timeout),
                )
            })?
            .map_err(|e| Error::render(url.as_str(), format!("{program} failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::render(
                url.as_str(),
                format!("{program} exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(())
    }
}

/// Print settings handed to Chromium for every page.
#[derive(Debug, Clone)]
pub struct PdfOptions {
    pub scale: f64,
    pub margin_top: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub print_background: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            scale: 0.75,
            margin_top: 0.4,
            margin_right: 0.4,
            margin_bottom: 0.4,
            margin_left: 0.4,
            print_background: true,
        }
    }
}

impl PdfOptions {
    fn to_params(&self) -> PrintToPdfParams {
        PrintToPdfParams {
            scale: Some(self.scale),
            margin_top: Some(self.margin_top),
            margin_right: Some(self.margin_right),
            margin_bottom: Some(self.margin_bottom),
            margin_left: Some(self.margin_left),
            print_background: Some(self.print_background),
            ..Default::default()
        }
    }
}

/// Prints pages through one headless Chromium kept alive for the whole run.
pub struct ChromiumRenderer {
    browser: Browser,
    handler: Option<JoinHandle<()>>,
    pdf_options: PdfOptions,
    timeout: Duration,
}

impl ChromiumRenderer {
    /// Starts the browser. `executable` overrides Chromium auto-detection.
    pub async fn launch(timeout: Duration, executable: Option<&Path>) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .request_timeout(timeout);
        if let Some(executable) = executable {
            builder = builder.chrome_executable(executable);
        }

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to create browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Config(format!("failed to launch browser: {e}")))?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(err) = h {
                    // Chromium emits protocol messages the client cannot decode; those are noise
                    let err_str = err.to_string();
                    if !err_str.contains("data did not match any variant")
                        && !err_str.contains("untagged enum Message")
                    {
                        error!("Browser handler error: {}", err);
                    } else {
                        debug!("Chrome protocol message ignored: {}", err);
                    }
                }
            }
        });

        Ok(Self {
            browser,
            handler: Some(handle),
            pdf_options: PdfOptions::default(),
            timeout,
        })
    }

    async fn print(&self, url: &Url) -> Result<Vec<u8>> {
        let page = self
            .browser
            .new_page(url.as_str())
            .await
            .map_err(|e| Error::render(url.as_str(), format!("failed to open page: {e}")))?;

        page.wait_for_navigation()
            .await
            .map_err(|e| Error::render(url.as_str(), format!("navigation failed: {e}")))?;

        let pdf_data = page
            .pdf(self.pdf_options.to_params())
            .await
            .map_err(|e| Error::render(url.as_str(), format!("failed to generate PDF: {e}")))?;

        page.close().await.ok();
        Ok(pdf_data)
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &Url, dest: &Path) -> Result<()> {
        let pdf_data = tokio::time::timeout(self.timeout, self.print(url))
            .await
            .map_err(|_| {
                Error::render(url.as_str(), format!("timed out after {:?}", self.timeout))
            })??;

        write_pdf(url, dest, &pdf_data).await
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.browser.close().await.ok();
        self.browser.wait().await.ok();
        if let Some(handle) = self.handler.take() {
            handle.abort();
        }
        Ok(())
    }
}

/// A page that cannot be saved is a failed render of that page.
async fn write_pdf(url: &Url, dest: &Path, data: &[u8]) -> Result<()> {
    fs::write(dest, data).await.map_err(|e| {
        Error::render(url.as_str(), format!("failed to write {}: {}", dest.display(), e))
    })
}
