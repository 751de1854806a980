//! # manual2pdf
//!
//! A CLI utility to convert a paginated documentation manual into one offline PDF.
//!
//! Starting from the first page, the "next" navigation link is followed until the
//! manual ends. Every page is rendered to its own PDF by an external converter
//! (`wkhtmltopdf` or headless Chromium) and the pages are concatenated in reading
//! order (`pdftk`, `pdfunite`, `qpdf` or in-process with `lopdf`).
//!
//! ## Usage
//!
//! ```bash
//! manual2pdf https://doc.owncloud.com/webui/next/classic_ui/
//! manual2pdf https://doc.example.com/manual/page1 12 --merger lopdf
//! ```

pub mod config;
pub mod error;
pub mod fetcher;
pub mod link_walker;
pub mod merger;
pub mod next_link;
pub mod output_namer;
pub mod pdf_merger;
pub mod pipeline;
pub mod renderer;
pub mod workspace;

pub use config::{Config, LinkStrategy, MergerKind, RendererKind};
pub use error::{Error, Result};
pub use link_walker::{LinkWalker, WalkResult};
pub use pdf_merger::LopdfMerger;
pub use pipeline::{Pipeline, Report};
