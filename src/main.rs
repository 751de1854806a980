use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::*;
use manual2pdf::config::parse_start_url;
use manual2pdf::next_link::DEFAULT_NEXT_SELECTOR;
use manual2pdf::workspace::ScratchLocation;
use manual2pdf::{Config, LinkStrategy, MergerKind, Pipeline, RendererKind};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "manual2pdf")]
#[command(about = "CLI utility to turn a paginated documentation manual into a single PDF for offline reading")]
#[command(version = "0.1.0")]
#[command(arg_required_else_help = true)]
#[command(after_help = "Requires external tools for the defaults: 'sudo apt-get install wkhtmltopdf pdftk'\n\
Example: manual2pdf https://doc.owncloud.com/webui/next/classic_ui/")]
struct Args {
    /// URL of the first page of the manual
    start_url: String,

    /// Stop after this many pages
    end_index: Option<NonZeroUsize>,

    /// Directory the merged PDF is written to
    #[arg(short = 'o', long = "out-dir", default_value = ".")]
    out_dir: PathBuf,

    /// Request timeout in seconds
    #[arg(short = 't', long = "timeout", default_value = "30.0", value_parser = parse_timeout)]
    timeout: f64,

    /// Time allowed to render a single page, in seconds
    #[arg(long = "render-timeout", default_value = "120.0", value_parser = parse_timeout)]
    render_timeout: f64,

    /// Time allowed for the final merge, in seconds
    #[arg(long = "merge-timeout", default_value = "600.0", value_parser = parse_timeout)]
    merge_timeout: f64,

    /// Page renderer
    #[arg(long, value_enum, default_value_t = RendererKind::Wkhtmltopdf)]
    renderer: RendererKind,

    /// Renderer executable (wkhtmltopdf binary or Chromium executable)
    #[arg(long = "renderer-program")]
    renderer_program: Option<PathBuf>,

    /// Extra argument for the renderer command, may be repeated
    #[arg(long = "renderer-arg", allow_hyphen_values = true)]
    renderer_args: Vec<String>,

    /// PDF merger
    #[arg(long, value_enum, default_value_t = MergerKind::Pdftk)]
    merger: MergerKind,

    /// Merge tool executable
    #[arg(long = "merger-program")]
    merger_program: Option<PathBuf>,

    /// Regex locating the next page link; the first capture group is the href
    #[arg(long = "next-pattern", conflicts_with = "next_selector")]
    next_pattern: Option<String>,

    /// CSS selector locating the next page anchor, instead of a regex
    #[arg(long = "next-selector", num_args = 0..=1, default_missing_value = DEFAULT_NEXT_SELECTOR)]
    next_selector: Option<String>,

    /// Directory for per-page PDFs (by default a temporary directory)
    #[arg(long = "scratch-dir")]
    scratch_dir: Option<PathBuf>,

    /// Preserve individual page PDFs (by default they are deleted after combining)
    #[arg(short = 'p', long = "keep-pages")]
    keep_pages: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn into_config(self) -> Config {
        let link_strategy = match (self.next_pattern, self.next_selector) {
            (Some(pattern), _) => LinkStrategy::Pattern(pattern),
            (None, Some(selector)) => LinkStrategy::Selector(selector),
            (None, None) => LinkStrategy::default(),
        };

        Config {
            end_index: self.end_index,
            timeout: Duration::from_secs_f64(self.timeout),
            render_timeout: Duration::from_secs_f64(self.render_timeout),
            merge_timeout: Duration::from_secs_f64(self.merge_timeout),
            renderer: self.renderer,
            renderer_program: self.renderer_program,
            renderer_args: self.renderer_args,
            merger: self.merger,
            merger_program: self.merger_program,
            link_strategy,
            out_dir: self.out_dir,
            scratch: self
                .scratch_dir
                .map(ScratchLocation::Dir)
                .unwrap_or_default(),
            keep_pages: self.keep_pages,
        }
    }
}

fn parse_timeout(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|_| "Not a number.")?;
    if !value.is_finite() || value <= 0.0 {
        return Err("Must be a positive number.".to_string());
    }
    Ok(value)
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let crate_directive = format!("manual2pdf={level}");

    // Chromium's protocol handler is very chatty
    let mut filter = EnvFilter::from_default_env();
    for directive in [
        "chromiumoxide::conn=off",
        "chromiumoxide::handler=off",
        crate_directive.as_str(),
    ] {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive {directive}: {e}"),
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let start = parse_start_url(&args.start_url)?;
    let config = args.into_config();

    let pipeline = Pipeline::from_config(&config).await?;
    let report = pipeline.run(&start).await.map_err(|e| {
        let stage = e.stage();
        anyhow::Error::new(e).context(format!("{stage} stage failed"))
    })?;

    info!(
        "Done: {} pages written to {}",
        report.pages(),
        report.output.display().to_string().green()
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("{}", format!("Error: {:#}", e).red());
        process::exit(1);
    }
}
