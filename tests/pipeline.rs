//! End-to-end runs of the pipeline against a mock documentation site.
//!
//! Rendering and merging are replaced with stubs: each "PDF" holds the URL it was
//! rendered from, and the merge concatenates them line by line.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use manual2pdf::fetcher::{HttpFetcher, PageSource};
use manual2pdf::merger::PageMerger;
use manual2pdf::next_link::PatternExtractor;
use manual2pdf::renderer::PageRenderer;
use manual2pdf::workspace::ScratchLocation;
use manual2pdf::{Error, LinkWalker, Pipeline, Result};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Writes the page URL as the content of the "PDF" and records the call.
#[derive(Clone, Default)]
struct StubRenderer {
    calls: Arc<Mutex<Vec<String>>>,
    fail_on: Option<String>,
}

#[async_trait]
impl PageRenderer for StubRenderer {
    async fn render(&self, url: &Url, dest: &Path) -> Result<()> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.fail_on.as_deref() == Some(url.as_str()) {
            return Err(Error::render(url.as_str(), "stub failure"));
        }
        tokio::fs::write(dest, url.as_str())
            .await
            .map_err(|e| Error::io(dest, e))
    }
}

/// Concatenates the inputs, one per line, in the order given.
struct ConcatMerger {
    fail: bool,
}

#[async_trait]
impl PageMerger for ConcatMerger {
    async fn merge(&self, pages: &[PathBuf], dest: &Path) -> Result<()> {
        if self.fail {
            return Err(Error::merge(dest, "stub failure"));
        }
        let mut combined = Vec::new();
        for page in pages {
            combined.push(tokio::fs::read_to_string(page).await.map_err(|e| Error::io(page, e))?);
        }
        tokio::fs::write(dest, combined.join("\n"))
            .await
            .map_err(|e| Error::io(dest, e))
    }
}

fn page_with_next(href: &str) -> String {
    format!(
        r#"<html><body><article>content</article>
        <nav class="pagination"><span class="prev"><a href="prev">Prev</a></span>
        <span class="next"><a href="{href}">Next</a></span></nav></body></html>"#
    )
}

async fn mount(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// page1 -> page2 -> page3, with a relative and an absolute-path next link.
async fn three_page_manual() -> MockServer {
    let server = MockServer::start().await;
    mount(&server, "/manual/page1", page_with_next("page2")).await;
    mount(&server, "/manual/page2", page_with_next("/manual/page3")).await;
    mount(&server, "/manual/page3", "<html><body>last page</body></html>".to_string()).await;
    server
}

fn walker() -> LinkWalker {
    LinkWalker::new(
        Box::new(HttpFetcher::new(Duration::from_secs(5)).unwrap()),
        Box::new(PatternExtractor::default()),
    )
}

fn start_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/manual/page1", server.uri())).unwrap()
}

fn expected_urls(server: &MockServer) -> Vec<String> {
    ["page1", "page2", "page3"]
        .iter()
        .map(|page| format!("{}/manual/{}", server.uri(), page))
        .collect()
}

#[tokio::test]
async fn test_full_manual_is_merged_in_reading_order() {
    let server = three_page_manual().await;
    let out = tempfile::tempdir().unwrap();
    let scratch = out.path().join("scratch");
    let renderer = StubRenderer::default();

    let report = Pipeline::new(
        walker(),
        Box::new(renderer.clone()),
        Box::new(ConcatMerger { fail: false }),
    )
    .out_dir(out.path())
    .scratch(ScratchLocation::Dir(scratch.clone()))
    .run(&start_url(&server))
    .await
    .unwrap();

    assert_eq!(report.pages(), 3);
    assert_eq!(report.output, out.path().join("manual_page1.pdf"));

    let merged = std::fs::read_to_string(&report.output).unwrap();
    let lines: Vec<&str> = merged.lines().collect();
    assert_eq!(lines, expected_urls(&server));
    assert_eq!(*renderer.calls.lock().unwrap(), expected_urls(&server));

    // Per-page files are gone after a successful merge
    assert!(!scratch.exists());
}

#[tokio::test]
async fn test_end_index_limits_pages() {
    let server = three_page_manual().await;
    let out = tempfile::tempdir().unwrap();

    let report = Pipeline::new(
        walker(),
        Box::new(StubRenderer::default()),
        Box::new(ConcatMerger { fail: false }),
    )
    .out_dir(out.path())
    .end_index(NonZeroUsize::new(2))
    .run(&start_url(&server))
    .await
    .unwrap();

    assert_eq!(report.pages(), 2);
    let merged = std::fs::read_to_string(&report.output).unwrap();
    assert_eq!(merged.lines().count(), 2);
}

#[tokio::test]
async fn test_existing_output_is_not_overwritten() {
    let server = three_page_manual().await;
    let out = tempfile::tempdir().unwrap();
    std::fs::write(out.path().join("manual_page1.pdf"), "older run").unwrap();

    let run = || {
        Pipeline::new(
            walker(),
            Box::new(StubRenderer::default()),
            Box::new(ConcatMerger { fail: false }),
        )
        .out_dir(out.path())
    };

    let first = run().run(&start_url(&server)).await.unwrap();
    assert_eq!(first.output, out.path().join("manual_page1(1).pdf"));

    let second = run().run(&start_url(&server)).await.unwrap();
    assert_eq!(second.output, out.path().join("manual_page1(2).pdf"));

    assert_eq!(
        std::fs::read_to_string(out.path().join("manual_page1.pdf")).unwrap(),
        "older run"
    );
}

#[tokio::test]
async fn test_output_name_is_chosen_after_rendering() {
    /// Takes the output name for itself while the manual is being rendered.
    struct ClaimingRenderer {
        claim: PathBuf,
    }

    #[async_trait]
    impl PageRenderer for ClaimingRenderer {
        async fn render(&self, url: &Url, dest: &Path) -> Result<()> {
            tokio::fs::write(&self.claim, "written meanwhile")
                .await
                .map_err(|e| Error::io(&self.claim, e))?;
            tokio::fs::write(dest, url.as_str())
                .await
                .map_err(|e| Error::io(dest, e))
        }
    }

    let server = three_page_manual().await;
    let out = tempfile::tempdir().unwrap();
    let claim = out.path().join("manual_page1.pdf");

    let report = Pipeline::new(
        walker(),
        Box::new(ClaimingRenderer { claim: claim.clone() }),
        Box::new(ConcatMerger { fail: false }),
    )
    .out_dir(out.path())
    .run(&start_url(&server))
    .await
    .unwrap();

    assert_eq!(report.output, out.path().join("manual_page1(1).pdf"));
    assert_eq!(std::fs::read_to_string(&claim).unwrap(), "written meanwhile");
}

#[tokio::test]
async fn test_fetch_failure_aborts_before_rendering() {
    let server = MockServer::start().await;
    mount(&server, "/manual/page1", page_with_next("page2")).await;
    Mock::given(method("GET"))
        .and(path("/manual/page2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let renderer = StubRenderer::default();

    let err = Pipeline::new(
        walker(),
        Box::new(renderer.clone()),
        Box::new(ConcatMerger { fail: false }),
    )
    .out_dir(out.path())
    .run(&start_url(&server))
    .await
    .unwrap_err();

    match err {
        Error::HttpStatus { url, status } => {
            assert_eq!(status, 500);
            assert!(url.ends_with("/manual/page2"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(renderer.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_render_failure_keeps_scratch_and_writes_nothing() {
    let server = three_page_manual().await;
    let out = tempfile::tempdir().unwrap();
    let scratch = out.path().join("scratch");
    let renderer = StubRenderer {
        fail_on: Some(format!("{}/manual/page2", server.uri())),
        ..Default::default()
    };

    let err = Pipeline::new(
        walker(),
        Box::new(renderer.clone()),
        Box::new(ConcatMerger { fail: false }),
    )
    .out_dir(out.path())
    .scratch(ScratchLocation::Dir(scratch.clone()))
    .run(&start_url(&server))
    .await
    .unwrap_err();

    assert_eq!(err.stage(), "render");
    // Fail fast: page3 is never attempted
    assert_eq!(renderer.calls.lock().unwrap().len(), 2);
    assert!(scratch.join("page_0001.pdf").exists());
    assert!(!out.path().join("manual_page1.pdf").exists());
}

#[tokio::test]
async fn test_renderer_without_output_is_a_render_error() {
    struct SilentRenderer;

    #[async_trait]
    impl PageRenderer for SilentRenderer {
        async fn render(&self, _url: &Url, _dest: &Path) -> Result<()> {
            Ok(())
        }
    }

    let server = three_page_manual().await;
    let out = tempfile::tempdir().unwrap();

    let err = Pipeline::new(
        walker(),
        Box::new(SilentRenderer),
        Box::new(ConcatMerger { fail: false }),
    )
    .out_dir(out.path())
    .run(&start_url(&server))
    .await
    .unwrap_err();

    match err {
        Error::Render { url, .. } => assert!(url.ends_with("/manual/page1")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_merge_failure_keeps_every_page() {
    let server = three_page_manual().await;
    let out = tempfile::tempdir().unwrap();
    let scratch = out.path().join("scratch");

    let err = Pipeline::new(
        walker(),
        Box::new(StubRenderer::default()),
        Box::new(ConcatMerger { fail: true }),
    )
    .out_dir(out.path())
    .scratch(ScratchLocation::Dir(scratch.clone()))
    .run(&start_url(&server))
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Merge { .. }));
    for page in ["page_0001.pdf", "page_0002.pdf", "page_0003.pdf"] {
        assert!(scratch.join(page).exists(), "{page} should be kept");
    }
}

#[tokio::test]
async fn test_keep_pages_preserves_rendered_files() {
    let server = three_page_manual().await;
    let out = tempfile::tempdir().unwrap();
    let scratch = out.path().join("scratch");

    Pipeline::new(
        walker(),
        Box::new(StubRenderer::default()),
        Box::new(ConcatMerger { fail: false }),
    )
    .out_dir(out.path())
    .scratch(ScratchLocation::Dir(scratch.clone()))
    .keep_pages(true)
    .run(&start_url(&server))
    .await
    .unwrap();

    let second = std::fs::read_to_string(scratch.join("page_0002.pdf")).unwrap();
    assert!(second.ends_with("/manual/page2"));
}

#[tokio::test]
async fn test_http_fetcher_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
    let url = Url::parse(&format!("{}/gone", server.uri())).unwrap();

    match fetcher.fetch(&url).await.unwrap_err() {
        Error::HttpStatus { status, .. } => assert_eq!(status, 404),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_http_fetcher_returns_body() {
    let server = MockServer::start().await;
    mount(&server, "/manual/page1", page_with_next("page2")).await;

    let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
    let page = fetcher.fetch(&start_url(&server)).await.unwrap();
    assert_eq!(page.url, start_url(&server));
    assert!(page.body.contains(r#"<span class="next"><a href="page2">"#));
}

#[tokio::test]
async fn test_redirected_start_page_resolves_links_from_its_target() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manual"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", format!("{}/manual/", server.uri())),
        )
        .mount(&server)
        .await;
    mount(&server, "/manual/", page_with_next("page2")).await;
    mount(&server, "/manual/page2", "<html><body>last page</body></html>".to_string()).await;

    let start = Url::parse(&format!("{}/manual", server.uri())).unwrap();

    let page = HttpFetcher::new(Duration::from_secs(5))
        .unwrap()
        .fetch(&start)
        .await
        .unwrap();
    assert_eq!(page.url.as_str(), format!("{}/manual/", server.uri()));

    let walk = walker().walk(&start, None).await.unwrap();
    let urls: Vec<String> = walk.urls().iter().map(Url::to_string).collect();
    assert_eq!(
        urls,
        vec![
            format!("{}/manual", server.uri()),
            format!("{}/manual/page2", server.uri()),
        ]
    );
}

#[tokio::test]
async fn test_unreachable_host_is_a_fetch_error() {
    // Nothing listens on the discard port
    let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
    let url = Url::parse("http://127.0.0.1:9/manual").unwrap();

    let err = fetcher.fetch(&url).await.unwrap_err();
    assert!(matches!(err, Error::Fetch { .. }));
    assert_eq!(err.stage(), "fetch");
}
