use std::collections::HashSet;
use std::num::NonZeroUsize;

use colored::*;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::fetcher::PageSource;
use crate::next_link::NextLinkExtractor;

/// Ordered pages of a manual, in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkResult {
    urls: Vec<Url>,
}

impl WalkResult {
    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn into_urls(self) -> Vec<Url> {
        self.urls
    }
}

/// Follows "next" links from a start page until the chain ends.
pub struct LinkWalker {
    source: Box<dyn PageSource>,
    extractor: Box<dyn NextLinkExtractor>,
}

impl LinkWalker {
    pub fn new(source: Box<dyn PageSource>, extractor: Box<dyn NextLinkExtractor>) -> Self {
        Self { source, extractor }
    }

    /// Walks the chain starting at `start`. Any fetch failure aborts the walk,
    /// since a silently skipped page would corrupt the manual's order.
    ///
    /// The sequence holds the URLs as they were linked. Next links are resolved
    /// against the URL each page was actually served from.
    pub async fn walk(&self, start: &Url, max_count: Option<NonZeroUsize>) -> Result<WalkResult> {
        let mut urls = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(start.clone());

        while let Some(url) = current.take() {
            let page = self.source.fetch(&url).await?;

            info!("[{}] {}", urls.len() + 1, url.as_str().green());
            seen.insert(page_key(&url));
            seen.insert(page_key(&page.url));
            urls.push(url);

            if max_count.is_some_and(|max| urls.len() >= max.get()) {
                debug!("Reached end index {}, stopping", urls.len());
                break;
            }

            let Some(href) = self.extractor.next_link(&page.body) else {
                debug!("No next link found, manual ends here");
                break;
            };

            let next = resolve_next(&page.url, &href)?;

            if seen.contains(&page_key(&next)) {
                warn!("Next link {} loops back to an earlier page, stopping", next);
                break;
            }

            current = Some(next);
        }

        Ok(WalkResult { urls })
    }
}

/// Identity of a page for cycle detection: the fragment only moves within a page.
fn page_key(url: &Url) -> Url {
    let mut key = url.clone();
    key.set_fragment(None);
    key
}

/// Resolves a next link the way a browser would, relative to the page it was found on.
pub fn resolve_next(base: &Url, href: &str) -> Result<Url> {
    base.join(href).map_err(|source| Error::InvalidLink {
        base: base.to_string(),
        href: href.to_string(),
        source,
    })
}
