//! Locating the "next page" anchor in a fetched page.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::error::{Error, Result};

/// Pattern matching the navigation anchor of Antora-style manuals.
pub const DEFAULT_NEXT_PATTERN: &str = r#"<span class="next"><a href="(.*?)""#;

/// Selector equivalent of [`DEFAULT_NEXT_PATTERN`].
pub const DEFAULT_NEXT_SELECTOR: &str = "span.next > a[href]";

static DEFAULT_NEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(DEFAULT_NEXT_PATTERN)
        .unwrap_or_else(|e| panic!("invalid static regex '{DEFAULT_NEXT_PATTERN}': {e}"))
});

/// Finds the href of the next page, if the page has one.
pub trait NextLinkExtractor: Send + Sync {
    fn next_link(&self, html: &str) -> Option<String>;
}

/// Regex based extraction. The first capture group is the href.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    regex: Regex,
}

impl PatternExtractor {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid next-link pattern: {e}")))?;

        // captures_len counts the implicit whole-match group
        if regex.captures_len() < 2 {
            return Err(Error::Config(format!(
                "next-link pattern '{pattern}' has no capture group for the href"
            )));
        }

        Ok(Self { regex })
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self {
            regex: DEFAULT_NEXT_RE.clone(),
        }
    }
}

impl NextLinkExtractor for PatternExtractor {
    fn next_link(&self, html: &str) -> Option<String> {
        let href = self.regex.captures(html)?.get(1)?.as_str().trim();
        if href.is_empty() {
            return None;
        }
        Some(href.replace("&amp;", "&"))
    }
}

/// CSS selector based extraction through a real HTML parse.
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    selector: Selector,
}

impl SelectorExtractor {
    pub fn new(selector: &str) -> Result<Self> {
        let selector = Selector::parse(selector)
            .map_err(|e| Error::Config(format!("invalid next-link selector '{selector}': {e}")))?;
        Ok(Self { selector })
    }
}

impl NextLinkExtractor for SelectorExtractor {
    fn next_link(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let href = document
            .select(&self.selector)
            .filter_map(|element| element.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty())?;
        debug!("Selector matched next link {}", href);
        Some(href.to_string())
    }
}
