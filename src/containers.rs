//! Strategies for locating episode containers in an archive snapshot.
//!
//! The archive markup has changed over time, so the extractor holds an ordered
//! list of strategies and uses the first one that finds anything.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::config::{ContainerRule, ExtractorConfig};
use crate::error::{Error, Result};

pub(crate) static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static RE_ARTICLE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d{4}/").unwrap());

/// URL-shape rules shared by container discovery and field extraction.
#[derive(Debug, Clone)]
pub struct LinkRules {
    download_needles: Vec<String>,
    embed_needles: Vec<String>,
}

impl LinkRules {
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            download_needles: lowercase_all(&config.download_needles),
            embed_needles: lowercase_all(&config.embed_needles),
        }
    }

    pub fn is_download(&self, href: &str) -> bool {
        let h = href.to_lowercase();
        self.download_needles.iter().any(|n| h.contains(n.as_str()))
    }

    pub fn is_embed(&self, href: &str) -> bool {
        let h = href.to_lowercase();
        self.embed_needles.iter().any(|n| h.contains(n.as_str()))
    }

    /// An anchor that can carry the episode title: not the download, not an
    /// embed, and shaped like a dated article path.
    pub fn is_title_candidate(&self, href: &str, download_href: Option<&str>) -> bool {
        download_href != Some(href)
            && !self.is_download(href)
            && !self.is_embed(href)
            && RE_ARTICLE_YEAR.is_match(href)
    }
}

fn lowercase_all(v: &[String]) -> Vec<String> {
    v.iter().map(|s| s.to_lowercase()).collect()
}

pub(crate) fn href<'a>(a: &ElementRef<'a>) -> Option<&'a str> {
    a.value().attr("href")
}

pub trait ContainerStrategy {
    fn name(&self) -> &'static str;

    fn find_containers<'a>(&self, doc: &'a Html, rules: &LinkRules) -> Vec<ElementRef<'a>>;
}

/// Direct structural match: every element matching the selector that holds a
/// download link.
pub struct StructuralMatch {
    selector: Selector,
}

impl StructuralMatch {
    pub fn new(selector: &str) -> Result<Self> {
        let selector = Selector::parse(selector).map_err(|e| Error::selector(selector, e))?;
        Ok(Self { selector })
    }
}

impl ContainerStrategy for StructuralMatch {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn find_containers<'a>(&self, doc: &'a Html, rules: &LinkRules) -> Vec<ElementRef<'a>> {
        doc.select(&self.selector)
            .filter(|el| {
                el.select(&ANCHOR)
                    .filter_map(|a| href(&a))
                    .any(|h| rules.is_download(h))
            })
            .collect()
    }
}

/// Fallback: climb from each download link to the nearest ancestor that also
/// holds a title link, without swallowing a neighbouring episode.
pub struct DownloadAncestor {
    max_depth: usize,
}

impl DownloadAncestor {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    fn container_for<'a>(&self, link: ElementRef<'a>, rules: &LinkRules) -> Option<ElementRef<'a>> {
        let own = href(&link);
        let mut chosen = None;
        for anc in link
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take(self.max_depth)
        {
            if matches!(anc.value().name(), "body" | "html") {
                break;
            }
            let downloads: HashSet<&str> = anc
                .select(&ANCHOR)
                .filter_map(|a| href(&a))
                .filter(|h| rules.is_download(h))
                .collect();
            if downloads.len() > 1 {
                break;
            }
            chosen = Some(anc);
            let has_title = anc
                .select(&ANCHOR)
                .filter_map(|a| href(&a))
                .any(|h| rules.is_title_candidate(h, own));
            if has_title {
                break;
            }
        }
        chosen
    }
}

impl ContainerStrategy for DownloadAncestor {
    fn name(&self) -> &'static str {
        "download-ancestor"
    }

    fn find_containers<'a>(&self, doc: &'a Html, rules: &LinkRules) -> Vec<ElementRef<'a>> {
        let mut seen = HashSet::new();
        doc.select(&ANCHOR)
            .filter(|a| href(a).is_some_and(|h| rules.is_download(h)))
            .filter_map(|a| self.container_for(a, rules))
            .filter(|c| seen.insert(c.id()))
            .collect()
    }
}

pub fn build_strategies(rules: &[ContainerRule]) -> Result<Vec<Box<dyn ContainerStrategy>>> {
    rules
        .iter()
        .map(|rule| -> Result<Box<dyn ContainerStrategy>> {
            let strategy: Box<dyn ContainerStrategy> = match rule {
                ContainerRule::Selector(s) => Box::new(StructuralMatch::new(s)?),
                ContainerRule::DownloadAncestor { max_depth } => {
                    Box::new(DownloadAncestor::new(*max_depth))
                }
            };
            Ok(strategy)
        })
        .collect()
}
