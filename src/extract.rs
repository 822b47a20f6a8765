//! Episode extraction from an archive snapshot.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::config::ExtractorConfig;
use crate::containers::{build_strategies, href, ContainerStrategy, LinkRules, ANCHOR};
use crate::date::datestamp_date;
use crate::episode::RawEpisode;
use crate::error::Result;
use crate::text::{canonicalize_link, clean_text, joined_text, resolve_href};

static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());
static BLOCKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p, div, li, section, blockquote").unwrap());

static RE_FULL_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},\s*\d{4}\b").unwrap()
});
static RE_ABBR_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sept?|Oct|Nov|Dec)\.?\s+\d{1,2},\s*\d{4}\b")
        .unwrap()
});
static RE_ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap());
static RE_SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b").unwrap());

const BULLET: char = '•';
const MIN_DESCRIPTION_LEN: usize = 40;
const BLOCK_NAMES: &[&str] = &["p", "div", "li", "section", "blockquote", "article"];

pub struct EpisodeExtractor {
    strategies: Vec<Box<dyn ContainerStrategy>>,
    rules: LinkRules,
    boilerplate: Vec<String>,
    untitled: String,
}

impl EpisodeExtractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        Ok(Self {
            strategies: build_strategies(&config.containers)?,
            rules: LinkRules::from_config(config),
            boilerplate: config.boilerplate.clone(),
            untitled: config.untitled.clone(),
        })
    }

    /// Containers found by the first strategy that finds any.
    pub fn containers<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        for strategy in &self.strategies {
            let found = strategy.find_containers(doc, &self.rules);
            if !found.is_empty() {
                debug!(strategy = strategy.name(), count = found.len(), "located episode containers");
                return found;
            }
        }
        Vec::new()
    }

    pub fn count_containers(&self, doc: &Html) -> usize {
        self.containers(doc).len()
    }

    /// Episodes in document order, unique by audio URL (first occurrence
    /// wins), at most `max_count` of them when given.
    pub fn extract(&self, doc: &Html, base: &Url, max_count: Option<usize>) -> Vec<RawEpisode> {
        let mut seen = HashSet::new();
        let mut episodes = Vec::new();

        for container in self.containers(doc) {
            if max_count.is_some_and(|max| episodes.len() >= max) {
                break;
            }
            let Some(episode) = self.episode_from(container, base) else {
                continue;
            };
            if !seen.insert(episode.audio_url.clone()) {
                debug!(audio_url = %episode.audio_url, "skipping duplicate episode");
                continue;
            }
            episodes.push(episode);
        }

        info!(count = episodes.len(), "extracted episodes");
        episodes
    }

    fn episode_from(&self, container: ElementRef<'_>, base: &Url) -> Option<RawEpisode> {
        let download = container
            .select(&ANCHOR)
            .find(|a| href(a).is_some_and(|h| self.rules.is_download(h)))?;
        let audio_url = resolve_href(base, href(&download)?)?;

        let title_anchor = self.title_anchor(container, download);
        let title = title_anchor
            .map(|a| joined_text(a.text()))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| {
                debug!(audio_url = %audio_url, "episode has no title link");
                self.untitled.clone()
            });
        let link = title_anchor
            .and_then(|a| href(&a))
            .and_then(|h| resolve_href(base, h))
            .map(|l| canonicalize_link(&l))
            .unwrap_or_else(|| audio_url.clone());

        let date_text = self.date_text(container, &audio_url, &link);
        if date_text.is_empty() {
            debug!(audio_url = %audio_url, "episode has no date text");
        }
        let description = self.description(container, &title);

        Some(RawEpisode {
            title,
            link,
            date_text,
            audio_url,
            description,
        })
    }

    /// Search outward from the download link for a title anchor. Candidates
    /// are gathered nearest-first across the whole container; an anchor under
    /// a heading wins, then any anchor with text, then the nearest one.
    fn title_anchor<'a>(
        &self,
        container: ElementRef<'a>,
        download: ElementRef<'a>,
    ) -> Option<ElementRef<'a>> {
        let download_href = href(&download);
        let mut seen = HashSet::new();
        let mut candidates: Vec<ElementRef<'a>> = Vec::new();
        for scope in download.ancestors().filter_map(ElementRef::wrap) {
            candidates.extend(
                scope
                    .select(&ANCHOR)
                    .filter(|a| {
                        href(a).is_some_and(|h| self.rules.is_title_candidate(h, download_href))
                    })
                    .filter(|a| seen.insert(a.id())),
            );
            if scope.id() == container.id() {
                break;
            }
        }

        candidates
            .iter()
            .copied()
            .find(|a| has_heading_parent(a) && has_text(a))
            .or_else(|| candidates.iter().copied().find(has_text))
            .or_else(|| candidates.first().copied())
    }

    fn date_text(&self, container: ElementRef<'_>, audio_url: &str, link: &str) -> String {
        if let Some(date) = [audio_url, link].into_iter().find_map(datestamp_date) {
            return date.format("%Y-%m-%d").to_string();
        }

        let attr = container
            .select(&TIME)
            .filter_map(|t| t.value().attr("datetime"))
            .map(str::trim)
            .find(|d| !d.is_empty());
        if let Some(datetime) = attr {
            return datetime.to_string();
        }

        let text = joined_text(container.text());
        [&RE_FULL_MONTH, &RE_ABBR_MONTH, &RE_ISO_DATE, &RE_SLASH_DATE]
            .into_iter()
            .find_map(|re| re.find(&text))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    fn description(&self, container: ElementRef<'_>, title: &str) -> String {
        if let Some(after) = text_after_bullet(container).filter(|d| !d.is_empty()) {
            return after;
        }

        container
            .select(&BLOCKS)
            .map(|el| joined_text(el.text()))
            .find(|text| {
                text.chars().count() > MIN_DESCRIPTION_LEN
                    && !(title != self.untitled && text.contains(title))
                    && !self.boilerplate.iter().any(|b| text.contains(b.as_str()))
            })
            .unwrap_or_default()
    }
}

fn has_text(a: &ElementRef<'_>) -> bool {
    a.text().any(|t| !t.trim().is_empty())
}

fn has_heading_parent(a: &ElementRef<'_>) -> bool {
    a.parent()
        .and_then(ElementRef::wrap)
        .is_some_and(|p| matches!(p.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6"))
}

/// Text after the first bullet separator, taken from the block that holds it.
fn text_after_bullet(container: ElementRef<'_>) -> Option<String> {
    let node = container
        .descendants()
        .find(|n| n.value().as_text().is_some_and(|t| t.contains(BULLET)))?;
    let block = node
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| BLOCK_NAMES.contains(&el.value().name()) || el.id() == container.id())?;
    let text = joined_text(block.text());
    let (_, after) = text.split_once(BULLET)?;
    Some(clean_text(after))
}
