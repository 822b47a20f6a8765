//! Plain configuration data: channel metadata, extraction rules, page behavior.

use std::time::Duration;

pub const DEFAULT_SOURCE_URL: &str = "https://www.npr.org/podcasts/510298/ted-radio-hour/archive";
pub const DEFAULT_MAX_EPISODES: usize = 100;
pub const DEFAULT_CHECK_COUNT: usize = 20;
pub const DEFAULT_MAX_CLICKS: usize = 50;
pub const DEFAULT_STALL_LIMIT: usize = 3;
pub const DEFAULT_SETTLE_MS: u64 = 2500;
pub const DEFAULT_NAV_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 60_000;
pub const UNTITLED_EPISODE: &str = "Untitled episode";

/// Channel-level metadata written at the top of every feed.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    pub image_url: Option<String>,
    /// Public URL the feed itself is served from (`atom:link rel="self"`).
    pub self_link: String,
}

impl ChannelConfig {
    pub fn for_source(source_url: &str, self_link: &str) -> Self {
        Self {
            title: "TED Radio Hour".to_string(),
            link: source_url.to_string(),
            description: "Episodes scraped from the NPR program archive.".to_string(),
            language: "en-us".to_string(),
            image_url: None,
            self_link: self_link.to_string(),
        }
    }
}

/// How an episode container is located in the archive markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerRule {
    /// A CSS selector matching one container per episode.
    Selector(String),
    /// Walk up from each download link to the nearest ancestor holding one
    /// episode, at most `max_depth` levels.
    DownloadAncestor { max_depth: usize },
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Tried in order; the first rule that finds any container is used.
    pub containers: Vec<ContainerRule>,
    /// Substrings of an `href` that mark the direct audio download.
    pub download_needles: Vec<String>,
    /// Substrings of an `href` that mark a media embed (never a title link).
    pub embed_needles: Vec<String>,
    /// Text fragments that disqualify a block as a description.
    pub boilerplate: Vec<String>,
    pub untitled: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            containers: vec![
                ContainerRule::Selector("article.item, article.podcast-episode".to_string()),
                ContainerRule::DownloadAncestor { max_depth: 8 },
            ],
            download_needles: vec![
                "ondemand.npr.org".to_string(),
                "/anon.npr-mp3/".to_string(),
                "play.podtrac.com".to_string(),
                ".mp3".to_string(),
            ],
            embed_needles: vec!["/embed".to_string(), "player/embed".to_string()],
            boilerplate: vec![
                "Listen ·".to_string(),
                "Download".to_string(),
                "Embed".to_string(),
            ],
            untitled: UNTITLED_EPISODE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageConfig {
    /// Selectors for the "load more" affordance, checked in order.
    pub load_more_selectors: Vec<String>,
    pub nav_timeout: Duration,
    pub wait_timeout: Duration,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            load_more_selectors: vec![
                "div.scrolllink a".to_string(),
                "button.options__load-more".to_string(),
                "[data-load-more]".to_string(),
            ],
            nav_timeout: Duration::from_millis(DEFAULT_NAV_TIMEOUT_MS),
            wait_timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
        }
    }
}

/// Bounds for the "load more" expansion loop.
#[derive(Debug, Clone)]
pub struct ExpandConfig {
    pub target: usize,
    pub max_clicks: usize,
    pub stall_limit: usize,
    pub settle: Duration,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_MAX_EPISODES,
            max_clicks: DEFAULT_MAX_CLICKS,
            stall_limit: DEFAULT_STALL_LIMIT,
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
        }
    }
}
