//! The page the scraper drives: navigate, snapshot, click "load more", wait.

use std::thread::sleep;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::config::PageConfig;
use crate::error::{Error, Result};
use crate::text::resolve_href;

/// State of the "load more" affordance on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMore {
    Missing,
    /// Present in the markup but not something a user could click.
    Hidden,
    Ready,
}

pub trait Page {
    fn goto(&mut self, url: &Url) -> Result<()>;

    fn url(&self) -> Option<&Url>;

    /// Markup of everything currently loaded.
    fn html(&self) -> String;

    fn snapshot(&self) -> Html {
        Html::parse_document(&self.html())
    }

    fn load_more(&self) -> LoadMore;

    fn click_load_more(&mut self) -> Result<()>;

    fn settle(&mut self, interval: Duration);
}

/// A [`Page`] backed by plain HTTP. Each "load more" click fetches the
/// affordance's target and appends it to the document.
pub struct HttpPage {
    client: Client,
    config: PageConfig,
    selectors: Vec<Selector>,
    url: Option<Url>,
    chunks: Vec<String>,
}

impl HttpPage {
    pub fn new(config: PageConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.nav_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        let selectors = config
            .load_more_selectors
            .iter()
            .map(|s| Selector::parse(s).map_err(|e| Error::selector(s, e)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            client,
            config,
            selectors,
            url: None,
            chunks: Vec::new(),
        })
    }

    fn fetch(&self, url: &Url, timeout: Duration) -> Result<String> {
        let resp = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .header(USER_AGENT, pick_user_agent())
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(CONNECTION, "keep-alive")
            .send()?;

        if !resp.status().is_success() {
            return Err(Error::UnexpectedStatus {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.text()?)
    }

    /// Target URL of the affordance in the newest chunk.
    fn load_more_target(&self) -> Result<Url> {
        let base = self
            .url
            .as_ref()
            .ok_or_else(|| Error::LoadMore("no page loaded".to_string()))?;
        let last = self
            .chunks
            .last()
            .ok_or_else(|| Error::LoadMore("no page loaded".to_string()))?;
        affordance_target(&Html::parse_document(last), &self.selectors, base)
    }
}

/// Resolved target of the first interactable affordance. `data-href` wins
/// over `data-url`, which wins over `href`; unusable values fall through.
fn affordance_target(doc: &Html, selectors: &[Selector], base: &Url) -> Result<Url> {
    let el = find_affordance(doc, selectors)
        .ok_or_else(|| Error::LoadMore("affordance not found".to_string()))?;
    if !is_interactable(el) {
        return Err(Error::LoadMore("affordance is hidden".to_string()));
    }
    let target = ["data-href", "data-url", "href"]
        .iter()
        .filter_map(|attr| el.value().attr(attr))
        .find_map(|h| resolve_href(base, h))
        .ok_or_else(|| Error::LoadMore("affordance has no target".to_string()))?;
    Url::parse(&target).map_err(|source| Error::InvalidUrl {
        url: target.clone(),
        source,
    })
}

impl Page for HttpPage {
    fn goto(&mut self, url: &Url) -> Result<()> {
        info!(%url, "navigating");
        let body = self.fetch(url, self.config.nav_timeout)?;
        self.url = Some(url.clone());
        self.chunks = vec![body];
        Ok(())
    }

    fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    fn html(&self) -> String {
        self.chunks.concat()
    }

    fn load_more(&self) -> LoadMore {
        let Some(last) = self.chunks.last() else {
            return LoadMore::Missing;
        };
        let doc = Html::parse_document(last);
        match find_affordance(&doc, &self.selectors) {
            None => LoadMore::Missing,
            Some(el) if !is_interactable(el) => LoadMore::Hidden,
            Some(_) => LoadMore::Ready,
        }
    }

    fn click_load_more(&mut self) -> Result<()> {
        let target = self.load_more_target()?;
        debug!(%target, "following load-more target");
        let body = self.fetch(&target, self.config.wait_timeout)?;
        self.chunks.push(body);
        Ok(())
    }

    fn settle(&mut self, interval: Duration) {
        sleep(interval + jitter());
    }
}

fn find_affordance<'a>(doc: &'a Html, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|sel| doc.select(sel).next())
}

/// Hidden, disabled or styled out of view counts as not clickable.
pub fn is_interactable(el: ElementRef<'_>) -> bool {
    let v = el.value();
    if v.attr("hidden").is_some() || v.attr("disabled").is_some() {
        return false;
    }
    if v.attr("aria-hidden") == Some("true") {
        return false;
    }
    if let Some(style) = v.attr("style") {
        let compact: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if compact.contains("display:none") || compact.contains("visibility:hidden") {
            return false;
        }
    }
    !v.classes().any(|c| c == "hidden" || c == "is-hidden")
}

// Pick a random common browser user-agent string
fn pick_user_agent() -> String {
    let agents = [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Safari/605.1.15",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    ];
    let mut rng = thread_rng();
    agents.choose(&mut rng).unwrap_or(&agents[0]).to_string()
}

// 200-600ms on top of the settle interval
fn jitter() -> Duration {
    Duration::from_millis(thread_rng().gen_range(200..=600))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        doc.select(&Selector::parse(css).unwrap()).next().unwrap()
    }

    fn default_selectors() -> Vec<Selector> {
        PageConfig::default()
            .load_more_selectors
            .iter()
            .map(|s| Selector::parse(s).unwrap())
            .collect()
    }

    fn target_of(markup: &str) -> Result<Url> {
        let base = Url::parse("https://www.npr.org/podcasts/510298/ted-radio-hour/archive").unwrap();
        affordance_target(&Html::parse_document(markup), &default_selectors(), &base)
    }

    #[test]
    fn visible_affordance_is_interactable() {
        let doc = Html::parse_document(r#"<div class="scrolllink"><a href="/next?start=25">Load more</a></div>"#);
        assert!(is_interactable(first(&doc, "a")));
    }

    #[test]
    fn hidden_affordances_are_not_interactable() {
        for markup in [
            r#"<a hidden href="/n">Load more</a>"#,
            r#"<a aria-hidden="true" href="/n">Load more</a>"#,
            r#"<a style="display: none" href="/n">Load more</a>"#,
            r#"<a style="visibility:hidden;" href="/n">Load more</a>"#,
            r#"<a class="btn hidden" href="/n">Load more</a>"#,
            r#"<button disabled>Load more</button>"#,
        ] {
            let doc = Html::parse_document(markup);
            let el = first(&doc, "a, button");
            assert!(!is_interactable(el), "expected hidden: {markup}");
        }
    }

    #[test]
    fn affordance_lookup_follows_selector_order() {
        let doc = Html::parse_document(
            r#"<button class="options__load-more" data-href="/b">More</button><div class="scrolllink"><a href="/a">More</a></div>"#,
        );
        let el = find_affordance(&doc, &default_selectors()).unwrap();
        assert_eq!(el.value().attr("href"), Some("/a"));
    }

    #[test]
    fn unloaded_page_has_no_affordance() {
        let page = HttpPage::new(PageConfig::default()).unwrap();
        assert_eq!(page.load_more(), LoadMore::Missing);
        assert!(page.url().is_none());
    }

    #[test]
    fn target_attributes_checked_in_order() {
        let url = target_of(
            r#"<button class="options__load-more" data-href="/a" data-url="/b" href="/c">More</button>"#,
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://www.npr.org/a");

        let url = target_of(r#"<div class="scrolllink"><a data-url="/b" href="/c">More</a></div>"#).unwrap();
        assert_eq!(url.as_str(), "https://www.npr.org/b");

        let url = target_of(r#"<div class="scrolllink"><a href="/c?start=25">More</a></div>"#).unwrap();
        assert_eq!(url.as_str(), "https://www.npr.org/c?start=25");
    }

    #[test]
    fn unusable_attribute_falls_through_to_next() {
        let url = target_of(r##"<div class="scrolllink"><a data-href="#" href="/c">More</a></div>"##).unwrap();
        assert_eq!(url.as_str(), "https://www.npr.org/c");
    }

    #[test]
    fn hidden_affordance_has_no_target() {
        let err = target_of(r#"<div class="scrolllink"><a hidden href="/c">More</a></div>"#).unwrap_err();
        assert!(matches!(err, Error::LoadMore(ref m) if m.contains("hidden")), "{err}");
    }

    #[test]
    fn fragment_only_affordance_has_no_target() {
        let err = target_of(r##"<div class="scrolllink"><a href="#">More</a></div>"##).unwrap_err();
        assert!(matches!(err, Error::LoadMore(ref m) if m.contains("no target")), "{err}");
    }

    #[test]
    fn missing_affordance_has_no_target() {
        let err = target_of("<p>End of archive</p>").unwrap_err();
        assert!(matches!(err, Error::LoadMore(ref m) if m.contains("not found")), "{err}");
    }
}
