//! Drives "load more" until enough episode containers are on the page.

use tracing::{debug, info, warn};

use crate::config::ExpandConfig;
use crate::extract::EpisodeExtractor;
use crate::page::{LoadMore, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The page holds at least the target number of containers.
    Reached,
    /// No clickable affordance, or clicking it failed.
    Exhausted,
    /// Too many clicks in a row added nothing.
    Stalled,
    /// Hard ceiling on clicks hit.
    ClickLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expansion {
    pub count: usize,
    pub clicks: usize,
    pub stop: StopReason,
}

pub struct Paginator<'e> {
    config: ExpandConfig,
    extractor: &'e EpisodeExtractor,
}

impl<'e> Paginator<'e> {
    pub fn new(config: ExpandConfig, extractor: &'e EpisodeExtractor) -> Self {
        Self { config, extractor }
    }

    fn count<P: Page>(&self, page: &P) -> usize {
        self.extractor.count_containers(&page.snapshot())
    }

    pub fn expand_until<P: Page>(&self, page: &mut P) -> Expansion {
        let mut count = self.count(page);
        let mut clicks = 0;
        let mut stalls = 0;

        let stop = loop {
            if count >= self.config.target {
                break StopReason::Reached;
            }
            if clicks >= self.config.max_clicks {
                break StopReason::ClickLimit;
            }
            match page.load_more() {
                LoadMore::Ready => {}
                state => {
                    debug!(?state, "load-more affordance not clickable");
                    break StopReason::Exhausted;
                }
            }
            if let Err(e) = page.click_load_more() {
                warn!(error = %e, clicks, "load-more click failed; treating archive as exhausted");
                break StopReason::Exhausted;
            }
            clicks += 1;
            page.settle(self.config.settle);

            let next = self.count(page);
            if next > count {
                stalls = 0;
            } else {
                stalls += 1;
            }
            debug!(clicks, count = next, stalls, "expanded archive");
            count = next;
            if stalls >= self.config.stall_limit {
                break StopReason::Stalled;
            }
        };

        info!(count, clicks, stop = ?stop, "archive expansion finished");
        Expansion { count, clicks, stop }
    }
}
