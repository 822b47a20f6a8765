//! The two run modes: full rebuild and incremental update.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::info;
use url::Url;

use crate::config::{ChannelConfig, ExpandConfig};
use crate::error::{Error, Result};
use crate::extract::EpisodeExtractor;
use crate::feed;
use crate::merge::{merge, MergeOutcome};
use crate::page::Page;
use crate::paginate::Paginator;

/// What a run works on.
pub struct Job<'a> {
    pub source: &'a Url,
    pub output: &'a Path,
    pub channel: &'a ChannelConfig,
    pub max_episodes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing new; the output file was not touched.
    Unchanged,
    Written {
        total: usize,
        added: usize,
        evicted: usize,
    },
}

/// Expand the archive up to the cap, extract everything, write a fresh feed.
pub fn full_build<P: Page>(
    page: &mut P,
    extractor: &EpisodeExtractor,
    job: &Job<'_>,
    expand: ExpandConfig,
    now: DateTime<Utc>,
) -> Result<RunOutcome> {
    page.goto(job.source)?;

    let expand = ExpandConfig {
        target: job.max_episodes,
        ..expand
    };
    Paginator::new(expand, extractor).expand_until(page);

    let base = page.url().unwrap_or(job.source).clone();
    let episodes = extractor.extract(&page.snapshot(), &base, None);

    match merge(&[], episodes, job.max_episodes, now) {
        MergeOutcome::Unchanged => Err(Error::NoEpisodes {
            url: job.source.to_string(),
        }),
        MergeOutcome::Updated {
            items,
            added,
            evicted,
        } => {
            feed::save(job.output, job.channel, &items, now)?;
            Ok(RunOutcome::Written {
                total: items.len(),
                added,
                evicted,
            })
        }
    }
}

/// Check the newest `check` episodes against the stored feed and merge in
/// whatever is new.
pub fn incremental_update<P: Page>(
    page: &mut P,
    extractor: &EpisodeExtractor,
    job: &Job<'_>,
    check: usize,
    now: DateTime<Utc>,
) -> Result<RunOutcome> {
    let existing = feed::load(job.output, now)?;

    page.goto(job.source)?;
    let base = page.url().unwrap_or(job.source).clone();
    let episodes = extractor.extract(&page.snapshot(), &base, Some(check));

    match merge(&existing, episodes, job.max_episodes, now) {
        MergeOutcome::Unchanged => {
            info!(checked = check, "no new episodes; feed left untouched");
            Ok(RunOutcome::Unchanged)
        }
        MergeOutcome::Updated {
            items,
            added,
            evicted,
        } => {
            feed::save(job.output, job.channel, &items, now)?;
            Ok(RunOutcome::Written {
                total: items.len(),
                added,
                evicted,
            })
        }
    }
}
