//! Combines freshly scraped episodes with the items already in the feed.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::episode::{FeedItem, RawEpisode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Nothing new was scraped; the feed must not be rewritten.
    Unchanged,
    Updated {
        items: Vec<FeedItem>,
        /// New episodes that made it into `items`.
        added: usize,
        /// Previously stored items pushed out by the cap.
        evicted: usize,
    },
}

/// Merge `new_raw` into `existing`, newest first, capped at `cap` items.
///
/// Episodes whose audio URL is already present are ignored. Dates that cannot
/// be resolved fall back to `now`. The sort is stable, so equal timestamps
/// keep new-before-existing order.
pub fn merge(
    existing: &[FeedItem],
    new_raw: Vec<RawEpisode>,
    cap: usize,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let known: HashSet<&str> = existing.iter().map(|i| i.audio_url.as_str()).collect();
    let mut fresh_urls: HashSet<String> = HashSet::new();

    let mut items = Vec::new();
    for raw in new_raw {
        if known.contains(raw.audio_url.as_str()) || fresh_urls.contains(&raw.audio_url) {
            continue;
        }
        fresh_urls.insert(raw.audio_url.clone());
        let item = FeedItem::from_raw(raw, now);
        debug!(audio_url = %item.audio_url, pub_date = %item.pub_date(), "new episode");
        items.push(item);
    }
    if items.is_empty() {
        return MergeOutcome::Unchanged;
    }

    items.extend(existing.iter().cloned());
    items.sort_by(|a, b| b.published.cmp(&a.published));
    items.truncate(cap);

    let added = items
        .iter()
        .filter(|i| fresh_urls.contains(&i.audio_url))
        .count();
    let evicted = existing.len() - (items.len() - added);

    MergeOutcome::Updated {
        items,
        added,
        evicted,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 1, 12, 0, 0).unwrap()
    }

    fn raw(n: u32, date: &str) -> RawEpisode {
        RawEpisode {
            title: format!("Episode {n}"),
            link: format!("https://www.npr.org/2025/01/01/{n}/episode"),
            date_text: date.to_string(),
            audio_url: format!("https://ondemand.npr.org/anon.npr-mp3/npr/ted/{n}.mp3"),
            description: String::new(),
        }
    }

    fn item(n: u32, days_ago: i64) -> FeedItem {
        let mut it = FeedItem::from_raw(raw(n, ""), now() - Duration::days(days_ago));
        it.title = format!("Stored {n}");
        it
    }

    fn updated(outcome: MergeOutcome) -> (Vec<FeedItem>, usize, usize) {
        match outcome {
            MergeOutcome::Updated {
                items,
                added,
                evicted,
            } => (items, added, evicted),
            MergeOutcome::Unchanged => panic!("expected an update"),
        }
    }

    fn assert_sorted(items: &[FeedItem]) {
        assert!(items.windows(2).all(|w| w[0].published >= w[1].published));
    }

    #[test]
    fn already_known_audio_is_no_change() {
        let existing = vec![item(1, 1), item(2, 2)];
        let outcome = merge(&existing, vec![raw(1, "2025-10-31")], 100, now());
        assert_eq!(outcome, MergeOutcome::Unchanged);
    }

    #[test]
    fn empty_new_set_is_no_change() {
        assert_eq!(merge(&[item(1, 1)], Vec::new(), 100, now()), MergeOutcome::Unchanged);
    }

    #[test]
    fn merge_sorts_descending_and_caps() {
        let existing: Vec<FeedItem> = (0..5).map(|n| item(n, i64::from(n) + 10)).collect();
        let new = vec![raw(100, "2025-10-30"), raw(101, "2025-01-01")];
        let (items, added, evicted) = updated(merge(&existing, new, 5, now()));

        assert_eq!(items.len(), 5);
        assert_sorted(&items);
        assert_eq!(items[0].audio_url, raw(100, "").audio_url);
        assert_eq!(added, 1);
        assert_eq!(evicted, 1);
        assert!(!items.iter().any(|i| i.audio_url == raw(101, "").audio_url));
    }

    #[test]
    fn duplicate_new_episodes_are_merged_once() {
        let new = vec![raw(7, "2025-10-01"), raw(7, "2025-10-02")];
        let (items, added, _) = updated(merge(&[], new, 100, now()));
        assert_eq!(items.len(), 1);
        assert_eq!(added, 1);
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let new = vec![raw(1, "2025-10-01"), raw(2, "2025-10-02")];
        let (first, _, _) = updated(merge(&[], new.clone(), 100, now()));
        assert_eq!(merge(&first, new, 100, now()), MergeOutcome::Unchanged);
    }

    #[test]
    fn unresolvable_dates_use_now() {
        let (items, _, _) = updated(merge(&[item(1, 3)], vec![raw(9, "soon")], 100, now()));
        assert_eq!(items[0].published, now());
        assert_eq!(items[0].guid, items[0].audio_url);
    }

    #[test]
    fn equal_dates_keep_input_order() {
        let new = vec![raw(1, "2025-10-01"), raw(2, "2025-10-01"), raw(3, "2025-10-01")];
        let (items, _, _) = updated(merge(&[], new, 100, now()));
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, ["Episode 1", "Episode 2", "Episode 3"]);
    }
}
