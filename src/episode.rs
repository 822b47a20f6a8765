use chrono::{DateTime, Utc};

use crate::date;

/// One episode as scraped from the archive page, before its date is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEpisode {
    pub title: String,
    /// Article URL, or the audio URL when no article link was found.
    pub link: String,
    /// Unparsed date text; empty when nothing was found.
    pub date_text: String,
    /// Natural key of an episode.
    pub audio_url: String,
    pub description: String,
}

/// An episode as it lives in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub audio_url: String,
    /// Always equal to `audio_url`; written with `isPermaLink="false"`.
    pub guid: String,
    pub published: DateTime<Utc>,
}

impl FeedItem {
    pub fn from_raw(raw: RawEpisode, fallback: DateTime<Utc>) -> Self {
        let published = date::resolve(&raw.date_text, fallback);
        Self {
            title: raw.title,
            link: raw.link,
            description: raw.description,
            guid: raw.audio_url.clone(),
            audio_url: raw.audio_url,
            published,
        }
    }

    pub fn pub_date(&self) -> String {
        date::to_rfc1123(&self.published)
    }
}
