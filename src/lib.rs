//! npr2rss - keep a podcast RSS feed in step with an NPR episode archive page.

pub mod config;
pub mod containers;
pub mod date;
pub mod episode;
pub mod error;
pub mod extract;
pub mod feed;
pub mod merge;
pub mod page;
pub mod paginate;
pub mod pipeline;
pub mod text;

pub use config::{ChannelConfig, ContainerRule, ExpandConfig, ExtractorConfig, PageConfig};
pub use episode::{FeedItem, RawEpisode};
pub use error::{Error, Result};
pub use extract::EpisodeExtractor;
pub use merge::{merge, MergeOutcome};
pub use page::{HttpPage, LoadMore, Page};
pub use paginate::{Expansion, Paginator, StopReason};
pub use pipeline::{full_build, incremental_update, Job, RunOutcome};
