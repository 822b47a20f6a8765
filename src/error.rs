use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid URL \"{url}\": {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid selector \"{selector}\": {reason}")]
    Selector { selector: String, reason: String },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to render feed: {0}")]
    Render(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no existing feed at {path}; run a full build first")]
    FeedNotFound { path: PathBuf },

    #[error("no episodes found on {url}")]
    NoEpisodes { url: String },

    #[error("load-more affordance unusable: {0}")]
    LoadMore(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn selector(selector: &str, reason: impl std::fmt::Display) -> Self {
        Error::Selector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }
}
