use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

use npr2rss::config::{
    DEFAULT_CHECK_COUNT, DEFAULT_MAX_CLICKS, DEFAULT_MAX_EPISODES, DEFAULT_NAV_TIMEOUT_MS,
    DEFAULT_SETTLE_MS, DEFAULT_SOURCE_URL, DEFAULT_STALL_LIMIT, DEFAULT_WAIT_TIMEOUT_MS,
};
use npr2rss::{
    full_build, incremental_update, ChannelConfig, EpisodeExtractor, Error, ExpandConfig,
    ExtractorConfig, HttpPage, Job, PageConfig, RunOutcome,
};

/// npr2rss - build or update a podcast feed from an NPR episode archive
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Expand the whole archive and write a fresh feed
    Build {
        #[command(flatten)]
        common: CommonArgs,

        /// Maximum number of "load more" clicks
        #[arg(long = "max-clicks", env = "NPR2RSS_MAX_CLICKS", default_value_t = DEFAULT_MAX_CLICKS)]
        max_clicks: usize,

        /// Wait after each click, in milliseconds
        #[arg(long = "settle-ms", env = "NPR2RSS_SETTLE_MS", default_value_t = DEFAULT_SETTLE_MS)]
        settle_ms: u64,
    },
    /// Merge the newest episodes into an existing feed
    Update {
        #[command(flatten)]
        common: CommonArgs,

        /// How many of the newest episodes to check
        #[arg(long = "check", env = "NPR2RSS_CHECK", default_value_t = DEFAULT_CHECK_COUNT)]
        check: usize,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// URL of the episode archive page
    #[arg(long, env = "NPR2RSS_URL", default_value = DEFAULT_SOURCE_URL)]
    url: String,

    /// Path of the feed file
    #[arg(short, long, env = "NPR2RSS_OUTPUT", default_value = "feed.xml")]
    output: PathBuf,

    /// Maximum number of episodes kept in the feed
    #[arg(short = 'n', long = "max-episodes", env = "NPR2RSS_MAX_EPISODES", default_value_t = DEFAULT_MAX_EPISODES)]
    max_episodes: usize,

    /// Public URL of the feed (atom self-link)
    #[arg(long = "self-link", env = "NPR2RSS_SELF_LINK")]
    self_link: String,

    /// Channel title
    #[arg(long, env = "NPR2RSS_TITLE")]
    title: Option<String>,

    /// Channel description
    #[arg(long, env = "NPR2RSS_DESCRIPTION")]
    description: Option<String>,

    /// Channel language
    #[arg(long, env = "NPR2RSS_LANGUAGE")]
    language: Option<String>,

    /// Channel artwork URL
    #[arg(long = "image-url", env = "NPR2RSS_IMAGE_URL")]
    image_url: Option<String>,

    /// Navigation timeout in milliseconds
    #[arg(short = 't', long = "timeout-ms", env = "NPR2RSS_TIMEOUT_MS", default_value_t = DEFAULT_NAV_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Timeout for each "load more" request in milliseconds
    #[arg(long = "wait-ms", env = "NPR2RSS_WAIT_MS", default_value_t = DEFAULT_WAIT_TIMEOUT_MS)]
    wait_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long = "log-level", env = "NPR2RSS_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl CommonArgs {
    fn channel(&self) -> ChannelConfig {
        let mut channel = ChannelConfig::for_source(&self.url, &self.self_link);
        if let Some(title) = &self.title {
            channel.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            channel.description.clone_from(description);
        }
        if let Some(language) = &self.language {
            channel.language.clone_from(language);
        }
        channel.image_url.clone_from(&self.image_url);
        channel
    }

    fn page_config(&self) -> PageConfig {
        PageConfig {
            nav_timeout: Duration::from_millis(self.timeout_ms),
            wait_timeout: Duration::from_millis(self.wait_ms),
            ..PageConfig::default()
        }
    }
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let common = match &cli.command {
        Command::Build { common, .. } | Command::Update { common, .. } => common,
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&common.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(exit_code(&e));
        }
    }
}

/// 3 when `update` has no base feed, 4 for every other failure.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Error>() {
        Some(Error::FeedNotFound { .. }) => 3,
        _ => 4,
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let now = Utc::now();
    let extractor = EpisodeExtractor::new(&ExtractorConfig::default())?;

    let outcome = match &cli.command {
        Command::Build {
            common,
            max_clicks,
            settle_ms,
        } => {
            let source = parse_source(&common.url)?;
            let channel = common.channel();
            let job = Job {
                source: &source,
                output: &common.output,
                channel: &channel,
                max_episodes: common.max_episodes,
            };
            let expand = ExpandConfig {
                target: common.max_episodes,
                max_clicks: *max_clicks,
                stall_limit: DEFAULT_STALL_LIMIT,
                settle: Duration::from_millis(*settle_ms),
            };
            let mut page = HttpPage::new(common.page_config())?;
            full_build(&mut page, &extractor, &job, expand, now)
                .with_context(|| format!("full build from {source} failed"))?
        }
        Command::Update { common, check } => {
            let source = parse_source(&common.url)?;
            let channel = common.channel();
            let job = Job {
                source: &source,
                output: &common.output,
                channel: &channel,
                max_episodes: common.max_episodes,
            };
            let mut page = HttpPage::new(common.page_config())?;
            incremental_update(&mut page, &extractor, &job, *check, now)
                .with_context(|| format!("update of {} failed", common.output.display()))?
        }
    };

    match outcome {
        RunOutcome::Unchanged => info!("feed is up to date"),
        RunOutcome::Written {
            total,
            added,
            evicted,
        } => info!(total, added, evicted, "feed written"),
    }
    Ok(())
}

fn parse_source(url: &str) -> anyhow::Result<Url> {
    Url::parse(url).map_err(|source| {
        Error::InvalidUrl {
            url: url.to_string(),
            source,
        }
        .into()
    })
}
