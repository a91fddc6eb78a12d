//! Command-line interface definitions for Dream Feed.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every argument can also be provided through an environment variable, which
//! is how scheduled jobs usually configure the run.

use crate::api::DEFAULT_PROMPT;
use crate::error::{Error, Result};
use crate::feed::{DEFAULT_MAX_ENTRIES, DEFAULT_TITLE_TEMPLATE, FeedSettings};
use crate::pipeline::PipelineConfig;
use crate::selector::DEFAULT_BATCH_SIZE;
use clap::Parser;
use std::path::PathBuf;
use url::Url;

/// Command-line arguments for the Dream Feed application.
///
/// # Examples
///
/// ```sh
/// # Minimal run; everything else has defaults
/// dream_feed --feed-link https://example.github.io/dream-feed/rss.xml
///
/// # Custom files and a companion redirect page
/// dream_feed -k keywords.json -u used.json -o site/rss.xml \
///     --redirect-page site/index.html --feed-link https://example.com/rss.xml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// JSON list of candidate dream keywords
    #[arg(short, long, env = "DREAM_FEED_KEYWORDS", default_value = "dream_keywords.json")]
    pub keywords: PathBuf,

    /// JSON list of keywords already interpreted
    #[arg(short, long, env = "DREAM_FEED_USED_KEYWORDS", default_value = "used_keywords.json")]
    pub used_keywords: PathBuf,

    /// RSS file to update
    #[arg(short = 'o', long, env = "DREAM_FEED_OUTPUT", default_value = "docs/rss.xml")]
    pub feed: PathBuf,

    /// Optional HTML page redirecting to the feed with a cache buster
    #[arg(long, env = "DREAM_FEED_REDIRECT_PAGE")]
    pub redirect_page: Option<PathBuf>,

    /// Public URL of the feed
    #[arg(long, env = "DREAM_FEED_LINK")]
    pub feed_link: String,

    /// Feed channel title
    #[arg(long, env = "DREAM_FEED_TITLE", default_value = "꿈해몽 피드")]
    pub feed_title: String,

    /// Feed channel description
    #[arg(
        long,
        env = "DREAM_FEED_DESCRIPTION",
        default_value = "매일 꿈 키워드에 대한 풍부한 해몽을 제공합니다."
    )]
    pub feed_description: String,

    /// Feed channel language
    #[arg(long, env = "DREAM_FEED_LANGUAGE", default_value = "ko-kr")]
    pub feed_language: String,

    /// Entry title template; must start with {date} and may use {keyword}
    #[arg(long, env = "DREAM_FEED_TITLE_TEMPLATE", default_value = DEFAULT_TITLE_TEMPLATE)]
    pub title_template: String,

    /// Prompt sent for each keyword; {keyword} is replaced
    #[arg(long, env = "DREAM_FEED_PROMPT", default_value = DEFAULT_PROMPT)]
    pub prompt: String,

    /// Keywords interpreted per run
    #[arg(long, env = "DREAM_FEED_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Maximum number of entries kept in the feed
    #[arg(long, env = "DREAM_FEED_MAX_ENTRIES", default_value_t = DEFAULT_MAX_ENTRIES)]
    pub max_entries: usize,

    /// Optional path to the awful_aj config.yaml file
    #[arg(short, long, env = "DREAM_FEED_CONFIG")]
    pub config: Option<String>,

    /// Name of the awful_aj chat template used as the system prompt
    #[arg(short, long, env = "DREAM_FEED_TEMPLATE", default_value = "dream_interpreter")]
    pub template: String,

    /// API key overriding the one in the awful_aj config
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

impl Cli {
    /// Build the validated pipeline configuration from the parsed arguments.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let link = Url::parse(&self.feed_link).map_err(|e| {
            Error::InvalidConfig(format!("feed link {:?} is not a URL: {e}", self.feed_link))
        })?;

        let config = PipelineConfig {
            keywords_path: self.keywords.clone(),
            history_path: self.used_keywords.clone(),
            feed_path: self.feed.clone(),
            redirect_path: self.redirect_page.clone(),
            batch_size: self.batch_size,
            prompt_template: self.prompt.clone(),
            feed: FeedSettings {
                title: self.feed_title.clone(),
                link,
                description: self.feed_description.clone(),
                language: self.feed_language.clone(),
                title_template: self.title_template.clone(),
                max_entries: self.max_entries,
            },
        };
        config.validate()?;
        Ok(config)
    }
}
