//! # Dream Feed
//!
//! Publishes a daily RSS feed of short dream interpretations. Each run picks a
//! few dream-symbol keywords that have not been used yet, asks an
//! OpenAI-compatible LLM to interpret them, and merges the results into an
//! RSS file while remembering which keywords are used up.
//!
//! ## Usage
//!
//! ```sh
//! OPENAI_API_KEY=... dream_feed --feed-link https://example.github.io/dream-feed/rss.xml
//! ```
//!
//! ## Architecture
//!
//! The application is a single sequential pipeline:
//! 1. **Selection**: Pick unused keywords, restarting the rotation when exhausted
//! 2. **Interpretation**: Ask the LLM about each keyword, skipping failures
//! 3. **Merge**: Prepend the new entries to a capped tail of older entries
//! 4. **Output**: Stage and commit the feed, the history and the redirect page

use awful_aj::{config, config_dir, template};
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod error;
mod feed;
mod keywords;
mod models;
mod pipeline;
mod redirect;
mod selector;
mod utils;

use api::AskFnWrapper;
use cli::Cli;
use models::RunDate;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("dream_feed starting up");

    let args = Cli::parse();
    debug!(?args.keywords, ?args.used_keywords, ?args.feed, "Parsed CLI arguments");

    let pipeline_config = match args.pipeline_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    // ---- Load template & config ----
    let template = template::load_template(&args.template).await?;
    info!(template = %args.template, "Loaded template");
    let conf_file = match &args.config {
        Some(path) => PathBuf::from(path),
        None => config_dir()?.join("config.yaml"),
    };
    let config_path = conf_file
        .to_str()
        .ok_or("awful_aj config path is not valid UTF-8")?;
    let mut config = config::load_config(config_path)?;
    if let Some(key) = &args.api_key {
        config.api_key = key.clone();
        debug!("Using API key from the environment");
    }
    info!(config_path, "Loaded configuration");

    let client = AskFnWrapper {
        config: &config,
        template: &template,
    };
    let run_date = RunDate::now();
    let mut rng = rand::rng();

    let report = match pipeline::run(&pipeline_config, &client, &mut rng, &run_date).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Feed update failed");
            return Err(e.into());
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        generated = ?report.generated,
        failed = ?report.failed,
        history_reset = report.history_reset,
        "Execution complete"
    );

    Ok(())
}
