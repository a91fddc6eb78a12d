//! RSS feed merging.
//!
//! Each run prepends today's fresh entries to the entries carried over from
//! the previous feed file and caps the total:
//!
//! ```text
//! [new_1, new_2, new_3, old_1, old_2, ..., old_k]   k = cap - len(new)
//! ```
//!
//! Old entries whose title starts with today's date are dropped first, so a
//! rerun on the same day replaces that day's entries instead of stacking a
//! second copy under them.

use crate::error::{Error, Result};
use crate::models::{FeedEntry, Interpretation, RunDate};
use rss::validation::Validate;
use rss::{Channel, ChannelBuilder};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Maximum number of entries kept in the feed.
pub const DEFAULT_MAX_ENTRIES: usize = 30;

/// Default entry title; must start with `{date}` for the same-day filter.
pub const DEFAULT_TITLE_TEMPLATE: &str = "{date} 🌙 {keyword} 꿈";

/// Channel metadata and entry formatting.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Channel title.
    pub title: String,
    /// Public URL of the feed; also the base of every entry link.
    pub link: Url,
    /// Channel description.
    pub description: String,
    /// Channel language code, e.g. `ko-kr`.
    pub language: String,
    /// Entry title template with `{date}` and `{keyword}` placeholders.
    pub title_template: String,
    /// Cap on the total number of entries.
    pub max_entries: usize,
}

/// Read the items of an existing feed.
///
/// A missing file yields no entries. An unreadable or malformed file is
/// logged and also yields no entries rather than aborting the run. Items that
/// fail RSS validation (for example an unparseable `pubDate`) are dropped so
/// they cannot poison the rewritten feed.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_existing(path: &Path) -> Vec<FeedEntry> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No existing feed; starting empty");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "Failed to read existing feed; starting empty");
            return Vec::new();
        }
    };

    let channel = match Channel::read_from(&bytes[..]) {
        Ok(channel) => channel,
        Err(e) => {
            warn!(error = %e, "Existing feed is malformed; starting empty");
            return Vec::new();
        }
    };

    let entries: Vec<FeedEntry> = channel
        .items()
        .iter()
        .filter(|item| match item.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(title = ?item.title(), error = %e, "Dropping invalid feed item");
                false
            }
        })
        .map(FeedEntry::from)
        .collect();
    info!(count = entries.len(), "Loaded existing feed entries");
    entries
}

/// Keep the old entries that may be carried into today's feed.
///
/// Drops entries titled with `today` (a `YYYY-MM-DD` string) and entries
/// without a title.
pub fn carry_over(existing: Vec<FeedEntry>, today: &str) -> Vec<FeedEntry> {
    let before = existing.len();
    let kept: Vec<FeedEntry> = existing
        .into_iter()
        .filter(|e| e.title.as_deref().is_some_and(|t| !t.starts_with(today)))
        .collect();
    debug!(before, kept = kept.len(), today, "Filtered carried-over entries");
    kept
}

/// Build the feed entry for one interpretation.
///
/// `index` is the 1-based position of the entry in today's batch. The link
/// is the feed link with a `v=<timestamp>` query and an `#<index>` fragment;
/// the guid combines date, timestamp, index and keyword so that reruns on the
/// same day never reuse an id.
pub fn new_entry(
    interpretation: &Interpretation,
    index: usize,
    run_date: &RunDate,
    settings: &FeedSettings,
) -> FeedEntry {
    let date = run_date.today_string();
    let stamp = run_date.cache_buster();
    let title = settings
        .title_template
        .replace("{date}", &date)
        .replace("{keyword}", &interpretation.keyword);

    let mut link = settings.link.clone();
    link.query_pairs_mut().append_pair("v", &stamp.to_string());
    link.set_fragment(Some(&index.to_string()));

    FeedEntry {
        title: Some(title),
        link: Some(link.to_string()),
        description: Some(interpretation.text.clone()),
        pub_date: Some(run_date.rfc2822()),
        guid: Some(format!("{date}-{stamp}-{index}-{}", interpretation.keyword)),
        guid_is_permalink: false,
    }
}

/// Prepend `fresh` to `carried` and cap the result at `cap` entries.
pub fn merge(fresh: Vec<FeedEntry>, carried: Vec<FeedEntry>, cap: usize) -> Vec<FeedEntry> {
    let max_old = cap.saturating_sub(fresh.len());
    fresh
        .into_iter()
        .take(cap)
        .chain(carried.into_iter().take(max_old))
        .collect()
}

/// Serialize the channel and its entries as an RSS 2.0 document.
///
/// # Errors
///
/// Returns [`Error::Feed`] if the channel fails RSS validation.
pub fn render(
    settings: &FeedSettings,
    entries: Vec<FeedEntry>,
    run_date: &RunDate,
) -> Result<String> {
    let items: Vec<rss::Item> = entries.into_iter().map(FeedEntry::into_item).collect();

    let channel = ChannelBuilder::default()
        .title(settings.title.clone())
        .link(settings.link.to_string())
        .description(settings.description.clone())
        .language(Some(settings.language.clone()))
        .pub_date(Some(run_date.rfc2822()))
        .last_build_date(Some(run_date.rfc2822()))
        .generator(Some(format!(
            "{} {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )))
        .items(items)
        .build();

    channel
        .validate()
        .map_err(|e| Error::Feed(format!("RSS validation failed: {e}")))?;
    Ok(channel.to_string())
}
