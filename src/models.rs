//! Data models shared across the pipeline.
//!
//! - [`Keyword`]: a dream-symbol keyword, identified by its text alone
//! - [`Interpretation`]: a keyword paired with the text the LLM wrote for it
//! - [`FeedEntry`]: one item of the RSS feed, fresh or carried over
//! - [`RunDate`]: the instant a run started, captured once so every entry in
//!   a batch shares the same date, timestamp and cache buster

use chrono::{DateTime, Local, NaiveDate, Utc};
use rss::{GuidBuilder, Item, ItemBuilder};

/// A dream-symbol keyword. Keywords have no attributes beyond their text.
pub type Keyword = String;

/// Text generated for a single keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    /// The keyword that was interpreted.
    pub keyword: Keyword,
    /// The trimmed text returned by the LLM.
    pub text: String,
}

/// A single feed item.
///
/// Fresh entries are built from an [`Interpretation`]; carried-over entries
/// are read back from the previous feed file. Fields mirror the RSS item
/// elements this program reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    /// Publication date in RFC 2822 form.
    pub pub_date: Option<String>,
    /// Stable identifier of the entry.
    pub guid: Option<String>,
    /// Whether `guid` is a permalink URL.
    pub guid_is_permalink: bool,
}

impl From<&Item> for FeedEntry {
    fn from(item: &Item) -> Self {
        Self {
            title: item.title().map(str::to_string),
            link: item.link().map(str::to_string),
            description: item.description().map(str::to_string),
            pub_date: item.pub_date().map(str::to_string),
            guid: item.guid().map(|g| g.value().to_string()),
            guid_is_permalink: item.guid().is_some_and(|g| g.is_permalink()),
        }
    }
}

impl FeedEntry {
    /// Convert into an `rss` item ready for serialization.
    pub fn into_item(self) -> Item {
        let guid = self.guid.map(|value| {
            GuidBuilder::default()
                .permalink(self.guid_is_permalink)
                .value(value)
                .build()
        });
        ItemBuilder::default()
            .title(self.title)
            .link(self.link)
            .description(self.description)
            .pub_date(self.pub_date)
            .guid(guid)
            .build()
    }
}

/// The moment a run started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDate {
    /// Local calendar date; drives entry titles and the same-day filter.
    pub today: NaiveDate,
    /// UTC instant; drives publication dates and cache busters.
    pub now: DateTime<Utc>,
}

impl RunDate {
    /// Capture the current local date and UTC instant.
    pub fn now() -> Self {
        let local = Local::now();
        Self {
            today: local.date_naive(),
            now: local.with_timezone(&Utc),
        }
    }

    /// Today's date as `YYYY-MM-DD`.
    pub fn today_string(&self) -> String {
        self.today.format("%Y-%m-%d").to_string()
    }

    /// The run instant as an RFC 2822 timestamp, e.g. `Sun, 18 Oct 2026 06:00:00 +0000`.
    pub fn rfc2822(&self) -> String {
        self.now.to_rfc2822()
    }

    /// A uniqueness token for links, unique per second.
    pub fn cache_buster(&self) -> i64 {
        self.now.timestamp()
    }
}
