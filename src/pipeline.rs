//! The feed update run, end to end.
//!
//! 1. **Lock**: take the run lock next to the history file
//! 2. **Select**: load universe and history, pick a batch of unused keywords
//! 3. **Interpret**: ask the LLM about each keyword, one at a time
//! 4. **Merge**: build the new feed and the updated history in memory
//! 5. **Commit**: stage every output, then rename feed, history and redirect
//!    page into place
//!
//! Nothing is written unless at least one interpretation succeeded.

use crate::api::{AskAsync, KEYWORD_PLACEHOLDER, interpret};
use crate::error::{Error, Result};
use crate::feed::{self, FeedSettings};
use crate::keywords;
use crate::models::{Interpretation, Keyword, RunDate};
use crate::redirect::render_redirect_page;
use crate::selector::select_batch;
use crate::utils::{RunLock, ensure_parent_dir, write_all_staged};
use rand::Rng;
use std::path::PathBuf;
use tracing::{error, info, instrument};

/// Everything a run needs besides the LLM client, the RNG and the clock.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// JSON list of every candidate keyword.
    pub keywords_path: PathBuf,
    /// JSON list of keywords already interpreted.
    pub history_path: PathBuf,
    /// RSS file to merge into.
    pub feed_path: PathBuf,
    /// Optional companion HTML page.
    pub redirect_path: Option<PathBuf>,
    /// Keywords interpreted per run.
    pub batch_size: usize,
    /// Prompt template containing `{keyword}`.
    pub prompt_template: String,
    pub feed: FeedSettings,
}

impl PipelineConfig {
    /// Check the settings that would otherwise fail halfway through a run.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be at least 1".into()));
        }
        if self.feed.max_entries < self.batch_size {
            return Err(Error::InvalidConfig(format!(
                "max entries ({}) must be at least the batch size ({})",
                self.feed.max_entries, self.batch_size
            )));
        }
        if !self.prompt_template.contains(KEYWORD_PLACEHOLDER) {
            return Err(Error::InvalidConfig(format!(
                "prompt template must contain {KEYWORD_PLACEHOLDER}"
            )));
        }
        if !self.feed.title_template.starts_with("{date}") {
            return Err(Error::InvalidConfig(
                "entry title template must start with {date}".into(),
            ));
        }
        Ok(())
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Keywords chosen by the selector.
    pub picked: Vec<Keyword>,
    /// Keywords that made it into the feed.
    pub generated: Vec<Keyword>,
    /// Keywords whose interpretation failed.
    pub failed: Vec<Keyword>,
    /// Whether the rotation started over this run.
    pub history_reset: bool,
    /// Entries in the written feed.
    pub feed_entries: usize,
    /// Keywords in the persisted history.
    pub history_len: usize,
}

/// Run one feed update.
///
/// # Errors
///
/// - [`Error::AlreadyRunning`] if another run holds the lock
/// - [`Error::KeywordFile`] / [`Error::UniverseTooSmall`] if no batch can be picked
/// - [`Error::NothingGenerated`] if every interpretation failed; in that case
///   no file is modified
/// - [`Error::Io`] / [`Error::Feed`] if the outputs cannot be written
#[instrument(level = "info", skip_all, fields(date = %run_date.today_string()))]
pub async fn run<A, R>(
    config: &PipelineConfig,
    client: &A,
    rng: &mut R,
    run_date: &RunDate,
) -> Result<RunReport>
where
    A: AskAsync<Response = String>,
    R: Rng + ?Sized,
{
    config.validate()?;
    ensure_parent_dir(&config.history_path).await?;
    let _lock = RunLock::acquire(&RunLock::path_for(&config.history_path))?;

    let universe = keywords::load_universe(&config.keywords_path).await?;
    let mut history = keywords::load_history(&config.history_path).await;
    let selection = select_batch(&universe, &mut history, config.batch_size, rng)?;

    let mut report = RunReport {
        picked: selection.picked.clone(),
        history_reset: selection.history_reset,
        ..Default::default()
    };

    let mut interpretations = Vec::with_capacity(selection.picked.len());
    for (i, keyword) in selection.picked.iter().enumerate() {
        info!(keyword = %keyword, n = i + 1, of = selection.picked.len(), "Interpreting keyword");
        match interpret(client, &config.prompt_template, keyword).await {
            Ok(text) => interpretations.push(Interpretation {
                keyword: keyword.clone(),
                text,
            }),
            Err(e) => {
                error!(keyword = %keyword, error = %e, "Interpretation failed; skipping keyword");
                report.failed.push(keyword.clone());
            }
        }
    }

    if interpretations.is_empty() {
        error!(picked = ?report.picked, "Every interpretation failed");
        return Err(Error::NothingGenerated);
    }

    let fresh: Vec<_> = interpretations
        .iter()
        .enumerate()
        .map(|(i, interp)| feed::new_entry(interp, i + 1, run_date, &config.feed))
        .collect();
    let existing = feed::load_existing(&config.feed_path).await;
    let carried = feed::carry_over(existing, &run_date.today_string());
    let entries = feed::merge(fresh, carried, config.feed.max_entries);
    report.feed_entries = entries.len();
    let xml = feed::render(&config.feed, entries, run_date)?;

    history.extend(interpretations.iter().map(|i| i.keyword.clone()));
    let history = keywords::dedup_history(history);
    let history_json = keywords::encode_history(&history)?;
    report.history_len = history.len();
    report.generated = interpretations.into_iter().map(|i| i.keyword).collect();

    let mut outputs = vec![
        (config.feed_path.clone(), xml.into_bytes()),
        (config.history_path.clone(), history_json.into_bytes()),
    ];
    if let Some(path) = &config.redirect_path {
        let html = render_redirect_page(
            &config.feed.link,
            &config.feed.title,
            &config.feed.language,
            run_date,
        );
        outputs.push((path.clone(), html.into_bytes()));
    }
    write_all_staged(&outputs).await?;

    info!(
        generated = report.generated.len(),
        failed = report.failed.len(),
        feed_entries = report.feed_entries,
        history_len = report.history_len,
        "Feed update complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{DEFAULT_MAX_ENTRIES, DEFAULT_TITLE_TEMPLATE};
    use crate::models::FeedEntry;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rss::Channel;
    use std::error::Error as StdError;
    use std::path::Path;
    use url::Url;

    /// Interpreter stub that fails for prompts mentioning any of `fail_on`.
    #[derive(Debug, Default)]
    struct StubInterpreter {
        fail_on: Vec<&'static str>,
    }

    impl AskAsync for StubInterpreter {
        type Response = String;

        async fn ask(&self, text: &str) -> std::result::Result<String, Box<dyn StdError>> {
            if self.fail_on.iter().any(|k| text.contains(k)) {
                return Err("service unavailable".into());
            }
            Ok(format!("  dream about: {text}  "))
        }
    }

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            keywords_path: dir.join("dream_keywords.json"),
            history_path: dir.join("used_keywords.json"),
            feed_path: dir.join("docs/rss.xml"),
            redirect_path: None,
            batch_size: 3,
            prompt_template: "Interpret the dream symbol {keyword}.".to_string(),
            feed: FeedSettings {
                title: "Dream feed".to_string(),
                link: Url::parse("https://example.github.io/dream-feed/rss.xml").unwrap(),
                description: "Daily dream interpretations".to_string(),
                language: "en".to_string(),
                title_template: DEFAULT_TITLE_TEMPLATE.to_string(),
                max_entries: DEFAULT_MAX_ENTRIES,
            },
        }
    }

    fn run_date(day: u32) -> RunDate {
        RunDate {
            today: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
            now: Utc.with_ymd_and_hms(2026, 10, day, 6, 0, 0).unwrap(),
        }
    }

    fn write_json(path: &Path, keywords: &[&str]) {
        std::fs::write(path, serde_json::to_string(keywords).unwrap()).unwrap();
    }

    fn read_history(path: &Path) -> Vec<String> {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    fn read_titles(path: &Path) -> Vec<String> {
        let channel = Channel::read_from(&std::fs::read(path).unwrap()[..]).unwrap();
        channel
            .items()
            .iter()
            .map(|i| i.title().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_three_keyword_universe_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_json(&cfg.keywords_path, &["flying", "snake", "water"]);

        let mut rng = StdRng::seed_from_u64(3);
        let report = run(&cfg, &StubInterpreter::default(), &mut rng, &run_date(18))
            .await
            .unwrap();

        let mut generated = report.generated.clone();
        generated.sort();
        assert_eq!(generated, vec!["flying", "snake", "water"]);
        assert!(report.failed.is_empty());

        let mut history = read_history(&cfg.history_path);
        history.sort();
        assert_eq!(history, vec!["flying", "snake", "water"]);

        let channel = Channel::read_from(&std::fs::read(&cfg.feed_path).unwrap()[..]).unwrap();
        assert_eq!(channel.items().len(), 3);
        let first = &channel.items()[0];
        assert!(first.title().unwrap().starts_with("2026-10-18 🌙 "));
        assert!(
            first
                .description()
                .unwrap()
                .starts_with("dream about: Interpret the dream symbol")
        );
        assert!(!RunLock::path_for(&cfg.history_path).exists());
    }

    #[tokio::test]
    async fn test_failed_keyword_is_neither_published_nor_marked_used() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_json(&cfg.keywords_path, &["flying", "snake", "water"]);
        let client = StubInterpreter {
            fail_on: vec!["snake"],
        };

        let mut rng = StdRng::seed_from_u64(9);
        let report = run(&cfg, &client, &mut rng, &run_date(18)).await.unwrap();

        assert_eq!(report.failed, vec!["snake"]);
        assert_eq!(report.generated.len(), 2);
        let history = read_history(&cfg.history_path);
        assert_eq!(history.len(), 2);
        assert!(!history.contains(&"snake".to_string()));
        let titles = read_titles(&cfg.feed_path);
        assert_eq!(titles.len(), 2);
        assert!(titles.iter().all(|t| !t.contains("snake")));
    }

    #[tokio::test]
    async fn test_nothing_generated_leaves_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_json(&cfg.keywords_path, &["flying", "snake", "water"]);
        write_json(&cfg.history_path, &["older"]);
        let client = StubInterpreter {
            fail_on: vec!["flying", "snake", "water"],
        };

        let mut rng = StdRng::seed_from_u64(1);
        let err = run(&cfg, &client, &mut rng, &run_date(18)).await.unwrap_err();

        assert!(matches!(err, Error::NothingGenerated));
        assert!(!cfg.feed_path.exists());
        assert_eq!(read_history(&cfg.history_path), vec!["older"]);
        assert!(!RunLock::path_for(&cfg.history_path).exists());
    }

    #[tokio::test]
    async fn test_feed_is_capped_with_new_entries_first() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_json(&cfg.keywords_path, &["a", "b", "c", "d", "e"]);

        // 29 entries from earlier days plus 2 already published today.
        let mut old: Vec<FeedEntry> = (0..2)
            .map(|n| FeedEntry {
                title: Some(format!("2026-10-18 🌙 today{n} 꿈")),
                link: None,
                description: Some("same day".to_string()),
                pub_date: None,
                guid: None,
                guid_is_permalink: false,
            })
            .collect();
        old.extend((0..29).map(|n| FeedEntry {
            title: Some(format!("2026-10-{:02} 🌙 old{n} 꿈", 17 - (n / 3))),
            link: None,
            description: Some("earlier".to_string()),
            pub_date: None,
            guid: None,
            guid_is_permalink: false,
        }));
        std::fs::create_dir_all(cfg.feed_path.parent().unwrap()).unwrap();
        std::fs::write(
            &cfg.feed_path,
            feed::render(&cfg.feed, old, &run_date(17)).unwrap(),
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let report = run(&cfg, &StubInterpreter::default(), &mut rng, &run_date(18))
            .await
            .unwrap();

        assert_eq!(report.feed_entries, 30);
        let titles = read_titles(&cfg.feed_path);
        assert_eq!(titles.len(), 30);
        assert!(titles[..3].iter().all(|t| t.starts_with("2026-10-18")));
        assert!(titles[3..].iter().all(|t| !t.starts_with("2026-10-18")));
        assert_eq!(titles[3], "2026-10-17 🌙 old0 꿈");
        assert_eq!(titles[29], "2026-10-09 🌙 old26 꿈");
    }

    #[tokio::test]
    async fn test_same_day_rerun_replaces_todays_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_json(
            &cfg.keywords_path,
            &["a", "b", "c", "d", "e", "f", "g", "h", "i"],
        );
        let client = StubInterpreter::default();
        let mut rng = StdRng::seed_from_u64(11);

        run(&cfg, &client, &mut rng, &run_date(17)).await.unwrap();
        let first_today = run(&cfg, &client, &mut rng, &run_date(18)).await.unwrap();
        let second_today = run(&cfg, &client, &mut rng, &run_date(18)).await.unwrap();

        let titles = read_titles(&cfg.feed_path);
        let today: Vec<_> = titles
            .iter()
            .filter(|t| t.starts_with("2026-10-18"))
            .collect();
        assert_eq!(titles.len(), 6);
        assert_eq!(today.len(), 3);
        assert!(
            second_today
                .generated
                .iter()
                .all(|k| today.iter().any(|t| t.contains(&format!(" {k} "))))
        );
        // The first same-day batch drops out of the feed but stays marked as used.
        let history = read_history(&cfg.history_path);
        assert_eq!(history.len(), 9);
        assert!(first_today.generated.iter().all(|k| history.contains(k)));
    }

    #[tokio::test]
    async fn test_rotation_restarts_when_universe_is_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_json(&cfg.keywords_path, &["a", "b", "c", "d"]);
        write_json(&cfg.history_path, &["a", "b", "c", "a"]);

        let mut rng = StdRng::seed_from_u64(2);
        let report = run(&cfg, &StubInterpreter::default(), &mut rng, &run_date(18))
            .await
            .unwrap();

        assert!(report.history_reset);
        let mut history = read_history(&cfg.history_path);
        history.sort();
        let mut picked = report.picked.clone();
        picked.sort();
        assert_eq!(history, picked);
    }

    #[tokio::test]
    async fn test_malformed_feed_and_corrupt_history_start_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_json(&cfg.keywords_path, &["flying", "snake", "water", "fire"]);
        std::fs::write(&cfg.history_path, "{not json").unwrap();
        std::fs::create_dir_all(cfg.feed_path.parent().unwrap()).unwrap();
        std::fs::write(&cfg.feed_path, "definitely not rss").unwrap();

        let mut rng = StdRng::seed_from_u64(4);
        let report = run(&cfg, &StubInterpreter::default(), &mut rng, &run_date(18))
            .await
            .unwrap();

        assert!(!report.history_reset);
        assert_eq!(report.feed_entries, 3);
        assert_eq!(read_history(&cfg.history_path).len(), 3);
    }

    #[tokio::test]
    async fn test_redirect_page_written_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.redirect_path = Some(dir.path().join("docs/index.html"));
        write_json(&cfg.keywords_path, &["flying", "snake", "water"]);

        let mut rng = StdRng::seed_from_u64(8);
        run(&cfg, &StubInterpreter::default(), &mut rng, &run_date(18))
            .await
            .unwrap();

        let html = std::fs::read_to_string(dir.path().join("docs/index.html")).unwrap();
        assert!(html.contains("rss.xml?v=1792303200"));
    }

    #[tokio::test]
    async fn test_first_run_creates_missing_state_and_feed_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.history_path = dir.path().join("state/used_keywords.json");
        cfg.feed_path = dir.path().join("public/feeds/rss.xml");
        write_json(&cfg.keywords_path, &["flying", "snake", "water"]);

        let mut rng = StdRng::seed_from_u64(11);
        let report = run(&cfg, &StubInterpreter::default(), &mut rng, &run_date(18))
            .await
            .unwrap();

        assert_eq!(report.generated.len(), 3);
        assert_eq!(read_history(&cfg.history_path).len(), 3);
        assert_eq!(read_titles(&cfg.feed_path).len(), 3);
        assert!(!RunLock::path_for(&cfg.history_path).exists());
    }

    #[tokio::test]
    async fn test_held_lock_blocks_a_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_json(&cfg.keywords_path, &["flying", "snake", "water"]);
        let _held = RunLock::acquire(&RunLock::path_for(&cfg.history_path)).unwrap();

        let mut rng = StdRng::seed_from_u64(6);
        let err = run(&cfg, &StubInterpreter::default(), &mut rng, &run_date(18))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AlreadyRunning(_)));
        assert!(!cfg.feed_path.exists());
    }

    #[tokio::test]
    async fn test_small_universe_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_json(&cfg.keywords_path, &["flying", "snake", "flying"]);

        let mut rng = StdRng::seed_from_u64(6);
        let err = run(&cfg, &StubInterpreter::default(), &mut rng, &run_date(18))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UniverseTooSmall { available: 2, .. }));
    }

    #[test]
    fn test_validate_rejects_inconsistent_settings() {
        let dir = tempfile::tempdir().unwrap();

        let mut cfg = config(dir.path());
        cfg.feed.max_entries = 2;
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        let mut cfg = config(dir.path());
        cfg.prompt_template = "no placeholder".to_string();
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        let mut cfg = config(dir.path());
        cfg.feed.title_template = "🌙 {keyword} on {date}".to_string();
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        assert!(config(dir.path()).validate().is_ok());
    }
}
