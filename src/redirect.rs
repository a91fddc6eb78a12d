//! Companion HTML page that forwards visitors to the feed.
//!
//! Static hosts and feed readers cache aggressively, so the redirect target
//! carries a `v=<timestamp>` query that changes on every run.

use crate::models::RunDate;
use quick_xml::escape::escape;
use std::fmt::Write;
use url::Url;

/// Render the redirect page for `feed_link`.
pub fn render_redirect_page(
    feed_link: &Url,
    title: &str,
    language: &str,
    run_date: &RunDate,
) -> String {
    let mut target = feed_link.clone();
    target
        .query_pairs_mut()
        .append_pair("v", &run_date.cache_buster().to_string());
    let href = escape(target.as_str());
    let title = escape(title);
    let lang = escape(language);

    let mut html = String::new();
    writeln!(html, "<!DOCTYPE html>").unwrap();
    writeln!(html, "<html lang=\"{lang}\">").unwrap();
    writeln!(html, "<head>").unwrap();
    writeln!(html, "  <meta charset=\"utf-8\">").unwrap();
    writeln!(html, "  <title>{title}</title>").unwrap();
    writeln!(html, "  <meta http-equiv=\"refresh\" content=\"0; url={href}\">").unwrap();
    writeln!(
        html,
        "  <link rel=\"alternate\" type=\"application/rss+xml\" title=\"{title}\" href=\"{href}\">"
    )
    .unwrap();
    writeln!(html, "</head>").unwrap();
    writeln!(html, "<body>").unwrap();
    writeln!(html, "  <p><a href=\"{href}\">{title}</a></p>").unwrap();
    writeln!(html, "</body>").unwrap();
    writeln!(html, "</html>").unwrap();
    html
}
