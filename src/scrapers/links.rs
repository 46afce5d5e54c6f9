//! Article link discovery on category pages.

use std::collections::HashSet;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// Find article links on a category page.
///
/// Every `href` is resolved against `base_url`. A link is kept when `pattern`
/// matches the absolute URL starting at its first character and the URL is
/// not in `seen`. Links keep page order; repeats on the same page collapse to
/// the first occurrence.
pub fn discover(
    page_html: &str,
    base_url: &Url,
    pattern: &Regex,
    seen: &HashSet<String>,
) -> Vec<String> {
    let document = Html::parse_document(page_html);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base_url.join(href).ok())
        .map(String::from)
        .filter(|url| matches_from_start(pattern, url) && !seen.contains(url))
        .unique()
        .collect()
}

/// True when `pattern` has a match beginning at offset 0 of `text`.
fn matches_from_start(pattern: &Regex, text: &str) -> bool {
    pattern.find(text).is_some_and(|m| m.start() == 0)
}
