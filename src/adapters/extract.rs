//! Helpers shared by every source adapter: HTML to text, link discovery,
//! keyword matching and date normalisation.
//!
//! Everything here is synchronous and owns its output. `scraper::Html` is not
//! `Send`, so documents are parsed and dropped inside these functions and
//! never held across an `.await`.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Selector lists used to pull an article out of an arbitrary page. The
/// first selector that matches a non-empty element wins.
#[derive(Debug, Clone, Copy)]
pub struct ExtractProfile {
    pub title: &'static [&'static str],
    pub content: &'static [&'static str],
    pub date: &'static [&'static str],
}

pub const NEWS_PROFILE: ExtractProfile = ExtractProfile {
    title: &["h1", ".article-title", ".post-title", ".news-title", "title"],
    content: &[
        ".article-content",
        ".post-content",
        ".news-content",
        ".entry-content",
        ".content",
        "article",
    ],
    date: &[
        "time[datetime]",
        ".publish-date",
        ".post-date",
        ".news-date",
        "time",
        ".date",
        ".timestamp",
    ],
};

pub const TECH_PROFILE: ExtractProfile = ExtractProfile {
    title: &[
        "h1",
        ".post-title",
        ".article-title",
        ".blog-title",
        ".entry-title",
        ".title",
        "title",
    ],
    content: &[
        ".post-content",
        ".article-content",
        ".blog-content",
        ".entry-content",
        ".content",
        "article",
        ".post-body",
    ],
    date: &[
        "time[datetime]",
        ".publish-date",
        ".post-date",
        ".blog-date",
        "time",
        ".date",
        ".timestamp",
        ".meta-date",
    ],
};

pub const GENERIC_PROFILE: ExtractProfile = ExtractProfile {
    title: &["h1", "meta[property=\"og:title\"]", "title"],
    content: &["article", "main", ".article-content", ".post-content", ".content"],
    date: &["time[datetime]", "meta[property=\"article:published_time\"]", "time", ".date"],
};

pub const NEWS_LINK_SELECTORS: &[&str] = &[
    "a[href*=\"/article/\"]",
    "a[href*=\"/news/\"]",
    "a[href*=\"/story/\"]",
    "a[href*=\"/post/\"]",
    "h1 a",
    "h2 a",
    "h3 a",
    ".article-title a",
    ".news-title a",
    ".post-title a",
];

pub const TECH_LINK_SELECTORS: &[&str] = &[
    "a[href*=\"/article/\"]",
    "a[href*=\"/post/\"]",
    "a[href*=\"/blog/\"]",
    "a[href*=\"/tutorial/\"]",
    "a[href*=\"/guide/\"]",
    ".post-title a",
    ".article-title a",
    ".blog-title a",
    "h1 a",
    "h2 a",
    "h3 a",
];

/// Title, body and date pulled from one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFields {
    pub title: String,
    pub content: String,
    pub publish_date: String,
}

pub fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().filter_map(|css| Selector::parse(css).ok()).collect()
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_hidden(name: &str) -> bool {
    matches!(name, "script" | "style" | "noscript" | "template")
}

/// Visible text of an element, whitespace collapsed.
pub fn element_text(element: ElementRef) -> String {
    let mut parts = Vec::new();
    for node in element.descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| is_hidden(e.name()))
                    .unwrap_or(false)
            });
            if !hidden {
                parts.push(&**text);
            }
        }
    }
    collapse_whitespace(&parts.join(" "))
}

/// Plain text of a whole document, scripts and styles removed.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    element_text(document.root_element())
}

/// Render an HTML fragment (feed summaries, descriptions) as plain text.
pub fn html_to_plain(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), 200) {
        Ok(text) => collapse_whitespace(&text),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to convert HTML to text");
            collapse_whitespace(html)
        }
    }
}

fn node_value(element: ElementRef) -> String {
    // <meta content=".."> and <time datetime=".."> carry their value in an attribute
    let value = element.value();
    if let Some(content) = value.attr("content") {
        return collapse_whitespace(content);
    }
    if let Some(datetime) = value.attr("datetime") {
        return collapse_whitespace(datetime);
    }
    element_text(element)
}

/// Value of the first selector in `list` that matches a non-empty element.
pub fn select_text(document: &Html, list: &[&str]) -> Option<String> {
    selectors(list).iter().find_map(|selector| {
        document
            .select(selector)
            .map(node_value)
            .find(|text| !text.is_empty())
    })
}

/// Text of every element matching `css`, in document order.
pub fn select_all_text(document: &Html, css: &str, limit: usize) -> Vec<String> {
    let Ok(selector) = Selector::parse(css) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .take(limit)
        .collect()
}

pub fn extract_article(html: &str, profile: &ExtractProfile) -> ArticleFields {
    let document = Html::parse_document(html);

    let title = select_text(&document, profile.title).unwrap_or_default();
    let content = select_text(&document, profile.content)
        .unwrap_or_else(|| element_text(document.root_element()));
    let publish_date = select_text(&document, profile.date)
        .map(|raw| parse_date(&raw))
        .unwrap_or_default();

    ArticleFields {
        title,
        content,
        publish_date,
    }
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let resolved = base.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

/// Absolute links matched by `list`, deduplicated, in selector then document
/// order.
pub fn find_links(html: &str, base_url: &str, list: &[&str]) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for selector in selectors(list) {
        for element in document.select(&selector) {
            if let Some(url) = element.value().attr("href").and_then(|h| resolve(&base, h)) {
                if seen.insert(url.clone()) {
                    links.push(url);
                }
            }
        }
    }

    links
}

/// Links whose anchor text mentions one of `keywords`, with that text.
pub fn keyword_links(html: &str, base_url: &str, keywords: &[String]) -> Vec<(String, String)> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();

    document
        .select(&anchor)
        .filter_map(|element| {
            let text = element_text(element);
            if !contains_keyword(&text, keywords) {
                return None;
            }
            let url = resolve(&base, element.value().attr("href")?)?;
            seen.insert(url.clone()).then_some((url, text))
        })
        .collect()
}

pub fn contains_keyword(text: &str, keywords: &[String]) -> bool {
    let text = text.to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .any(|k| !k.is_empty() && text.contains(&k))
}

/// Configured keywords that occur in `text`, case-insensitively, each once,
/// in configuration order.
pub fn extract_keywords(text: &str, keywords: &[String]) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut found: Vec<String> = Vec::new();
    for keyword in keywords {
        let needle = keyword.trim().to_lowercase();
        if !needle.is_empty() && lower.contains(&needle) && !found.contains(keyword) {
            found.push(keyword.clone());
        }
    }
    found
}

/// Drop the query string and fragment.
pub fn clean_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.trim().to_string(),
    }
}

/// Host part of a URL, used as a source name for generic sites.
pub fn host_of(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| raw.to_string())
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

fn iso_date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})").expect("valid regex"))
}

/// Normalise a publication date to `YYYY-MM-DD`. Unrecognised input is kept
/// as trimmed text; empty input stays empty.
pub fn parse_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.date_naive().to_string();
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return dt.date_naive().to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return dt.date().to_string();
    }
    for format in ["%Y-%m-%d", "%d %b %Y", "%d %B %Y", "%B %d, %Y", "%b %d, %Y", "%Y年%m月%d日"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.to_string();
        }
    }
    if let Some(caps) = iso_date_pattern().captures(raw) {
        let parsed = (
            caps[1].parse::<i32>(),
            caps[2].parse::<u32>(),
            caps[3].parse::<u32>(),
        );
        if let (Ok(y), Ok(m), Ok(d)) = parsed {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                return date.to_string();
            }
        }
    }

    raw.to_string()
}

fn leading_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)").expect("valid regex"))
}

/// Resolve relative dates such as "3 days ago" or "2周前" against `today`.
/// Anything unrecognised resolves to `today`.
pub fn parse_relative_date(text: &str, today: NaiveDate) -> NaiveDate {
    let text = text.to_lowercase();
    let Some(n) = leading_number()
        .captures(&text)
        .and_then(|c| c[1].parse::<i64>().ok())
    else {
        return today;
    };

    let unit = if text.contains("year") || text.contains('年') {
        365
    } else if text.contains("month") || text.contains('月') {
        30
    } else if text.contains("week") || text.contains('周') {
        7
    } else if text.contains("day") || text.contains('天') {
        1
    } else {
        0
    };

    n.checked_mul(unit)
        .and_then(Duration::try_days)
        .and_then(|ago| today.checked_sub_signed(ago))
        .unwrap_or(today)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head>
            <title>Site title | Example</title>
            <style>.x { color: red }</style>
          </head>
          <body>
            <nav><a href="/">Home</a></nav>
            <h1>  Bluetooth 6.0   adds channel sounding </h1>
            <time datetime="2024-09-03T10:00:00Z">Sep 3</time>
            <div class="article-content">
              <p>The new spec brings <b>distance</b> awareness.</p>
              <script>var tracking = 1;</script>
              <p>Chips ship next year.</p>
            </div>
          </body>
        </html>
    "#;

    #[test]
    fn extracts_title_content_and_date() {
        let fields = extract_article(PAGE, &NEWS_PROFILE);
        assert_eq!(fields.title, "Bluetooth 6.0 adds channel sounding");
        assert_eq!(
            fields.content,
            "The new spec brings distance awareness. Chips ship next year."
        );
        assert_eq!(fields.publish_date, "2024-09-03");
    }

    #[test]
    fn whole_page_text_drops_scripts_and_styles() {
        let text = extract_text(PAGE);
        assert!(text.contains("Chips ship next year."));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn content_falls_back_to_whole_page() {
        let fields = extract_article(
            "<html><body><h1>Only a headline</h1><p>Loose body text</p></body></html>",
            &NEWS_PROFILE,
        );
        assert_eq!(fields.content, "Only a headline Loose body text");
        assert_eq!(fields.publish_date, "");
    }

    #[test]
    fn links_are_resolved_and_deduplicated() {
        let html = r##"
            <a href="/news/one">One</a>
            <h2><a href="/news/one">One again</a></h2>
            <h3><a href="https://other.test/story/two">Two</a></h3>
            <a href="#top">Top</a>
            <h2><a href="mailto:x@example.test">Mail</a></h2>
        "##;
        let links = find_links(html, "https://example.test/", NEWS_LINK_SELECTORS);
        assert_eq!(
            links,
            vec![
                "https://example.test/news/one".to_string(),
                "https://other.test/story/two".to_string(),
            ]
        );
    }

    #[test]
    fn keyword_links_match_anchor_text() {
        let keywords = vec!["Bluetooth".to_string()];
        let html = r#"
            <a href="/dev/ble">Bluetooth LE guide</a>
            <a href="/dev/wifi">Wi-Fi guide</a>
            <a href="/dev/ble">BLUETOOTH LE guide (again)</a>
        "#;
        let links = keyword_links(html, "https://vendor.test/", &keywords);
        assert_eq!(
            links,
            vec![(
                "https://vendor.test/dev/ble".to_string(),
                "Bluetooth LE guide".to_string()
            )]
        );
    }

    #[test]
    fn keyword_extraction_is_case_insensitive_and_unique() {
        let keywords = vec!["蓝牙".to_string(), "Bluetooth".to_string(), "BLE".to_string()];
        let found = extract_keywords("BLUETOOTH and bluetooth, 蓝牙耳机", &keywords);
        assert_eq!(found, vec!["蓝牙".to_string(), "Bluetooth".to_string()]);
        assert!(contains_keyword("new ble beacon", &keywords));
        assert!(!contains_keyword("nothing here", &keywords));
    }

    #[test]
    fn clean_url_strips_query_and_fragment() {
        assert_eq!(
            clean_url("https://example.test/a/b?utm_source=x#frag"),
            "https://example.test/a/b"
        );
        assert_eq!(clean_url("not a url"), "not a url");
    }

    #[test]
    fn dates_are_normalised() {
        assert_eq!(parse_date("2024-05-01 08:30:00"), "2024-05-01");
        assert_eq!(parse_date("2024-05-01"), "2024-05-01");
        assert_eq!(parse_date("1 May 2024"), "2024-05-01");
        assert_eq!(parse_date("May 1, 2024"), "2024-05-01");
        assert_eq!(parse_date("Wed, 01 May 2024 08:30:00 +0000"), "2024-05-01");
        assert_eq!(parse_date("Published 2024/05/01 by staff"), "2024-05-01");
        assert_eq!(parse_date("yesterday"), "yesterday");
        assert_eq!(parse_date("  "), "");
    }

    #[test]
    fn relative_dates_resolve_against_today() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert_eq!(
            parse_relative_date("3 days ago", today),
            NaiveDate::from_ymd_opt(2024, 6, 27).unwrap()
        );
        assert_eq!(
            parse_relative_date("2周前", today),
            NaiveDate::from_ymd_opt(2024, 6, 16).unwrap()
        );
        assert_eq!(
            parse_relative_date("1 month ago", today),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap()
        );
        assert_eq!(parse_relative_date("Streamed live", today), today);
    }

    #[test]
    fn out_of_range_relative_dates_resolve_to_today() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert_eq!(parse_relative_date("300000 years ago", today), today);
        assert_eq!(parse_relative_date("999999999999999999 days ago", today), today);
        assert_eq!(parse_relative_date("99999999999999999999999 weeks ago", today), today);
        assert_eq!(parse_relative_date("5000000年前", today), today);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("蓝牙耳机评测", 2), "蓝牙...");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn html_fragments_render_as_plain_text() {
        let text = html_to_plain("<p>Hello <b>Bluetooth</b></p><p>world</p>");
        assert!(text.contains("Hello"));
        assert!(text.contains("Bluetooth"));
        assert!(!text.contains('<'));
    }
}
