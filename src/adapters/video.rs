//! Video search result pages. Videos are indexed from the search listing
//! itself; individual watch pages are never fetched.

use std::collections::HashSet;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use super::extract::{
    clean_url, collapse_whitespace, element_text, extract_keywords, parse_date,
    parse_relative_date,
};
use super::{AdapterContext, Candidate, Harvest, SkipReason, SourceAdapter};
use crate::models::{NewArticle, SourceType};
use crate::validator::Validator;

const VIDEOS_PER_SEARCH: usize = 10;

pub struct VideoAdapter {
    ctx: AdapterContext,
    /// Search URL templates containing `{query}`.
    search_templates: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Platform {
    YouTube,
    Bilibili,
}

impl Platform {
    fn detect(url: &str) -> Option<Self> {
        let host = Url::parse(url).ok()?.host_str()?.to_ascii_lowercase();
        if host.ends_with("youtube.com") {
            Some(Platform::YouTube)
        } else if host.ends_with("bilibili.com") {
            Some(Platform::Bilibili)
        } else {
            None
        }
    }

    fn label(self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::Bilibili => "Bilibili",
        }
    }
}

/// One listing in a search results page.
#[derive(Debug, Clone, Default, PartialEq)]
struct VideoListing {
    title: String,
    url: String,
    description: String,
    channel: String,
    duration: String,
    views: String,
    published: String,
}

impl VideoAdapter {
    pub fn new(ctx: AdapterContext, search_templates: Vec<String>) -> Self {
        Self {
            ctx,
            search_templates,
        }
    }

    async fn crawl_search(
        &self,
        template: &str,
        keyword: &str,
        keywords: &[String],
        harvest: &mut Harvest,
    ) {
        let search_url = template.replace("{query}", &urlencoding::encode(keyword));
        let Some(platform) = Platform::detect(&search_url) else {
            harvest.record(Candidate::skip(
                search_url,
                SkipReason::Malformed("no listing parser for this host".into()),
            ));
            return;
        };
        let Some(page) = self.ctx.fetch(&search_url).await else {
            harvest.record(Candidate::skip(search_url, SkipReason::Unreachable));
            return;
        };

        let today = Local::now().date_naive();
        let listings = match platform {
            Platform::YouTube => parse_youtube(&page, today),
            Platform::Bilibili => parse_bilibili(&page, &search_url, today),
        };

        for listing in listings.into_iter().take(VIDEOS_PER_SEARCH) {
            harvest.record(listing.into_candidate(platform, keywords));
        }
    }
}

#[async_trait]
impl SourceAdapter for VideoAdapter {
    fn name(&self) -> &str {
        "video"
    }

    async fn crawl(&self, keywords: &[String]) -> anyhow::Result<Vec<NewArticle>> {
        let mut harvest = Harvest::new(self.name(), Validator::video(keywords));

        for keyword in keywords {
            for template in &self.search_templates {
                self.crawl_search(template, keyword, keywords, &mut harvest).await;
            }
        }

        Ok(harvest.into_drafts())
    }
}

impl VideoListing {
    fn into_candidate(self, platform: Platform, keywords: &[String]) -> Candidate {
        if self.title.is_empty() || self.url.is_empty() {
            return Candidate::skip(self.url, SkipReason::MissingFields);
        }

        let mut content = if self.description.is_empty() {
            format!("{} video: {}", platform.label(), self.title)
        } else {
            self.description.clone()
        };
        let details: Vec<String> = [
            ("Channel", &self.channel),
            ("Duration", &self.duration),
            ("Views", &self.views),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}: {v}"))
        .collect();
        if !details.is_empty() {
            content.push_str("\n\n");
            content.push_str(&details.join(" | "));
        }

        let found = extract_keywords(&format!("{} {}", self.title, content), keywords);
        Candidate::Draft(
            NewArticle::new(SourceType::Video, platform.label(), self.url, self.title, content)
                .with_publish_date(self.published)
                .with_keywords(found),
        )
    }
}

fn initial_data_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)ytInitialData\s*=\s*(\{.+?\});\s*</script>").expect("valid regex")
    })
}

/// Listings from a YouTube results page. The embedded `ytInitialData` JSON
/// is preferred; watch links in the markup are the fallback.
fn parse_youtube(html: &str, today: NaiveDate) -> Vec<VideoListing> {
    let from_json = initial_data_pattern()
        .captures(html)
        .and_then(|caps| serde_json::from_str::<Value>(&caps[1]).ok())
        .map(|data| {
            let mut renderers = Vec::new();
            collect_video_renderers(&data, &mut renderers);
            renderers
                .into_iter()
                .filter_map(|r| youtube_listing(r, today))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if !from_json.is_empty() {
        return from_json;
    }

    tracing::debug!("No ytInitialData found, falling back to watch links");
    youtube_watch_links(html)
}

fn collect_video_renderers<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(renderer) = map.get("videoRenderer") {
                out.push(renderer);
                return;
            }
            for child in map.values() {
                collect_video_renderers(child, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_video_renderers(child, out);
            }
        }
        _ => {}
    }
}

/// `{"simpleText": ..}` or `{"runs": [{"text": ..}, ..]}`.
fn yt_text(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    if let Some(text) = value.get("simpleText").and_then(Value::as_str) {
        return collapse_whitespace(text);
    }
    let runs = value
        .get("runs")
        .and_then(Value::as_array)
        .map(|runs| {
            runs.iter()
                .filter_map(|r| r.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();
    collapse_whitespace(&runs)
}

fn youtube_listing(renderer: &Value, today: NaiveDate) -> Option<VideoListing> {
    let video_id = renderer.get("videoId")?.as_str()?;
    let published = yt_text(renderer.get("publishedTimeText"));

    Some(VideoListing {
        title: yt_text(renderer.get("title")),
        url: format!("https://www.youtube.com/watch?v={video_id}"),
        description: yt_text(
            renderer
                .get("detailedMetadataSnippets")
                .and_then(|s| s.get(0))
                .and_then(|s| s.get("snippetText"))
                .or_else(|| renderer.get("descriptionSnippet")),
        ),
        channel: yt_text(renderer.get("ownerText")),
        duration: yt_text(renderer.get("lengthText")),
        views: yt_text(renderer.get("viewCountText")),
        published: parse_relative_date(&published, today).to_string(),
    })
}

fn youtube_watch_links(html: &str) -> Vec<VideoListing> {
    let document = Html::parse_document(html);
    let Ok(anchor) = Selector::parse("a[href*=\"/watch?v=\"]") else {
        return Vec::new();
    };
    let Ok(base) = Url::parse("https://www.youtube.com/") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    document
        .select(&anchor)
        .filter_map(|a| {
            let url = base.join(a.value().attr("href")?).ok()?;
            let video_id = url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned())?;
            if !seen.insert(video_id.clone()) {
                return None;
            }
            let title = a
                .value()
                .attr("title")
                .map(collapse_whitespace)
                .unwrap_or_else(|| element_text(a));
            Some(VideoListing {
                title,
                url: format!("https://www.youtube.com/watch?v={video_id}"),
                ..VideoListing::default()
            })
        })
        .collect()
}

fn first_text(card: ElementRef, list: &[&str]) -> String {
    list.iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|selector| {
            card.select(&selector)
                .map(|el| {
                    el.value()
                        .attr("title")
                        .map(collapse_whitespace)
                        .unwrap_or_else(|| element_text(el))
                })
                .find(|t| !t.is_empty())
        })
        .unwrap_or_default()
}

/// Bilibili shows absolute dates, `MM-DD` for the current year, or relative
/// text such as "3天前".
fn bilibili_date(raw: &str, today: NaiveDate) -> String {
    let raw = raw.trim_start_matches('·').trim();
    let parsed = parse_date(raw);
    if NaiveDate::parse_from_str(&parsed, "%Y-%m-%d").is_ok() {
        return parsed;
    }
    parse_relative_date(raw, today).to_string()
}

fn parse_bilibili(html: &str, page_url: &str, today: NaiveDate) -> Vec<VideoListing> {
    let document = Html::parse_document(html);
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let (Ok(cards), Ok(link)) = (
        Selector::parse(".bili-video-card, li.video-item"),
        Selector::parse("a[href*=\"/video/\"]"),
    ) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    document
        .select(&cards)
        .filter_map(|card| {
            let href = card.select(&link).next()?.value().attr("href")?;
            let url = clean_url(base.join(href).ok()?.as_str());
            if !seen.insert(url.clone()) {
                return None;
            }

            Some(VideoListing {
                title: first_text(card, &[".bili-video-card__info--tit", "a.title", "h3"]),
                url,
                description: first_text(card, &[".des", ".bili-video-card__info--desc"]),
                channel: first_text(card, &[".bili-video-card__info--author", ".up-name"]),
                duration: first_text(card, &[".bili-video-card__stats__duration", ".so-imgTag_rb"]),
                views: first_text(card, &[".bili-video-card__stats--item", ".watch-num"]),
                published: bilibili_date(
                    &first_text(card, &[".bili-video-card__info--date", ".time"]),
                    today,
                ),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testing::{context, StaticPages};
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    const YOUTUBE: &str = r#"<html><body><script>var ytInitialData = {"contents":{"twoColumnSearchResultsRenderer":{"primaryContents":{"sectionListRenderer":{"contents":[{"itemSectionRenderer":{"contents":[
        {"videoRenderer":{"videoId":"abc123","title":{"runs":[{"text":"Bluetooth LE Audio "},{"text":"explained"}]},
          "descriptionSnippet":{"runs":[{"text":"Everything about LC3 and Auracast."}]},
          "ownerText":{"runs":[{"text":"Radio Lab"}]},
          "lengthText":{"simpleText":"12:34"},
          "viewCountText":{"simpleText":"1,234 views"},
          "publishedTimeText":{"simpleText":"3 days ago"}}},
        {"adSlotRenderer":{}},
        {"videoRenderer":{"videoId":"def456","title":{"runs":[{"text":"Cooking pasta"}]}}}
    ]}}]}}}}};</script></body></html>"#;

    #[test]
    fn youtube_initial_data_is_parsed() {
        let listings = parse_youtube(YOUTUBE, today());
        assert_eq!(listings.len(), 2);

        let first = &listings[0];
        assert_eq!(first.title, "Bluetooth LE Audio explained");
        assert_eq!(first.url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(first.description, "Everything about LC3 and Auracast.");
        assert_eq!(first.channel, "Radio Lab");
        assert_eq!(first.duration, "12:34");
        assert_eq!(first.published, "2024-06-27");
    }

    #[test]
    fn absurd_upload_age_keeps_the_other_listings() {
        let html = YOUTUBE.replace("3 days ago", "999999 years ago");
        let listings = parse_youtube(&html, today());
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].title, "Bluetooth LE Audio explained");
        assert_eq!(listings[0].published, "2024-06-30");

        assert_eq!(bilibili_date("300000年前", today()), "2024-06-30");
    }

    #[test]
    fn youtube_falls_back_to_watch_links() {
        let html = r#"<html><body>
            <a href="/watch?v=xyz789&amp;t=10s" title="Bluetooth sniffing with nRF">thumb</a>
            <a href="/watch?v=xyz789">duplicate</a>
        </body></html>"#;
        let listings = parse_youtube(html, today());
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].title, "Bluetooth sniffing with nRF");
        assert_eq!(listings[0].url, "https://www.youtube.com/watch?v=xyz789");
    }

    #[test]
    fn bilibili_cards_are_parsed() {
        let html = r#"<html><body>
            <div class="bili-video-card">
              <a href="//www.bilibili.com/video/BV1xx411c7mD/?spm_id_from=333">
                <span class="bili-video-card__stats__duration">08:21</span>
              </a>
              <h3 class="bili-video-card__info--tit" title="蓝牙耳机 延迟 实测">蓝牙耳机 延迟 实测</h3>
              <span class="bili-video-card__info--author">数码君</span>
              <span class="bili-video-card__info--date">· 2天前</span>
            </div>
        </body></html>"#;

        let listings = parse_bilibili(html, "https://search.bilibili.com/all?keyword=x", today());
        assert_eq!(listings.len(), 1);
        let card = &listings[0];
        assert_eq!(card.url, "https://www.bilibili.com/video/BV1xx411c7mD/");
        assert_eq!(card.title, "蓝牙耳机 延迟 实测");
        assert_eq!(card.channel, "数码君");
        assert_eq!(card.duration, "08:21");
        assert_eq!(card.published, "2024-06-28");
    }

    #[test]
    fn bilibili_absolute_dates_are_kept() {
        assert_eq!(bilibili_date("· 2024-05-01", today()), "2024-05-01");
        assert_eq!(bilibili_date("1周前", today()), "2024-06-23");
    }

    #[test]
    fn listing_without_description_gets_a_generated_body() {
        let listing = VideoListing {
            title: "Bluetooth pairing tips".into(),
            url: "https://www.youtube.com/watch?v=1".into(),
            channel: "Tips".into(),
            ..VideoListing::default()
        };
        let Candidate::Draft(draft) =
            listing.into_candidate(Platform::YouTube, &["Bluetooth".to_string()])
        else {
            panic!("expected a draft");
        };
        assert_eq!(
            draft.content,
            "YouTube video: Bluetooth pairing tips\n\nChannel: Tips"
        );
        assert_eq!(draft.source_name, "YouTube");
        assert_eq!(draft.source_type, SourceType::Video);
    }

    #[tokio::test]
    async fn crawl_validates_with_video_thresholds() {
        let pages = Arc::new(StaticPages::default().with(
            "https://www.youtube.com/results?search_query=Bluetooth",
            YOUTUBE,
        ));
        let adapter = VideoAdapter::new(
            context(pages),
            vec![
                "https://www.youtube.com/results?search_query={query}".to_string(),
                "https://videos.example.test/?q={query}".to_string(),
            ],
        );

        let drafts = adapter.crawl(&["Bluetooth".to_string()]).await.unwrap();

        // the pasta video has no keyword and is rejected
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].url, "https://www.youtube.com/watch?v=abc123");
        assert!(drafts[0].content.contains("Channel: Radio Lab | Duration: 12:34"));
    }

    #[tokio::test]
    async fn crawl_survives_out_of_range_dates() {
        let pages = Arc::new(StaticPages::default().with(
            "https://www.youtube.com/results?search_query=Bluetooth",
            &YOUTUBE.replace("3 days ago", "999999 years ago"),
        ));
        let adapter = VideoAdapter::new(
            context(pages),
            vec!["https://www.youtube.com/results?search_query={query}".to_string()],
        );

        let drafts = adapter.crawl(&["Bluetooth".to_string()]).await.unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Bluetooth LE Audio explained");
    }
}
