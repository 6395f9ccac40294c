use async_trait::async_trait;
use feed_rs::parser;

use super::extract::{
    clean_url, contains_keyword, extract_article, extract_keywords, find_links, host_of,
    html_to_plain, NEWS_LINK_SELECTORS, NEWS_PROFILE,
};
use super::{AdapterContext, Candidate, Harvest, SkipReason, SourceAdapter};
use crate::models::{NewArticle, SourceType};
use crate::validator::Validator;

/// Entries considered per feed.
const FEED_ENTRY_LIMIT: usize = 20;
/// Article links followed per news homepage.
const SITE_ARTICLE_LIMIT: usize = 10;

/// RSS/Atom feeds plus news site homepages.
pub struct NewsAdapter {
    ctx: AdapterContext,
    feeds: Vec<String>,
    sites: Vec<String>,
}

/// A feed entry that mentions a keyword, before its page is fetched.
#[derive(Debug, Clone, PartialEq)]
struct FeedEntry {
    title: String,
    link: String,
    summary: String,
    published: String,
    feed_title: String,
}

impl NewsAdapter {
    pub fn new(ctx: AdapterContext, feeds: Vec<String>, sites: Vec<String>) -> Self {
        Self { ctx, feeds, sites }
    }

    async fn crawl_feed(&self, feed_url: &str, keywords: &[String], harvest: &mut Harvest) {
        let Some(body) = self.ctx.fetch(feed_url).await else {
            harvest.record(Candidate::skip(feed_url, SkipReason::Unreachable));
            return;
        };

        let entries = match parse_feed(&body, feed_url, keywords) {
            Ok(entries) => entries,
            Err(e) => {
                harvest.record(Candidate::skip(feed_url, SkipReason::Malformed(e.to_string())));
                return;
            }
        };

        let links = entries.iter().map(|e| e.link.clone()).collect();
        let pages = self.ctx.fetch_all(links).await;

        for (entry, (_, page)) in entries.into_iter().zip(pages) {
            harvest.record(entry.into_candidate(page.as_deref(), keywords));
        }
    }

    async fn crawl_site(&self, site_url: &str, keywords: &[String], harvest: &mut Harvest) {
        let Some(home) = self.ctx.fetch(site_url).await else {
            harvest.record(Candidate::skip(site_url, SkipReason::Unreachable));
            return;
        };

        let links: Vec<String> = find_links(&home, site_url, NEWS_LINK_SELECTORS)
            .into_iter()
            .take(SITE_ARTICLE_LIMIT)
            .collect();
        let source_name = host_of(site_url);

        for (link, page) in self.ctx.fetch_all(links).await {
            harvest.record(Candidate::from_page(
                &link,
                page.as_deref(),
                SourceType::News,
                &source_name,
                &NEWS_PROFILE,
                keywords,
            ));
        }
    }
}

#[async_trait]
impl SourceAdapter for NewsAdapter {
    fn name(&self) -> &str {
        "news"
    }

    async fn crawl(&self, keywords: &[String]) -> anyhow::Result<Vec<NewArticle>> {
        let mut harvest = Harvest::new(self.name(), Validator::article(keywords));

        for feed_url in &self.feeds {
            self.crawl_feed(feed_url, keywords, &mut harvest).await;
        }
        for site_url in &self.sites {
            self.crawl_site(site_url, keywords, &mut harvest).await;
        }

        Ok(harvest.into_drafts())
    }
}

/// Keyword-matching entries among the first [`FEED_ENTRY_LIMIT`] of a feed.
fn parse_feed(
    body: &str,
    feed_url: &str,
    keywords: &[String],
) -> Result<Vec<FeedEntry>, parser::ParseFeedError> {
    let feed = parser::parse(body.as_bytes())?;
    let feed_title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| host_of(feed_url));

    let entries = feed
        .entries
        .into_iter()
        .take(FEED_ENTRY_LIMIT)
        .filter_map(|entry| {
            let title = entry.title.map(|t| html_to_plain(&t.content))?;
            let link = entry.links.first().map(|l| l.href.clone())?;
            let summary_html = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();
            let summary = html_to_plain(&summary_html);

            if !contains_keyword(&format!("{title} {summary}"), keywords) {
                return None;
            }

            Some(FeedEntry {
                title,
                link: clean_url(&link),
                summary,
                published: entry
                    .published
                    .or(entry.updated)
                    .map(|d| d.date_naive().to_string())
                    .unwrap_or_default(),
                feed_title: feed_title.clone(),
            })
        })
        .collect();

    Ok(entries)
}

impl FeedEntry {
    /// The linked page supplies the body when it has one; the feed summary
    /// stands in otherwise.
    fn into_candidate(self, page: Option<&str>, keywords: &[String]) -> Candidate {
        let content = page
            .map(|html| extract_article(html, &NEWS_PROFILE).content)
            .filter(|c| !c.is_empty())
            .unwrap_or(self.summary);

        if self.title.is_empty() || content.is_empty() {
            return Candidate::skip(self.link, SkipReason::MissingFields);
        }

        let found = extract_keywords(&format!("{} {}", self.title, content), keywords);
        Candidate::Draft(
            NewArticle::new(
                SourceType::News,
                self.feed_title,
                self.link,
                self.title,
                content,
            )
            .with_publish_date(self.published)
            .with_keywords(found),
        )
    }
}
