//! Source adapters. Each adapter turns one family of upstream sources into
//! validated [`NewArticle`] drafts for the configured keywords.
//!
//! Adapters never see the store. A failing URL is skipped and logged, and a
//! failing adapter only loses its own drafts; the scheduler keeps going.

pub mod academic;
pub mod extract;
pub mod manufacturer;
pub mod news;
pub mod tech;
pub mod video;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::models::{NewArticle, SourceType};
use crate::validator::Validator;

use self::extract::{clean_url, extract_article, extract_keywords, find_links, ExtractProfile};

pub use academic::AcademicAdapter;
pub use manufacturer::ManufacturerAdapter;
pub use news::NewsAdapter;
pub use tech::TechAdapter;
pub use video::VideoAdapter;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short identifier used in logs and run reports.
    fn name(&self) -> &str;

    /// Collect drafts mentioning any of `keywords`. Every returned draft has
    /// already passed validation.
    async fn crawl(&self, keywords: &[String]) -> anyhow::Result<Vec<NewArticle>>;
}

/// What every adapter needs to talk to the network politely.
///
/// Clones share one request gate, so request starts stay `request_delay`
/// apart no matter how many fetches are in flight.
#[derive(Clone)]
pub struct AdapterContext {
    pub fetcher: Arc<Fetcher>,
    pub request_delay: Duration,
    pub max_concurrent: usize,
    next_request: Arc<Mutex<Option<Instant>>>,
}

impl AdapterContext {
    pub fn new(fetcher: Arc<Fetcher>, request_delay: Duration, max_concurrent: usize) -> Self {
        Self {
            fetcher,
            request_delay,
            max_concurrent: max_concurrent.max(1),
            next_request: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_config(config: &Config, fetcher: Arc<Fetcher>) -> Self {
        Self::new(
            fetcher,
            config.request_delay(),
            config.http.max_concurrent_requests,
        )
    }

    /// Claim the next request slot and wait for it.
    async fn pause(&self) {
        if self.request_delay.is_zero() {
            return;
        }
        let slot = {
            let mut next = self.next_request.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |at| at.max(now));
            *next = Some(slot + self.request_delay);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }

    /// Fetch one page once its politeness slot comes up.
    pub async fn fetch(&self, url: &str) -> Option<String> {
        self.pause().await;
        self.fetcher.fetch(url).await
    }

    /// Fetch several pages with at most `max_concurrent` in flight. Results
    /// come back in input order.
    pub async fn fetch_all(&self, urls: Vec<String>) -> Vec<(String, Option<String>)> {
        stream::iter(urls)
            .map(|url| async move {
                let body = self.fetch(&url).await;
                (url, body)
            })
            .buffered(self.max_concurrent)
            .collect()
            .await
    }

    /// Fetch a search page, follow up to `target.limit` result links and
    /// read each result with `target.parse`.
    pub async fn crawl_search(
        &self,
        target: SearchTarget<'_>,
        keywords: &[String],
        harvest: &mut Harvest,
    ) {
        let Some(results) = self.fetch(&target.search_url).await else {
            harvest.record(Candidate::skip(&target.search_url, SkipReason::Unreachable));
            return;
        };

        let links: Vec<String> = find_links(&results, &target.search_url, target.link_selectors)
            .into_iter()
            .map(|l| clean_url(&l))
            .take(target.limit)
            .collect();

        for (link, page) in self.fetch_all(links).await {
            let candidate = match page.as_deref().map(target.parse) {
                None => Candidate::skip(&link, SkipReason::Unreachable),
                Some(None) => Candidate::skip(&link, SkipReason::MissingFields),
                Some(Some(parsed)) => {
                    parsed.into_candidate(&link, target.source_type, target.source_name, keywords)
                }
            };
            harvest.record(candidate);
        }
    }
}

/// A search results page and how to read the pages it links to.
pub struct SearchTarget<'a> {
    pub search_url: String,
    pub link_selectors: &'a [&'a str],
    pub limit: usize,
    pub parse: fn(&str) -> Option<ParsedPage>,
    pub source_type: SourceType,
    pub source_name: &'a str,
}

/// A result page reduced to what a draft needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    pub title: String,
    pub content: String,
    pub publish_date: String,
}

impl ParsedPage {
    pub fn into_candidate(
        self,
        url: &str,
        source_type: SourceType,
        source_name: &str,
        keywords: &[String],
    ) -> Candidate {
        if self.title.is_empty() || self.content.is_empty() {
            return Candidate::skip(url, SkipReason::MissingFields);
        }
        let found = extract_keywords(&format!("{} {}", self.title, self.content), keywords);
        Candidate::Draft(
            NewArticle::new(source_type, source_name, url, self.title, self.content)
                .with_publish_date(self.publish_date)
                .with_keywords(found),
        )
    }
}

/// Why a URL produced no draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Every fetch attempt failed.
    Unreachable,
    /// The body could not be understood.
    Malformed(String),
    /// Parsed fine, but no title or no content.
    MissingFields,
}

/// Outcome of turning one URL into a draft.
#[derive(Debug, Clone)]
pub enum Candidate {
    Draft(NewArticle),
    Skip { url: String, reason: SkipReason },
}

impl Candidate {
    pub fn skip(url: impl Into<String>, reason: SkipReason) -> Self {
        Candidate::Skip {
            url: url.into(),
            reason,
        }
    }

    /// Draft from a fetched article page. `page` is `None` when the fetch
    /// failed.
    pub fn from_page(
        url: &str,
        page: Option<&str>,
        source_type: SourceType,
        source_name: &str,
        profile: &ExtractProfile,
        keywords: &[String],
    ) -> Self {
        let Some(html) = page else {
            return Candidate::skip(url, SkipReason::Unreachable);
        };

        let fields = extract_article(html, profile);
        ParsedPage {
            title: fields.title,
            content: fields.content,
            publish_date: fields.publish_date,
        }
        .into_candidate(url, source_type, source_name, keywords)
    }
}

/// Collects the drafts of one adapter run, validating each and counting
/// what was dropped.
pub struct Harvest {
    source: String,
    validator: Validator,
    drafts: Vec<NewArticle>,
    skipped: usize,
    rejected: usize,
}

impl Harvest {
    pub fn new(source: impl Into<String>, validator: Validator) -> Self {
        Self {
            source: source.into(),
            validator,
            drafts: Vec::new(),
            skipped: 0,
            rejected: 0,
        }
    }

    /// Returns `true` when the candidate was kept.
    pub fn record(&mut self, candidate: Candidate) -> bool {
        match candidate {
            Candidate::Draft(draft) => {
                if self.validator.is_valid(&draft.title, &draft.content) {
                    self.drafts.push(draft);
                    true
                } else {
                    debug!(source = %self.source, url = %draft.url, "Draft rejected by validator");
                    self.rejected += 1;
                    false
                }
            }
            Candidate::Skip { url, reason } => {
                match &reason {
                    SkipReason::Malformed(detail) => {
                        warn!(source = %self.source, %url, error = %detail, "Skipping malformed page")
                    }
                    other => debug!(source = %self.source, %url, reason = ?other, "Skipping URL"),
                }
                self.skipped += 1;
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn into_drafts(self) -> Vec<NewArticle> {
        info!(
            source = %self.source,
            drafts = self.drafts.len(),
            skipped = self.skipped,
            rejected = self.rejected,
            "Adapter finished"
        );
        self.drafts
    }
}

/// The adapters a scheduled run walks through, in order.
pub fn default_adapters(config: &Config, ctx: &AdapterContext) -> Vec<Arc<dyn SourceAdapter>> {
    let sources = &config.sources;
    vec![
        Arc::new(NewsAdapter::new(
            ctx.clone(),
            sources.news_feeds.clone(),
            sources.news_sites.clone(),
        )),
        Arc::new(TechAdapter::new(ctx.clone(), sources.tech_blogs.clone())),
        Arc::new(AcademicAdapter::new(ctx.clone())),
        Arc::new(ManufacturerAdapter::manufacturers(
            ctx.clone(),
            sources.manufacturer_sites.clone(),
        )),
        Arc::new(ManufacturerAdapter::tech_companies(
            ctx.clone(),
            sources.tech_company_sites.clone(),
        )),
        Arc::new(VideoAdapter::new(ctx.clone(), sources.video_search.clone())),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    //! A canned-page transport for adapter tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::fetcher::{RetryPolicy, Transport, TransportError};

    #[derive(Default)]
    pub struct StaticPages {
        pages: HashMap<String, String>,
        pub requests: Mutex<Vec<String>>,
    }

    impl StaticPages {
        pub fn with(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for StaticPages {
        async fn get(&self, url: &str) -> Result<String, TransportError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or(TransportError::Status(404))
        }
    }

    pub fn context(pages: Arc<StaticPages>) -> AdapterContext {
        let fetcher = Fetcher::new(pages, RetryPolicy::immediate(1));
        AdapterContext::new(Arc::new(fetcher), Duration::ZERO, 4)
    }

    pub fn keywords() -> Vec<String> {
        vec!["Bluetooth".to_string(), "蓝牙".to_string()]
    }

    pub fn long_text(prefix: &str) -> String {
        format!("{prefix} {}", "Low energy audio and mesh networking. ".repeat(6))
    }
}
