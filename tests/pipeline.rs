use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tech_digest::adapters::NewsAdapter;
use tech_digest::fetcher::{Transport, TransportError};
use tech_digest::models::DigestOrigin;
use tech_digest::{
    AdapterContext, AppError, Config, Digest, DigestGenerator, Fetcher, NewArticle, Repository,
    RetryPolicy, Scheduler, SourceAdapter, SourceType, TemplateDigest,
};

fn config() -> Config {
    Config::from_toml(
        r#"
        keywords = ["Bluetooth", "蓝牙"]
        retention_days = 30
        "#,
    )
    .unwrap()
}

fn draft(url: &str, title: &str, keywords: &[&str]) -> NewArticle {
    NewArticle::new(
        SourceType::News,
        "Wire",
        url,
        title,
        format!("{title}. {}", "Details about the release. ".repeat(5)),
    )
    .with_keywords(keywords.iter().map(|k| k.to_string()).collect())
}

struct Fixed {
    name: &'static str,
    drafts: Vec<NewArticle>,
    calls: AtomicUsize,
}

impl Fixed {
    fn new(name: &'static str, drafts: Vec<NewArticle>) -> Self {
        Self {
            name,
            drafts,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceAdapter for Fixed {
    fn name(&self) -> &str {
        self.name
    }

    async fn crawl(&self, _keywords: &[String]) -> anyhow::Result<Vec<NewArticle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.drafts.clone())
    }
}

struct Broken;

#[async_trait]
impl SourceAdapter for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn crawl(&self, _keywords: &[String]) -> anyhow::Result<Vec<NewArticle>> {
        anyhow::bail!("upstream layout changed")
    }
}

struct Panicking;

#[async_trait]
impl SourceAdapter for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn crawl(&self, _keywords: &[String]) -> anyhow::Result<Vec<NewArticle>> {
        panic!("index out of range in parser")
    }
}

struct FailingDigest;

#[async_trait]
impl DigestGenerator for FailingDigest {
    async fn summarize(&self, _articles: &[NewArticle]) -> tech_digest::Result<Digest> {
        Err(AppError::DigestApi("service unavailable".into()))
    }
}

/// Records how many drafts it was handed.
struct CountingDigest {
    seen: AtomicUsize,
}

#[async_trait]
impl DigestGenerator for CountingDigest {
    async fn summarize(&self, articles: &[NewArticle]) -> tech_digest::Result<Digest> {
        self.seen.store(articles.len(), Ordering::SeqCst);
        Ok(Digest::fallback(articles, &[]))
    }
}

async fn scheduler_with(
    adapters: Vec<Arc<dyn SourceAdapter>>,
    digest: Arc<dyn DigestGenerator>,
) -> (Scheduler, Repository) {
    let repo = Repository::in_memory().await.unwrap();
    let scheduler = Scheduler::new(&config(), repo.clone(), adapters, digest).unwrap();
    (scheduler, repo)
}

#[tokio::test]
async fn failing_adapters_do_not_stop_the_run() {
    let good = Arc::new(Fixed::new(
        "good",
        vec![draft("https://w.test/1", "Bluetooth 6.0 announced", &["Bluetooth"])],
    ));
    let (scheduler, repo) = scheduler_with(
        vec![
            Arc::new(Broken),
            Arc::new(Panicking),
            good.clone(),
        ],
        Arc::new(TemplateDigest::new(config().keywords)),
    )
    .await;

    let report = scheduler.run_once().await;

    assert_eq!(good.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.saved, 1);
    assert_eq!(report.per_adapter.len(), 3);
    assert_eq!(report.per_adapter[0].drafts, 0);
    assert!(report.per_adapter[0]
        .error
        .as_deref()
        .unwrap()
        .contains("upstream layout changed"));
    assert_eq!(report.per_adapter[1].drafts, 0);
    assert!(report.per_adapter[1]
        .error
        .as_deref()
        .unwrap()
        .contains("index out of range"));
    assert_eq!(report.per_adapter[2].drafts, 1);
    assert!(report.per_adapter[2].error.is_none());

    assert!(repo
        .get_article_by_url("https://w.test/1")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn duplicate_urls_are_stored_once_and_counted_once() {
    let first = Arc::new(Fixed::new(
        "first",
        vec![
            draft("https://w.test/a", "Bluetooth LE Audio arrives", &["Bluetooth"]),
            draft("https://w.test/b", "蓝牙 芯片 出货量 增长", &["蓝牙"]),
        ],
    ));
    let second = Arc::new(Fixed::new(
        "second",
        vec![draft(
            "https://w.test/a",
            "Bluetooth LE Audio arrives (updated)",
            &["Bluetooth"],
        )],
    ));
    let digest = Arc::new(CountingDigest {
        seen: AtomicUsize::new(0),
    });
    let (scheduler, repo) = scheduler_with(vec![first, second], digest.clone()).await;

    let report = scheduler.run_once().await;

    assert_eq!(report.drafts, 3);
    assert_eq!(report.unique, 2);
    assert_eq!(digest.seen.load(Ordering::SeqCst), 3);
    assert_eq!(repo.article_count().await.unwrap(), 2);

    let stored = repo
        .get_article_by_url("https://w.test/a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "Bluetooth LE Audio arrives (updated)");

    let stats = repo.statistics(1).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].counts.total_articles, 2);
    assert_eq!(stats[0].counts.news_count, 2);

    let keywords: HashMap<String, i64> = repo
        .top_keywords(10)
        .await
        .unwrap()
        .into_iter()
        .map(|k| (k.keyword, k.frequency))
        .collect();
    assert_eq!(keywords["Bluetooth"], 1);
    assert_eq!(keywords["蓝牙"], 1);
}

#[tokio::test]
async fn second_run_same_day_replaces_the_statistics_row() {
    let adapter = Arc::new(Fixed::new(
        "fixed",
        vec![draft("https://w.test/a", "Bluetooth LE Audio arrives", &["Bluetooth"])],
    ));
    let (scheduler, repo) = scheduler_with(
        vec![adapter],
        Arc::new(TemplateDigest::new(config().keywords)),
    )
    .await;

    scheduler.run_once().await;
    scheduler.run_once().await;

    let stats = repo.statistics(1).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].counts.total_articles, 1);
    assert_eq!(repo.article_count().await.unwrap(), 1);
    // frequencies accumulate across runs
    assert_eq!(repo.top_keywords(1).await.unwrap()[0].frequency, 2);
}

#[tokio::test]
async fn digest_failure_falls_back_to_template() {
    let adapter = Arc::new(Fixed::new(
        "fixed",
        vec![
            draft("https://w.test/a", "Bluetooth trackers compared", &["Bluetooth"]),
            draft("https://w.test/b", "Bluetooth speakers compared", &["Bluetooth"]),
        ],
    ));
    let (scheduler, repo) = scheduler_with(vec![adapter], Arc::new(FailingDigest)).await;

    let report = scheduler.run_once().await;

    assert_eq!(report.digest.origin, DigestOrigin::Template);
    assert!(report
        .digest
        .daily_summary
        .starts_with("Collected 2 articles today."));
    assert_eq!(report.digest.hot_topics[0].topic, "Bluetooth");
    assert_eq!(repo.article_count().await.unwrap(), 2);
}

#[tokio::test]
async fn cleanup_runs_through_the_scheduler() {
    let (scheduler, repo) =
        scheduler_with(vec![], Arc::new(TemplateDigest::new(config().keywords))).await;

    let old = chrono::Utc::now() - chrono::Duration::days(31);
    repo.upsert_article_at(draft("https://w.test/old", "Bluetooth history", &[]), old)
        .await
        .unwrap();
    repo.upsert_article(draft("https://w.test/new", "Bluetooth today", &[]))
        .await
        .unwrap();

    let report = scheduler.run_cleanup().await.unwrap();

    assert_eq!(report.articles_deleted, 1);
    assert_eq!(repo.article_count().await.unwrap(), 1);
}

/// Canned pages keyed by URL, counting requests.
#[derive(Default)]
struct Pages {
    pages: HashMap<String, String>,
    requests: AtomicUsize,
}

#[async_trait]
impl Transport for Pages {
    async fn get(&self, url: &str) -> Result<String, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .cloned()
            .ok_or(TransportError::Connect("connection refused".into()))
    }
}

#[tokio::test]
async fn feed_to_store_without_network() {
    let feed = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Radio Weekly</title><link>https://radio.test/</link>
<description>d</description>
<item><title>Bluetooth Auracast broadcast explained</title><link>https://radio.test/auracast</link>
<description>Broadcast audio.</description></item>
<item><title>Bluetooth item on a dead host</title><link>https://dead.test/x</link>
<description>Gone.</description></item>
</channel></rss>"#;
    let article = format!(
        "<html><body><h1>Auracast</h1><article>{}</article></body></html>",
        "Auracast lets one Bluetooth source stream to many sinks. ".repeat(4)
    );

    let mut pages = Pages::default();
    pages
        .pages
        .insert("https://radio.test/feed".into(), feed.to_string());
    pages
        .pages
        .insert("https://radio.test/auracast".into(), article);
    let pages = Arc::new(pages);

    let fetcher = Arc::new(Fetcher::new(pages.clone(), RetryPolicy::immediate(3)));
    let ctx = AdapterContext::new(fetcher, Duration::ZERO, 2);
    let news = NewsAdapter::new(ctx, vec!["https://radio.test/feed".into()], vec![]);

    let (scheduler, repo) = scheduler_with(
        vec![Arc::new(news)],
        Arc::new(TemplateDigest::new(config().keywords)),
    )
    .await;
    let report = scheduler.run_once().await;

    // the dead article falls back to a two-word summary and is rejected
    assert_eq!(report.saved, 1);
    // feed once, article once, dead host three times
    assert_eq!(pages.requests.load(Ordering::SeqCst), 5);

    let stored = repo
        .get_article_by_url("https://radio.test/auracast")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.source_name, "Radio Weekly");
    assert_eq!(stored.keywords, vec!["Bluetooth".to_string()]);
}
