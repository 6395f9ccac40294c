//! Plain-text rendering of stored data and run results for the CLI.

use std::fmt::Write as _;

use tracing::warn;

use crate::db::Repository;
use crate::models::{Article, DailyCount, DailyStatistics, Digest, KeywordFrequency};
use crate::scheduler::RunReport;

pub const NO_DATA: &str = "No data for this period.";

/// What the store holds for a reporting window.
#[derive(Debug, Default)]
pub struct Report {
    pub days: u32,
    pub recent: Vec<Article>,
    pub top_keywords: Vec<KeywordFrequency>,
    pub daily_counts: Vec<DailyCount>,
    pub statistics: Vec<DailyStatistics>,
}

impl Report {
    /// Read failures are logged and reported as an empty window.
    pub async fn load(repo: &Repository, days: u32, limit: usize) -> Self {
        let loaded = async {
            Ok::<_, crate::error::AppError>(Self {
                days,
                recent: repo.recent_articles(days, limit).await?,
                top_keywords: repo.top_keywords(limit).await?,
                daily_counts: repo.daily_article_counts(days).await?,
                statistics: repo.statistics(days).await?,
            })
        }
        .await;

        loaded.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load report data");
            Self {
                days,
                ..Self::default()
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty() && self.daily_counts.is_empty() && self.statistics.is_empty()
    }

    pub fn render(&self) -> String {
        if self.is_empty() {
            return NO_DATA.to_string();
        }

        let mut out = String::new();
        let _ = writeln!(out, "Last {} days", self.days);

        if !self.statistics.is_empty() {
            let _ = writeln!(out, "\nDaily runs:");
            for stat in &self.statistics {
                let c = &stat.counts;
                let _ = writeln!(
                    out,
                    "  {}  total {:>4}  news {:>3}  tech {:>3}  academic {:>3}  patent {:>3}",
                    stat.date,
                    c.total_articles,
                    c.news_count,
                    c.tech_count,
                    c.academic_count,
                    c.patent_count
                );
            }
        }

        if !self.daily_counts.is_empty() {
            let _ = writeln!(out, "\nArticles stored per day:");
            for day in &self.daily_counts {
                let _ = writeln!(out, "  {}  {}", day.date, day.count);
            }
        }

        if !self.top_keywords.is_empty() {
            let _ = writeln!(out, "\nTop keywords:");
            for kw in &self.top_keywords {
                let _ = writeln!(out, "  {:<20} {}", kw.keyword, kw.frequency);
            }
        }

        if !self.recent.is_empty() {
            let _ = writeln!(out, "\nRecent articles:");
            for article in &self.recent {
                let _ = writeln!(
                    out,
                    "  [{}] {} ({})\n      {}",
                    article.source_type, article.title, article.source_name, article.url
                );
            }
        }

        out.trim_end().to_string()
    }
}

pub fn render_digest(digest: &Digest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", digest.daily_summary);

    if !digest.hot_topics.is_empty() {
        let _ = writeln!(out, "\nHot topics:");
        for topic in &digest.hot_topics {
            let _ = writeln!(out, "  {} ({} articles)", topic.topic, topic.article_count);
            for title in &topic.sample_titles {
                let _ = writeln!(out, "    - {title}");
            }
        }
    }

    if !digest.source_distribution.is_empty() {
        let _ = writeln!(out, "\nSources:");
        for (source, count) in &digest.source_distribution {
            let _ = writeln!(out, "  {source:<24} {count}");
        }
    }

    out.trim_end().to_string()
}

pub fn render_run(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Collected {} drafts ({} unique), saved {}, failed {}",
        report.drafts, report.unique, report.saved, report.failed
    );
    for run in &report.per_adapter {
        match &run.error {
            Some(e) => {
                let _ = writeln!(out, "  {:<14} failed: {e}", run.name);
            }
            None => {
                let _ = writeln!(out, "  {:<14} {} drafts", run.name, run.drafts);
            }
        }
    }
    let _ = writeln!(out, "\n{}", render_digest(&report.digest));
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewArticle, SourceType};

    #[tokio::test]
    async fn empty_store_reports_no_data() {
        let repo = Repository::in_memory().await.unwrap();
        let report = Report::load(&repo, 7, 10).await;
        assert!(report.is_empty());
        assert_eq!(report.render(), NO_DATA);
    }

    #[tokio::test]
    async fn stored_articles_are_listed() {
        let repo = Repository::in_memory().await.unwrap();
        repo.upsert_article(
            NewArticle::new(
                SourceType::Tech,
                "Blog",
                "https://blog.test/ble",
                "Bluetooth mesh deep dive",
                "content",
            )
            .with_keywords(vec!["Bluetooth".into()]),
        )
        .await
        .unwrap();
        repo.increment_keyword_frequency(vec!["Bluetooth".into()])
            .await
            .unwrap();

        let text = Report::load(&repo, 7, 10).await.render();
        assert!(text.starts_with("Last 7 days"));
        assert!(text.contains("[tech] Bluetooth mesh deep dive (Blog)"));
        assert!(text.contains("https://blog.test/ble"));
        assert!(text.contains("Top keywords:"));
    }

    #[test]
    fn digest_lists_hot_topics() {
        let articles: Vec<NewArticle> = (0..2)
            .map(|i| {
                NewArticle::new(
                    SourceType::News,
                    "Wire",
                    format!("https://w.test/{i}"),
                    format!("Bluetooth item {i}"),
                    "c",
                )
            })
            .collect();
        let digest = Digest::fallback(&articles, &["Bluetooth".to_string()]);

        let text = render_digest(&digest);
        assert!(text.starts_with("Collected 2 articles today."));
        assert!(text.contains("Bluetooth (2 articles)"));
        assert!(text.contains("    - Bluetooth item 1"));
        assert!(text.contains("Wire"));
    }
}
