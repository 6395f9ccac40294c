use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Digest, DigestOrigin, HotTopic, NewArticle, TrendAnalysis};

const TOP_KEYWORDS: usize = 10;
const HOT_TOPIC_MIN_ARTICLES: usize = 2;
const HOT_TOPIC_SAMPLES: usize = 5;

/// Produces the digest of one crawl run.
#[async_trait]
pub trait DigestGenerator: Send + Sync {
    async fn summarize(&self, articles: &[NewArticle]) -> Result<Digest>;
}

/// The template digest, for runs without a text-generation service.
pub struct TemplateDigest {
    keywords: Vec<String>,
}

impl TemplateDigest {
    pub fn new(keywords: Vec<String>) -> Self {
        Self { keywords }
    }
}

#[async_trait]
impl DigestGenerator for TemplateDigest {
    async fn summarize(&self, articles: &[NewArticle]) -> Result<Digest> {
        Ok(Digest::fallback(articles, &self.keywords))
    }
}

fn ranked<K: Ord>(counts: HashMap<K, usize>) -> Vec<(K, usize)> {
    let mut ranked: Vec<(K, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

impl Digest {
    /// Everything except the summary text, computed from the drafts alone.
    pub fn analyze(articles: &[NewArticle], keywords: &[String]) -> Self {
        let mut keyword_counts: HashMap<String, usize> = HashMap::new();
        let mut source_types: BTreeMap<String, usize> = BTreeMap::new();
        let mut sources: HashMap<String, usize> = HashMap::new();

        for article in articles {
            for keyword in &article.keywords {
                *keyword_counts.entry(keyword.clone()).or_default() += 1;
            }
            *source_types
                .entry(article.source_type.as_str().to_string())
                .or_default() += 1;
            *sources.entry(article.source_name.clone()).or_default() += 1;
        }

        let keyword_analysis = ranked(keyword_counts);
        let keyword_trends = keyword_analysis.iter().take(TOP_KEYWORDS).cloned().collect();

        Self {
            daily_summary: String::new(),
            keyword_analysis,
            trend_analysis: TrendAnalysis {
                source_types,
                keyword_trends,
            },
            hot_topics: hot_topics(articles, keywords),
            source_distribution: ranked(sources),
            total_articles: articles.len(),
            origin: DigestOrigin::Template,
        }
    }

    /// Deterministic digest: counts per source type and the top keywords.
    pub fn fallback(articles: &[NewArticle], keywords: &[String]) -> Self {
        let mut digest = Self::analyze(articles, keywords);
        digest.daily_summary = digest.template_summary();
        digest
    }

    fn template_summary(&self) -> String {
        if self.total_articles == 0 {
            return "No articles were collected today.".to_string();
        }

        let mut lines = vec![format!(
            "Collected {} article{} today.",
            self.total_articles,
            if self.total_articles == 1 { "" } else { "s" }
        )];

        let by_type = self
            .trend_analysis
            .source_types
            .iter()
            .map(|(t, n)| format!("{t} {n}"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("By source type: {by_type}."));

        if !self.trend_analysis.keyword_trends.is_empty() {
            let top = self
                .trend_analysis
                .keyword_trends
                .iter()
                .map(|(k, n)| format!("{k} ({n})"))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("Top keywords: {top}."));
        }

        lines.join("\n")
    }
}

/// Articles grouped by the first configured keyword found in their title.
fn hot_topics(articles: &[NewArticle], keywords: &[String]) -> Vec<HotTopic> {
    let lowered: Vec<(String, &String)> = keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .map(|k| (k.trim().to_lowercase(), k))
        .collect();

    let mut groups: Vec<(String, Vec<&NewArticle>)> = Vec::new();
    for article in articles {
        let title = article.title.to_lowercase();
        let Some((_, keyword)) = lowered.iter().find(|(needle, _)| title.contains(needle.as_str()))
        else {
            continue;
        };
        match groups.iter_mut().find(|(topic, _)| topic.as_str() == keyword.as_str()) {
            Some((_, members)) => members.push(article),
            None => groups.push((keyword.to_string(), vec![article])),
        }
    }

    let mut topics: Vec<HotTopic> = groups
        .into_iter()
        .filter(|(_, members)| members.len() >= HOT_TOPIC_MIN_ARTICLES)
        .map(|(topic, members)| HotTopic {
            topic,
            article_count: members.len(),
            sample_titles: members
                .iter()
                .take(HOT_TOPIC_SAMPLES)
                .map(|a| a.title.clone())
                .collect(),
        })
        .collect();
    // stable: equal counts keep first-seen order
    topics.sort_by(|a, b| b.article_count.cmp(&a.article_count));
    topics
}
