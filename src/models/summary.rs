use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The digest of one crawl run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub daily_summary: String,
    /// Keyword occurrence counts across the run, most frequent first.
    pub keyword_analysis: Vec<(String, usize)>,
    pub trend_analysis: TrendAnalysis,
    pub hot_topics: Vec<HotTopic>,
    /// Articles per source name, most frequent first.
    pub source_distribution: Vec<(String, usize)>,
    pub total_articles: usize,
    pub origin: DigestOrigin,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub source_types: BTreeMap<String, usize>,
    /// Top 10 keywords by article count.
    pub keyword_trends: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotTopic {
    pub topic: String,
    pub article_count: usize,
    pub sample_titles: Vec<String>,
}

/// Where the `daily_summary` text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DigestOrigin {
    Generated,
    #[default]
    Template,
}
