use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{NewArticle, SourceType};

/// Per-run article counts written into the `statistics` table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsCounts {
    pub total_articles: i64,
    pub news_count: i64,
    pub tech_count: i64,
    pub academic_count: i64,
    pub patent_count: i64,
}

impl StatisticsCounts {
    pub fn from_articles(articles: &[NewArticle]) -> Self {
        let count = |t: SourceType| articles.iter().filter(|a| a.source_type == t).count() as i64;
        Self {
            total_articles: articles.len() as i64,
            news_count: count(SourceType::News),
            tech_count: count(SourceType::Tech),
            academic_count: count(SourceType::Academic),
            patent_count: count(SourceType::Patent),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStatistics {
    pub id: i64,
    pub date: NaiveDate,
    pub counts: StatisticsCounts,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordFrequency {
    pub id: i64,
    pub keyword: String,
    pub frequency: i64,
    pub last_updated: DateTime<Utc>,
}

/// Number of articles ingested on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_split_by_source_type() {
        let draft = |t| NewArticle::new(t, "src", "https://example.test", "title", "content");
        let articles = vec![
            draft(SourceType::News),
            draft(SourceType::News),
            draft(SourceType::Tech),
            draft(SourceType::Patent),
            draft(SourceType::Video),
        ];

        let counts = StatisticsCounts::from_articles(&articles);
        assert_eq!(counts.total_articles, 5);
        assert_eq!(counts.news_count, 2);
        assert_eq!(counts.tech_count, 1);
        assert_eq!(counts.academic_count, 0);
        assert_eq!(counts.patent_count, 1);
    }
}
