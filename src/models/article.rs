use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    News,
    Tech,
    Academic,
    Patent,
    Manufacturer,
    TechCompany,
    Video,
}

impl SourceType {
    pub const ALL: [SourceType; 7] = [
        SourceType::News,
        SourceType::Tech,
        SourceType::Academic,
        SourceType::Patent,
        SourceType::Manufacturer,
        SourceType::TechCompany,
        SourceType::Video,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::News => "news",
            SourceType::Tech => "tech",
            SourceType::Academic => "academic",
            SourceType::Patent => "patent",
            SourceType::Manufacturer => "manufacturer",
            SourceType::TechCompany => "tech_company",
            SourceType::Video => "video",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown source type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }

    /// Unknown values read back from storage map to `Neutral`.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

/// A stored article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub url: String,
    pub source_type: SourceType,
    pub source_name: String,
    /// `YYYY-MM-DD` when the source exposed a parseable date, the raw text
    /// otherwise, empty when unknown.
    pub publish_date: String,
    pub keywords: Vec<String>,
    pub sentiment: Sentiment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A draft produced by a source adapter; it has no id until stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub url: String,
    pub source_type: SourceType,
    pub source_name: String,
    pub publish_date: String,
    pub keywords: Vec<String>,
    pub sentiment: Sentiment,
}

impl NewArticle {
    pub fn new(
        source_type: SourceType,
        source_name: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            summary: None,
            url: url.into(),
            source_type,
            source_name: source_name.into(),
            publish_date: String::new(),
            keywords: Vec::new(),
            sentiment: Sentiment::Neutral,
        }
    }

    pub fn with_publish_date(mut self, date: impl Into<String>) -> Self {
        self.publish_date = date.into();
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }
}
