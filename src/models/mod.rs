mod article;
mod statistics;
mod summary;

pub use article::{Article, NewArticle, Sentiment, SourceType};
pub use statistics::{DailyCount, DailyStatistics, KeywordFrequency, StatisticsCounts};
pub use summary::{Digest, DigestOrigin, HotTopic, TrendAnalysis};
