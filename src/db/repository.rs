use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    Article, DailyCount, DailyStatistics, KeywordFrequency, NewArticle, Sentiment, SourceType,
    StatisticsCounts,
};

use super::schema::SCHEMA;

/// Timestamps are stored as UTC text in this layout so that lexical order is
/// time order and SQLite's date functions understand them.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const ARTICLE_COLUMNS: &str = "id, title, content, summary, url, source_type, source_name, \
     publish_date, keywords, sentiment, created_at, updated_at";

/// Rows removed by a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub articles_deleted: usize,
    pub statistics_deleted: usize,
}

/// The article store. Cloning is cheap and every clone talks to the same
/// SQLite connection thread.
#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Make every insert of `url` fail, standing in for a broken write.
    #[cfg(test)]
    pub(crate) async fn refuse_url(&self, url: &str) -> Result<()> {
        let url = url.replace('\'', "''");
        self.conn
            .call(move |conn| {
                conn.execute_batch(&format!(
                    "CREATE TRIGGER refuse_url BEFORE INSERT ON articles
                     WHEN NEW.url = '{url}'
                     BEGIN SELECT RAISE(ABORT, 'write refused'); END;"
                ))?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Article operations

    /// Insert the article, or replace every mutable field of the row that
    /// already holds its URL. Returns the row id, which is stable across
    /// replacements.
    pub async fn upsert_article(&self, article: NewArticle) -> Result<i64> {
        self.upsert_article_at(article, Utc::now()).await
    }

    pub async fn upsert_article_at(&self, article: NewArticle, now: DateTime<Utc>) -> Result<i64> {
        let keywords_json = serde_json::to_string(&article.keywords)?;
        let now = format_timestamp(now);
        let id = self
            .conn
            .call(move |conn| {
                let id: i64 = conn.query_row(
                    r#"INSERT INTO articles (title, content, summary, url, source_type, source_name,
                                             publish_date, keywords, sentiment, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                       ON CONFLICT(url) DO UPDATE SET
                           title = excluded.title,
                           content = excluded.content,
                           summary = excluded.summary,
                           source_type = excluded.source_type,
                           source_name = excluded.source_name,
                           publish_date = excluded.publish_date,
                           keywords = excluded.keywords,
                           sentiment = excluded.sentiment,
                           updated_at = excluded.updated_at
                       RETURNING id"#,
                    params![
                        article.title,
                        article.content,
                        article.summary,
                        article.url,
                        article.source_type.as_str(),
                        article.source_name,
                        article.publish_date,
                        keywords_json,
                        article.sentiment.as_str(),
                        now,
                    ],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    pub async fn get_article_by_url(&self, url: &str) -> Result<Option<Article>> {
        let url = url.to_string();
        let article = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?1"
                ))?;
                let article = stmt.query_row(params![url], article_from_row).optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    /// Articles ingested within the last `max_age_days`, newest first.
    pub async fn recent_articles(&self, max_age_days: u32, limit: usize) -> Result<Vec<Article>> {
        let cutoff = format_timestamp(days_ago(max_age_days));
        let limit = limit as i64;
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles
                     WHERE created_at >= ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2"
                ))?;
                let articles = stmt
                    .query_map(params![cutoff, limit], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn articles_by_source_type(
        &self,
        source_type: SourceType,
        limit: usize,
    ) -> Result<Vec<Article>> {
        let limit = limit as i64;
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles
                     WHERE source_type = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2"
                ))?;
                let articles = stmt
                    .query_map(params![source_type.as_str(), limit], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn article_count(&self) -> Result<i64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    // Statistics

    pub async fn update_statistics(&self, date: NaiveDate, counts: StatisticsCounts) -> Result<()> {
        let date = date.format(DATE_FORMAT).to_string();
        let now = format_timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO statistics (date, total_articles, news_count, tech_count,
                                               academic_count, patent_count, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                       ON CONFLICT(date) DO UPDATE SET
                           total_articles = excluded.total_articles,
                           news_count = excluded.news_count,
                           tech_count = excluded.tech_count,
                           academic_count = excluded.academic_count,
                           patent_count = excluded.patent_count"#,
                    params![
                        date,
                        counts.total_articles,
                        counts.news_count,
                        counts.tech_count,
                        counts.academic_count,
                        counts.patent_count,
                        now,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Statistics rows for the last `days` days, newest first.
    pub async fn statistics(&self, days: u32) -> Result<Vec<DailyStatistics>> {
        let cutoff = days_ago(days).format(DATE_FORMAT).to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, date, total_articles, news_count, tech_count, academic_count,
                              patent_count, created_at
                       FROM statistics
                       WHERE date >= ?1
                       ORDER BY date DESC"#,
                )?;
                let rows = stmt
                    .query_map(params![cutoff], statistics_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    // Keyword frequency

    /// Add one to the frequency of every entry in `keywords`. Repeated
    /// entries count once each.
    pub async fn increment_keyword_frequency(&self, keywords: Vec<String>) -> Result<()> {
        if keywords.is_empty() {
            return Ok(());
        }
        let now = format_timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        r#"INSERT INTO keywords (keyword, frequency, last_updated)
                           VALUES (?1, 1, ?2)
                           ON CONFLICT(keyword) DO UPDATE SET
                               frequency = frequency + 1,
                               last_updated = excluded.last_updated"#,
                    )?;
                    for keyword in &keywords {
                        stmt.execute(params![keyword, now])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn top_keywords(&self, limit: usize) -> Result<Vec<KeywordFrequency>> {
        let limit = limit as i64;
        let keywords = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, keyword, frequency, last_updated
                       FROM keywords
                       ORDER BY frequency DESC, keyword ASC
                       LIMIT ?1"#,
                )?;
                let keywords = stmt
                    .query_map(params![limit], keyword_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(keywords)
            })
            .await?;
        Ok(keywords)
    }

    /// Articles ingested per calendar day (UTC) over the last `days` days,
    /// newest day first.
    pub async fn daily_article_counts(&self, days: u32) -> Result<Vec<DailyCount>> {
        let cutoff = format_timestamp(days_ago(days));
        let counts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT DATE(created_at) AS day, COUNT(*)
                       FROM articles
                       WHERE created_at >= ?1
                       GROUP BY day
                       ORDER BY day DESC"#,
                )?;
                let counts = stmt
                    .query_map(params![cutoff], |row| {
                        Ok(DailyCount {
                            date: row.get(0)?,
                            count: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(counts)
            })
            .await?;
        Ok(counts)
    }

    // Retention

    /// Delete articles created more than `retention_days` ago and statistics
    /// rows dated before the same cutoff. Keyword frequencies are kept.
    pub async fn cleanup(&self, retention_days: u32) -> Result<CleanupReport> {
        self.cleanup_before(days_ago(retention_days)).await
    }

    pub async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<CleanupReport> {
        let cutoff_ts = format_timestamp(cutoff);
        let cutoff_date = cutoff.format(DATE_FORMAT).to_string();
        let report = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let articles_deleted =
                    tx.execute("DELETE FROM articles WHERE created_at < ?1", params![cutoff_ts])?;
                let statistics_deleted =
                    tx.execute("DELETE FROM statistics WHERE date < ?1", params![cutoff_date])?;
                tx.commit()?;
                Ok(CleanupReport {
                    articles_deleted,
                    statistics_deleted,
                })
            })
            .await?;
        Ok(report)
    }
}

/// `days` before now, saturating at the earliest representable instant.
fn days_ago(days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(days))
        .and_then(|span| Utc::now().checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
        return Some(naive.and_utc());
    }
    // Rows written by hand may carry RFC3339 timestamps
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, anyhow::anyhow!(message).into())
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp {raw:?}")))
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    let source_type: String = row.get(5)?;
    let keywords: String = row.get(8)?;
    let sentiment: String = row.get(9)?;

    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        summary: row.get(3)?,
        url: row.get(4)?,
        source_type: source_type
            .parse()
            .map_err(|e: String| conversion_error(5, e))?,
        source_name: row.get(6)?,
        publish_date: row.get(7)?,
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        sentiment: Sentiment::parse_lenient(&sentiment),
        created_at: timestamp_column(row, 10)?,
        updated_at: timestamp_column(row, 11)?,
    })
}

fn statistics_from_row(row: &Row) -> rusqlite::Result<DailyStatistics> {
    let date: String = row.get(1)?;
    Ok(DailyStatistics {
        id: row.get(0)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|e| conversion_error(1, e.to_string()))?,
        counts: StatisticsCounts {
            total_articles: row.get(2)?,
            news_count: row.get(3)?,
            tech_count: row.get(4)?,
            academic_count: row.get(5)?,
            patent_count: row.get(6)?,
        },
        created_at: timestamp_column(row, 7)?,
    })
}

fn keyword_from_row(row: &Row) -> rusqlite::Result<KeywordFrequency> {
    Ok(KeywordFrequency {
        id: row.get(0)?,
        keyword: row.get(1)?,
        frequency: row.get(2)?,
        last_updated: timestamp_column(row, 3)?,
    })
}
