use async_trait::async_trait;
use feed_rs::parser;
use scraper::Html;

use super::extract::{collapse_whitespace, html_to_plain, parse_date, select_all_text, select_text};
use super::{AdapterContext, Candidate, Harvest, ParsedPage, SearchTarget, SkipReason, SourceAdapter};
use crate::models::{NewArticle, SourceType};
use crate::validator::Validator;

const ARXIV_KEYWORDS: usize = 5;
const ARXIV_RESULTS_PER_KEYWORD: usize = 20;
const PATENT_KEYWORDS: usize = 3;
const PATENTS_PER_KEYWORD: usize = 10;
const IEEE_KEYWORDS: usize = 3;
const IEEE_PAPERS_PER_KEYWORD: usize = 10;
const MAX_AUTHORS: usize = 10;

/// arXiv preprints, Google Patents and IEEE Xplore papers.
pub struct AcademicAdapter {
    ctx: AdapterContext,
    arxiv_api: String,
}

impl AcademicAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self::with_arxiv_api(ctx, "http://export.arxiv.org/api/query")
    }

    pub fn with_arxiv_api(ctx: AdapterContext, arxiv_api: impl Into<String>) -> Self {
        Self {
            ctx,
            arxiv_api: arxiv_api.into(),
        }
    }

    fn arxiv_query(&self, keyword: &str) -> String {
        format!(
            "{}?search_query=all:{}&start=0&max_results={}&sortBy=submittedDate&sortOrder=descending",
            self.arxiv_api,
            urlencoding::encode(keyword),
            ARXIV_RESULTS_PER_KEYWORD
        )
    }

    async fn crawl_arxiv(&self, keyword: &str, keywords: &[String], harvest: &mut Harvest) {
        let query = self.arxiv_query(keyword);
        let Some(body) = self.ctx.fetch(&query).await else {
            harvest.record(Candidate::skip(query, SkipReason::Unreachable));
            return;
        };

        match parse_arxiv(&body) {
            Ok(papers) => {
                for (url, paper) in papers {
                    harvest.record(paper.into_candidate(
                        &url,
                        SourceType::Academic,
                        "arXiv",
                        keywords,
                    ));
                }
            }
            Err(e) => {
                harvest.record(Candidate::skip(query, SkipReason::Malformed(e.to_string())));
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for AcademicAdapter {
    fn name(&self) -> &str {
        "academic"
    }

    async fn crawl(&self, keywords: &[String]) -> anyhow::Result<Vec<NewArticle>> {
        let mut harvest = Harvest::new(self.name(), Validator::article(keywords));

        for keyword in keywords.iter().take(ARXIV_KEYWORDS) {
            self.crawl_arxiv(keyword, keywords, &mut harvest).await;
        }

        for keyword in keywords.iter().take(PATENT_KEYWORDS) {
            let target = SearchTarget {
                search_url: format!(
                    "https://patents.google.com/?q={}&language=ENGLISH",
                    urlencoding::encode(keyword)
                ),
                link_selectors: &["a[href*=\"/patent/\"]"],
                limit: PATENTS_PER_KEYWORD,
                parse: parse_patent,
                source_type: SourceType::Patent,
                source_name: "Google Patents",
            };
            self.ctx.crawl_search(target, keywords, &mut harvest).await;
        }

        for keyword in keywords.iter().take(IEEE_KEYWORDS) {
            let target = SearchTarget {
                search_url: format!(
                    "https://ieeexplore.ieee.org/search/searchresult.jsp?queryText={}",
                    urlencoding::encode(keyword)
                ),
                link_selectors: &["a[href*=\"/document/\"]"],
                limit: IEEE_PAPERS_PER_KEYWORD,
                parse: parse_ieee_paper,
                source_type: SourceType::Academic,
                source_name: "IEEE Xplore",
            };
            self.ctx.crawl_search(target, keywords, &mut harvest).await;
        }

        Ok(harvest.into_drafts())
    }
}

/// Papers from an arXiv API Atom response, keyed by their abstract page URL.
fn parse_arxiv(body: &str) -> Result<Vec<(String, ParsedPage)>, parser::ParseFeedError> {
    let feed = parser::parse(body.as_bytes())?;

    let papers = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry
                .links
                .iter()
                .find(|l| l.rel.as_deref() == Some("alternate"))
                .or_else(|| entry.links.first())
                .map(|l| l.href.clone())
                .unwrap_or_else(|| entry.id.clone());
            if url.is_empty() {
                return None;
            }

            let title = collapse_whitespace(&entry.title?.content);
            let abstract_text = entry
                .summary
                .map(|s| html_to_plain(&s.content))
                .unwrap_or_default();
            let authors = entry
                .authors
                .iter()
                .take(MAX_AUTHORS)
                .map(|a| a.name.trim().to_string())
                .collect::<Vec<_>>()
                .join(", ");

            let mut content = format!("Abstract: {abstract_text}");
            if !authors.is_empty() {
                content.push_str(&format!("\n\nAuthors: {authors}"));
            }

            Some((
                url,
                ParsedPage {
                    title,
                    content,
                    publish_date: entry
                        .published
                        .map(|d| d.date_naive().to_string())
                        .unwrap_or_default(),
                },
            ))
        })
        .collect();

    Ok(papers)
}

fn parse_patent(html: &str) -> Option<ParsedPage> {
    let document = Html::parse_document(html);

    let title = select_text(
        &document,
        &["span[itemprop=\"title\"]", "meta[name=\"DC.title\"]", "h1"],
    )?;
    let abstract_text = select_text(
        &document,
        &["section[itemprop=\"abstract\"] .abstract", "div.abstract", "section[itemprop=\"abstract\"]"],
    )?;

    let mut content = format!("Abstract: {abstract_text}");
    if let Some(assignee) = select_text(
        &document,
        &["dd[itemprop=\"assigneeOriginal\"]", "span[itemprop=\"assignee\"]"],
    ) {
        content.push_str(&format!("\n\nAssignee: {assignee}"));
    }
    let inventors = select_all_text(&document, "dd[itemprop=\"inventor\"]", MAX_AUTHORS);
    if !inventors.is_empty() {
        content.push_str(&format!("\n\nInventors: {}", inventors.join(", ")));
    }

    let publish_date = select_text(
        &document,
        &["time[itemprop=\"filingDate\"]", "time[itemprop=\"publicationDate\"]"],
    )
    .map(|d| parse_date(&d))
    .unwrap_or_default();

    Some(ParsedPage {
        title: format!("Patent: {title}"),
        content,
        publish_date,
    })
}

fn parse_ieee_paper(html: &str) -> Option<ParsedPage> {
    let document = Html::parse_document(html);

    let title = select_text(
        &document,
        &["h1.document-title", "meta[property=\"og:title\"]", "h1"],
    )?;
    let abstract_text = select_text(
        &document,
        &["div.abstract-text", "meta[property=\"og:description\"]"],
    )?;

    let mut content = format!("Abstract: {abstract_text}");
    let authors = select_all_text(&document, ".authors-info a", MAX_AUTHORS);
    if !authors.is_empty() {
        content.push_str(&format!("\n\nAuthors: {}", authors.join(", ")));
    }

    let publish_date = select_text(&document, &[".doc-abstract-pubdate", ".doc-abstract-confdate"])
        .map(|d| parse_date(d.trim_start_matches("Date of Publication:").trim()))
        .unwrap_or_default();

    Some(ParsedPage {
        title: format!("IEEE: {title}"),
        content,
        publish_date,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testing::{context, keywords, StaticPages};
    use super::*;

    const ARXIV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query</title>
  <id>http://arxiv.org/api/query</id>
  <updated>2024-03-01T00:00:00Z</updated>
  <entry>
    <id>http://arxiv.org/abs/2403.00001v1</id>
    <updated>2024-03-01T00:00:00Z</updated>
    <published>2024-02-28T18:00:00Z</published>
    <title>Energy-Efficient Bluetooth Low Energy
      Advertising for Dense Deployments</title>
    <summary>We study Bluetooth Low Energy advertising under heavy contention and propose an
      adaptive interval scheme that halves collisions in dense deployments.</summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/2403.00001v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2403.00001v1" rel="related" type="application/pdf"/>
  </entry>
</feed>"#;

    #[test]
    fn arxiv_entries_become_papers() {
        let papers = parse_arxiv(ARXIV).unwrap();
        assert_eq!(papers.len(), 1);

        let (url, paper) = &papers[0];
        assert_eq!(url, "http://arxiv.org/abs/2403.00001v1");
        assert_eq!(
            paper.title,
            "Energy-Efficient Bluetooth Low Energy Advertising for Dense Deployments"
        );
        assert!(paper.content.starts_with("Abstract: We study Bluetooth"));
        assert!(paper.content.ends_with("Authors: Ada Lovelace, Alan Turing"));
        assert_eq!(paper.publish_date, "2024-02-28");
    }

    #[test]
    fn patent_page_is_parsed() {
        let html = r#"<html><body>
            <span itemprop="title">Low latency Bluetooth audio relay</span>
            <section itemprop="abstract"><div class="abstract">A relay node forwards isochronous audio.</div></section>
            <dd itemprop="assigneeOriginal">Acme Audio Inc</dd>
            <dd itemprop="inventor">Jane Roe</dd>
            <dd itemprop="inventor">John Doe</dd>
            <time itemprop="filingDate" datetime="2022-07-19">2022-07-19</time>
        </body></html>"#;

        let page = parse_patent(html).unwrap();
        assert_eq!(page.title, "Patent: Low latency Bluetooth audio relay");
        assert_eq!(
            page.content,
            "Abstract: A relay node forwards isochronous audio.\n\n\
             Assignee: Acme Audio Inc\n\nInventors: Jane Roe, John Doe"
        );
        assert_eq!(page.publish_date, "2022-07-19");
        assert!(parse_patent("<html><body><h1>No abstract</h1></body></html>").is_none());
    }

    #[test]
    fn ieee_page_is_parsed() {
        let html = r#"<html><body>
            <h1 class="document-title">Bluetooth Channel Sounding Accuracy</h1>
            <div class="authors-info"><a href="/author/1">R. Kim</a></div>
            <div class="abstract-text">We measure ranging error.</div>
            <div class="doc-abstract-pubdate">Date of Publication: 12 March 2024</div>
        </body></html>"#;

        let page = parse_ieee_paper(html).unwrap();
        assert_eq!(page.title, "IEEE: Bluetooth Channel Sounding Accuracy");
        assert_eq!(page.content, "Abstract: We measure ranging error.\n\nAuthors: R. Kim");
        assert_eq!(page.publish_date, "2024-03-12");
    }

    #[tokio::test]
    async fn arxiv_results_are_academic_drafts() {
        let pages = Arc::new(StaticPages::default().with(
            "http://arxiv.test/api?search_query=all:Bluetooth&start=0&max_results=20&sortBy=submittedDate&sortOrder=descending",
            ARXIV,
        ));
        let adapter = AcademicAdapter::with_arxiv_api(context(pages.clone()), "http://arxiv.test/api");

        let drafts = adapter.crawl(&keywords()[..1]).await.unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].source_name, "arXiv");
        assert_eq!(drafts[0].source_type, SourceType::Academic);
        assert_eq!(drafts[0].publish_date, "2024-02-28");

        // one arXiv query, one patent search, one IEEE search
        assert_eq!(pages.requested().len(), 3);
    }
}
