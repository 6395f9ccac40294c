use async_trait::async_trait;
use scraper::Html;

use super::extract::{
    find_links, host_of, parse_date, select_all_text, select_text, truncate_chars,
    TECH_LINK_SELECTORS, TECH_PROFILE,
};
use super::{
    AdapterContext, Candidate, Harvest, ParsedPage, SearchTarget, SkipReason, SourceAdapter,
};
use crate::models::{NewArticle, SourceType};
use crate::validator::Validator;

const BLOG_ARTICLE_LIMIT: usize = 15;
const GITHUB_KEYWORDS: usize = 5;
const GITHUB_REPOS_PER_KEYWORD: usize = 5;
const STACKOVERFLOW_KEYWORDS: usize = 3;
const STACKOVERFLOW_QUESTIONS_PER_KEYWORD: usize = 10;
const STACKOVERFLOW_ANSWERS: usize = 3;
const README_CHARS: usize = 4000;

/// Technical blogs, GitHub repository search and Stack Overflow questions.
pub struct TechAdapter {
    ctx: AdapterContext,
    blogs: Vec<String>,
}

impl TechAdapter {
    pub fn new(ctx: AdapterContext, blogs: Vec<String>) -> Self {
        Self { ctx, blogs }
    }

    async fn crawl_blog(&self, blog_url: &str, keywords: &[String], harvest: &mut Harvest) {
        let Some(home) = self.ctx.fetch(blog_url).await else {
            harvest.record(Candidate::skip(blog_url, SkipReason::Unreachable));
            return;
        };

        let links: Vec<String> = find_links(&home, blog_url, TECH_LINK_SELECTORS)
            .into_iter()
            .take(BLOG_ARTICLE_LIMIT)
            .collect();
        let source_name = host_of(blog_url);

        for (link, page) in self.ctx.fetch_all(links).await {
            harvest.record(Candidate::from_page(
                &link,
                page.as_deref(),
                SourceType::Tech,
                &source_name,
                &TECH_PROFILE,
                keywords,
            ));
        }
    }
}

#[async_trait]
impl SourceAdapter for TechAdapter {
    fn name(&self) -> &str {
        "tech"
    }

    async fn crawl(&self, keywords: &[String]) -> anyhow::Result<Vec<NewArticle>> {
        let mut harvest = Harvest::new(self.name(), Validator::article(keywords));

        for blog_url in &self.blogs {
            self.crawl_blog(blog_url, keywords, &mut harvest).await;
        }

        for keyword in keywords.iter().take(GITHUB_KEYWORDS) {
            let search_url = format!(
                "https://github.com/search?q={}&type=repositories",
                urlencoding::encode(keyword)
            );
            let target = SearchTarget {
                search_url,
                link_selectors: GITHUB_RESULT_LINKS,
                limit: GITHUB_REPOS_PER_KEYWORD,
                parse: parse_github_repo,
                source_type: SourceType::Tech,
                source_name: "GitHub",
            };
            self.ctx.crawl_search(target, keywords, &mut harvest).await;
        }

        for keyword in keywords.iter().take(STACKOVERFLOW_KEYWORDS) {
            let search_url = format!(
                "https://stackoverflow.com/search?q={}",
                urlencoding::encode(keyword)
            );
            let target = SearchTarget {
                search_url,
                link_selectors: STACKOVERFLOW_RESULT_LINKS,
                limit: STACKOVERFLOW_QUESTIONS_PER_KEYWORD,
                parse: parse_stackoverflow_question,
                source_type: SourceType::Tech,
                source_name: "Stack Overflow",
            };
            self.ctx.crawl_search(target, keywords, &mut harvest).await;
        }

        Ok(harvest.into_drafts())
    }
}

const GITHUB_RESULT_LINKS: &[&str] = &[
    ".search-title a",
    "a.v-align-middle",
    ".repo-list-item h3 a",
];

const STACKOVERFLOW_RESULT_LINKS: &[&str] = &[
    "a.question-hyperlink",
    ".s-post-summary--content-title a",
    ".result-link a",
];

fn parse_github_repo(html: &str) -> Option<ParsedPage> {
    let document = Html::parse_document(html);

    let name = select_text(
        &document,
        &["strong[itemprop=\"name\"] a", "meta[property=\"og:title\"]"],
    )?;
    let description = select_text(
        &document,
        &["p.f4", ".BorderGrid-cell p", "meta[name=\"description\"]"],
    )
    .unwrap_or_default();
    let readme = select_text(&document, &["article.markdown-body", "#readme"])
        .map(|r| truncate_chars(&r, README_CHARS))
        .unwrap_or_default();

    let content = [description, readme]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    if content.is_empty() {
        return None;
    }

    let publish_date = select_text(&document, &["relative-time[datetime]"])
        .map(|d| parse_date(&d))
        .unwrap_or_default();

    Some(ParsedPage {
        title: format!("GitHub: {name}"),
        content,
        publish_date,
    })
}

fn parse_stackoverflow_question(html: &str) -> Option<ParsedPage> {
    let document = Html::parse_document(html);

    let title = select_text(
        &document,
        &["#question-header h1 a", "h1 a.question-hyperlink", "h1"],
    )?;
    let question = select_text(&document, &[".question .s-prose", ".question .post-text"])?;

    let mut sections = vec![format!("Question: {question}")];
    let mut answers = select_all_text(&document, ".answer .s-prose", STACKOVERFLOW_ANSWERS);
    if answers.is_empty() {
        answers = select_all_text(&document, ".answer .post-text", STACKOVERFLOW_ANSWERS);
    }
    for (i, answer) in answers.into_iter().enumerate() {
        sections.push(format!("Answer {}: {answer}", i + 1));
    }

    let publish_date = select_text(
        &document,
        &[".question time[itemprop=\"dateCreated\"]", "time[itemprop=\"dateCreated\"]"],
    )
    .map(|d| parse_date(&d))
    .unwrap_or_default();

    Some(ParsedPage {
        title: format!("Stack Overflow: {title}"),
        content: sections.join("\n\n"),
        publish_date,
    })
}
