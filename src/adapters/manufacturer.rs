use async_trait::async_trait;

use super::extract::{host_of, keyword_links, GENERIC_PROFILE};
use super::{AdapterContext, Candidate, Harvest, SkipReason, SourceAdapter};
use crate::models::{NewArticle, SourceType};
use crate::validator::Validator;

/// Vendor and company sites. Homepages are scanned for links whose text
/// mentions a keyword and those pages are read as articles.
pub struct ManufacturerAdapter {
    ctx: AdapterContext,
    name: &'static str,
    source_type: SourceType,
    sites: Vec<String>,
    max_sites: usize,
    per_site: usize,
    max_drafts: usize,
}

impl ManufacturerAdapter {
    /// Device manufacturers: ten sites, thirty drafts per run.
    pub fn manufacturers(ctx: AdapterContext, sites: Vec<String>) -> Self {
        Self {
            ctx,
            name: "manufacturer",
            source_type: SourceType::Manufacturer,
            sites,
            max_sites: 10,
            per_site: 3,
            max_drafts: 30,
        }
    }

    /// Chip vendors and technical publications: fifteen sites, fifty drafts.
    pub fn tech_companies(ctx: AdapterContext, sites: Vec<String>) -> Self {
        Self {
            ctx,
            name: "tech_company",
            source_type: SourceType::TechCompany,
            sites,
            max_sites: 15,
            per_site: 3,
            max_drafts: 50,
        }
    }

    async fn crawl_site(&self, site_url: &str, keywords: &[String], harvest: &mut Harvest) {
        let Some(home) = self.ctx.fetch(site_url).await else {
            harvest.record(Candidate::skip(site_url, SkipReason::Unreachable));
            return;
        };

        let links: Vec<String> = keyword_links(&home, site_url, keywords)
            .into_iter()
            .map(|(url, _)| url)
            .take(self.per_site)
            .collect();
        let source_name = host_of(site_url);

        for (link, page) in self.ctx.fetch_all(links).await {
            if harvest.len() >= self.max_drafts {
                break;
            }
            harvest.record(Candidate::from_page(
                &link,
                page.as_deref(),
                self.source_type,
                &source_name,
                &GENERIC_PROFILE,
                keywords,
            ));
        }
    }
}

#[async_trait]
impl SourceAdapter for ManufacturerAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn crawl(&self, keywords: &[String]) -> anyhow::Result<Vec<NewArticle>> {
        let mut harvest = Harvest::new(self.name, Validator::article(keywords));

        for site_url in self.sites.iter().take(self.max_sites) {
            if harvest.len() >= self.max_drafts {
                break;
            }
            self.crawl_site(site_url, keywords, &mut harvest).await;
        }

        Ok(harvest.into_drafts())
    }
}
