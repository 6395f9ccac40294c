//! Daily crawl and retention scheduling.
//!
//! A crawl run walks every adapter in registration order, hands the combined
//! drafts to the digest generator and writes them through the repository.
//! Nothing that goes wrong inside a run stops the run: a failing adapter
//! contributes no drafts, a failing write is counted, a failing digest falls
//! back to the template.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime, Utc};
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::adapters::{default_adapters, AdapterContext, SourceAdapter};
use crate::ai::{DigestGenerator, LlmDigestGenerator, TemplateDigest};
use crate::config::{parse_time_of_day, Config, CLEANUP_TIME};
use crate::db::{CleanupReport, Repository};
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::models::{Digest, NewArticle, StatisticsCounts};

const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Fires at most once per calendar day, on the first poll at or after its
/// time of day.
#[derive(Debug, Clone)]
pub struct DailyTrigger {
    at: NaiveTime,
    last_fired: Option<chrono::NaiveDate>,
}

impl DailyTrigger {
    /// A trigger created after today's time has already passed waits for
    /// tomorrow.
    pub fn new(at: NaiveTime, now: NaiveDateTime) -> Self {
        Self {
            at,
            last_fired: (now.time() >= at).then(|| now.date()),
        }
    }

    pub fn poll(&mut self, now: NaiveDateTime) -> bool {
        let today = now.date();
        if now.time() >= self.at && self.last_fired != Some(today) {
            self.last_fired = Some(today);
            true
        } else {
            false
        }
    }
}

/// How one adapter fared in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterRun {
    pub name: String,
    pub drafts: usize,
    /// Set when the adapter returned an error or panicked.
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    /// Drafts collected across all adapters, duplicates included.
    pub drafts: usize,
    /// Distinct URLs among the drafts.
    pub unique: usize,
    pub saved: usize,
    pub failed: usize,
    pub per_adapter: Vec<AdapterRun>,
    pub digest: Digest,
}

/// Stops a running [`Scheduler::run`]. Cheap to clone and usable from any
/// task or thread.
#[derive(Clone)]
pub struct SchedulerHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    /// Future trigger firings are cancelled; a run already in progress
    /// completes first.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}

pub struct Scheduler {
    repo: Repository,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    digest: Arc<dyn DigestGenerator>,
    keywords: Vec<String>,
    retention_days: u32,
    crawl_time: NaiveTime,
    cleanup_time: NaiveTime,
    poll_interval: Duration,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        repo: Repository,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        digest: Arc<dyn DigestGenerator>,
    ) -> Result<Self> {
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            repo,
            adapters,
            digest,
            keywords: config.keywords.clone(),
            retention_days: config.retention_days,
            crawl_time: config.crawl_time()?,
            cleanup_time: parse_time_of_day(CLEANUP_TIME)?,
            poll_interval: POLL_INTERVAL,
            shutdown: Arc::new(shutdown),
        })
    }

    /// The production wiring: HTTP fetcher, every source adapter and the
    /// configured digest generator.
    pub fn from_config(config: &Config, repo: Repository) -> Result<Self> {
        let fetcher = Arc::new(Fetcher::from_config(config)?);
        let ctx = AdapterContext::from_config(config, fetcher);
        let adapters = default_adapters(config, &ctx);

        let digest: Arc<dyn DigestGenerator> =
            match LlmDigestGenerator::from_config(&config.digest, &config.keywords)? {
                Some(generator) => {
                    info!(model = generator.model(), "Digest generation enabled");
                    Arc::new(generator)
                }
                None => {
                    info!("No digest API key configured, using template digests");
                    Arc::new(TemplateDigest::new(config.keywords.clone()))
                }
            };

        Self::new(config, repo, adapters, digest)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn adapter_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    /// One full crawl: every adapter, the digest, then the writes.
    pub async fn run_once(&self) -> RunReport {
        info!(adapters = self.adapters.len(), "Starting crawl run");

        let mut drafts: Vec<NewArticle> = Vec::new();
        let mut per_adapter = Vec::with_capacity(self.adapters.len());

        for adapter in &self.adapters {
            let name = adapter.name().to_string();
            let outcome = AssertUnwindSafe(adapter.crawl(&self.keywords))
                .catch_unwind()
                .await;

            let run = match outcome {
                Ok(Ok(found)) => {
                    info!(adapter = %name, drafts = found.len(), "Adapter completed");
                    let count = found.len();
                    drafts.extend(found);
                    AdapterRun {
                        name,
                        drafts: count,
                        error: None,
                    }
                }
                Ok(Err(e)) => {
                    error!(adapter = %name, error = %e, "Adapter failed");
                    AdapterRun {
                        name,
                        drafts: 0,
                        error: Some(e.to_string()),
                    }
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(adapter = %name, panic = %message, "Adapter panicked");
                    AdapterRun {
                        name,
                        drafts: 0,
                        error: Some(message),
                    }
                }
            };
            per_adapter.push(run);
        }

        let digest = match self.digest.summarize(&drafts).await {
            Ok(digest) => digest,
            Err(e) => {
                warn!(error = %e, "Digest generation failed, using template");
                Digest::fallback(&drafts, &self.keywords)
            }
        };

        let mut saved = 0;
        let mut failed = 0;
        for draft in &drafts {
            match self.repo.upsert_article(draft.clone()).await {
                Ok(_) => saved += 1,
                Err(e) => {
                    error!(url = %draft.url, error = %e, "Failed to save article");
                    failed += 1;
                }
            }
        }

        let unique = unique_by_url(&drafts);
        self.record_statistics(&unique).await;

        info!(
            drafts = drafts.len(),
            unique = unique.len(),
            saved,
            failed,
            "Crawl run finished"
        );

        RunReport {
            drafts: drafts.len(),
            unique: unique.len(),
            saved,
            failed,
            per_adapter,
            digest,
        }
    }

    async fn record_statistics(&self, articles: &[NewArticle]) {
        let counts = StatisticsCounts::from_articles(articles);
        if let Err(e) = self
            .repo
            .update_statistics(Utc::now().date_naive(), counts)
            .await
        {
            error!(error = %e, "Failed to update daily statistics");
        }

        let occurrences: Vec<String> = articles
            .iter()
            .flat_map(|a| a.keywords.iter().cloned())
            .collect();
        if let Err(e) = self.repo.increment_keyword_frequency(occurrences).await {
            error!(error = %e, "Failed to update keyword frequencies");
        }
    }

    pub async fn run_cleanup(&self) -> Result<CleanupReport> {
        let report = self.repo.cleanup(self.retention_days).await?;
        info!(
            retention_days = self.retention_days,
            articles = report.articles_deleted,
            statistics = report.statistics_deleted,
            "Retention cleanup finished"
        );
        Ok(report)
    }

    /// Drive the crawl and cleanup triggers until [`SchedulerHandle::stop`].
    pub async fn run(&self) {
        info!(
            crawl_time = %self.crawl_time,
            cleanup_time = %self.cleanup_time,
            "Scheduler started"
        );

        tokio::join!(
            self.crawl_loop(self.shutdown.subscribe()),
            self.cleanup_loop(self.shutdown.subscribe()),
        );

        info!("Scheduler stopped");
    }

    async fn crawl_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut trigger = DailyTrigger::new(self.crawl_time, Local::now().naive_local());
        loop {
            if *shutdown.borrow() {
                break;
            }
            if trigger.poll(Local::now().naive_local()) {
                self.run_once().await;
            }
            if wait_for_shutdown(&mut shutdown, self.poll_interval).await {
                break;
            }
        }
    }

    async fn cleanup_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut trigger = DailyTrigger::new(self.cleanup_time, Local::now().naive_local());
        loop {
            if *shutdown.borrow() {
                break;
            }
            if trigger.poll(Local::now().naive_local()) {
                if let Err(e) = self.run_cleanup().await {
                    error!(error = %e, "Retention cleanup failed");
                }
            }
            if wait_for_shutdown(&mut shutdown, self.poll_interval).await {
                break;
            }
        }
    }
}

/// Sleep one poll interval. Returns `true` if shutdown was requested.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(interval) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// One draft per URL, keeping the first position and the last content.
fn unique_by_url(drafts: &[NewArticle]) -> Vec<NewArticle> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<NewArticle> = Vec::new();
    for draft in drafts {
        match index.get(draft.url.as_str()) {
            Some(&i) => unique[i] = draft.clone(),
            None => {
                index.insert(draft.url.as_str(), unique.len());
                unique.push(draft.clone());
            }
        }
    }
    unique
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
