//! Keyword-driven crawling, storage and daily digests of technology articles.

pub mod adapters;
pub mod ai;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod report;
pub mod scheduler;
pub mod validator;

pub use adapters::{AdapterContext, SourceAdapter};
pub use ai::{DigestGenerator, LlmDigestGenerator, TemplateDigest};
pub use config::Config;
pub use db::Repository;
pub use error::{AppError, Result};
pub use fetcher::{Fetcher, RetryPolicy};
pub use models::{Article, Digest, NewArticle, SourceType};
pub use scheduler::{RunReport, Scheduler, SchedulerHandle};
pub use validator::Validator;
