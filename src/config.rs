use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Time of day the retention sweep runs.
pub const CLEANUP_TIME: &str = "02:00";

/// Longest politeness delay accepted between two requests.
pub const MAX_REQUEST_DELAY: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Daily crawl time, `HH:MM` local time.
    #[serde(default = "default_schedule_time")]
    pub schedule_time: String,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub digest: DigestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Politeness delay applied before every page fetch.
    #[serde(default = "default_request_delay")]
    pub request_delay_secs: f64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_news_feeds")]
    pub news_feeds: Vec<String>,

    #[serde(default = "default_news_sites")]
    pub news_sites: Vec<String>,

    #[serde(default = "default_tech_blogs")]
    pub tech_blogs: Vec<String>,

    #[serde(default = "default_manufacturer_sites")]
    pub manufacturer_sites: Vec<String>,

    #[serde(default = "default_tech_company_sites")]
    pub tech_company_sites: Vec<String>,

    /// Search URL templates; `{query}` is replaced by the url-encoded keyword.
    #[serde(default = "default_video_search")]
    pub video_search: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    pub api_key: Option<String>,

    #[serde(default = "default_digest_base_url")]
    pub base_url: String,

    #[serde(default = "default_digest_model")]
    pub model: String,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tech-digest");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("articles.db").to_string_lossy().to_string()
}

fn default_keywords() -> Vec<String> {
    [
        "蓝牙",
        "Bluetooth",
        "br/edr",
        "蓝牙技术",
        "蓝牙协议",
        "蓝牙开发",
        "蓝牙应用",
        "蓝牙芯片",
        "蓝牙耳机",
        "蓝牙音箱",
        "蓝牙连接",
        "蓝牙标准",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_schedule_time() -> String {
    "06:00".to_string()
}

fn default_retention_days() -> u32 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0".to_string()
}

fn default_request_delay() -> f64 {
    1.0
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_concurrent() -> usize {
    5
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_news_feeds() -> Vec<String> {
    strings(&[
        "https://www.cnbeta.com.tw/backend.php",
        "https://www.ithome.com/rss/",
        "https://feeds.feedburner.com/engadget",
        "https://www.theverge.com/rss/index.xml",
        "https://techcrunch.com/feed/",
        "https://www.wired.com/feed/rss",
    ])
}

fn default_news_sites() -> Vec<String> {
    strings(&[
        "https://www.cnbeta.com.tw/",
        "https://www.ithome.com/",
        "https://www.engadget.com/",
        "https://www.theverge.com/",
        "https://techcrunch.com/",
        "https://www.wired.com/",
    ])
}

fn default_tech_blogs() -> Vec<String> {
    strings(&[
        "https://www.infoq.com/",
        "https://medium.com/",
        "https://dev.to/",
        "https://css-tricks.com/",
        "https://www.smashingmagazine.com/",
    ])
}

fn default_manufacturer_sites() -> Vec<String> {
    strings(&[
        "https://developer.apple.com/news/",
        "https://developer.samsung.com/",
        "https://news.samsung.com/global/",
        "https://developer.huawei.com/",
        "https://blog.mi.com/",
        "https://www.oppo.com/cn/about-us/news/",
        "https://android-developers.googleblog.com/",
        "https://source.android.com/",
        "https://developer.sony.com/",
        "https://www.motorola.com/",
    ])
}

fn default_tech_company_sites() -> Vec<String> {
    strings(&[
        "https://www.qualcomm.com/",
        "https://www.broadcom.com/",
        "https://www.mediatek.com/",
        "https://www.nordicsemi.com/",
        "https://www.espressif.com/",
        "https://www.infineon.com/",
        "https://www.nxp.com/",
        "https://www.ti.com/",
        "https://www.st.com/",
        "https://www.bluetooth.com/",
        "https://lwn.net/",
        "https://arstechnica.com/",
        "https://spectrum.ieee.org/",
        "https://hackaday.com/",
        "https://www.embedded.com/",
    ])
}

fn default_video_search() -> Vec<String> {
    strings(&[
        "https://www.youtube.com/results?search_query={query}",
        "https://search.bilibili.com/all?keyword={query}",
    ])
}

fn default_digest_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_digest_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_delay_secs: default_request_delay(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            news_feeds: default_news_feeds(),
            news_sites: default_news_sites(),
            tech_blogs: default_tech_blogs(),
            manufacturer_sites: default_manufacturer_sites(),
            tech_company_sites: default_tech_company_sites(),
            video_search: default_video_search(),
        }
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_digest_base_url(),
            model: default_digest_model(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            keywords: default_keywords(),
            schedule_time: default_schedule_time(),
            retention_days: default_retention_days(),
            http: HttpConfig::default(),
            sources: SourcesConfig::default(),
            digest: DigestConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`. A missing
    /// default file is created with default values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let config_path = Self::config_path();
                if config_path.exists() {
                    Self::from_file(&config_path)?
                } else {
                    let config = Config::default();
                    config.save()?;
                    config
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tech-digest")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(AppError::Config("keyword list is empty".into()));
        }
        self.crawl_time()?;
        if self.retention_days == 0 {
            return Err(AppError::Config("retention_days must be at least 1".into()));
        }
        if self.http.max_retries == 0 {
            return Err(AppError::Config("http.max_retries must be at least 1".into()));
        }
        if self.http.max_concurrent_requests == 0 {
            return Err(AppError::Config(
                "http.max_concurrent_requests must be at least 1".into(),
            ));
        }
        let delay = self.http.request_delay_secs;
        if !delay.is_finite() || delay < 0.0 || delay > MAX_REQUEST_DELAY.as_secs_f64() {
            return Err(AppError::Config(format!(
                "http.request_delay_secs must be between 0 and {}",
                MAX_REQUEST_DELAY.as_secs()
            )));
        }
        Ok(())
    }

    pub fn crawl_time(&self) -> Result<NaiveTime> {
        parse_time_of_day(&self.schedule_time)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.http.request_delay_secs.max(0.0))
            .map_or(MAX_REQUEST_DELAY, |delay| delay.min(MAX_REQUEST_DELAY))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}

/// Parse an `HH:MM` time of day.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| AppError::Config(format!("invalid time of day {value:?}: {e}")))
}
