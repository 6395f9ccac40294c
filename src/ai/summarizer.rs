use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::digest::DigestGenerator;
use crate::adapters::extract::truncate_chars;
use crate::config::DigestConfig;
use crate::error::{AppError, Result};
use crate::models::{Digest, DigestOrigin, NewArticle};

/// Articles included in the prompt, in run order.
const PROMPT_ARTICLES: usize = 20;
const EXCERPT_CHARS: usize = 200;

const SYSTEM_PROMPT: &str = "You are a technology news editor. Write a concise daily digest \
of the articles provided: name the main developments, group related stories, and call out \
anything new about the tracked technologies. Answer in 3 short paragraphs of plain text.";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Digest text from an OpenAI-compatible chat completions endpoint. The
/// structured parts of the digest are always computed locally.
pub struct LlmDigestGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    keywords: Vec<String>,
}

impl LlmDigestGenerator {
    pub fn new(config: &DigestConfig, api_key: String, keywords: Vec<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            keywords,
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &DigestConfig, keywords: &[String]) -> Result<Option<Self>> {
        match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {
                Self::new(config, key.to_string(), keywords.to_vec()).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens: 1024,
            temperature: 0.3,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::DigestApi(format!("HTTP {status}: {error_text}")));
        }

        let chat: ChatResponse = response.json().await?;
        let text = chat
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(AppError::DigestApi("empty completion".into()));
        }
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl DigestGenerator for LlmDigestGenerator {
    async fn summarize(&self, articles: &[NewArticle]) -> Result<Digest> {
        if articles.is_empty() {
            return Ok(Digest::fallback(articles, &self.keywords));
        }

        let mut digest = Digest::analyze(articles, &self.keywords);
        digest.daily_summary = self.complete(build_prompt(articles)).await?;
        digest.origin = DigestOrigin::Generated;
        Ok(digest)
    }
}

fn build_prompt(articles: &[NewArticle]) -> String {
    let mut prompt = format!(
        "Today's crawl collected {} articles. The first {} follow.\n",
        articles.len(),
        articles.len().min(PROMPT_ARTICLES)
    );

    for (i, article) in articles.iter().take(PROMPT_ARTICLES).enumerate() {
        prompt.push_str(&format!(
            "\n{}. {} [{} / {}]\n{}\n",
            i + 1,
            article.title,
            article.source_type,
            article.source_name,
            truncate_chars(&article.content, EXCERPT_CHARS)
        ));
    }

    prompt
}
