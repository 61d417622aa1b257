//! PubMed Client
//!
//! Searches PubMed through the NCBI E-utilities:
//! - `esearch.fcgi` resolves a query expression to a ranked list of PMIDs
//! - `efetch.fcgi` fetches titles, abstracts and journal metadata for them
//!
//! NCBI allows 3 requests/second without an API key and 10 with one; the
//! client enforces that locally and retries 429/5xx responses with backoff.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::LazyLock;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{SearchError, SearchProvider};
use crate::config::PubMedConfig;
use crate::models::Document;
use crate::utils::retry::{with_retry, RetryPolicy};

pub const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

const REQUESTS_PER_SECOND: u32 = 3;
const REQUESTS_PER_SECOND_WITH_KEY: u32 = 10;

pub struct PubMedClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    email: Option<String>,
    tool: String,
    limiter: DefaultDirectRateLimiter,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(default, rename = "ERROR")]
    error: Option<String>,
}

impl PubMedClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::build(base_url.into(), None, None, "ayurveda-research".to_string(), RetryPolicy::default())
    }

    pub fn from_config(config: &PubMedConfig) -> Self {
        let retry = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            ..RetryPolicy::default()
        };
        Self::build(
            config.base_url.clone(),
            config.api_key.clone(),
            config.email.clone(),
            config.tool.clone(),
            retry,
        )
    }

    fn build(
        base_url: String,
        api_key: Option<String>,
        email: Option<String>,
        tool: String,
        retry: RetryPolicy,
    ) -> Self {
        let per_second = if api_key.is_some() {
            REQUESTS_PER_SECOND_WITH_KEY
        } else {
            REQUESTS_PER_SECOND
        };
        let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));

        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            email,
            tool,
            limiter: RateLimiter::direct(quota),
            retry,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn common_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("db", "pubmed".to_string()), ("tool", self.tool.clone())];
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// GET an E-utilities endpoint, rate limited and retried
    async fn get(&self, endpoint: &str, params: Vec<(&'static str, String)>) -> Result<String, SearchError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut query = self.common_params();
        query.extend(params);
        let (url, query) = (&url, &query);

        with_retry(
            self.retry,
            move || async move {
                self.limiter.until_ready().await;
                let response = self
                    .client
                    .get(url)
                    .query(query)
                    .send()
                    .await
                    .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| SearchError::RequestFailed(e.to_string()))?;
                if !status.is_success() {
                    return Err(SearchError::Status { status: status.as_u16(), body });
                }
                Ok(body)
            },
            SearchError::is_retryable,
        )
        .await
    }

    /// Resolve an expression to PMIDs, most relevant first
    pub async fn esearch(&self, expression: &str, max_results: usize) -> Result<Vec<String>, SearchError> {
        let body = self
            .get(
                "esearch.fcgi",
                vec![
                    ("term", expression.to_string()),
                    ("retmax", max_results.to_string()),
                    ("retmode", "json".to_string()),
                    ("sort", "relevance".to_string()),
                ],
            )
            .await?;

        let parsed: ESearchResponse =
            serde_json::from_str(&body).map_err(|e| SearchError::ParseError(e.to_string()))?;
        if let Some(error) = parsed.esearchresult.error {
            return Err(SearchError::ParseError(format!("esearch error: {}", error)));
        }
        Ok(parsed.esearchresult.idlist)
    }

    /// Fetch article metadata for PMIDs, preserving the order of `ids`
    pub async fn efetch(&self, ids: &[String]) -> Result<Vec<Document>, SearchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = self
            .get(
                "efetch.fcgi",
                vec![("id", ids.join(",")), ("retmode", "xml".to_string())],
            )
            .await?;

        let mut by_id: HashMap<String, Document> = parse_efetch_xml(&body)?
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

#[async_trait]
impl SearchProvider for PubMedClient {
    fn name(&self) -> &str {
        "pubmed"
    }

    async fn search(&self, expression: &str, max_results: usize) -> Result<Vec<Document>, SearchError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }
        info!(expression = %expression, max_results, "Searching PubMed");

        let ids = self.esearch(expression, max_results).await?;
        debug!(count = ids.len(), "esearch returned ids");
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let documents = self.efetch(&ids).await?;
        info!(count = documents.len(), "PubMed search completed");
        Ok(documents)
    }
}

static ARTICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<PubmedArticle>(.*?)</PubmedArticle>").expect("valid regex"));
static PMID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<PMID[^>]*>\s*(\d+)\s*</PMID>").expect("valid regex"));
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<ArticleTitle[^>]*>(.*?)</ArticleTitle>").expect("valid regex"));
static ABSTRACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<AbstractText([^>]*)>(.*?)</AbstractText>").expect("valid regex"));
static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"Label="([^"]*)""#).expect("valid regex"));
static JOURNAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<Journal>.*?<Title>(.*?)</Title>").expect("valid regex"));
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<PubDate>.*?<Year>(\d{4})</Year>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Extract documents from an efetch `PubmedArticleSet` payload
pub fn parse_efetch_xml(xml: &str) -> Result<Vec<Document>, SearchError> {
    if !xml.contains("<PubmedArticleSet") {
        return Err(SearchError::ParseError("efetch response is not a PubmedArticleSet".to_string()));
    }

    let mut documents = Vec::new();
    for article in ARTICLE_RE.captures_iter(xml) {
        let body = &article[1];
        let Some(id) = PMID_RE.captures(body).map(|c| c[1].to_string()) else {
            continue;
        };

        let title = TITLE_RE
            .captures(body)
            .map(|c| clean_text(&c[1]))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let text = ABSTRACT_RE
            .captures_iter(body)
            .map(|c| {
                let section = clean_text(&c[2]);
                match LABEL_RE.captures(&c[1]) {
                    Some(label) if !label[1].is_empty() => format!("{}: {}", &label[1], section),
                    _ => section,
                }
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        documents.push(Document {
            id,
            title,
            text,
            journal: JOURNAL_RE.captures(body).map(|c| clean_text(&c[1])),
            year: YEAR_RE.captures(body).and_then(|c| c[1].parse().ok()),
        });
    }
    Ok(documents)
}

/// Strip inline markup and decode the XML entities NCBI emits
fn clean_text(raw: &str) -> String {
    let stripped = TAG_RE.replace_all(raw, "");
    let decoded = stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
