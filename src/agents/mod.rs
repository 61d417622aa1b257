//! Agent System
//!
//! This module contains the two research agents and the coordinator that
//! chains them:
//!
//! - **Research Agent**: searches PubMed and produces a structured research record
//! - **Summary Agent**: turns the record into the user-facing markdown report
//!
//! ## Pipeline Overview
//!
//! ```text
//! User Query
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Research   │  → PubMed search + schema-validated ResearchRecord
//! │   Agent     │
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Summary    │  → Markdown report
//! │   Agent     │
//! └─────────────┘
//!      │
//!      ▼
//!  Final Report
//! ```
//!
//! The record never leaves the pipeline; callers only see the report or an error.

pub mod research;
pub mod summary;

pub use research::{ResearchAgent, ResearchSettings};
pub use summary::SummaryAgent;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::knowledge::KeywordCatalog;
use crate::llm::{LLMProviderConfig, StructuredOptions, LLM};
use crate::models::ResearchRecord;
use crate::search::{PubMedClient, SearchProvider};
use crate::types::{AppError, AppResult};

/// First stage: query in, structured record out
#[async_trait]
pub trait ResearchStage: Send + Sync {
    async fn run(&self, user_query: &str) -> AppResult<ResearchRecord>;
}

/// Second stage: query and record in, markdown report out
#[async_trait]
pub trait SummaryStage: Send + Sync {
    async fn run(&self, user_query: &str, record: &ResearchRecord) -> AppResult<String>;
}

/// Where a request is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    AwaitingResearch,
    AwaitingSummary,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::AwaitingResearch => write!(f, "awaiting_research"),
            PipelineStage::AwaitingSummary => write!(f, "awaiting_summary"),
            PipelineStage::Done => write!(f, "done"),
        }
    }
}

/// Per-request controls
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the pipeline's default deadline
    pub deadline: Option<Duration>,
    /// Cancelling aborts the in-flight stage
    pub cancel: Option<CancellationToken>,
    /// Id recorded on the request span; generated when absent
    pub request_id: Option<Uuid>,
}

impl RequestOptions {
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

/// Runs research then summary for one query. Holds no per-request state, so
/// one instance can serve concurrent requests.
pub struct ResearchPipeline {
    research: Arc<dyn ResearchStage>,
    summary: Arc<dyn SummaryStage>,
    default_deadline: Option<Duration>,
}

impl ResearchPipeline {
    pub fn new(research: Arc<dyn ResearchStage>, summary: Arc<dyn SummaryStage>) -> Self {
        Self {
            research,
            summary,
            default_deadline: None,
        }
    }

    pub fn with_default_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline = Some(deadline);
        self
    }

    /// Wire up PubMed, the configured LLM provider and both agents
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let llm = Arc::new(LLM::new(LLMProviderConfig::from_config(&config.llm)?)?);
        let search: Arc<dyn SearchProvider> = Arc::new(PubMedClient::from_config(&config.pubmed));

        let research = ResearchAgent::new(
            llm.clone(),
            search,
            ResearchSettings {
                model: config.llm.research_model.clone(),
                max_results: config.pubmed.max_results,
                max_expressions: config.pipeline.max_search_expressions,
                structured: StructuredOptions {
                    retries: config.pipeline.schema_retries,
                    parser_model: Some(config.llm.parser_model().to_string()),
                },
            },
        )
        .with_knowledge_base(Arc::new(KeywordCatalog::new()));
        let summary = SummaryAgent::new(llm, config.llm.summary_model.clone())
            .with_max_tokens(config.pipeline.summary_max_tokens);

        info!(
            provider = %config.llm.provider,
            research_model = %config.llm.research_model,
            summary_model = %config.llm.summary_model,
            "Research pipeline configured"
        );

        Ok(Self::new(Arc::new(research), Arc::new(summary))
            .with_default_deadline(Duration::from_secs(config.pipeline.request_timeout_secs)))
    }

    /// Answer `query` with a markdown report
    pub async fn answer(&self, query: &str) -> AppResult<String> {
        self.answer_with(query, RequestOptions::default()).await
    }

    /// Answer `query`, giving up when the deadline passes or the token is cancelled
    pub async fn answer_with(&self, query: &str, options: RequestOptions) -> AppResult<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidRequest("query must not be empty".to_string()));
        }

        let request_id = options.request_id.unwrap_or_else(Uuid::new_v4);
        let cancel = options.cancel.unwrap_or_default();
        let deadline = options.deadline.or(self.default_deadline);

        async {
            let guarded = async {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(AppError::Timeout("request cancelled".to_string())),
                    result = self.run_stages(query) => result,
                }
            };

            let result = match deadline {
                Some(limit) => tokio::time::timeout(limit, guarded).await.unwrap_or_else(|_| {
                    Err(AppError::Timeout(format!("no answer within {} ms", limit.as_millis())))
                }),
                None => guarded.await,
            };

            match &result {
                Ok(report) => info!(report_len = report.len(), "Request completed"),
                Err(e) => warn!(kind = e.kind(), error = %e, "Request failed"),
            }
            result
        }
        .instrument(info_span!("answer", %request_id))
        .await
    }

    async fn run_stages(&self, query: &str) -> AppResult<String> {
        let mut stage = PipelineStage::AwaitingResearch;
        info!(%stage, query_len = query.len(), "Starting research pipeline");

        let record = self.research.run(query).await.map_err(|e| {
            warn!(%stage, error = %e, "Research stage failed");
            e
        })?;

        stage = PipelineStage::AwaitingSummary;
        info!(
            %stage,
            total_found = record.total_found,
            papers = record.papers.len(),
            count_mismatch = record.count_mismatch(),
            "Research complete"
        );

        let report = self.summary.run(query, &record).await.map_err(|e| {
            warn!(%stage, error = %e, "Summary stage failed");
            e
        })?;

        stage = PipelineStage::Done;
        info!(%stage, response_len = report.len(), "Research pipeline complete");
        Ok(report)
    }
}
