//! Search Module
//!
//! Literature search behind the [`SearchProvider`] trait. PubMed (NCBI
//! E-utilities) is the production backend.

pub mod pubmed;

pub use pubmed::PubMedClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Document;
use crate::types::AppError;

/// Errors that can occur during search operations
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Search service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse search results: {0}")]
    ParseError(String),
}

impl SearchError {
    /// Transport failures, rate limiting and server errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::RequestFailed(_) => true,
            SearchError::Status { status, .. } => *status == 429 || *status >= 500,
            SearchError::ParseError(_) => false,
        }
    }
}

impl From<SearchError> for AppError {
    fn from(e: SearchError) -> Self {
        AppError::Upstream(e.to_string())
    }
}

/// A literature search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Candidate documents for `expression`, best match first. No hits is `Ok(vec![])`.
    async fn search(&self, expression: &str, max_results: usize) -> Result<Vec<Document>, SearchError>;
}
