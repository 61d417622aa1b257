use std::collections::HashSet;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::agents::ResearchPipeline;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ResearchPipeline>,
    pub config: Config,
}

/// Candidate document returned by a search provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Abstract text, empty when the source has none
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

/// Structured synthesis of one source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PaperSummary {
    /// The PubMed ID (PMID) of the paper
    pub source_id: String,
    /// The title of the paper
    pub title: String,
    /// Detailed summary of the abstract and methodology, focused on Ayurvedic relevance
    pub summary: String,
    /// 1-8 specific findings: dosages, mechanisms, clinical results
    pub key_points: Vec<String>,
    /// How the research validates or challenges traditional Ayurvedic principles
    pub domain_relevance: String,
    /// Study design, e.g. clinical trial, systematic review, in-vitro, animal study
    pub study_type: String,
    /// Number of participants or sample size, if reported
    #[serde(default)]
    pub sample_size: Option<String>,
}

/// Structured result handed from the research stage to the summary stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchRecord {
    /// How the user's query was interpreted
    pub query_interpretation: String,
    /// Search terms and strategy used against PubMed
    pub search_strategy: String,
    /// Total number of candidate papers considered
    pub total_found: u32,
    /// Curated papers, most relevant first; empty if nothing relevant was found
    #[serde(default)]
    pub papers: Vec<PaperSummary>,
}

pub const KEY_POINTS_RANGE: std::ops::RangeInclusive<usize> = 1..=8;

impl ResearchRecord {
    /// Structural checks the model output must pass. Advisory bounds are
    /// reported by [`ResearchRecord::advisories`] instead.
    pub fn validate(&self) -> Result<(), String> {
        for (i, paper) in self.papers.iter().enumerate() {
            if paper.title.trim().is_empty() {
                return Err(format!("papers[{}].title must not be empty", i));
            }
        }
        Ok(())
    }

    /// Soft-contract violations worth logging
    pub fn advisories(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if self.count_mismatch() {
            notes.push(format!(
                "total_found ({}) is smaller than papers.len() ({})",
                self.total_found,
                self.papers.len()
            ));
        }
        let mut seen = HashSet::new();
        for paper in &self.papers {
            if !seen.insert(paper.source_id.as_str()) {
                notes.push(format!("duplicate source_id {}", paper.source_id));
            }
            if !KEY_POINTS_RANGE.contains(&paper.key_points.len()) {
                notes.push(format!(
                    "paper {} has {} key points",
                    paper.source_id,
                    paper.key_points.len()
                ));
            }
        }
        notes
    }

    pub fn count_mismatch(&self) -> bool {
        (self.papers.len() as u64) > u64::from(self.total_found)
    }

    pub fn has_papers(&self) -> bool {
        !self.papers.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnswerRequest {
    #[validate(length(min = 1, max = 1000))]
    pub query: String,
    #[validate(range(min = 1, max = 900))]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub request_id: uuid::Uuid,
    pub content: String,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub llm_provider: String,
    pub search_provider: String,
}
