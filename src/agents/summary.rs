//! Summary Agent
//!
//! Renders a [`ResearchRecord`] into the final markdown report. This is the
//! last step in the pipeline; the record is read, never modified.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::SummaryStage;
use crate::llm::LLM;
use crate::models::{PaperSummary, ResearchRecord};
use crate::types::{AppError, AppResult, LLMRequest};

const SUMMARY_SYSTEM_PROMPT: &str = "You are an expert Ayurvedic research analyst who turns structured research \
data into comprehensive, practical markdown reports. Base every statement on the research data provided and do \
not add generic information the studies do not support.";

pub const NO_EVIDENCE_NOTICE: &str = "No relevant research evidence was found for this query.";

pub struct SummaryAgent {
    llm: Arc<LLM>,
    model: String,
    max_tokens: u32,
}

impl SummaryAgent {
    pub fn new(llm: Arc<LLM>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            max_tokens: 8192,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Report for a record with no papers. Built locally so it is never empty.
    pub fn no_evidence_report(user_query: &str, record: &ResearchRecord) -> String {
        let mut report = format!("# {}\n\n", report_title(user_query));
        report.push_str("## Executive Summary\n\n");
        report.push_str(NO_EVIDENCE_NOTICE);
        report.push_str(
            " PubMed did not return any papers that substantially investigate this topic from an Ayurvedic perspective, \
             so no evidence-based conclusions can be drawn.\n\n",
        );

        report.push_str("## How the Search Was Performed\n\n");
        if !record.query_interpretation.trim().is_empty() {
            report.push_str(&format!("**Query interpretation:** {}\n\n", record.query_interpretation.trim()));
        }
        if !record.search_strategy.trim().is_empty() {
            report.push_str(&format!("**Search strategy:** {}\n\n", record.search_strategy.trim()));
        }
        report.push_str(&format!("**Candidate papers considered:** {}\n\n", record.total_found));

        report.push_str("## Practical Takeaways\n\n");
        report.push_str("- Try the common and scientific names of the herb or formulation (e.g. \"ashwagandha\" or \"Withania somnifera\").\n");
        report.push_str("- Name a specific condition, outcome or study type such as clinical trials or systematic reviews.\n");
        report.push_str("- Absence of indexed studies is not evidence of safety or efficacy; consult a qualified practitioner.\n");
        report
    }

    /// Markdown rendering of the record used as model context
    pub fn format_record_context(record: &ResearchRecord) -> String {
        let mut output = String::new();
        output.push_str(&format!("**Query interpretation:** {}\n\n", record.query_interpretation));
        output.push_str(&format!("**Search strategy:** {}\n\n", record.search_strategy));
        output.push_str(&format!(
            "**Papers considered:** {} (curated: {})\n",
            record.total_found,
            record.papers.len()
        ));

        for (i, paper) in record.papers.iter().enumerate() {
            output.push_str(&Self::format_paper(i + 1, paper));
        }
        output
    }

    fn format_paper(index: usize, paper: &PaperSummary) -> String {
        let mut output = format!("\n### Study {}: {}\n", index, paper.title);
        output.push_str(&format!("**Citation label:** PMID {}\n", paper.source_id));
        output.push_str(&format!("**Study type:** {}\n", paper.study_type));
        if let Some(size) = &paper.sample_size {
            output.push_str(&format!("**Sample size:** {}\n", size));
        }
        output.push_str(&format!("\n**Summary:** {}\n", paper.summary));
        if !paper.key_points.is_empty() {
            output.push_str("\n**Key points:**\n");
            for point in &paper.key_points {
                output.push_str(&format!("- {}\n", point));
            }
        }
        output.push_str(&format!("\n**Ayurvedic relevance:** {}\n", paper.domain_relevance));
        output
    }

    fn create_report_prompt(user_query: &str, record: &ResearchRecord) -> String {
        let context = Self::format_record_context(record);
        let title = report_title(user_query);

        format!(
            r#"USER'S QUESTION: {user_query}

RESEARCH DATA:
{context}

TASK:
Transform the research data into a comprehensive, practical markdown report. Identify themes across studies, synthesize the findings, highlight strengths and limitations, and connect modern findings with traditional Ayurvedic principles.

REPORT STRUCTURE:

# {title}

## Executive Summary
- Direct answer to the question, overall quality and quantity of the research, key evidence-based recommendations

## Research Overview
- Studies analyzed and their types, quality assessment

## Key Findings

### Clinical Efficacy
### Mechanisms of Action
### Safety Profile
### Traditional vs. Modern Perspectives

## Clinical Applications

## Research Gaps and Limitations

## Practical Takeaways

GUIDELINES:
- Include specific quantitative data (dosages, effect sizes, p-values) when the data has it
- Refer to studies by their key details; citation labels are optional and must not replace description
- Balance optimism with scientific skepticism
- Output markdown only. Never output JSON."#,
            user_query = user_query,
            context = context,
            title = title,
        )
    }
}

#[async_trait]
impl SummaryStage for SummaryAgent {
    async fn run(&self, user_query: &str, record: &ResearchRecord) -> AppResult<String> {
        if !record.has_papers() {
            info!(total_found = record.total_found, "No papers in research record, writing no-evidence report");
            return Ok(Self::no_evidence_report(user_query, record));
        }

        info!(papers = record.papers.len(), "Generating report");
        let request = LLMRequest::new(
            &self.model,
            SUMMARY_SYSTEM_PROMPT,
            Self::create_report_prompt(user_query, record),
        )
        .with_temperature(0.4)
        .with_max_tokens(self.max_tokens);

        let response = self.llm.create_chat_completion(&request).await?;
        if is_truncated(&response.finish_reason) {
            warn!(max_tokens = self.max_tokens, "Report hit the token limit");
            return Err(AppError::Upstream(format!(
                "Report truncated at max_tokens ({})",
                self.max_tokens
            )));
        }

        let report = normalize_report(user_query, &response.content)?;
        info!(report_len = report.len(), "Report generated");
        Ok(report)
    }
}

/// OpenAI-style `length` and Gemini `MAX_TOKENS`
fn is_truncated(finish_reason: &str) -> bool {
    finish_reason.eq_ignore_ascii_case("length") || finish_reason.eq_ignore_ascii_case("MAX_TOKENS")
}

fn report_title(user_query: &str) -> String {
    format!("{} - Research Evidence Summary", user_query.trim())
}

/// Clean up model output into a standalone markdown report
pub fn normalize_report(user_query: &str, raw: &str) -> AppResult<String> {
    let mut text = raw.trim();

    // Unwrap a reply that is entirely one fenced block
    if text.starts_with("```") && text.ends_with("```") && text.len() >= 6 {
        let inner = &text[3..text.len() - 3];
        if !inner.contains("```") {
            let inner = match inner.find('\n') {
                Some(newline) if !inner[..newline].contains(' ') => &inner[newline + 1..],
                _ => inner,
            };
            text = inner.trim();
        }
    }

    if text.is_empty() {
        return Err(AppError::Upstream("Summary model returned an empty report".to_string()));
    }
    if (text.starts_with('{') || text.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(text).is_ok()
    {
        return Err(AppError::Upstream("Summary model returned JSON instead of a report".to_string()));
    }

    if has_title_heading(text) {
        Ok(text.to_string())
    } else {
        Ok(format!("# {}\n\n{}", report_title(user_query), text))
    }
}

/// A `# ` line outside any fenced code block
fn has_title_heading(text: &str) -> bool {
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        } else if !in_fence && line.starts_with("# ") {
            return true;
        }
    }
    false
}
