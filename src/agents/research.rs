//! Research Agent
//!
//! Turns a user query into a [`ResearchRecord`]: expands the query into
//! PubMed expressions, gathers candidates, then has the model judge
//! relevance and extract per-paper summaries as schema-constrained output.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use super::ResearchStage;
use crate::knowledge::{DomainPolicy, KeywordCatalog, KnowledgeBase};
use crate::llm::{generate_structured, StructuredOptions, LLM};
use crate::models::{Document, ResearchRecord};
use crate::search::SearchProvider;
use crate::types::{AppResult, LLMRequest};

const RESEARCH_SYSTEM_PROMPT: &str = "You are an expert Ayurvedic research specialist with deep knowledge of both \
traditional Ayurveda and modern scientific research. You only report on Ayurveda-related evidence and you never \
invent papers: every paper you return must come from the candidate list you are given.";

/// Abstracts longer than this are cut before prompting
const MAX_ABSTRACT_CHARS: usize = 3000;

#[derive(Debug, Clone)]
pub struct ResearchSettings {
    pub model: String,
    pub max_results: usize,
    pub max_expressions: usize,
    pub structured: StructuredOptions,
}

pub struct ResearchAgent {
    llm: Arc<LLM>,
    search: Arc<dyn SearchProvider>,
    knowledge: Option<Arc<dyn KnowledgeBase>>,
    catalog: KeywordCatalog,
    policy: DomainPolicy,
    settings: ResearchSettings,
}

impl ResearchAgent {
    pub fn new(llm: Arc<LLM>, search: Arc<dyn SearchProvider>, settings: ResearchSettings) -> Self {
        Self {
            llm,
            search,
            knowledge: None,
            catalog: KeywordCatalog::new(),
            policy: DomainPolicy::default(),
            settings,
        }
    }

    pub fn with_knowledge_base(mut self, knowledge: Arc<dyn KnowledgeBase>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Run every expression against the search provider and merge the hits.
    ///
    /// Hits keep expression order, then provider rank; a document already
    /// seen under an earlier expression is skipped.
    async fn gather_candidates(&self, expressions: &[String]) -> AppResult<Vec<Document>> {
        let searches = expressions
            .iter()
            .map(|expression| self.search.search(expression, self.settings.max_results));
        let results = join_all(searches).await;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (expression, result) in expressions.iter().zip(results) {
            let documents = result.map_err(|e| {
                warn!(provider = self.search.name(), expression = %expression, error = %e, "Search failed");
                e
            })?;
            for document in documents {
                if seen.insert(document.id.clone()) {
                    candidates.push(document);
                }
            }
        }
        Ok(candidates)
    }

    fn create_research_prompt(
        &self,
        query: &str,
        expressions: &[String],
        candidates: &[Document],
        notes: &[String],
    ) -> String {
        let strategy = expressions
            .iter()
            .map(|e| format!("- {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        let background = if notes.is_empty() {
            "None.".to_string()
        } else {
            notes.iter().map(|n| format!("- {}", n)).collect::<Vec<_>>().join("\n")
        };

        let candidate_block = if candidates.is_empty() {
            "No candidate papers were returned by PubMed for these expressions.".to_string()
        } else {
            candidates
                .iter()
                .enumerate()
                .map(|(i, doc)| self.format_candidate(i + 1, doc))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        format!(
            r#"USER QUERY: {query}

PUBMED SEARCH EXPRESSIONS USED:
{strategy}

BACKGROUND ON TERMS IN THE QUERY:
{background}

RELEVANCE POLICY:
{policy}

CANDIDATE PAPERS ({count} found):
{candidate_block}

TASK:
1. Explain in query_interpretation how you understood the query: herbs, formulations or practices, conditions, and the research aspect (efficacy, safety, mechanisms).
2. Describe in search_strategy the expressions above and how you judged relevance.
3. Set total_found to the number of candidate papers you considered.
4. For each candidate that satisfies the relevance policy, most relevant first, produce a paper entry:
   - source_id: the PMID exactly as given
   - title: the paper title
   - summary: a detailed summary of the abstract and methodology (150-200 words) focused on Ayurvedic relevance
   - key_points: 5-8 specific findings with quantitative data (dosages, effect sizes, p-values) where available
   - domain_relevance: how the findings validate or challenge traditional Ayurvedic principles
   - study_type: clinical trial, systematic review, observational, in-vitro, animal study, etc.
   - sample_size: participants or sample size if the abstract states it, otherwise null
5. Use only information from the candidates. If none are relevant, return an empty papers list and still explain the strategy.

Respond with ONLY the JSON object."#,
            query = query,
            strategy = strategy,
            background = background,
            policy = self.policy.describe(),
            count = candidates.len(),
            candidate_block = candidate_block,
        )
    }

    fn format_candidate(&self, index: usize, doc: &Document) -> String {
        let mut venue = Vec::new();
        if let Some(journal) = &doc.journal {
            venue.push(journal.clone());
        }
        if let Some(year) = doc.year {
            venue.push(year.to_string());
        }
        let venue = if venue.is_empty() {
            String::new()
        } else {
            format!(" ({})", venue.join(", "))
        };

        let haystack = format!("{} {}", doc.title, doc.text);
        let include = self.policy.matched_include(&haystack);
        let exclude = self.policy.matched_exclude(&haystack);
        let signals = |found: Vec<&str>| if found.is_empty() { "none".to_string() } else { found.join(", ") };

        let abstract_text = if doc.text.is_empty() {
            "(no abstract available)".to_string()
        } else {
            truncate_chars(&doc.text, MAX_ABSTRACT_CHARS)
        };

        format!(
            "[{index}] PMID {id}{venue}\nTitle: {title}\nDomain signals: {include} | Exclusion signals: {exclude}\nAbstract: {abstract_text}",
            index = index,
            id = doc.id,
            venue = venue,
            title = doc.title,
            include = signals(include),
            exclude = signals(exclude),
            abstract_text = abstract_text,
        )
    }
}

#[async_trait]
impl ResearchStage for ResearchAgent {
    async fn run(&self, user_query: &str) -> AppResult<ResearchRecord> {
        let expressions = self
            .catalog
            .build_expressions(user_query, self.settings.max_expressions);
        info!(query = %user_query, expressions = ?expressions, "Starting research");

        let candidates = self.gather_candidates(&expressions).await?;
        let notes = self
            .knowledge
            .as_ref()
            .map(|kb| kb.lookup(user_query))
            .unwrap_or_default();
        info!(candidates = candidates.len(), notes = notes.len(), "Candidates gathered");

        let prompt = self.create_research_prompt(user_query, &expressions, &candidates, &notes);
        let request = LLMRequest::new(&self.settings.model, RESEARCH_SYSTEM_PROMPT, prompt)
            .with_temperature(0.2)
            .with_max_tokens(8192);

        let record: ResearchRecord =
            generate_structured(&self.llm, request, &self.settings.structured).await?;

        for note in record.advisories() {
            warn!(note = %note, "Research record advisory");
        }
        info!(
            total_found = record.total_found,
            papers = record.papers.len(),
            "Research record produced"
        );
        Ok(record)
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LLMAdapter;
    use crate::search::SearchError;
    use crate::types::LLMResponse;

    struct NoSearch;

    #[async_trait]
    impl SearchProvider for NoSearch {
        fn name(&self) -> &str {
            "none"
        }
        async fn search(&self, _e: &str, _n: usize) -> Result<Vec<Document>, SearchError> {
            Ok(vec![])
        }
    }

    struct NoModel;

    #[async_trait]
    impl LLMAdapter for NoModel {
        async fn create_chat_completion(&self, _r: &LLMRequest) -> AppResult<LLMResponse> {
            unreachable!("prompt tests do not call the model")
        }
    }

    fn agent() -> ResearchAgent {
        ResearchAgent::new(
            Arc::new(LLM::from_adapter("none", Box::new(NoModel))),
            Arc::new(NoSearch),
            ResearchSettings {
                model: "m".to_string(),
                max_results: 5,
                max_expressions: 3,
                structured: StructuredOptions::default(),
            },
        )
    }

    fn doc(id: &str, title: &str, text: &str) -> Document {
        Document {
            id: id.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            journal: Some("J Ethnopharmacol".to_string()),
            year: Some(2021),
        }
    }

    #[test]
    fn test_prompt_lists_candidates_with_signals() {
        let agent = agent();
        let prompt = agent.create_research_prompt(
            "ashwagandha for anxiety",
            &["ashwagandha".to_string()],
            &[doc("111", "Ashwagandha root extract in stress", "An Ayurvedic rasayana trial.")],
            &["ashwagandha (herb): also known as withania somnifera".to_string()],
        );
        assert!(prompt.contains("[1] PMID 111 (J Ethnopharmacol, 2021)"));
        assert!(prompt.contains("Domain signals: ayurvedic, ashwagandha, rasayana"));
        assert!(prompt.contains("Exclusion signals: none"));
        assert!(prompt.contains("also known as withania somnifera"));
        assert!(prompt.contains("CANDIDATE PAPERS (1 found)"));
    }

    #[test]
    fn test_prompt_without_candidates() {
        let prompt = agent().create_research_prompt("xyz", &["xyz".to_string()], &[], &[]);
        assert!(prompt.contains("No candidate papers were returned"));
        assert!(prompt.contains("BACKGROUND ON TERMS IN THE QUERY:\nNone."));
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("ééééé", 2), "éé…");
    }
}
