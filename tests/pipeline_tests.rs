use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use ayurveda_research::agents::summary::NO_EVIDENCE_NOTICE;
use ayurveda_research::agents::{
    ResearchAgent, ResearchSettings, ResearchStage, SummaryAgent, SummaryStage,
};
use ayurveda_research::llm::{LLMAdapter, StructuredOptions, LLM};
use ayurveda_research::models::{Document, ResearchRecord};
use ayurveda_research::search::{SearchError, SearchProvider};
use ayurveda_research::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};
use ayurveda_research::{RequestOptions, ResearchPipeline};

/// Replays canned replies in order and records every request it sees
struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    requests: Arc<Mutex<Vec<LLMRequest>>>,
}

#[async_trait]
impl LLMAdapter for ScriptedModel {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::Upstream("no scripted reply left".to_string()))?;
        Ok(LLMResponse {
            content,
            finish_reason: "stop".to_string(),
            usage: TokenUsage::default(),
        })
    }
}

fn scripted_llm(replies: Vec<String>) -> (Arc<LLM>, Arc<Mutex<Vec<LLMRequest>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let model = ScriptedModel {
        replies: Mutex::new(replies.into()),
        requests: requests.clone(),
    };
    (Arc::new(LLM::from_adapter("scripted", Box::new(model))), requests)
}

struct FixedSearch {
    documents: Vec<Document>,
    fail: bool,
    expressions: Mutex<Vec<String>>,
}

impl FixedSearch {
    fn returning(documents: Vec<Document>) -> Self {
        Self {
            documents,
            fail: false,
            expressions: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            documents: vec![],
            fail: true,
            expressions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SearchProvider for FixedSearch {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn search(&self, expression: &str, max_results: usize) -> Result<Vec<Document>, SearchError> {
        self.expressions.lock().unwrap().push(expression.to_string());
        if self.fail {
            return Err(SearchError::Status {
                status: 503,
                body: "Service Unavailable".to_string(),
            });
        }
        Ok(self.documents.iter().take(max_results).cloned().collect())
    }
}

struct CountingSummary {
    calls: AtomicUsize,
}

#[async_trait]
impl SummaryStage for CountingSummary {
    async fn run(&self, query: &str, _record: &ResearchRecord) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("# {}", query))
    }
}

struct SlowResearch(Duration);

#[async_trait]
impl ResearchStage for SlowResearch {
    async fn run(&self, _query: &str) -> AppResult<ResearchRecord> {
        tokio::time::sleep(self.0).await;
        Ok(serde_json::from_str(&record_json("[]")).unwrap())
    }
}

fn settings() -> ResearchSettings {
    ResearchSettings {
        model: "research-model".to_string(),
        max_results: 5,
        max_expressions: 3,
        structured: StructuredOptions::default(),
    }
}

fn pipeline(llm: Arc<LLM>, search: Arc<FixedSearch>) -> ResearchPipeline {
    let research = ResearchAgent::new(llm.clone(), search, settings());
    let summary = SummaryAgent::new(llm, "summary-model");
    ResearchPipeline::new(Arc::new(research), Arc::new(summary))
}

fn record_json(papers: &str) -> String {
    format!(
        r#"{{"query_interpretation": "interpretation", "search_strategy": "strategy", "total_found": 2, "papers": {}}}"#,
        papers
    )
}

fn paper_json(id: &str) -> serde_json::Value {
    json!({
        "source_id": id,
        "title": "Withania somnifera root extract reduces stress and anxiety",
        "summary": "A randomized, double-blind, placebo-controlled trial of 300 mg root extract twice daily.",
        "key_points": ["Serum cortisol reduced by 27.9%", "Perceived stress scale fell significantly"],
        "domain_relevance": "Supports the traditional use of ashwagandha as a rasayana for stress.",
        "study_type": "clinical trial",
        "sample_size": "64 adults"
    })
}

fn ashwagandha_doc(id: &str) -> Document {
    Document {
        id: id.to_string(),
        title: "Withania somnifera root extract reduces stress and anxiety".to_string(),
        text: "Ashwagandha, an Ayurvedic rasayana, was given to 64 adults with chronic stress.".to_string(),
        journal: Some("Indian J Psychol Med".to_string()),
        year: Some(2012),
    }
}

const REPORT: &str = "# Ashwagandha for anxiety - Research Evidence Summary\n\n## Executive Summary\n\nTwo randomized trials found lower cortisol.\n\n## Practical Takeaways\n\n- Standardized root extract was used.";

#[tokio::test]
async fn test_ashwagandha_end_to_end() {
    let papers = json!([paper_json("23439798"), paper_json("31517876")]).to_string();
    let (llm, requests) = scripted_llm(vec![record_json(&papers), REPORT.to_string()]);
    let search = Arc::new(FixedSearch::returning(vec![
        ashwagandha_doc("23439798"),
        ashwagandha_doc("31517876"),
    ]));

    let report = pipeline(llm, search.clone())
        .answer("ashwagandha for anxiety")
        .await
        .unwrap();

    assert_eq!(report, REPORT);
    assert!(report.lines().any(|line| line.starts_with("# ")));
    assert!(report.contains("## Practical Takeaways"));
    assert!(!report.contains("\"source_id\""));
    assert!(!report.trim_start().starts_with('{'));

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].model, "research-model");
    assert!(requests[0].response_format.is_some());
    assert!(requests[0].messages[0].content.contains("PMID 23439798"));
    assert!(requests[0].messages[0].content.contains("CANDIDATE PAPERS (2 found)"));
    assert_eq!(requests[1].model, "summary-model");
    assert!(requests[1].response_format.is_none());
    assert!(requests[1].messages[0].content.contains("**Papers considered:** 2 (curated: 2)"));
    assert!(requests[1].messages[0].content.contains("Serum cortisol reduced by 27.9%"));

    let expressions = search.expressions.lock().unwrap();
    assert!(expressions.iter().any(|e| e.contains("withania somnifera")));
}

#[tokio::test]
async fn test_record_shape_is_stable_across_runs() {
    let papers = json!([paper_json("1"), paper_json("2")]).to_string();
    let search = Arc::new(FixedSearch::returning(vec![ashwagandha_doc("1"), ashwagandha_doc("2")]));

    let mut shapes = Vec::new();
    for _ in 0..2 {
        let (llm, _) = scripted_llm(vec![record_json(&papers)]);
        let agent = ResearchAgent::new(llm, search.clone(), settings());
        let record = agent.run("ashwagandha for anxiety").await.unwrap();
        let key_points: Vec<usize> = record.papers.iter().map(|p| p.key_points.len()).collect();
        let ids: Vec<String> = record.papers.iter().map(|p| p.source_id.clone()).collect();
        shapes.push((record.total_found, record.papers.len(), key_points, ids));
    }
    assert_eq!(shapes[0], shapes[1]);
    assert_eq!(shapes[0].1, 2);
}

#[tokio::test]
async fn test_unknown_herb_yields_no_evidence_report() {
    let (llm, requests) = scripted_llm(vec![record_json("[]")]);
    let search = Arc::new(FixedSearch::returning(vec![]));

    let report = pipeline(llm, search.clone())
        .answer("xyz-nonexistent-herb")
        .await
        .unwrap();

    assert!(report.starts_with("# xyz-nonexistent-herb"));
    assert!(report.contains(NO_EVIDENCE_NOTICE));
    // Only the research stage reached the model
    assert_eq!(requests.lock().unwrap().len(), 1);
    assert!(search
        .expressions
        .lock()
        .unwrap()
        .contains(&"(xyz-nonexistent-herb) AND (ayurveda OR ayurvedic)".to_string()));
}

#[tokio::test]
async fn test_source_ids_are_opaque_to_the_report_prompt() {
    let mut prompts = Vec::new();
    for id in ["111", "999"] {
        let papers = json!([paper_json(id)]).to_string();
        let (llm, requests) = scripted_llm(vec![record_json(&papers), REPORT.to_string()]);
        let search = Arc::new(FixedSearch::returning(vec![ashwagandha_doc(id)]));
        pipeline(llm, search).answer("ashwagandha for anxiety").await.unwrap();
        let summary_prompt = requests.lock().unwrap()[1].messages[0].content.clone();
        prompts.push(summary_prompt);
    }
    assert_eq!(prompts[0].replace("PMID 111", "PMID 999"), prompts[1]);
}

#[tokio::test]
async fn test_report_gets_a_heading_when_model_omits_one() {
    let papers = json!([paper_json("1")]).to_string();
    let (llm, _) = scripted_llm(vec![
        record_json(&papers),
        "## Executive Summary\n\nEvidence is limited.".to_string(),
    ]);
    let search = Arc::new(FixedSearch::returning(vec![ashwagandha_doc("1")]));

    let report = pipeline(llm, search).answer("brahmi memory").await.unwrap();
    assert!(report.starts_with("# brahmi memory - Research Evidence Summary\n\n## Executive Summary"));
}

#[tokio::test]
async fn test_search_failure_skips_summary() {
    let (llm, requests) = scripted_llm(vec![]);
    let research = ResearchAgent::new(llm, Arc::new(FixedSearch::failing()), settings());
    let summary = Arc::new(CountingSummary {
        calls: AtomicUsize::new(0),
    });
    let pipeline = ResearchPipeline::new(Arc::new(research), summary.clone());

    let err = pipeline.answer("turmeric arthritis").await.unwrap_err();
    assert!(matches!(err, AppError::Upstream(_)));
    assert_eq!(summary.calls.load(Ordering::SeqCst), 0);
    assert!(requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_record_is_schema_error() {
    let (llm, requests) = scripted_llm(vec!["not json".to_string(), "{\"papers\": 3}".to_string()]);
    let search = Arc::new(FixedSearch::returning(vec![ashwagandha_doc("1")]));

    let err = pipeline(llm, search).answer("ashwagandha").await.unwrap_err();
    assert!(matches!(err, AppError::Schema(_)));
    // First attempt plus one repair turn
    assert_eq!(requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_deadline_bounds_the_request() {
    let summary = Arc::new(CountingSummary {
        calls: AtomicUsize::new(0),
    });
    let pipeline = ResearchPipeline::new(Arc::new(SlowResearch(Duration::from_secs(30))), summary.clone());

    let started = Instant::now();
    let err = pipeline
        .answer_with("ashwagandha", RequestOptions::with_deadline(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Timeout(_)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_default_deadline_applies() {
    let summary = Arc::new(CountingSummary {
        calls: AtomicUsize::new(0),
    });
    let pipeline = ResearchPipeline::new(Arc::new(SlowResearch(Duration::from_secs(30))), summary)
        .with_default_deadline(Duration::from_millis(50));

    let err = pipeline.answer("ashwagandha").await.unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)));
}

#[tokio::test]
async fn test_cancellation_aborts_the_request() {
    let summary = Arc::new(CountingSummary {
        calls: AtomicUsize::new(0),
    });
    let pipeline = ResearchPipeline::new(Arc::new(SlowResearch(Duration::from_secs(30))), summary.clone());

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let options = RequestOptions {
        cancel: Some(token),
        ..RequestOptions::default()
    };
    let err = pipeline.answer_with("ashwagandha", options).await.unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)));
    assert_eq!(summary.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_query_is_rejected() {
    let (llm, requests) = scripted_llm(vec![]);
    let search = Arc::new(FixedSearch::returning(vec![]));

    let err = pipeline(llm, search.clone()).answer("   ").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
    assert!(requests.lock().unwrap().is_empty());
    assert!(search.expressions.lock().unwrap().is_empty());
}
