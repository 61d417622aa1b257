// Ayurveda Research - two-stage LLM pipeline over PubMed evidence

pub mod config;
pub mod models;
pub mod types;
pub mod agents;
pub mod knowledge;
pub mod llm;
pub mod search;    // Literature search (NCBI E-utilities)
pub mod routes;
pub mod middleware;
pub mod utils;

// Re-exports for convenience
pub use agents::{RequestOptions, ResearchPipeline};
pub use config::Config;
pub use models::AppState;
// Note: Import specific items from types module instead of glob to avoid name conflicts
// e.g., use ayurveda_research::types::{LLMRequest, LLMResponse, AppResult};

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
