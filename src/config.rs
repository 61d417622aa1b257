use anyhow::{bail, Result};
use serde::Deserialize;
use std::env;

use crate::types::LLMProvider;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub pubmed: PubMedConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: String,
    pub openai_api_key: String,
    pub google_api_key: String,
    pub groq_api_key: String,
    pub openrouter_api_key: String,
    /// Overrides the provider's default endpoint (OpenAI-compatible gateways, tests)
    pub base_url: Option<String>,
    pub research_model: String,
    pub summary_model: String,
    /// Model used for repairing malformed structured output; falls back to `research_model`
    pub parser_model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PubMedConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub email: Option<String>,
    pub tool: String,
    pub max_results: usize,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub request_timeout_secs: u64,
    pub schema_retries: u32,
    pub max_search_expressions: usize,
    pub summary_max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub directory: Option<String>,
}

impl LLMConfig {
    /// API key for the configured provider, if one is set
    pub fn active_api_key(&self) -> Option<String> {
        let key = match LLMProvider::from_id(&self.provider)? {
            LLMProvider::OpenAI => &self.openai_api_key,
            LLMProvider::Google => &self.google_api_key,
            LLMProvider::Groq => &self.groq_api_key,
            LLMProvider::OpenRouter => &self.openrouter_api_key,
        };
        if key.is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }

    pub fn parser_model(&self) -> &str {
        self.parser_model.as_deref().unwrap_or(&self.research_model)
    }
}

fn default_model(provider: &str) -> &'static str {
    match provider {
        "google" | "gemini" => "gemini-2.5-flash",
        "groq" => "llama-3.3-70b-versatile",
        "openrouter" => "google/gemini-2.5-flash",
        _ => "gpt-4o-mini",
    }
}

fn non_empty(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let provider = env::var("LLM_PROVIDER").unwrap_or_else(|_| "google".to_string());
        // A generic key applies to whichever provider is selected
        let generic_key = env::var("LLM_API_KEY").unwrap_or_default();
        let key_for = |var: &str, id: &str| {
            let key = env::var(var).unwrap_or_default();
            if key.is_empty() && provider == id {
                generic_key.clone()
            } else {
                key
            }
        };
        let research_model = env::var("RESEARCH_LLM_MODEL")
            .unwrap_or_else(|_| default_model(&provider).to_string());

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            llm: LLMConfig {
                openai_api_key: key_for("OPENAI_API_KEY", "openai"),
                google_api_key: key_for("GOOGLE_API_KEY", "google"),
                groq_api_key: key_for("GROQ_API_KEY", "groq"),
                openrouter_api_key: key_for("OPENROUTER_API_KEY", "openrouter"),
                base_url: non_empty("LLM_BASE_URL"),
                summary_model: env::var("SUMMARY_LLM_MODEL")
                    .unwrap_or_else(|_| research_model.clone()),
                research_model,
                parser_model: non_empty("PARSER_LLM_MODEL"),
                provider,
            },
            pubmed: PubMedConfig {
                base_url: env::var("PUBMED_BASE_URL")
                    .unwrap_or_else(|_| crate::search::pubmed::EUTILS_BASE.to_string()),
                api_key: non_empty("NCBI_API_KEY"),
                email: non_empty("NCBI_EMAIL"),
                tool: env::var("NCBI_TOOL").unwrap_or_else(|_| "ayurveda-research".to_string()),
                max_results: env::var("PUBMED_MAX_RESULTS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                max_attempts: env::var("PUBMED_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()?,
            },
            pipeline: PipelineConfig {
                request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "180".to_string())
                    .parse()?,
                schema_retries: env::var("SCHEMA_RETRIES")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
                max_search_expressions: env::var("MAX_SEARCH_EXPRESSIONS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()?,
                summary_max_tokens: env::var("SUMMARY_MAX_TOKENS")
                    .unwrap_or_else(|_| "8192".to_string())
                    .parse()?,
            },
            logging: LoggingConfig {
                directory: non_empty("LOG_DIR"),
            },
        })
    }

    /// Checks that must hold before any request is served
    pub fn validate(&self) -> Result<()> {
        if LLMProvider::from_id(&self.llm.provider).is_none() {
            bail!(
                "Unsupported LLM_PROVIDER '{}' (expected openai, groq, openrouter or google)",
                self.llm.provider
            );
        }
        if self.llm.active_api_key().is_none() {
            bail!("No API key configured for LLM provider '{}'", self.llm.provider);
        }
        if self.pubmed.max_results == 0 {
            bail!("PUBMED_MAX_RESULTS must be at least 1");
        }
        if self.pubmed.max_attempts == 0 {
            bail!("PUBMED_MAX_ATTEMPTS must be at least 1");
        }
        if self.pipeline.max_search_expressions == 0 {
            bail!("MAX_SEARCH_EXPRESSIONS must be at least 1");
        }
        if self.pipeline.summary_max_tokens == 0 {
            bail!("SUMMARY_MAX_TOKENS must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        server: ServerConfig {
            port: 3000,
            host: "127.0.0.1".to_string(),
            cors_allowed_origins: vec![],
        },
        llm: LLMConfig {
            provider: "openai".to_string(),
            openai_api_key: "test-key".to_string(),
            google_api_key: String::new(),
            groq_api_key: String::new(),
            openrouter_api_key: String::new(),
            base_url: None,
            research_model: "gpt-4o-mini".to_string(),
            summary_model: "gpt-4o-mini".to_string(),
            parser_model: None,
        },
        pubmed: PubMedConfig {
            base_url: crate::search::pubmed::EUTILS_BASE.to_string(),
            api_key: None,
            email: None,
            tool: "ayurveda-research".to_string(),
            max_results: 5,
            max_attempts: 3,
        },
        pipeline: PipelineConfig {
            request_timeout_secs: 60,
            schema_retries: 1,
            max_search_expressions: 3,
            summary_max_tokens: 8192,
        },
        logging: LoggingConfig { directory: None },
    }
}
