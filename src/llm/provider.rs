use async_trait::async_trait;
use crate::types::{AppError, AppResult, LLMProvider, LLMRequest, LLMResponse};

/// A concrete language model backend
#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Configuration for LLM provider (renamed to avoid conflict with LLMProvider enum in types.rs)
pub struct LLMProviderConfig {
    pub name: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

impl LLMProviderConfig {
    pub fn from_config(config: &crate::config::LLMConfig) -> AppResult<Self> {
        let api_key = config.active_api_key().ok_or_else(|| {
            AppError::Config(format!("No API key configured for provider '{}'", config.provider))
        })?;
        Ok(Self {
            name: config.provider.clone(),
            api_key,
            base_url: config.base_url.clone(),
        })
    }
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    provider_name: String,
}

impl LLM {
    pub fn new(provider: LLMProviderConfig) -> AppResult<Self> {
        let kind = LLMProvider::from_id(&provider.name)
            .ok_or_else(|| AppError::Config(format!("Unsupported provider: {}", provider.name)))?;
        let base_url = provider.base_url.as_deref();

        let adapter: Box<dyn LLMAdapter> = match kind {
            LLMProvider::OpenAI => Box::new(crate::llm::openai::OpenAIAdapter::new_with_api_base(
                &provider.api_key,
                base_url.unwrap_or(crate::llm::openai::OPENAI_API_BASE),
            )),
            LLMProvider::Groq => Box::new(crate::llm::openai::OpenAIAdapter::new_with_api_base(
                &provider.api_key,
                base_url.unwrap_or(crate::llm::openai::GROQ_API_BASE),
            )),
            LLMProvider::OpenRouter => Box::new(crate::llm::openai::OpenAIAdapter::new_with_api_base(
                &provider.api_key,
                base_url.unwrap_or(crate::llm::openai::OPENROUTER_API_BASE),
            )),
            LLMProvider::Google => Box::new(crate::llm::google::GoogleAdapter::new_with_api_base(
                &provider.api_key,
                base_url.unwrap_or(crate::llm::google::GEMINI_API_BASE),
            )),
        };

        Ok(Self {
            adapter,
            provider_name: provider.name,
        })
    }

    /// Wrap an existing adapter, e.g. a test double
    pub fn from_adapter(name: impl Into<String>, adapter: Box<dyn LLMAdapter>) -> Self {
        Self {
            adapter,
            provider_name: name.into(),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_config_error() {
        let result = LLM::new(LLMProviderConfig {
            name: "anthropic".to_string(),
            api_key: "k".to_string(),
            base_url: None,
        });
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_known_providers_build() {
        for name in ["openai", "groq", "openrouter", "google"] {
            let llm = LLM::new(LLMProviderConfig {
                name: name.to_string(),
                api_key: "k".to_string(),
                base_url: None,
            })
            .unwrap();
            assert_eq!(llm.provider_name(), name);
        }
    }
}
