//! Schema-constrained generation
//!
//! Sends a request with the JSON schema of `T`, parses the reply and runs the
//! type's own checks. A malformed reply gets a bounded number of repair turns
//! in which the model sees its previous output and the parse error. When the
//! allowance is used up the caller gets [`AppError::Schema`].

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::llm::provider::LLM;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, ResponseFormat};

/// Types the model can be asked to produce
pub trait StructuredOutput: DeserializeOwned + JsonSchema {
    /// Checks beyond what deserialization enforces
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

impl StructuredOutput for crate::models::ResearchRecord {
    fn check(&self) -> Result<(), String> {
        self.validate()
    }
}

#[derive(Debug, Clone)]
pub struct StructuredOptions {
    /// Extra attempts after the first malformed reply
    pub retries: u32,
    /// Model for repair turns; `None` reuses the request's model
    pub parser_model: Option<String>,
}

impl Default for StructuredOptions {
    fn default() -> Self {
        Self {
            retries: 1,
            parser_model: None,
        }
    }
}

/// JSON schema for `T` as sent to providers
pub fn schema_value<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

/// Generate a `T`, retrying malformed output up to `options.retries` times
pub async fn generate_structured<T: StructuredOutput>(
    llm: &LLM,
    request: LLMRequest,
    options: &StructuredOptions,
) -> AppResult<T> {
    let name = T::schema_name().to_string();
    let mut request = request.with_response_format(ResponseFormat::JsonSchema {
        name: name.clone(),
        schema: schema_value::<T>(),
    });

    let mut attempt = 0;
    loop {
        let response = llm.create_chat_completion(&request).await?;
        let error = match parse_structured::<T>(&response.content) {
            Ok(value) => {
                debug!(schema = %name, attempt, "Structured output accepted");
                return Ok(value);
            }
            Err(e) => e,
        };

        if attempt >= options.retries {
            return Err(AppError::Schema(format!(
                "{} did not match the expected structure after {} attempt(s): {}",
                name,
                attempt + 1,
                error
            )));
        }
        attempt += 1;
        warn!(schema = %name, attempt, error = %error, "Malformed structured output, requesting repair");

        if let Some(parser) = &options.parser_model {
            request.model = parser.clone();
        }
        request.messages.push(LLMMessage::assistant(response.content));
        request.messages.push(LLMMessage::user(repair_prompt(&name, &error)));
    }
}

fn repair_prompt(schema_name: &str, error: &str) -> String {
    format!(
        "Your previous reply could not be used as a {schema_name} object.\n\
         Problem: {error}\n\n\
         Reply again with ONLY the corrected JSON object. Keep the content, fix the structure. \
         Do not wrap it in markdown or add commentary."
    )
}

/// Parse model output as `T`, tolerating code fences and surrounding prose
pub fn parse_structured<T: StructuredOutput>(raw: &str) -> Result<T, String> {
    let json_str = extract_json(raw).ok_or_else(|| "no JSON object found in output".to_string())?;
    let value: T = serde_json::from_str(json_str).map_err(|e| e.to_string())?;
    value.check()?;
    Ok(value)
}

/// Pull the JSON object out of a model reply
pub fn extract_json(response: &str) -> Option<&str> {
    let fenced = if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
    } else if response.contains("```") {
        response.split("```").nth(1)
    } else {
        None
    };
    let candidate = fenced.unwrap_or(response).trim();

    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&candidate[start..=end])
}
