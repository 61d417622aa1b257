// Google Gemini adapter (generateContent API)
// API Reference: https://ai.google.dev/api/generate-content

use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, ResponseFormat, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleAdapter {
    client: Client,
    api_key: String,
    api_base: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GoogleAdapter {
    pub fn new_with_api_base(api_key: &str, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn build_body(request: &LLMRequest) -> GenerateRequest {
        let text_content = |role: Option<&str>, text: &str| GeminiContent {
            role: role.map(String::from),
            parts: vec![GeminiPart { text: Some(text.to_string()) }],
        };

        let contents = request
            .messages
            .iter()
            .map(|m| {
                // Gemini names the assistant role "model"
                let role = if m.role == "assistant" { "model" } else { "user" };
                text_content(Some(role), &m.content)
            })
            .collect();

        let mut generation_config = GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            ..Default::default()
        };
        if let Some(ResponseFormat::JsonSchema { schema, .. }) = &request.response_format {
            generation_config.response_mime_type = Some("application/json".to_string());
            generation_config.response_schema = Some(to_gemini_schema(schema));
        }

        GenerateRequest {
            system_instruction: request
                .system_instruction
                .as_deref()
                .map(|s| text_content(None, s)),
            contents,
            generation_config,
        }
    }
}

#[async_trait]
impl LLMAdapter for GoogleAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/models/{}:generateContent", self.api_base, request.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(error_response) = serde_json::from_str::<GeminiErrorResponse>(&error_text) {
                return Err(AppError::Upstream(format!(
                    "Gemini API error ({}): {} (status: {:?})",
                    status, error_response.error.message, error_response.error.status
                )));
            }
            return Err(AppError::Upstream(format!("Gemini API error ({}): {}", status, error_text)));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Gemini response: {}", e)))?;

        let candidate = generated
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Upstream("Gemini returned no candidates".to_string()))?;

        let content = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = generated
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            finish_reason: candidate.finish_reason.unwrap_or_else(|| "STOP".to_string()),
            usage,
        })
    }
}

/// Rewrite a JSON Schema into the OpenAPI subset Gemini's `responseSchema` accepts:
/// `$ref`s are inlined, `["T", "null"]` becomes `T` + `nullable`, and unsupported
/// keywords are dropped.
pub fn to_gemini_schema(schema: &Value) -> Value {
    let defs = schema
        .get("$defs")
        .or_else(|| schema.get("definitions"))
        .cloned()
        .unwrap_or(Value::Null);
    convert_node(schema, &defs, 0)
}

const MAX_REF_DEPTH: usize = 16;

fn convert_node(node: &Value, defs: &Value, depth: usize) -> Value {
    let Some(obj) = node.as_object() else {
        return node.clone();
    };

    if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
        let name = reference.rsplit('/').next().unwrap_or(reference);
        return match defs.get(name) {
            Some(target) if depth < MAX_REF_DEPTH => convert_node(target, defs, depth + 1),
            _ => Value::Object(Map::new()),
        };
    }

    let mut out = Map::new();
    for (key, value) in obj {
        match key.as_str() {
            "type" => match value {
                Value::Array(types) => {
                    let non_null: Vec<&Value> =
                        types.iter().filter(|t| t.as_str() != Some("null")).collect();
                    if let Some(first) = non_null.first() {
                        out.insert("type".to_string(), (*first).clone());
                    }
                    if non_null.len() < types.len() {
                        out.insert("nullable".to_string(), Value::Bool(true));
                    }
                }
                other => {
                    out.insert("type".to_string(), other.clone());
                }
            },
            "properties" => {
                let props = value
                    .as_object()
                    .map(|p| {
                        p.iter()
                            .map(|(k, v)| (k.clone(), convert_node(v, defs, depth)))
                            .collect::<Map<_, _>>()
                    })
                    .unwrap_or_default();
                out.insert("properties".to_string(), Value::Object(props));
            }
            "items" => {
                out.insert("items".to_string(), convert_node(value, defs, depth));
            }
            "description" | "required" | "enum" => {
                out.insert(key.clone(), value.clone());
            }
            _ => {}
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_conversion_inlines_refs_and_nullables() {
        let schema = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": "Record",
            "type": "object",
            "properties": {
                "count": {"type": "integer", "format": "uint32", "minimum": 0},
                "items": {"type": "array", "items": {"$ref": "#/$defs/Item"}}
            },
            "required": ["count", "items"],
            "$defs": {
                "Item": {
                    "type": "object",
                    "properties": {
                        "note": {"type": ["string", "null"], "description": "optional"}
                    }
                }
            }
        });

        let converted = to_gemini_schema(&schema);
        assert!(converted.get("$schema").is_none());
        assert!(converted.get("$defs").is_none());
        assert!(converted.get("title").is_none());
        assert_eq!(converted["properties"]["count"], json!({"type": "integer"}));
        let note = &converted["properties"]["items"]["items"]["properties"]["note"];
        assert_eq!(note["type"], "string");
        assert_eq!(note["nullable"], true);
        assert_eq!(note["description"], "optional");
        assert_eq!(converted["required"], json!(["count", "items"]));
    }

    #[test]
    fn test_build_body_maps_roles_and_schema() {
        let mut request = LLMRequest::new("gemini-2.5-flash", "system text", "question")
            .with_response_format(ResponseFormat::JsonSchema {
                name: "R".to_string(),
                schema: json!({"type": "object"}),
            });
        request.messages.push(crate::types::LLMMessage::assistant("earlier answer"));

        let body = serde_json::to_value(GoogleAdapter::build_body(&request)).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "system text");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }
}
