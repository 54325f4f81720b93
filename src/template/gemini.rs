//! Gemini Vision 구조화 출력 모델
//!
//! Gemini function calling으로 도면 치수를 `DimensionalInfo` 호출 목록으로 받습니다.
//! ref: https://ai.google.dev/gemini-api/docs/function-calling

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::model::{ModelRequest, StructuredModel};
use super::DimensionDescriptor;
use crate::embedding::get_api_key;

/// 기본 Vision 모델
pub const DEFAULT_VISION_MODEL: &str = "gemini-1.5-pro";

/// generateContent 엔드포인트 (모델 이름 치환)
const GEMINI_GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 치수 정보 함수 이름
const TOOL_NAME: &str = "DimensionalInfo";

/// Gemini Vision 모델 클라이언트
#[derive(Debug)]
pub struct GeminiVisionModel {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiVisionModel {
    /// 새 클라이언트 생성
    pub fn new(api_key: String, model: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            client,
        })
    }

    /// 환경변수의 API 키로 생성
    pub fn from_env(model: Option<String>) -> Result<Self> {
        Self::new(get_api_key()?, model)
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_GENERATE_URL, self.model)
    }
}

#[async_trait]
impl StructuredModel for GeminiVisionModel {
    async fn generate_structured(&self, request: &ModelRequest) -> Result<Vec<DimensionDescriptor>> {
        let body = build_request(request);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send Gemini request")?;

        let status = response.status();
        let text = response.text().await.context("Failed to read response body")?;

        if !status.is_success() {
            anyhow::bail!("Gemini API error ({}): {}", status, text);
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text).context("Failed to parse Gemini response")?;

        parse_tool_calls(parsed)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// 요청 본문 구성
fn build_request(request: &ModelRequest) -> GenerateRequest {
    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part::Text {
                text: request.system_instructions.clone(),
            }],
        },
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: "image/jpeg".to_string(),
                        data: request.image_base64.clone(),
                    },
                },
                Part::Text {
                    text: request.feature_context.clone(),
                },
            ],
        }],
        tools: vec![json!({
            "functionDeclarations": [{
                "name": TOOL_NAME,
                "description": "Dimension labeled with an alphabet in the blueprint",
                "parameters": {
                    "type": "OBJECT",
                    "properties": {
                        "name": {"type": "STRING", "description": "Natural language title of the dimension"},
                        "alphabet": {"type": "STRING", "description": "Alphabet labeling the dimension in the blueprint"},
                        "value": {"type": "NUMBER", "description": "Dimension value in the blueprint"},
                        "desc": {"type": "STRING", "description": "Detailed description of the dimension without its value"}
                    },
                    "required": ["name", "alphabet", "value", "desc"]
                }
            }]
        })],
        tool_config: json!({"functionCallingConfig": {"mode": "ANY"}}),
        generation_config: GenerationConfig { temperature: 0.0 },
    }
}

/// 응답에서 DimensionalInfo 호출 인자 추출
fn parse_tool_calls(response: GenerateResponse) -> Result<Vec<DimensionDescriptor>> {
    let calls = response
        .candidates
        .into_iter()
        .next()
        .map(|c| c.content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.function_call)
        .filter(|call| call.name == TOOL_NAME);

    let mut descriptors = Vec::new();
    for call in calls {
        let descriptor: DimensionDescriptor = serde_json::from_value(call.args)
            .context("Malformed DimensionalInfo arguments")?;
        descriptors.push(descriptor);
    }

    Ok(descriptors)
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    contents: Vec<Content>,
    tools: Vec<serde_json::Value>,
    #[serde(rename = "toolConfig")]
    tool_config: serde_json::Value,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(rename = "functionCall")]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            system_instructions: "sys".to_string(),
            image_base64: "AAAA".to_string(),
            feature_context: r#"{"D":10.0}"#.to_string(),
        }
    }

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(build_request(&request())).unwrap();

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(body["contents"][0]["parts"][1]["text"], r#"{"D":10.0}"#);
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], TOOL_NAME);
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
        assert!(body["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn test_parse_tool_calls() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "thinking"},
                        {"functionCall": {"name": "DimensionalInfo", "args": {
                            "name": "Diameter", "alphabet": "D", "value": 10, "desc": "Thread diameter"
                        }}},
                        {"functionCall": {"name": "DimensionalInfo", "args": {
                            "name": "Length", "alphabet": "L", "value": 16.5, "desc": "Shank length"
                        }}}
                    ]
                }
            }]
        }))
        .unwrap();

        let descriptors = parse_tool_calls(response).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].alphabet, "D");
        assert_eq!(descriptors[0].value, 10.0);
        assert_eq!(descriptors[1].value, 16.5);
    }

    #[test]
    fn test_parse_no_tool_calls_is_empty() {
        let response: GenerateResponse =
            serde_json::from_value(json!({"candidates": [{"content": {"parts": [{"text": "no"}]}}]}))
                .unwrap();
        assert!(parse_tool_calls(response).unwrap().is_empty());

        let response: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert!(parse_tool_calls(response).unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_args_is_error() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "DimensionalInfo", "args": {"name": "Diameter"}}}
            ]}}]
        }))
        .unwrap();
        assert!(parse_tool_calls(response).is_err());
    }
}
