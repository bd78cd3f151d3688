//! Gemini `generateContent` wire types and the mapping to and from
//! [`CompletionRequest`].

use serde::{Deserialize, Serialize};

use nexus_core::errors::CompletionError;
use nexus_core::provider::CompletionRequest;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    pub generation_config: GenerationConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeminiContent {
    /// `user` or `model`.
    pub role: String,
    pub parts: Vec<TextPart>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    /// `STOP`, `MAX_TOKENS`, `SAFETY`, ...
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
    /// Reasoning parts are not part of the reply.
    #[serde(default)]
    pub thought: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

pub fn build_request_body(request: &CompletionRequest) -> GenerateContentRequest {
    let contents = request
        .contents
        .iter()
        .map(|turn| GeminiContent {
            role: turn.role.as_str().to_string(),
            parts: vec![TextPart {
                text: turn.content.clone(),
            }],
        })
        .collect();

    let system_instruction = (!request.system_instruction.is_empty()).then(|| SystemInstruction {
        parts: vec![TextPart {
            text: request.system_instruction.clone(),
        }],
    });

    GenerateContentRequest {
        contents,
        system_instruction,
        generation_config: GenerationConfig {
            temperature: request.temperature,
        },
    }
}

/// The reply text of the first candidate. A response with no text at all is
/// an [`CompletionError::EmptyReply`] naming why, if the API said.
pub fn extract_reply(response: &GenerateContentResponse) -> Result<String, CompletionError> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(CompletionError::EmptyReply(format!("prompt blocked: {reason}")));
    }

    let Some(candidate) = response.candidates.first() else {
        return Err(CompletionError::EmptyReply("no candidates returned".into()));
    };

    let text: String = candidate
        .content
        .iter()
        .flat_map(|c| c.parts.iter())
        .filter(|p| !p.thought)
        .filter_map(|p| p.text.as_deref())
        .collect();

    if text.is_empty() {
        let reason = candidate.finish_reason.as_deref().unwrap_or("UNKNOWN");
        return Err(CompletionError::EmptyReply(format!("finish reason {reason}")));
    }
    Ok(text)
}

/// Pull `error.message` out of a Gemini error body, falling back to the raw body.
pub fn parse_api_error(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
