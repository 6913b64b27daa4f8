//! Wire types for OpenAI's Responses-style API (spec §6 "Provider-facing
//! surface"), adapted from the teacher's `responses_api` module: same
//! tagged-enum/serde idioms, narrowed to the shapes this adapter needs.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputItem {
    pub role: Role,
    pub content: String,
}

impl InputItem {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Required,
}

impl ToolChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Required => "required",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    WebSearch,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextFormat {
    Text,
    JsonSchema {
        name: String,
        schema: serde_json::Value,
        strict: bool,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextConfig {
    pub format: TextFormat,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub effort: ReasoningEffort,
}

#[derive(Clone, Debug, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OutputTextPart {
    pub text: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Output {
    Message {
        #[serde(default)]
        content: Vec<OutputTextPart>,
    },
    WebSearchCall {
        #[serde(default)]
        action: Option<WebSearchAction>,
    },
    Reasoning {
        #[serde(default)]
        summary: Vec<serde_json::Value>,
    },
    /// Anything the wire format adds later; kept so an unrecognized item
    /// never fails deserialization of the whole response.
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebSearchAction {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub sources: Vec<WebSearchSource>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebSearchSource {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OutputTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    #[serde(default)]
    pub total_tokens: Option<i64>,
    #[serde(default)]
    pub output_tokens_details: OutputTokensDetails,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub output: Vec<Output>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub system_fingerprint: Option<String>,
}

impl CompletionResponse {
    /// First `message` output item's concatenated text, if any (spec §4.3
    /// "Output assembly": "Extract text from any `message` output item").
    pub fn message_text(&self) -> Option<String> {
        self.output.iter().find_map(|item| match item {
            Output::Message { content } => {
                let text: String = content.iter().map(|p| p.text.as_str()).collect();
                Some(text)
            }
            _ => None,
        })
    }

    pub fn has_reasoning_only(&self) -> bool {
        let has_reasoning = self
            .output
            .iter()
            .any(|item| matches!(item, Output::Reasoning { .. }));
        let has_message = self
            .output
            .iter()
            .any(|item| matches!(item, Output::Message { .. }));
        has_reasoning && !has_message
    }

    pub fn web_search_call_count(&self) -> usize {
        self.output
            .iter()
            .filter(|item| matches!(item, Output::WebSearchCall { .. }))
            .count()
    }

    pub fn web_search_chunks(&self) -> Vec<crate::extractor::RawChunk> {
        self.output
            .iter()
            .filter_map(|item| match item {
                Output::WebSearchCall {
                    action: Some(action),
                } => Some(action.sources.clone()),
                _ => None,
            })
            .flatten()
            .map(|source| crate::extractor::RawChunk {
                uri: source.url,
                title: source.title,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_joins_parts() {
        let resp = CompletionResponse {
            id: "resp_1".into(),
            model: Some("gpt-4o".into()),
            output: vec![Output::Message {
                content: vec![
                    OutputTextPart { text: "hello ".into() },
                    OutputTextPart { text: "world".into() },
                ],
            }],
            usage: None,
            system_fingerprint: None,
        };
        assert_eq!(resp.message_text(), Some("hello world".to_string()));
    }

    #[test]
    fn reasoning_only_detected_when_no_message() {
        let resp = CompletionResponse {
            id: "resp_2".into(),
            model: None,
            output: vec![Output::Reasoning { summary: vec![] }],
            usage: None,
            system_fingerprint: None,
        };
        assert!(resp.has_reasoning_only());
    }
}
