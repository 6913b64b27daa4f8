//! Core data model: [`RunRequest`], [`RunResult`], [`GroundingMode`],
//! [`Citation`], and the capability record shape.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ResultErrorKind;

/// Grounding mode semantics for web search (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundingMode {
    Off,
    Preferred,
    Required,
}

impl GroundingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Preferred => "preferred",
            Self::Required => "required",
        }
    }
}

impl std::fmt::Display for GroundingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON Schema descriptor for structured outputs (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    pub schema: serde_json::Value,
    #[serde(default)]
    pub strict: bool,
}

impl SchemaDescriptor {
    /// Well-formedness check used by validation (spec §4.1): the schema must
    /// be an object, and when `strict` is true it must carry its own
    /// `schema`-shaped `properties`/`type` keys rather than being empty.
    pub fn is_well_formed(&self) -> bool {
        let Some(obj) = self.schema.as_object() else {
            return false;
        };
        if self.strict {
            return obj.contains_key("type") || obj.contains_key("properties");
        }
        true
    }
}

/// Immutable input to an orchestrator run (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRequest {
    pub run_id: String,
    pub client_id: String,
    pub provider: String,
    pub model_name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_grounding_mode")]
    pub grounding_mode: GroundingMode,
    #[serde(default)]
    pub system_text: String,
    #[serde(default)]
    pub als_block: String,
    pub user_prompt: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub schema: Option<SchemaDescriptor>,
    #[serde(default)]
    pub allow_equiv_fallback: bool,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_grounding_mode() -> GroundingMode {
    GroundingMode::Off
}

fn default_top_p() -> Option<f64> {
    Some(1.0)
}

fn default_timeout_seconds() -> u64 {
    90
}

impl RunRequest {
    pub const ALS_BLOCK_MAX_CHARS: usize = 350;
}

/// A normalized citation record (spec §3). `source` is `"web_search"` for
/// provider-evidenced retrieval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source: String,
}

impl Citation {
    pub fn web_search(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: title.into(),
            source: "web_search".to_string(),
        }
    }
}

/// Output of an orchestrator run (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub provider: String,
    pub model_name: String,
    #[serde(default)]
    pub region: Option<String>,
    pub grounded_effective: bool,
    #[serde(default)]
    pub tool_call_count: u32,
    #[serde(default)]
    pub citations: Vec<Citation>,
    pub json_text: String,
    #[serde(default)]
    pub json_obj: Option<serde_json::Value>,
    pub json_valid: bool,
    pub latency_ms: u64,
    #[serde(default)]
    pub system_fingerprint: Option<String>,
    #[serde(default)]
    pub usage: HashMap<String, i64>,
    #[serde(default)]
    pub error: Option<ResultErrorKind>,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

/// Per-model capability record (spec §3, §4.6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Capability {
    pub supports_required_toolchoice: bool,
    pub supports_grounding: bool,
    pub can_combine_schema_and_grounding: bool,
    #[serde(default)]
    pub temperature_locked_to: Option<f64>,
    #[serde(default)]
    pub reasoning_required: bool,
    pub default_max_output_tokens: u32,
    pub grounded_max_output_tokens: u32,
}

impl Default for Capability {
    fn default() -> Self {
        Self {
            supports_required_toolchoice: true,
            supports_grounding: false,
            can_combine_schema_and_grounding: true,
            temperature_locked_to: None,
            reasoning_required: false,
            default_max_output_tokens: 2048,
            grounded_max_output_tokens: 4096,
        }
    }
}

/// Locale-probe schema used by callers building brand/locale structured
/// queries. Kept as a convenience constant (spec §9 "out of core, interface
/// only" collaborators still need a canonical shape to agree on), mirroring
/// `LOCALE_PROBE_SCHEMA` in the original implementation.
pub fn locale_probe_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "vat_percent": {"type": "string", "description": "VAT/GST rate with % symbol"},
            "plug": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Electrical plug type letters (e.g., 'G', 'F')"
            },
            "emergency": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Emergency phone numbers"
            }
        },
        "required": ["vat_percent", "plug", "emergency"],
        "additionalProperties": false
    })
}
