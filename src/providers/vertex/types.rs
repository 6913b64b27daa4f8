//! Wire types for Vertex's `generateContent` endpoint (spec §6), adapted
//! from the teacher's `providers/gemini/completion.rs` request/response
//! shapes, narrowed and extended with the `GoogleSearch` tool and the
//! grounding/schema mutual-exclusion fields this adapter needs.

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct Part {
    pub text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part { text: text.into() }],
        }
    }
}

/// `tools: [{ google_search: {} }]` (spec §4.4 request construction table).
#[derive(Clone, Debug, Serialize)]
pub struct Tool {
    pub google_search: GoogleSearch,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct GoogleSearch {}

#[derive(Clone, Debug, Default, Serialize)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

/// Translates a caller's JSON-Schema-like descriptor into Vertex's native
/// schema object (spec §4.4 "Schema translation"). Supported property
/// types: string, array-of-string, number, boolean; unknown types default
/// to string. Required fields are preserved.
pub fn to_vertex_schema(schema: &serde_json::Value) -> serde_json::Value {
    let schema_def = schema.get("schema").unwrap_or(schema);
    let properties = schema_def
        .get("properties")
        .and_then(serde_json::Value::as_object)
        .cloned()
        .unwrap_or_default();
    let required = schema_def
        .get("required")
        .cloned()
        .unwrap_or_else(|| serde_json::json!([]));

    let mut vertex_props = serde_json::Map::new();
    for (name, def) in properties {
        vertex_props.insert(name, to_vertex_property(&def));
    }

    serde_json::json!({
        "type": "OBJECT",
        "properties": vertex_props,
        "required": required,
    })
}

fn to_vertex_property(prop_def: &serde_json::Value) -> serde_json::Value {
    let prop_type = prop_def.get("type").and_then(serde_json::Value::as_str);
    match prop_type {
        Some("string") => serde_json::json!({"type": "STRING"}),
        Some("array") => {
            let items_type = prop_def
                .get("items")
                .and_then(|i| i.get("type"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("string");
            if items_type == "string" {
                serde_json::json!({"type": "ARRAY", "items": {"type": "STRING"}})
            } else {
                serde_json::json!({"type": "ARRAY", "items": {"type": "STRING"}})
            }
        }
        Some("number") => serde_json::json!({"type": "NUMBER"}),
        Some("boolean") => serde_json::json!({"type": "BOOLEAN"}),
        _ => serde_json::json!({"type": "STRING"}),
    }
}
