//! Vertex Gemini adapter (spec §4.4): `GoogleSearch` grounding, the
//! grounding/schema mutual-exclusion rule, tolerant response-field
//! extraction, and chunks-only citation derivation.

use std::time::Instant;

use tracing::{info_span, warn};

use crate::als::AlsShape;
use crate::capability;
use crate::error::{ErrorContext, OrchestratorError};
use crate::extractor::{derive_grounding_signals, GroundingEvidence, RawChunk};
use crate::types::{GroundingMode, ResultErrorKind, RunRequest, RunResult};

use super::types::{
    to_vertex_schema, Content, GenerateContentRequest, GenerationConfig, GoogleSearch, Tool,
};

/// Public Generative Language API, used only for the ungrounded-only
/// diagnostic fallback when Vertex auth fails (spec §4.4 "Authentication
/// fallback", §6 `ALLOW_GEMINI_DIRECT`). Shares the same `generateContent`
/// request/response shape as the Vertex publisher-model endpoint.
const GEMINI_DIRECT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct VertexAdapter {
    http: reqwest::Client,
    project: String,
    location: String,
    endpoint_base: Option<String>,
}

impl std::fmt::Debug for VertexAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexAdapter")
            .field("project", &self.project)
            .field("location", &self.location)
            .finish()
    }
}

impl VertexAdapter {
    pub fn new(project: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            project: project.into(),
            location: location.into(),
            endpoint_base: None,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(config.vertex_project.clone(), config.vertex_location.clone())
    }

    /// Points this adapter at a different host for the `generateContent`
    /// call, e.g. a local mock server in tests. The publisher-model path
    /// and query structure are unchanged; only the scheme+host+project/loc
    /// prefix is replaced.
    pub fn with_endpoint_base(mut self, endpoint_base: impl Into<String>) -> Self {
        self.endpoint_base = Some(endpoint_base.into());
        self
    }

    fn ctx(&self, req: &RunRequest) -> ErrorContext {
        ErrorContext::new("vertex", req.model_name.clone())
            .with_grounding_mode(req.grounding_mode.as_str())
    }

    fn publisher_path(&self, model_name: &str) -> String {
        if model_name.starts_with("publishers/") {
            model_name.to_string()
        } else {
            format!("publishers/google/models/{model_name}")
        }
    }

    fn endpoint(&self, model_name: &str) -> String {
        match &self.endpoint_base {
            Some(base) => format!(
                "{base}/v1/projects/{proj}/locations/{loc}/{path}:generateContent",
                base = base.trim_end_matches('/'),
                proj = self.project,
                loc = self.location,
                path = self.publisher_path(model_name),
            ),
            None => format!(
                "https://{loc}-aiplatform.googleapis.com/v1/projects/{proj}/locations/{loc}/{path}:generateContent",
                loc = self.location,
                proj = self.project,
                path = self.publisher_path(model_name),
            ),
        }
    }

    fn access_token(&self) -> Result<String, OrchestratorError> {
        std::env::var("VERTEX_ACCESS_TOKEN")
            .or_else(|_| std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN"))
            .map_err(|_| OrchestratorError::AuthRequired(ErrorContext::new("vertex", "")))
    }

    pub async fn run(&self, req: &RunRequest) -> Result<RunResult, OrchestratorError> {
        let span = info_span!(
            target: "orchestrator_core::providers::vertex",
            "vertex.generate_content",
            gen_ai.operation.name = "generate_content",
            gen_ai.provider.name = "gcp.vertex",
            gen_ai.request.model = %req.model_name,
        );
        let _enter = span.enter();

        let needs_grounding = matches!(
            req.grounding_mode,
            GroundingMode::Required | GroundingMode::Preferred
        );
        let cap = capability::lookup(&req.model_name);

        if needs_grounding && !cap.supports_grounding {
            return Err(OrchestratorError::ModelNotGroundingCapable(
                self.ctx(req).with_grounding_mode(req.grounding_mode.as_str()),
            ));
        }

        let schema_applied = !needs_grounding && req.schema.is_some();
        let tools = if needs_grounding {
            vec![Tool {
                google_search: GoogleSearch {},
            }]
        } else {
            Vec::new()
        };

        let generation_config = GenerationConfig {
            temperature: cap.temperature_locked_to.or(Some(req.temperature)),
            top_p: req.top_p,
            seed: req.seed,
            response_mime_type: if needs_grounding {
                Some("text/plain".to_string())
            } else if req.schema.is_some() {
                Some("application/json".to_string())
            } else {
                None
            },
            response_schema: schema_applied
                .then(|| to_vertex_schema(&req.schema.as_ref().unwrap().schema)),
        };

        let (mut contents_text, als_shape) =
            crate::als::compose_vertex_contents(&req.als_block, &req.user_prompt);
        if needs_grounding && req.schema.is_some() {
            contents_text.push_str(
                "\n\nReturn your response as valid JSON matching the requested format.",
            );
            warn!("grounding requested alongside schema; falling back to best-effort JSON parse");
        }

        let system_instruction = (!req.system_text.is_empty())
            .then(|| Content::user(req.system_text.clone()));

        let body = GenerateContentRequest {
            contents: vec![Content::user(contents_text)],
            system_instruction,
            generation_config,
            tools,
        };

        let token = self.access_token()?;
        let t0 = Instant::now();
        let http_response = self
            .http
            .post(self.endpoint(&req.model_name))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|source| OrchestratorError::transport(self.ctx(req), source))?;

        if http_response.status() == reqwest::StatusCode::UNAUTHORIZED
            || http_response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(OrchestratorError::AuthRequired(self.ctx(req)));
        }
        if http_response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OrchestratorError::ProviderRateLimited(self.ctx(req)));
        }
        let http_response =
            http_response
                .error_for_status()
                .map_err(|source| OrchestratorError::transport(self.ctx(req), source))?;

        let raw: serde_json::Value =
            http_response
                .json()
                .await
                .map_err(|source| OrchestratorError::transport(self.ctx(req), source))?;
        let latency_ms = t0.elapsed().as_millis() as u64;

        let text = extract_text(&raw);
        let signals = extract_grounding_signals(&raw)?;

        if req.grounding_mode == GroundingMode::Required && !signals.grounded {
            return Err(OrchestratorError::NoGroundingMetadata(self.ctx(req)));
        }

        let (json_obj, json_valid) = if needs_grounding {
            // Grounding mode returns plain text, wrapped per spec §3 "RunResult".
            let obj = serde_json::json!({"response": text});
            let valid = req.schema.is_some()
                && serde_json::from_str::<serde_json::Value>(&text).is_ok();
            (Some(obj), valid)
        } else if req.schema.is_some() {
            let stripped = strip_code_fences(&text);
            match serde_json::from_str::<serde_json::Value>(&stripped) {
                Ok(value) => {
                    let valid = crate::json_validate::validates(
                        &value,
                        &req.schema.as_ref().unwrap().schema,
                    );
                    (Some(value), valid)
                }
                Err(_) => (None, false),
            }
        } else {
            (None, false)
        };

        // Embedded, not raised (spec §7 `json_parse_failed`): Vertex never
        // combines schema and grounding, so the REQUIRED+schema case never
        // reaches here with `needs_grounding` true; this only covers OFF/
        // PREFERRED runs where a schema was requested and the model's output
        // didn't parse or validate.
        let result_error = if req.grounding_mode != GroundingMode::Required
            && req.schema.is_some()
            && !json_valid
        {
            Some(ResultErrorKind::JsonParseFailed {
                detail: "schema requested but output did not parse or validate as JSON".to_string(),
            })
        } else {
            None
        };

        let usage = extract_usage(&raw);
        let system_fingerprint = extract_model_version(&raw);

        let mut meta = serde_json::Map::new();
        meta.insert("schema_applied".into(), serde_json::json!(schema_applied));
        meta.insert(
            "effective_temperature".into(),
            serde_json::json!(generation_config_temperature(&raw, req, &cap)),
        );
        meta.insert("als_shape".into(), serde_json::json!(als_shape.as_str()));
        meta.insert(
            "grounding_enabled".into(),
            serde_json::json!(needs_grounding),
        );

        Ok(RunResult {
            run_id: req.run_id.clone(),
            provider: "vertex".to_string(),
            model_name: req.model_name.clone(),
            region: Some(self.location.clone()),
            grounded_effective: signals.grounded,
            tool_call_count: signals.tool_calls,
            citations: signals.citations,
            json_text: text,
            json_obj,
            json_valid,
            latency_ms,
            system_fingerprint,
            usage,
            error: result_error,
            meta,
        })
    }

    /// Ungrounded-only diagnostic fallback to the direct Generative Language
    /// API, used by the orchestrator when Vertex authentication fails (spec
    /// §4.4 "Authentication fallback"). Callers are responsible for only
    /// invoking this when `grounding_mode == Off`; it never attaches the
    /// `GoogleSearch` tool.
    pub async fn run_direct(&self, req: &RunRequest, api_key: &str) -> Result<RunResult, OrchestratorError> {
        let cap = capability::lookup(&req.model_name);
        let schema_applied = req.schema.is_some();

        let generation_config = GenerationConfig {
            temperature: cap.temperature_locked_to.or(Some(req.temperature)),
            top_p: req.top_p,
            seed: req.seed,
            response_mime_type: req.schema.is_some().then(|| "application/json".to_string()),
            response_schema: schema_applied
                .then(|| to_vertex_schema(&req.schema.as_ref().unwrap().schema)),
        };

        let (contents_text, als_shape) =
            crate::als::compose_vertex_contents(&req.als_block, &req.user_prompt);
        let system_instruction =
            (!req.system_text.is_empty()).then(|| Content::user(req.system_text.clone()));

        let body = GenerateContentRequest {
            contents: vec![Content::user(contents_text)],
            system_instruction,
            generation_config,
            tools: Vec::new(),
        };

        let url = format!(
            "{base}/models/{model}:generateContent?key={key}",
            base = GEMINI_DIRECT_BASE,
            model = req.model_name.trim_start_matches("publishers/google/models/"),
            key = api_key,
        );

        let t0 = Instant::now();
        let http_response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| OrchestratorError::transport(self.ctx(req), source))?;
        let http_response = http_response
            .error_for_status()
            .map_err(|source| OrchestratorError::transport(self.ctx(req), source))?;
        let raw: serde_json::Value = http_response
            .json()
            .await
            .map_err(|source| OrchestratorError::transport(self.ctx(req), source))?;
        let latency_ms = t0.elapsed().as_millis() as u64;

        let text = extract_text(&raw);
        let (json_obj, json_valid) = if schema_applied {
            let stripped = strip_code_fences(&text);
            match serde_json::from_str::<serde_json::Value>(&stripped) {
                Ok(value) => {
                    let valid = crate::json_validate::validates(
                        &value,
                        &req.schema.as_ref().unwrap().schema,
                    );
                    (Some(value), valid)
                }
                Err(_) => (None, false),
            }
        } else {
            (None, false)
        };
        let result_error = (schema_applied && !json_valid).then(|| ResultErrorKind::JsonParseFailed {
            detail: "schema requested but output did not parse or validate as JSON".to_string(),
        });

        let mut meta = serde_json::Map::new();
        meta.insert("schema_applied".into(), serde_json::json!(schema_applied));
        meta.insert("als_shape".into(), serde_json::json!(als_shape.as_str()));
        meta.insert("grounding_enabled".into(), serde_json::json!(false));
        meta.insert("transport".into(), serde_json::json!("gemini_direct"));
        meta.insert(
            "fallback_reason".into(),
            serde_json::json!("vertex_auth_failed"),
        );

        Ok(RunResult {
            run_id: req.run_id.clone(),
            provider: "vertex".to_string(),
            model_name: req.model_name.clone(),
            region: None,
            grounded_effective: false,
            tool_call_count: 0,
            citations: Vec::new(),
            json_text: text,
            json_obj,
            json_valid,
            latency_ms,
            system_fingerprint: extract_model_version(&raw),
            usage: extract_usage(&raw),
            error: result_error,
            meta,
        })
    }
}

fn generation_config_temperature(
    _raw: &serde_json::Value,
    req: &RunRequest,
    cap: &crate::types::Capability,
) -> f64 {
    cap.temperature_locked_to.unwrap_or(req.temperature)
}

/// Tolerant text extraction (spec §4.4 "Response processing" step 1):
/// candidate → content → parts first, then a top-level `text` field, then
/// stringify as a last resort.
fn extract_text(raw: &serde_json::Value) -> String {
    if let Some(text) = raw
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    {
        let joined: String = text
            .iter()
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect();
        if !joined.is_empty() {
            return joined;
        }
    }
    if let Some(text) = raw.get("text").and_then(|t| t.as_str()) {
        return text.to_string();
    }
    raw.to_string()
}

/// Removes a markdown code fence wrapping JSON text, if present (spec §4.4
/// step 2 / SPEC_FULL.md B.6.5).
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.contains("```") {
        return trimmed.to_string();
    }
    let without_leading = trimmed
        .trim_start_matches("```json")
        .trim_start_matches("```");
    let without_trailing = without_leading.trim_end_matches("```");
    without_trailing.trim().to_string()
}

/// Reads grounding metadata from either `grounding_metadata` or
/// `groundingMetadata` at the candidate level, and both snake_case and
/// camelCase children, building citations exclusively from
/// `grounding_chunks[].web.uri` -- never from a `citations` field (spec
/// §4.4 step 3, DESIGN.md "Spec-vs-source deviations").
fn extract_grounding_signals(
    raw: &serde_json::Value,
) -> Result<crate::extractor::GroundingSignals, OrchestratorError> {
    let candidate = raw.get("candidates").and_then(|c| c.get(0));
    let Some(candidate) = candidate else {
        return Ok(derive_grounding_signals(GroundingEvidence::default()));
    };
    let gm = candidate
        .get("grounding_metadata")
        .or_else(|| candidate.get("groundingMetadata"));
    let Some(gm) = gm else {
        return Ok(derive_grounding_signals(GroundingEvidence::default()));
    };

    let queries = gm
        .get("web_search_queries")
        .or_else(|| gm.get("webSearchQueries"))
        .and_then(|q| q.as_array())
        .map(|q| q.len());

    let chunks_value = gm
        .get("grounding_chunks")
        .or_else(|| gm.get("groundingChunks"))
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default();

    let mut chunks = Vec::with_capacity(chunks_value.len());
    for chunk in &chunks_value {
        crate::extractor::assert_chunk_shape(chunk)?;
        let web = chunk.get("web");
        let uri = web
            .and_then(|w| w.get("uri"))
            .and_then(|u| u.as_str())
            .map(str::to_string);
        let title = web
            .and_then(|w| w.get("title"))
            .and_then(|t| t.as_str())
            .map(str::to_string);
        chunks.push(RawChunk { uri, title });
    }

    Ok(derive_grounding_signals(GroundingEvidence {
        query_count: queries,
        chunks,
    }))
}

/// Vertex's `modelVersion` (spec §3 `system_fingerprint`), read tolerantly
/// from both casing variants (`vertex_adapter_standalone.py:544`).
fn extract_model_version(raw: &serde_json::Value) -> Option<String> {
    raw.get("modelVersion")
        .or_else(|| raw.get("model_version"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn extract_usage(raw: &serde_json::Value) -> std::collections::HashMap<String, i64> {
    let mut out = std::collections::HashMap::new();
    let Some(usage) = raw.get("usageMetadata").or_else(|| raw.get("usage_metadata")) else {
        return out;
    };
    for (key, target) in [
        ("promptTokenCount", "input_tokens"),
        ("candidatesTokenCount", "output_tokens"),
        ("totalTokenCount", "total_tokens"),
    ] {
        if let Some(v) = usage.get(key).and_then(|v| v.as_i64()) {
            out.insert(target.to_string(), v);
        }
    }
    out
}
