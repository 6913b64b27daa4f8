//! OpenAI Responses-API adapter (spec §4.3): request construction, the
//! tool-choice state machine, soft-required fallback, token-starvation
//! retry, capability probing, and usage flattening.

use std::time::Instant;

use tracing::{info_span, warn};

use crate::als::{self, AlsShape};
use crate::capability::{self, interpret_probe_status};
use crate::error::{ErrorContext, OrchestratorError};
use crate::extractor::{derive_grounding_signals, GroundingEvidence};
use crate::types::{GroundingMode, ResultErrorKind, RunRequest, RunResult};

use super::types::{
    CompletionRequest, CompletionResponse, InputItem, ReasoningConfig, ReasoningEffort,
    TextConfig, TextFormat, ToolChoice, ToolDefinition,
};

const OPENAI_RESPONSES_URL: &str = "https://api.openai.com/v1/responses";

/// Minimal probe budget: enough for the API to accept the request shape
/// without paying for a full completion (spec §4.3 "Capability probe").
const PROBE_MAX_OUTPUT_TOKENS: u32 = 16;

/// Fixed search-first directive prepended to `system_text` for soft-required
/// runs (spec §4.3 soft-required path, step 1).
const SEARCH_FIRST_DIRECTIVE: &str = "Policy for stable facts: when a hosted web_search tool is \
     available, call web_search before answering. Keep internal deliberation minimal. After the \
     tool call, answer concisely (max 2 sentences) and include one official citation.";

pub struct OpenAiAdapter {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    gpt5_tools_max_output_tokens: Option<u32>,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Outcome of a single Responses-API call, before invariant enforcement.
struct Attempt {
    response: CompletionResponse,
    latency_ms: u64,
}

impl OpenAiAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_RESPONSES_URL.to_string(),
            gpt5_tools_max_output_tokens: None,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Result<Self, OrchestratorError> {
        Ok(Self::new(config.require_openai_key()?.to_string())
            .with_gpt5_tools_max_output_tokens(config.gpt5_tools_max_output_tokens))
    }

    /// Points this adapter at a different Responses-API endpoint, e.g. a
    /// local mock server in tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the grounded-mode token ceiling for GPT-5-family models
    /// (spec §6 `GPT5_TOOLS_MAX_OUTPUT_TOKENS`), in place of the capability
    /// registry's default.
    pub fn with_gpt5_tools_max_output_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.gpt5_tools_max_output_tokens = max_tokens;
        self
    }

    fn ctx(&self, req: &RunRequest) -> ErrorContext {
        ErrorContext::new("openai", req.model_name.clone())
            .with_grounding_mode(req.grounding_mode.as_str())
    }

    /// Determines whether `tool_choice=required` is safe to send, consulting
    /// the static registry first and the process-local probe cache second,
    /// only issuing a network probe when neither already has an answer
    /// (spec §4.3 capability probe, §8 "invoked at most once per model").
    async fn resolve_supports_required(&self, model: &str) -> bool {
        let cap = capability::lookup(model);
        if !cap.supports_required_toolchoice {
            return false;
        }
        if let Some(cached) = capability::cached_probe(model) {
            return cached;
        }
        let supports = self.probe_required_toolchoice(model).await.unwrap_or(false);
        capability::record_probe(model, supports);
        supports
    }

    async fn probe_required_toolchoice(&self, model: &str) -> Option<bool> {
        let body = CompletionRequest {
            model: model.to_string(),
            input: vec![InputItem::user("ping")],
            tools: vec![ToolDefinition::WebSearch],
            tool_choice: Some(ToolChoice::Required),
            temperature: None,
            top_p: None,
            max_output_tokens: Some(PROBE_MAX_OUTPUT_TOKENS),
            text: None,
            reasoning: None,
        };
        let resp = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .ok()?;
        interpret_probe_status(resp.status().as_u16())
    }

    async fn call(&self, req: &RunRequest, body: &CompletionRequest) -> Result<Attempt, OrchestratorError> {
        let t0 = Instant::now();
        let http_response = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(body)
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
        let http_response = http_response
            .error_for_status()
            .map_err(|source| OrchestratorError::transport(self.ctx(req), source))?;
        let response = http_response
            .json::<CompletionResponse>()
            .await
            .map_err(|source| OrchestratorError::transport(self.ctx(req), source))?;
        Ok(Attempt {
            response,
            latency_ms: t0.elapsed().as_millis() as u64,
        })
    }

    pub async fn run(&self, req: &RunRequest) -> Result<RunResult, OrchestratorError> {
        let span = info_span!(
            target: "orchestrator_core::providers::openai",
            "openai.run",
            gen_ai.operation.name = "responses",
            gen_ai.provider.name = "openai",
            gen_ai.request.model = %req.model_name,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
        );
        let _enter = span.enter();

        let cap = capability::lookup(&req.model_name);
        let wants_tools = matches!(
            req.grounding_mode,
            GroundingMode::Preferred | GroundingMode::Required
        );

        let mut enforcement_mode = "none";
        let mut tool_choice = None;
        let mut tools = Vec::new();
        let mut soft_required = false;

        match req.grounding_mode {
            GroundingMode::Off => {}
            GroundingMode::Preferred => {
                tools.push(ToolDefinition::WebSearch);
                tool_choice = Some(ToolChoice::Auto);
            }
            GroundingMode::Required => {
                if !cap.supports_grounding {
                    return Err(OrchestratorError::ModelNotGroundingCapable(
                        self.ctx(req).with_grounding_mode("required"),
                    ));
                }
                tools.push(ToolDefinition::WebSearch);
                if self.resolve_supports_required(&req.model_name).await {
                    tool_choice = Some(ToolChoice::Required);
                    enforcement_mode = "hard";
                } else {
                    tool_choice = Some(ToolChoice::Auto);
                    enforcement_mode = "soft";
                    soft_required = true;
                }
            }
        }

        let schema_applied = req.schema.is_some()
            && (req.grounding_mode == GroundingMode::Off || cap.can_combine_schema_and_grounding);

        let mut system_text = req.system_text.clone();
        if system_text.is_empty() && !req.als_block.is_empty() {
            system_text = als::LOCALE_SILENT_ADOPTION_DIRECTIVE.to_string();
        }
        if soft_required {
            system_text = if system_text.is_empty() {
                SEARCH_FIRST_DIRECTIVE.to_string()
            } else {
                format!("{SEARCH_FIRST_DIRECTIVE}\n\n{system_text}")
            };
        }

        let reasoning = if cap.reasoning_required && wants_tools {
            Some(ReasoningConfig {
                effort: ReasoningEffort::Low,
            })
        } else {
            None
        };

        let temperature = cap.temperature_locked_to.or(Some(req.temperature));
        let is_gpt5_family = req.model_name.to_lowercase().contains("gpt-5");
        let effective_max_tokens = if wants_tools {
            if is_gpt5_family {
                self.gpt5_tools_max_output_tokens
                    .unwrap_or(cap.grounded_max_output_tokens)
            } else {
                cap.grounded_max_output_tokens
            }
        } else {
            cap.default_max_output_tokens
        };

        let text_config = schema_applied.then(|| {
            let schema = req.schema.as_ref().unwrap();
            TextConfig {
                format: TextFormat::JsonSchema {
                    name: schema.name.clone(),
                    schema: schema.schema.clone(),
                    strict: schema.strict,
                },
            }
        });

        let build_messages = |provoker: Option<&str>| -> Vec<InputItem> {
            let mut msgs = Vec::new();
            if !system_text.is_empty() {
                msgs.push(InputItem::system(system_text.clone()));
            }
            if !req.als_block.is_empty() {
                msgs.push(InputItem::user(req.als_block.clone()));
            }
            let user_content = match provoker {
                Some(p) => format!("{}\n\n{p}", req.user_prompt),
                None => req.user_prompt.clone(),
            };
            msgs.push(InputItem::user(user_content));
            msgs
        };

        let mut body = CompletionRequest {
            model: req.model_name.clone(),
            input: build_messages(None),
            tools: tools.clone(),
            tool_choice,
            temperature,
            top_p: req.top_p,
            max_output_tokens: Some(effective_max_tokens),
            text: text_config.clone(),
            reasoning,
        };

        let mut attempt = self.call(req, &body).await?;

        let mut retry_count = 0u32;
        let mut provoker_hash: Option<String> = None;

        if soft_required && attempt.response.web_search_call_count() == 0 {
            let provoker = format!(
                "As of {}, include a citation to an official source with a working link.",
                chrono::Local::now().date_naive()
            );
            provoker_hash = Some(fingerprint(&provoker));
            body.input = build_messages(Some(&provoker));
            retry_count += 1;
            attempt = self.call(req, &body).await?;
        }

        if soft_required && attempt.response.web_search_call_count() == 0 {
            return Err(OrchestratorError::NoToolCallInSoftRequired(
                self.ctx(req)
                    .with_tool_choice("auto")
                    .with_enforcement_mode("soft"),
            ));
        }

        // Token-starvation retry: a reasoning-only response below the
        // configured ceiling gets one retry with the budget doubled (spec
        // §4.3 "Token starvation retry"). The ceiling is double the initial
        // budget, so the condition "below ceiling" holds for any positive
        // starting budget and the retry fires exactly once.
        let ceiling = effective_max_tokens.saturating_mul(2);
        if attempt.response.has_reasoning_only() && effective_max_tokens < ceiling {
            body.max_output_tokens = Some(ceiling);
            retry_count += 1;
            attempt = self.call(req, &body).await?;
        }

        if attempt.response.has_reasoning_only() {
            return Err(OrchestratorError::NoMessageOutput(self.ctx(req)));
        }

        let tool_call_count = attempt.response.web_search_call_count();

        if req.grounding_mode == GroundingMode::Off && tool_call_count > 0 {
            return Err(OrchestratorError::ToolUsedInUngrounded(self.ctx(req)));
        }

        if req.grounding_mode == GroundingMode::Required && tool_call_count == 0 {
            return Err(OrchestratorError::NoToolCallInRequired(
                self.ctx(req)
                    .with_tool_choice("required")
                    .with_enforcement_mode("hard"),
            ));
        }

        let signals = derive_grounding_signals(GroundingEvidence {
            query_count: Some(tool_call_count),
            chunks: attempt.response.web_search_chunks(),
        });

        let text = attempt.response.message_text().unwrap_or_default();
        let (json_obj, json_valid) = parse_output(&text, schema_applied, req);

        // Fail closed (spec §3 invariant 4): REQUIRED with a schema applied
        // alongside a successful search must not return an invalid payload
        // as if it succeeded (mirrors openai_production.py's
        // `raise RuntimeError(...)` in the equivalent branch).
        if req.grounding_mode == GroundingMode::Required && schema_applied && !json_valid {
            return Err(OrchestratorError::RequiredSchemaInvalid(
                self.ctx(req)
                    .with_tool_choice(body.tool_choice.map(|t| t.as_str()).unwrap_or("none"))
                    .with_enforcement_mode(enforcement_mode),
            ));
        }

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

        let usage = flatten_usage(&attempt.response);
        if let Some(input_tokens) = usage.get("input_tokens") {
            span.record("gen_ai.usage.input_tokens", *input_tokens);
        }
        if let Some(output_tokens) = usage.get("output_tokens") {
            span.record("gen_ai.usage.output_tokens", *output_tokens);
        }

        let mut meta = serde_json::Map::new();
        meta.insert(
            "tool_choice_sent".into(),
            serde_json::json!(body.tool_choice.map(|t| t.as_str())),
        );
        meta.insert("enforcement_mode".into(), serde_json::json!(enforcement_mode));
        meta.insert("schema_applied".into(), serde_json::json!(schema_applied));
        meta.insert(
            "effective_temperature".into(),
            serde_json::json!(temperature),
        );
        meta.insert(
            "effective_max_output_tokens".into(),
            serde_json::json!(body.max_output_tokens),
        );
        meta.insert("retry_count".into(), serde_json::json!(retry_count));
        meta.insert(
            "als_shape".into(),
            serde_json::json!(AlsShape::SeparateContextTurn.as_str()),
        );
        if let Some(hash) = provoker_hash {
            meta.insert("provoker_hash".into(), serde_json::json!(hash));
        }

        if !signals.grounded && !signals.citations.is_empty() {
            warn!("grounding signals disagree: citations present but grounded=false");
        }

        Ok(RunResult {
            run_id: req.run_id.clone(),
            provider: "openai".to_string(),
            model_name: req.model_name.clone(),
            region: None,
            grounded_effective: signals.grounded,
            tool_call_count: signals.tool_calls,
            citations: signals.citations,
            json_text: text,
            json_obj,
            json_valid,
            latency_ms: attempt.latency_ms,
            system_fingerprint: attempt.response.system_fingerprint.clone(),
            usage,
            error: result_error,
            meta,
        })
    }
}

fn parse_output(
    text: &str,
    schema_applied: bool,
    req: &RunRequest,
) -> (Option<serde_json::Value>, bool) {
    if !schema_applied && req.schema.is_none() {
        return (None, false);
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => {
            let valid = req
                .schema
                .as_ref()
                .map(|s| crate::json_validate::validates(&value, &s.schema))
                .unwrap_or(true);
            (Some(value), valid)
        }
        Err(_) => (None, false),
    }
}

fn flatten_usage(response: &CompletionResponse) -> std::collections::HashMap<String, i64> {
    let mut out = std::collections::HashMap::new();
    if let Some(usage) = &response.usage {
        out.insert("input_tokens".to_string(), usage.input_tokens);
        out.insert("output_tokens".to_string(), usage.output_tokens);
        out.insert(
            "total_tokens".to_string(),
            usage
                .total_tokens
                .unwrap_or(usage.input_tokens + usage.output_tokens),
        );
        if usage.output_tokens_details.reasoning_tokens > 0 {
            out.insert(
                "usage_reasoning_tokens".to_string(),
                usage.output_tokens_details.reasoning_tokens,
            );
        }
    }
    out
}

/// Short, non-cryptographic fingerprint for log correlation (DESIGN.md
/// "Dependency notes": a telemetry fingerprint, not a security boundary).
fn fingerprint(text: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:x}", hasher.finish())[..8].to_string()
}
