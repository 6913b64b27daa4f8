//! Thin dispatch layer (spec §4.5): routes a [`RunRequest`] to the adapter
//! selected by `provider`, exposes blocking and cooperative entry points,
//! and performs no retries of its own -- only the adapters' declared
//! retries may re-invoke a provider.

use tracing::{error, info, warn};

use crate::als;
use crate::config::Config;
use crate::error::OrchestratorError;
use crate::providers::openai::OpenAiAdapter;
use crate::providers::vertex::VertexAdapter;
use crate::types::{GroundingMode, ResultErrorKind, RunRequest, RunResult};

/// Canonical provider keys this orchestrator knows how to route to, plus
/// their aliases (spec §3, SPEC_FULL.md B.6.1: `gemini`/`google` both
/// resolve to `vertex`, looked up case-insensitively).
fn resolve_provider(provider: &str) -> Option<&'static str> {
    match provider.to_lowercase().as_str() {
        "openai" => Some("openai"),
        "vertex" | "google" | "gemini" => Some("vertex"),
        _ => None,
    }
}

/// Small static per-provider model list (SPEC_FULL.md B.6.2): advisory only,
/// callers may pass any `model_name`; unregistered providers get an empty
/// list rather than an error.
fn static_supported_models(provider: &str) -> Vec<&'static str> {
    match provider {
        "openai" => vec![
            "gpt-4o",
            "gpt-4o-mini",
            "gpt-5-chat-latest",
            "gpt-5-mini",
            "gpt-5-nano",
        ],
        "vertex" => vec![
            "publishers/google/models/gemini-2.5-pro",
            "publishers/google/models/gemini-2.5-flash",
            "publishers/google/models/gemini-2.0-flash",
        ],
        _ => Vec::new(),
    }
}

pub struct Orchestrator {
    openai: Option<OpenAiAdapter>,
    vertex: VertexAdapter,
    allow_gemini_direct: bool,
    google_api_key: Option<String>,
}

impl Orchestrator {
    pub fn from_config(config: Config) -> Self {
        let openai = config
            .openai_api_key
            .clone()
            .map(OpenAiAdapter::new)
            .map(|a| a.with_gpt5_tools_max_output_tokens(config.gpt5_tools_max_output_tokens));
        let vertex = VertexAdapter::from_config(&config);
        Self {
            openai,
            vertex,
            allow_gemini_direct: config.allow_gemini_direct,
            google_api_key: config.google_api_key.clone(),
        }
    }

    pub fn from_env() -> Self {
        Self::from_config(Config::from_env())
    }

    /// Builds an orchestrator from already-constructed adapters, bypassing
    /// environment lookup. Used by integration tests to point adapters at a
    /// mock server. The direct-Gemini fallback (spec §4.4, §6
    /// `ALLOW_GEMINI_DIRECT`) is disabled for orchestrators built this way;
    /// use `from_config` to enable it.
    pub fn from_adapters(openai: Option<OpenAiAdapter>, vertex: VertexAdapter) -> Self {
        Self {
            openai,
            vertex,
            allow_gemini_direct: false,
            google_api_key: None,
        }
    }

    /// Field-by-field request validation (spec §4.1, SPEC_FULL.md B.6.3),
    /// independently callable by callers before a run.
    pub fn validate_request(&self, req: &RunRequest) -> Result<(), OrchestratorError> {
        let Some(_) = resolve_provider(&req.provider) else {
            return Err(OrchestratorError::UnknownProvider {
                provider: req.provider.clone(),
            });
        };
        if req.run_id.is_empty() {
            return Err(OrchestratorError::InvalidRequest {
                reason: "run_id is required".to_string(),
            });
        }
        if req.user_prompt.is_empty() {
            return Err(OrchestratorError::InvalidRequest {
                reason: "user_prompt is required".to_string(),
            });
        }
        als::validate_als_length(&req.als_block).map_err(|reason| {
            OrchestratorError::InvalidRequest { reason }
        })?;
        if !(0.0..=2.0).contains(&req.temperature) {
            return Err(OrchestratorError::InvalidRequest {
                reason: format!("temperature out of range: {} (0-2)", req.temperature),
            });
        }
        if let Some(top_p) = req.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(OrchestratorError::InvalidRequest {
                    reason: format!("top_p out of range: {top_p} (0-1)"),
                });
            }
        }
        if let Some(schema) = &req.schema {
            if !schema.is_well_formed() {
                return Err(OrchestratorError::InvalidRequest {
                    reason: "schema is not well-formed".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn get_supported_models(&self, provider: &str) -> Vec<&'static str> {
        match resolve_provider(provider) {
            Some(canonical) => static_supported_models(canonical),
            None => Vec::new(),
        }
    }

    /// Cooperative (suspendable) entry point (spec §5).
    pub async fn run_async(&self, req: RunRequest) -> Result<RunResult, OrchestratorError> {
        self.validate_request(&req)?;
        let canonical = resolve_provider(&req.provider).expect("validated above");

        info!(
            run_id = %req.run_id,
            provider = %req.provider,
            model = %req.model_name,
            grounding_mode = %req.grounding_mode,
            "orchestrator run starting"
        );

        let timeout = std::time::Duration::from_secs(req.timeout_seconds.max(1));
        let outcome = tokio::time::timeout(timeout, self.dispatch(canonical, &req)).await;

        match outcome {
            Ok(Ok(result)) => {
                info!(
                    run_id = %req.run_id,
                    grounded_effective = result.grounded_effective,
                    tool_call_count = result.tool_call_count,
                    latency_ms = result.latency_ms,
                    "orchestrator run completed"
                );
                Ok(result)
            }
            Ok(Err(err)) => {
                error!(run_id = %req.run_id, error = %err, "orchestrator run failed");
                Err(err)
            }
            Err(_elapsed) => {
                error!(run_id = %req.run_id, "orchestrator run timed out");
                Err(OrchestratorError::timeout(crate::error::ErrorContext::new(
                    canonical,
                    req.model_name.clone(),
                )))
            }
        }
    }

    /// Runs `req`, honoring cooperative cancellation signaled on `cancel`
    /// (spec §5 "Cancellation"): a cancelled run returns `cancelled` with no
    /// citations rather than propagating an error.
    pub async fn run_cancellable(
        &self,
        req: RunRequest,
        cancel: tokio::sync::oneshot::Receiver<()>,
    ) -> Result<RunResult, OrchestratorError> {
        tokio::select! {
            biased;
            _ = cancel => Ok(cancelled_result(&req)),
            result = self.run_async(req.clone()) => result,
        }
    }

    /// Blocking entry point (spec §5).
    pub fn run(&self, req: RunRequest) -> Result<RunResult, OrchestratorError> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => tokio::task::block_in_place(|| handle.block_on(self.run_async(req))),
            Err(_) => {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .expect("failed to build a current-thread tokio runtime for Orchestrator::run");
                rt.block_on(self.run_async(req))
            }
        }
    }

    async fn dispatch(
        &self,
        canonical: &str,
        req: &RunRequest,
    ) -> Result<RunResult, OrchestratorError> {
        match canonical {
            "openai" => {
                let adapter = self.openai.as_ref().ok_or_else(|| {
                    OrchestratorError::AuthRequired(crate::error::ErrorContext::new(
                        "openai",
                        req.model_name.clone(),
                    ))
                })?;
                adapter.run(req).await
            }
            "vertex" => match self.vertex.run(req).await {
                Err(OrchestratorError::AuthRequired(_))
                    if req.grounding_mode == GroundingMode::Off
                        && self.allow_gemini_direct
                        && self.google_api_key.is_some() =>
                {
                    warn!(
                        run_id = %req.run_id,
                        "vertex auth failed, falling back to direct Gemini API"
                    );
                    self.vertex
                        .run_direct(req, self.google_api_key.as_deref().expect("checked above"))
                        .await
                }
                other => other,
            },
            other => Err(OrchestratorError::UnknownProvider {
                provider: other.to_string(),
            }),
        }
    }
}

fn cancelled_result(req: &RunRequest) -> RunResult {
    RunResult {
        run_id: req.run_id.clone(),
        provider: req.provider.clone(),
        model_name: req.model_name.clone(),
        region: req.region.clone(),
        grounded_effective: false,
        tool_call_count: 0,
        citations: Vec::new(),
        json_text: String::new(),
        json_obj: None,
        json_valid: false,
        latency_ms: 0,
        system_fingerprint: None,
        usage: Default::default(),
        error: Some(ResultErrorKind::Cancelled),
        meta: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GroundingMode;

    fn sample_request() -> RunRequest {
        RunRequest {
            run_id: "run-1".into(),
            client_id: "client-1".into(),
            provider: "openai".into(),
            model_name: "gpt-4o".into(),
            region: None,
            grounding_mode: GroundingMode::Off,
            system_text: String::new(),
            als_block: String::new(),
            user_prompt: "hello".into(),
            temperature: 0.0,
            top_p: Some(1.0),
            seed: None,
            schema: None,
            allow_equiv_fallback: false,
            timeout_seconds: 30,
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::from_config(Config::default())
    }

    #[test]
    fn resolve_provider_aliases_vertex() {
        assert_eq!(resolve_provider("gemini"), Some("vertex"));
        assert_eq!(resolve_provider("GOOGLE"), Some("vertex"));
        assert_eq!(resolve_provider("vertex"), Some("vertex"));
        assert_eq!(resolve_provider("openai"), Some("openai"));
        assert_eq!(resolve_provider("anthropic"), None);
    }

    #[test]
    fn validate_request_rejects_unknown_provider() {
        let orch = orchestrator();
        let mut req = sample_request();
        req.provider = "not-a-provider".into();
        let err = orch.validate_request(&req).unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownProvider { .. }));
    }

    #[test]
    fn validate_request_rejects_als_over_350_chars() {
        let orch = orchestrator();
        let mut req = sample_request();
        req.als_block = "x".repeat(351);
        assert!(orch.validate_request(&req).is_err());
    }

    #[test]
    fn validate_request_accepts_als_at_exactly_350_chars() {
        let orch = orchestrator();
        let mut req = sample_request();
        req.als_block = "x".repeat(350);
        assert!(orch.validate_request(&req).is_ok());
    }

    #[test]
    fn validate_request_rejects_temperature_out_of_range() {
        let orch = orchestrator();
        let mut req = sample_request();
        req.temperature = 2.1;
        assert!(orch.validate_request(&req).is_err());
    }

    #[test]
    fn validate_request_rejects_empty_run_id() {
        let orch = orchestrator();
        let mut req = sample_request();
        req.run_id = String::new();
        assert!(orch.validate_request(&req).is_err());
    }

    #[test]
    fn get_supported_models_is_advisory_and_empty_for_unknown_provider() {
        let orch = orchestrator();
        assert!(!orch.get_supported_models("openai").is_empty());
        assert!(orch.get_supported_models("not-a-provider").is_empty());
    }
}
