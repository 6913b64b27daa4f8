//! Error taxonomy for the orchestration core.
//!
//! Two kinds of failure exist, matching the sum-type/product-type split
//! described for provider citation shapes: [`OrchestratorError`] is raised
//! (an `Err` a caller must handle) and [`ResultErrorKind`] is embedded in a
//! successfully-returned [`crate::types::RunResult`].

use serde::{Deserialize, Serialize};

/// Diagnostic payload attached to every raised error, so callers can log it
/// verbatim without re-deriving context from the request.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ErrorContext {
    pub provider: String,
    pub model: String,
    pub grounding_mode: Option<String>,
    pub tool_choice_sent: Option<String>,
    pub enforcement_mode: Option<String>,
}

impl ErrorContext {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            grounding_mode: None,
            tool_choice_sent: None,
            enforcement_mode: None,
        }
    }

    pub fn with_grounding_mode(mut self, mode: impl Into<String>) -> Self {
        self.grounding_mode = Some(mode.into());
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: impl Into<String>) -> Self {
        self.tool_choice_sent = Some(tool_choice.into());
        self
    }

    pub fn with_enforcement_mode(mut self, mode: impl Into<String>) -> Self {
        self.enforcement_mode = Some(mode.into());
        self
    }
}

/// Errors raised to the caller (spec §7, "Raised?" = yes).
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("invalid_request: {reason}")]
    InvalidRequest { reason: String },

    #[error("unknown_provider: {provider}")]
    UnknownProvider { provider: String },

    #[error("model_not_grounding_capable: {0:?}")]
    ModelNotGroundingCapable(ErrorContext),

    #[error("no_tool_call_in_required: {0:?}")]
    NoToolCallInRequired(ErrorContext),

    #[error("no_tool_call_in_soft_required: {0:?}")]
    NoToolCallInSoftRequired(ErrorContext),

    #[error("no_grounding_metadata: {0:?}")]
    NoGroundingMetadata(ErrorContext),

    #[error("tool_used_in_ungrounded: {0:?}")]
    ToolUsedInUngrounded(ErrorContext),

    #[error("no_message_output: {0:?}")]
    NoMessageOutput(ErrorContext),

    #[error("required_schema_invalid: {0:?}")]
    RequiredSchemaInvalid(ErrorContext),

    #[error("auth_required: {0:?}")]
    AuthRequired(ErrorContext),

    #[error("provider_rate_limited: {0:?}")]
    ProviderRateLimited(ErrorContext),

    #[error("provider_transport_error: {context:?}: {message}")]
    ProviderTransportError {
        context: ErrorContext,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("extractor_shape_violation: {0}")]
    ExtractorShapeViolation(String),
}

impl OrchestratorError {
    /// Wraps a transport-level failure from `reqwest` (spec §7
    /// `provider_transport_error`: "Network-level failure after all
    /// in-adapter retries").
    pub fn transport(context: ErrorContext, source: reqwest::Error) -> Self {
        Self::ProviderTransportError {
            context,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// A per-call deadline elapsed (spec §5: `timeout_seconds` bounds total
    /// wall-clock including retries). Classified the same way as any other
    /// network-level failure, since the spec's error taxonomy has no
    /// dedicated timeout kind.
    pub fn timeout(context: ErrorContext) -> Self {
        Self::ProviderTransportError {
            context,
            message: "request timed out".to_string(),
            source: None,
        }
    }

    /// The stable string kind used in logs and by downstream consumers, matching
    /// the kind names in spec §7's error table.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::UnknownProvider { .. } => "unknown_provider",
            Self::ModelNotGroundingCapable(_) => "model_not_grounding_capable",
            Self::NoToolCallInRequired(_) => "no_tool_call_in_required",
            Self::NoToolCallInSoftRequired(_) => "no_tool_call_in_soft_required",
            Self::NoGroundingMetadata(_) => "no_grounding_metadata",
            Self::ToolUsedInUngrounded(_) => "tool_used_in_ungrounded",
            Self::NoMessageOutput(_) => "no_message_output",
            Self::RequiredSchemaInvalid(_) => "required_schema_invalid",
            Self::AuthRequired(_) => "auth_required",
            Self::ProviderRateLimited(_) => "provider_rate_limited",
            Self::ProviderTransportError { .. } => "provider_transport_error",
            Self::ExtractorShapeViolation(_) => "extractor_shape_violation",
        }
    }
}

/// Errors embedded in a returned [`crate::types::RunResult`] (spec §7,
/// "Raised?" = embedded). These never prevent a `RunResult` from being
/// constructed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultErrorKind {
    JsonParseFailed { detail: String },
    Cancelled,
}
