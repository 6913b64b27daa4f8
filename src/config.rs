//! Process configuration (spec §6 "Environment inputs").
//!
//! Centralized here so adapters don't each re-read `std::env`; matches the
//! teacher's `ProviderClient::from_env()` idiom but returns `Result` instead
//! of panicking, since an absent key is a classified `auth_required` error,
//! not a process-startup invariant.

use crate::error::{ErrorContext, OrchestratorError};

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub vertex_project: String,
    pub vertex_location: String,
    pub gpt5_tools_max_output_tokens: Option<u32>,
    pub allow_gemini_direct: bool,
    pub google_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            vertex_project: std::env::var("VERTEX_PROJECT")
                .unwrap_or_else(|_| "contestra-ai".to_string()),
            vertex_location: std::env::var("VERTEX_LOCATION")
                .unwrap_or_else(|_| "europe-west4".to_string()),
            gpt5_tools_max_output_tokens: std::env::var("GPT5_TOOLS_MAX_OUTPUT_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok()),
            allow_gemini_direct: std::env::var("ALLOW_GEMINI_DIRECT")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            google_api_key: std::env::var("GOOGLE_API_KEY").ok(),
        }
    }

    /// The OpenAI API key, or a classified `auth_required` error.
    pub fn require_openai_key(&self) -> Result<&str, OrchestratorError> {
        self.openai_api_key.as_deref().ok_or_else(|| {
            OrchestratorError::AuthRequired(
                ErrorContext::new("openai", "").with_enforcement_mode("n/a"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        // SAFETY: tests run single-threaded within this process for env access.
        let cfg = Config {
            openai_api_key: None,
            vertex_project: "contestra-ai".into(),
            vertex_location: "europe-west4".into(),
            gpt5_tools_max_output_tokens: None,
            allow_gemini_direct: false,
            google_api_key: None,
        };
        assert_eq!(cfg.vertex_project, "contestra-ai");
        assert_eq!(cfg.vertex_location, "europe-west4");
        assert!(cfg.require_openai_key().is_err());
    }
}
