//! `orchestrator_core` is a provider-agnostic LLM request runtime.
//!
//! It sends the same [`types::RunRequest`] to either an OpenAI-Responses-API-style
//! provider or a Vertex Gemini-style provider, enforces web-grounding invariants
//! consistently across both, folds in ambient locale context, validates
//! structured JSON output against a caller-supplied schema, and returns a
//! normalized [`types::RunResult`] regardless of which provider answered.
//!
//! # Example
//! ```no_run
//! use orchestrator_core::prelude::*;
//!
//! # async fn run() -> Result<(), OrchestratorError> {
//! let orchestrator = Orchestrator::from_env();
//!
//! let req = RunRequest {
//!     run_id: "run-1".into(),
//!     client_id: "acme".into(),
//!     provider: "openai".into(),
//!     model_name: "gpt-4o".into(),
//!     region: None,
//!     grounding_mode: GroundingMode::Off,
//!     system_text: String::new(),
//!     als_block: String::new(),
//!     user_prompt: "What is the capital of France?".into(),
//!     temperature: 0.0,
//!     top_p: Some(1.0),
//!     seed: None,
//!     schema: None,
//!     allow_equiv_fallback: false,
//!     timeout_seconds: 30,
//! };
//!
//! let result = orchestrator.run_async(req).await?;
//! println!("{}", result.json_text);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core concepts
//! - [`types`] -- the wire-independent `RunRequest`/`RunResult` contract.
//! - [`orchestrator`] -- routes a request to the right adapter and runs it.
//! - [`extractor`] -- normalizes grounding evidence and citations from either provider.
//! - [`capability`] -- process-local registry of per-model grounding capabilities.
//! - [`als`] -- ambient locale signal validation and provider-specific delivery shape.
//! - [`json_validate`] -- minimal structural validation of JSON output against a schema.
//! - [`providers`] -- the OpenAI and Vertex adapters.

extern crate self as orchestrator_core;

pub mod als;
pub mod capability;
pub mod config;
pub mod error;
pub mod extractor;
pub mod json_validate;
pub mod orchestrator;
pub mod prelude;
pub mod providers;
pub mod types;
