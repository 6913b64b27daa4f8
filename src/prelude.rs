//! Common imports for callers driving the orchestrator directly.

pub use crate::error::{ErrorContext, OrchestratorError, ResultErrorKind};
pub use crate::orchestrator::Orchestrator;
pub use crate::types::{
    Capability, Citation, GroundingMode, RunRequest, RunResult, SchemaDescriptor,
};
