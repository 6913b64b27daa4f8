//! Citation & grounding extractor (spec §4.2).
//!
//! A pure function from provider-specific evidence to `{grounded, tool_calls,
//! citations}`. Both provider adapters funnel their raw response shapes
//! through [`RawChunk`]/[`GroundingEvidence`] so this algorithm runs exactly
//! once, in one place, regardless of which provider produced the evidence.

use std::collections::HashSet;

use crate::error::OrchestratorError;
use crate::types::Citation;

/// One provider "chunk" or per-call citation record, before normalization.
#[derive(Clone, Debug, Default)]
pub struct RawChunk {
    pub uri: Option<String>,
    pub title: Option<String>,
}

/// Evidence a provider adapter gathers from a single response, handed to
/// [`derive_grounding_signals`].
#[derive(Clone, Debug, Default)]
pub struct GroundingEvidence {
    /// `Some(n)` when the provider surfaces an explicit query/tool-call
    /// count (OpenAI: number of `web_search_call` output items; Vertex:
    /// length of `web_search_queries`). `None` when the provider shape has
    /// no such record at all, in which case tool calls are derived from
    /// unique citation URIs instead (spec §4.2 step 5).
    pub query_count: Option<usize>,
    pub chunks: Vec<RawChunk>,
}

/// Derived signals, ready to populate [`crate::types::RunResult`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroundingSignals {
    pub grounded: bool,
    pub tool_calls: u32,
    pub citations: Vec<Citation>,
}

/// Build citations from provider chunks exclusively; never from free-form
/// text. Each chunk with a non-empty `uri` contributes at most one citation.
/// Deduplicates by `uri`, preserving first-seen order (spec §4.2 step 3,
/// §3 invariant 2).
pub fn dedup_citations(chunks: Vec<RawChunk>) -> Vec<Citation> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let Some(uri) = chunk.uri.filter(|u| !u.is_empty()) else {
            continue;
        };
        if seen.insert(uri.clone()) {
            out.push(Citation::web_search(uri, chunk.title.unwrap_or_default()));
        }
    }
    out
}

/// The pure extractor algorithm (spec §4.2 steps 4-5). Idempotent: running
/// it twice on equivalent evidence yields equal citation lists, satisfying
/// the testable property in spec §8.
pub fn derive_grounding_signals(evidence: GroundingEvidence) -> GroundingSignals {
    let citations = dedup_citations(evidence.chunks);
    let grounded = !citations.is_empty() || evidence.query_count.unwrap_or(0) > 0;
    let tool_calls = match evidence.query_count {
        Some(q) => q as u32,
        None => citations.len() as u32,
    };
    GroundingSignals {
        grounded,
        tool_calls,
        citations,
    }
}

/// Shape-assert that a provider-supplied JSON value is an object before
/// treating it as a citation chunk source, per spec §4.2 step 6 ("every
/// citation is a dict; otherwise raise `extractor_shape_violation` -- this
/// is a programmer error, not a runtime failure"). Callers use this when
/// pulling chunk entries out of loosely-typed provider JSON (Vertex's
/// tolerant field walk); OpenAI's typed `web_search_call` items never reach
/// this path since they are already structured.
pub fn assert_chunk_shape(
    value: &serde_json::Value,
) -> Result<&serde_json::Map<String, serde_json::Value>, OrchestratorError> {
    value.as_object().ok_or_else(|| {
        OrchestratorError::ExtractorShapeViolation(format!(
            "expected citation chunk to be an object, got: {value}"
        ))
    })
}
