//! Capability registry and probe cache (spec §4.6, §5, §9 "Mutable
//! process-wide capability cache").
//!
//! A process-local map keyed by normalized model name, seeded with static
//! defaults and updated by runtime probes. Readers and a single writer per
//! key; a lost race produces a duplicate probe, not corruption -- exactly
//! the "lost race is fine" semantics the spec calls for, so a plain
//! `RwLock<HashMap<..>>` is enough: no compare-and-swap, no retry loop.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::types::Capability;

fn registry() -> &'static RwLock<HashMap<String, Capability>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, Capability>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(default_capabilities()))
}

/// Probe outcomes cache: `(model_name) -> supports tool_choice=required`.
/// Populated at most once per model per process (spec §8 testable property).
fn probe_cache() -> &'static RwLock<HashMap<String, bool>> {
    static CACHE: OnceLock<RwLock<HashMap<String, bool>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Static capability defaults. GPT-5-family models are flagged as not
/// supporting `tool_choice=required` alongside `web_search`, which routes
/// them onto the soft-required path (spec §4.3 table).
fn default_capabilities() -> HashMap<String, Capability> {
    let mut m = HashMap::new();
    m.insert(
        "gpt-4o".to_string(),
        Capability {
            supports_required_toolchoice: true,
            supports_grounding: true,
            can_combine_schema_and_grounding: true,
            temperature_locked_to: None,
            reasoning_required: false,
            default_max_output_tokens: 2048,
            grounded_max_output_tokens: 4096,
        },
    );
    m.insert(
        "gpt-4o-mini".to_string(),
        Capability {
            supports_required_toolchoice: true,
            supports_grounding: true,
            can_combine_schema_and_grounding: true,
            ..Capability::default()
        },
    );
    for gpt5 in ["gpt-5-chat-latest", "gpt-5-mini", "gpt-5-nano", "gpt-5"] {
        m.insert(
            gpt5.to_string(),
            Capability {
                supports_required_toolchoice: false,
                supports_grounding: true,
                can_combine_schema_and_grounding: false,
                temperature_locked_to: Some(1.0),
                reasoning_required: true,
                default_max_output_tokens: 2048,
                grounded_max_output_tokens: 4096,
            },
        );
    }
    for gemini in ["gemini-2.5-pro", "gemini-2.5-flash", "gemini-2.0-flash"] {
        m.insert(
            gemini.to_string(),
            Capability {
                supports_required_toolchoice: true,
                supports_grounding: true,
                can_combine_schema_and_grounding: false,
                temperature_locked_to: None,
                reasoning_required: false,
                default_max_output_tokens: 2048,
                grounded_max_output_tokens: 8192,
            },
        );
    }
    m
}

/// Normalizes a caller-supplied model identifier to the registry key.
/// Vertex publisher paths (`publishers/google/models/gemini-2.0-flash`) are
/// reduced to their trailing short name so the same registry entry applies
/// whether the caller passed the bare name or the full path.
pub fn normalize_model_name(model_name: &str) -> String {
    model_name
        .rsplit('/')
        .next()
        .unwrap_or(model_name)
        .to_string()
}

/// Look up (or synthesize) the capability record for a model. Unknown
/// models get a conservative default (spec doesn't mandate a specific
/// unknown-model policy; a permissive default keeps callers unblocked while
/// still gating the things that have sharp edges -- grounding support
/// defaults to false so an unregistered model can't silently claim it
/// performed a web search).
pub fn lookup(model_name: &str) -> Capability {
    let key = normalize_model_name(model_name);
    registry()
        .read()
        .expect("capability registry lock poisoned")
        .get(&key)
        .cloned()
        .unwrap_or_default()
}

/// Insert or replace a capability record, e.g. after a runtime probe
/// resolves a previously-unknown model.
pub fn upsert(model_name: &str, capability: Capability) {
    let key = normalize_model_name(model_name);
    registry()
        .write()
        .expect("capability registry lock poisoned")
        .insert(key, capability);
}

/// Returns the cached probe result for `model_name`, if any has been
/// recorded this process.
pub fn cached_probe(model_name: &str) -> Option<bool> {
    let key = normalize_model_name(model_name);
    probe_cache()
        .read()
        .expect("probe cache lock poisoned")
        .get(&key)
        .copied()
}

/// Records a probe result. Called at most once logically per model; a
/// second concurrent caller racing to the same key simply overwrites with
/// the same answer (idempotent), matching the documented "lost race is
/// fine" semantics.
pub fn record_probe(model_name: &str, supports_required: bool) {
    let key = normalize_model_name(model_name);
    probe_cache()
        .write()
        .expect("probe cache lock poisoned")
        .insert(key, supports_required);
}

/// HTTP status outcome of a capability probe (spec §4.3): 200 or 429 means
/// the model accepted `tool_choice=required`; 400 means it rejected it.
/// Any other status is treated as inconclusive and not cached, so a later
/// call can retry the probe.
pub fn interpret_probe_status(status: u16) -> Option<bool> {
    match status {
        200 | 429 => Some(true),
        400 => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpt5_family_defaults_to_soft_enforcement_capability() {
        let cap = lookup("gpt-5-mini");
        assert!(!cap.supports_required_toolchoice);
        assert!(cap.reasoning_required);
    }

    #[test]
    fn vertex_publisher_path_normalizes_to_short_name() {
        let cap = lookup("publishers/google/models/gemini-2.5-pro");
        assert!(cap.supports_grounding);
        assert!(!cap.can_combine_schema_and_grounding);
    }

    #[test]
    fn unknown_model_gets_conservative_default() {
        let cap = lookup("some-future-model");
        assert!(!cap.supports_grounding);
    }

    #[test]
    fn probe_status_interpretation_matches_spec() {
        assert_eq!(interpret_probe_status(200), Some(true));
        assert_eq!(interpret_probe_status(429), Some(true));
        assert_eq!(interpret_probe_status(400), Some(false));
        assert_eq!(interpret_probe_status(500), None);
    }

    #[test]
    fn probe_cache_is_per_model_and_memoizes() {
        let model = "probe-cache-test-model-unique";
        assert_eq!(cached_probe(model), None);
        record_probe(model, true);
        assert_eq!(cached_probe(model), Some(true));
    }
}
