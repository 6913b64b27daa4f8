//! Ambient Locale Signals pass-through (spec §3 invariant 7, §4.3, §4.4).
//!
//! The core receives a pre-built, opaque ALS block (spec §1: "Evidence-pack
//! builders and ALS string composition" are out of scope) and is
//! responsible only for placing it correctly per provider and enforcing the
//! length cap.

use crate::types::RunRequest;

/// Fixed locale system message injected when `system_text` is empty but an
/// ALS block is present (spec §4.3): "use ambient context silently and not
/// name countries/regions."
pub const LOCALE_SILENT_ADOPTION_DIRECTIVE: &str =
    "Use the ambient context provided to inform your answer's locale, units, \
     and conventions. Do not name or refer to any country, region, or locale \
     explicitly in your response.";

/// Validates the ALS length cap (spec §3 invariant 1, §8 boundary: 350
/// accepted, 351 rejected).
pub fn validate_als_length(als_block: &str) -> Result<(), String> {
    if als_block.chars().count() > RunRequest::ALS_BLOCK_MAX_CHARS {
        return Err(format!(
            "als_block too long: {} chars (max {})",
            als_block.chars().count(),
            RunRequest::ALS_BLOCK_MAX_CHARS
        ));
    }
    Ok(())
}

/// Which shape was used to deliver ALS to the provider, recorded in
/// `meta.als_shape` (spec §9 "Global ALS composition").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlsShape {
    /// Delivered as its own context turn, distinct from the user message
    /// (OpenAI Responses API).
    SeparateContextTurn,
    /// Concatenated into a single contents string ahead of the user prompt,
    /// verbatim at the end (Vertex generateContent has no separate-turn
    /// concept).
    ConcatenatedContents,
}

impl AlsShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SeparateContextTurn => "separate_context_turn",
            Self::ConcatenatedContents => "concatenated_contents",
        }
    }
}

/// Builds the Vertex-style single contents string: ALS (if any) concatenated
/// ahead of the user prompt, with the user prompt preserved verbatim at the
/// end (spec §4.4). Returns `(text, shape)`.
pub fn compose_vertex_contents(als_block: &str, user_prompt: &str) -> (String, AlsShape) {
    if als_block.is_empty() {
        (user_prompt.to_string(), AlsShape::ConcatenatedContents)
    } else {
        (
            format!("{als_block}\n\n{user_prompt}"),
            AlsShape::ConcatenatedContents,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_350_chars_is_accepted() {
        let block = "x".repeat(350);
        assert!(validate_als_length(&block).is_ok());
    }

    #[test]
    fn exactly_351_chars_is_rejected() {
        let block = "x".repeat(351);
        assert!(validate_als_length(&block).is_err());
    }

    #[test]
    fn vertex_contents_preserves_user_prompt_verbatim_at_end() {
        let (text, shape) = compose_vertex_contents("ALS hints here", "What is the VAT rate?");
        assert!(text.ends_with("What is the VAT rate?"));
        assert_eq!(shape, AlsShape::ConcatenatedContents);
    }

    #[test]
    fn vertex_contents_with_empty_als_is_just_the_prompt() {
        let (text, _) = compose_vertex_contents("", "hello");
        assert_eq!(text, "hello");
    }
}
