//! Prompts for VLM-based alt-text synthesis.
//!
//! Kept in one place so the wording can be tuned, and inspected by tests,
//! without touching the retry logic in [`crate::pipeline::llm`].

/// System prompt for describing one image for a screen-reader user.
pub const DEFAULT_ALT_TEXT_PROMPT: &str = "Write concise, descriptive accessibility alt text for \
this image. Use 1-2 detailed sentences. No quotes.";

/// Extra guidance appended to the system prompt.
pub const ALT_TEXT_RULES: &str = r#"
Rules:
- Describe what the image shows and what it communicates, not how it looks on the page
- For charts and diagrams, name the kind of chart and the main trend or relationship
- Do NOT start with "Image of" or "Picture of"
- Output ONLY the alt text"#;

/// User-turn text carrying the surrounding document text, if any.
pub fn alt_text_context(context: Option<&str>) -> String {
    match context {
        Some(text) if !text.trim().is_empty() => format!(
            "The image appears in a document right after this text:\n\n\"\"\"{}\"\"\"",
            text.trim()
        ),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_asks_for_short_unquoted_text() {
        assert!(DEFAULT_ALT_TEXT_PROMPT.contains("1-2"));
        assert!(DEFAULT_ALT_TEXT_PROMPT.contains("No quotes"));
    }

    #[test]
    fn context_is_optional() {
        assert_eq!(alt_text_context(None), "");
        assert_eq!(alt_text_context(Some("   ")), "");
        assert!(alt_text_context(Some("Results by region")).contains("Results by region"));
    }
}
