//! # Mode Classifier
//!
//! Picks the pipeline mode for a prompt once, at admission. The estimate is
//! deterministic: word count plus word-boundary keyword matches.

use super::pipeline::PipelineMode;
use crate::config::PipelineConfig;

/// Prompts longer than this always get the full pipeline
const LONG_PROMPT_WORDS: usize = 40;
/// Only prompts up to this length qualify for simple mode
const SHORT_PROMPT_WORDS: usize = 15;

const STRUCTURAL_PATTERN: &str = r"(?i)\b(refactor\w*|migrat\w*|architecture|schema|database|endpoints?|integrat\w*|features?|redesign\w*|security|across|multiple)\b";
const TRIVIAL_PATTERN: &str =
    r"(?i)\b(typos?|renam\w*|comments?|wording|labels?|colou?rs?|text|spelling)\b";
const QUESTION_PATTERN: &str =
    r"(?i)^\s*(what|why|how|where|which|who|when|is|are|does|do|can|should|explain)\b";

fn matches(pattern: &str, text: &str) -> bool {
    match regex::Regex::new(pattern) {
        Ok(re) => re.is_match(text),
        Err(e) => {
            tracing::warn!("Invalid classifier pattern: {}", e);
            false
        }
    }
}

fn is_question(prompt: &str) -> bool {
    prompt.trim_end().ends_with('?') || matches(QUESTION_PATTERN, prompt)
}

/// Complexity estimate for a prompt
pub fn classify(prompt: &str) -> PipelineMode {
    let words = prompt.split_whitespace().count();

    if words > LONG_PROMPT_WORDS || matches(STRUCTURAL_PATTERN, prompt) {
        return PipelineMode::Full;
    }
    if words > 0
        && words <= SHORT_PROMPT_WORDS
        && (is_question(prompt) || matches(TRIVIAL_PATTERN, prompt))
    {
        return PipelineMode::Simple;
    }
    PipelineMode::Fast
}

/// Request mode, then `config.force_mode`, then the classifier
pub fn resolve_mode(
    requested: Option<PipelineMode>,
    config: &PipelineConfig,
    prompt: &str,
) -> PipelineMode {
    requested
        .or(config.force_mode)
        .unwrap_or_else(|| classify(prompt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_keywords_need_full() {
        assert_eq!(
            classify("Refactor the billing module into separate services"),
            PipelineMode::Full
        );
        assert_eq!(classify("Add an endpoint for invoices"), PipelineMode::Full);
        assert_eq!(classify("Migrate users to the new schema"), PipelineMode::Full);
    }

    #[test]
    fn test_long_prompts_need_full() {
        let prompt = "please adjust ".repeat(21);
        assert_eq!(classify(&prompt), PipelineMode::Full);
    }

    #[test]
    fn test_questions_and_trivial_edits_are_simple() {
        assert_eq!(classify("What does the retry helper do?"), PipelineMode::Simple);
        assert_eq!(classify("Fix the typo in the README"), PipelineMode::Simple);
        assert_eq!(classify("Rename getUser to fetchUser"), PipelineMode::Simple);
    }

    #[test]
    fn test_everything_else_is_fast() {
        assert_eq!(
            classify("Add a --verbose flag to the export command"),
            PipelineMode::Fast
        );
        assert_eq!(classify(""), PipelineMode::Fast);
    }

    #[test]
    fn test_word_boundaries() {
        // "texture" must not count as the trivial keyword "text".
        assert_eq!(classify("Cache the texture atlas on load"), PipelineMode::Fast);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let prompt = "Why is the login test flaky?";
        assert_eq!(classify(prompt), classify(prompt));
    }

    #[test]
    fn test_precedence() {
        let mut config = PipelineConfig::default();
        let prompt = "Fix the typo in the README";
        assert_eq!(resolve_mode(None, &config, prompt), PipelineMode::Simple);

        config.force_mode = Some(PipelineMode::Fast);
        assert_eq!(resolve_mode(None, &config, prompt), PipelineMode::Fast);
        assert_eq!(
            resolve_mode(Some(PipelineMode::Full), &config, prompt),
            PipelineMode::Full
        );
    }
}
