//! # Prompt Templates
//!
//! Builds the instruction sent to the language model. Both variants embed the
//! transcript verbatim in quotes, pin down the exact JSON field set, give
//! numeric rubric bands, and demand a JSON-only reply.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which prompt/reconciliation variant the generator runs.
///
/// ## Variants:
/// - **Simple**: the model returns a single flat `score`
/// - **WithBreakdown**: the model must also justify vocabulary, grammar and
///   understandability sub-scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    Simple,
    #[default]
    WithBreakdown,
}

impl ScoringMode {
    /// Whether records produced in this mode carry a `score_breakdown`.
    pub fn has_breakdown(self) -> bool {
        matches!(self, ScoringMode::WithBreakdown)
    }
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringMode::Simple => write!(f, "simple"),
            ScoringMode::WithBreakdown => write!(f, "with_breakdown"),
        }
    }
}

const RUBRIC_BANDS: &str = "  - 90-100: native-like, no errors
  - 70-89: minor issues that do not affect meaning
  - 50-69: several errors, meaning still recoverable
  - 0-49: many serious errors, hard to understand";

/// Build the prompt for the given transcript and scoring mode.
pub fn build_prompt(raw_transcript: &str, mode: ScoringMode) -> String {
    match mode {
        ScoringMode::Simple => simple_prompt(raw_transcript),
        ScoringMode::WithBreakdown => breakdown_prompt(raw_transcript),
    }
}

fn simple_prompt(raw_transcript: &str) -> String {
    format!(
        r#"You are an English evaluation assistant for language learners. Analyze the following raw speech transcript and provide feedback.

Raw transcript: "{raw_transcript}"

Reply with a JSON object in exactly this format:
{{
  "corrected": "Natural English version (1-2 sentences)",
  "issues": ["Issue 1", "Issue 2", "Issue 3"],
  "better_options": ["Better option 1", "Better option 2"],
  "drill": "Practice sentence with the same structure",
  "score": 85
}}

Rules:
- "corrected" (string): fix the grammar and make it natural English, 1-2 sentences max
- "issues" (array of strings): at most 3 specific issues, short phrases
- "better_options" (array of strings): at most 2 alternative ways to say the same thing, short phrases
- "drill" (string): one practice sentence using the same grammatical structure
- "score" (integer 0-100): correctness and naturalness. Be strict:
{RUBRIC_BANDS}

Return ONLY the JSON object, no additional text."#
    )
}

fn breakdown_prompt(raw_transcript: &str) -> String {
    format!(
        r#"You are a strict English evaluation assistant for language learners. Analyze the following raw speech transcript and provide feedback.

Raw transcript: "{raw_transcript}"

Reply with a JSON object in exactly this format:
{{
  "corrected": "Natural English version (1-2 sentences)",
  "issues": ["Issue 1", "Issue 2", "Issue 3"],
  "better_options": ["Better option 1", "Better option 2"],
  "drill": "Practice sentence with the same structure",
  "score_breakdown": {{
    "vocabulary": {{"score": 80, "reason": "Why this vocabulary score"}},
    "grammar": {{"score": 70, "reason": "Why this grammar score"}},
    "understandability": {{"score": 90, "reason": "Why this understandability score"}}
  }},
  "score": 80
}}

Rules:
- "corrected" (string): fix the grammar and make it natural English, 1-2 sentences max
- "issues" (array of strings): at most 3 specific issues, short phrases
- "better_options" (array of strings): at most 2 alternative ways to say the same thing, short phrases
- "drill" (string): one practice sentence using the same grammatical structure
- "score_breakdown.vocabulary.score" (integer 0-100): word choice and range
{RUBRIC_BANDS}
- "score_breakdown.grammar.score" (integer 0-100): tense, agreement, articles, word order
{RUBRIC_BANDS}
- "score_breakdown.understandability.score" (integer 0-100): how easily a native speaker understands it
{RUBRIC_BANDS}
- every "reason" (string): one short sentence justifying that score
- "score" (integer 0-100): the rounded average of the three sub-scores

Return ONLY the JSON object, no additional text."#
    )
}
